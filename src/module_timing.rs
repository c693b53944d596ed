use embassy_time::Duration;

/// Minimum quiet time on the line before a command is written
pub const fn command_quiet_interval() -> Duration {
    Duration::from_millis(20)
}

/// Fallback wait for commands sent as plain text
pub const fn default_response_timeout() -> Duration {
    Duration::from_millis(200)
}

/// Wait for the `>` prompt before raw payload is written
pub const fn prompt_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Wait for the `>` prompt of `+UDWNFILE`; the module aborts the transfer
/// itself after 20 s
pub const fn file_prompt_timeout() -> Duration {
    Duration::from_secs(20)
}

/// How long `AT` is retried after power up until the module answers
pub const fn autosense_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Time between `AT` attempts while autosensing
pub const fn autosense_interval() -> Duration {
    Duration::from_millis(100)
}

/// Response time of `AT+CFUN=15`, after which the module reboots
pub const fn soft_reset_time() -> Duration {
    Duration::from_secs(1)
}

/// Poll interval of blocking state machine loops
pub const fn poll_interval() -> Duration {
    Duration::from_millis(100)
}

/// Upper bound for an FTP operation, from `+UFTPC` to its `+UUFTPCR`
pub const fn ftp_operation_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Silence on the line before the `+++` escape ends a direct link
pub const fn escape_guard_time() -> Duration {
    Duration::from_secs(1)
}

/// Wait for the answer to `AT+USORD`
pub const fn socket_read_timeout() -> Duration {
    Duration::from_secs(10)
}
