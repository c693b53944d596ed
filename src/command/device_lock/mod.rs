//! ### 9 - Security
//!
use atat::atat_derive::AtatCmd;

use super::NoResponse;

/// 9.1 Enter PIN +CPIN
///
/// Reads whether the SIM is ready or waiting for a password. The answer is a
/// single `+CPIN: <code>` line, read from the response text.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CPIN?", NoResponse, timeout_ms = 10000)]
pub struct GetPinStatus;

/// 9.1 Enter PIN +CPIN
///
/// Enters the password required by the SIM.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CPIN", NoResponse, timeout_ms = 10000)]
pub struct SetPin<'a> {
    #[at_arg(position = 0, len = 8)]
    pub pin: &'a str,
}
