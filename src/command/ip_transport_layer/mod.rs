//! ### 25 - Internet protocol transport layer Commands
//!
pub mod urc;

use atat::atat_derive::{AtatCmd, AtatEnum};

use super::NoResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HexMode {
    /// 0 (factory-programmed value): HEX mode disabled
    Disabled = 0,
    /// 1: HEX mode enabled
    Enabled = 1,
}

/// 25.25 HEX mode configuration +UDCONF=1
///
/// Enables/disables the HEX mode for +USOWR, +USOST, +USORD and +USORF AT
/// commands.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UDCONF=1,", NoResponse, value_sep = false)]
pub struct SetHexMode {
    #[at_arg(position = 0)]
    pub hex_mode_disable: HexMode,
}

/// 25.12 Read Socket Data +USORD
///
/// Reads up to `length` bytes from the socket. In HEX mode the answer is
/// `+USORD: <socket>,<length>,"<hex data>"`, which is read from the
/// response text.
/// For the TCP socket type the URC +UUSORD: <socket>,<length> notifies the
/// data bytes available for reading, either when buffer is empty and new data
/// arrives or after a partial read by the user.
#[derive(Clone, AtatCmd)]
#[at_cmd("+USORD", NoResponse, timeout_ms = 10000)]
pub struct ReadSocketData {
    #[at_arg(position = 0)]
    pub socket: u8,
    #[at_arg(position = 1)]
    pub length: usize,
}
