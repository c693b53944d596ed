//! ### 27 - FTP
//!
//! `+UFTPC` only acknowledges that an operation was started; its result
//! arrives later as a `+UUFTPCR: <op_code>,<result>` URC.
pub mod responses;
pub mod types;
pub mod urc;

use atat::atat_derive::AtatCmd;
use responses::FtpError;
use types::{FtpOperation, FtpParameter};

use super::NoResponse;

/// 27.1 FTP service configuration +UFTP
///
/// Sets a text valued parameter of the FTP profile. Without a value the
/// parameter is reset to its factory default.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UFTP", NoResponse)]
pub struct SetFtpParameter<'a> {
    #[at_arg(position = 0)]
    pub param: FtpParameter,
    #[at_arg(position = 1, len = 128)]
    pub value: Option<&'a str>,
}

/// 27.1 FTP service configuration +UFTP
///
/// Sets a numeric parameter of the FTP profile.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UFTP", NoResponse)]
pub struct SetFtpNumericParameter {
    #[at_arg(position = 0)]
    pub param: FtpParameter,
    #[at_arg(position = 1)]
    pub value: u32,
}

/// 27.2 FTP command +UFTPC
#[derive(Clone, AtatCmd)]
#[at_cmd("+UFTPC", NoResponse, timeout_ms = 10000)]
pub struct FtpCommand<'a> {
    #[at_arg(position = 0)]
    pub op_code: FtpOperation,
    #[at_arg(position = 1, len = 128)]
    pub param1: Option<&'a str>,
    #[at_arg(position = 2, len = 128)]
    pub param2: Option<&'a str>,
}

/// 27.4 FTP error +UFTPER
///
/// Reads the error class and code of the last failed FTP operation.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UFTPER", FtpError)]
pub struct GetFtpError;
