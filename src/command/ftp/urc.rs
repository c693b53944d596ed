//! Unsolicited responses for FTP Commands
use atat::atat_derive::AtatResp;

/// 27.3 FTP command result +UUFTPCR
#[derive(Debug, Clone, AtatResp)]
pub struct FtpCommandResult {
    #[at_arg(position = 0)]
    pub op_code: u8,
    /// 0 failure, 1 success
    #[at_arg(position = 1)]
    pub result: u8,
}
