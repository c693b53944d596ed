//! Responses for FTP Commands
use atat::atat_derive::AtatResp;

/// 27.4 FTP error +UFTPER
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FtpError {
    #[at_arg(position = 0)]
    pub error_class: u16,
    #[at_arg(position = 1)]
    pub error_code: u16,
}
