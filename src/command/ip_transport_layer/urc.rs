//! Unsolicited responses for Internet protocol transport layer Commands
use atat::atat_derive::AtatResp;

/// 25.12 Read Socket Data +UUSORD
#[derive(Debug, Clone, AtatResp)]
pub struct SocketDataAvailable {
    #[at_arg(position = 0)]
    pub socket: u8,
    #[at_arg(position = 1)]
    pub length: usize,
}

/// 25.7 Close Socket +UUSOCL
///
/// The remote end closed the socket, or the module did.
#[derive(Debug, Clone, AtatResp)]
pub struct SocketClosed {
    #[at_arg(position = 0)]
    pub socket: u8,
}
