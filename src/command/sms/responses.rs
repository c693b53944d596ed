//! Responses for Short Messages Service Commands
use atat::atat_derive::AtatResp;
use heapless::String;

/// 5.5 Select TE character set +CSCS
#[derive(Debug, Clone, AtatResp)]
pub struct CharacterSet {
    #[at_arg(position = 0)]
    pub chset: String<8>,
}
