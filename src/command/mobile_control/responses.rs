//! Responses for Mobile equipment control and status Commands
use atat::atat_derive::AtatResp;
use heapless::String;

/// 5.8 Clock +CCLK
///
/// `yy/MM/dd,hh:mm:ss±zz`, the zone given in quarters of an hour.
#[derive(Debug, Clone, AtatResp)]
pub struct Clock {
    #[at_arg(position = 0)]
    pub time: String<24>,
}
