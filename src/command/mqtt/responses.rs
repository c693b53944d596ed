//! Responses for MQTT Commands
use atat::atat_derive::AtatResp;

/// 31.4 MQTT error +UMQTTER
#[derive(Debug, Clone, AtatResp)]
pub struct MqttError {
    #[at_arg(position = 0)]
    pub error_code: u16,
    #[at_arg(position = 1)]
    pub error_code2: u16,
}
