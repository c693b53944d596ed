//! ### 31 - MQTT
//!
pub mod responses;

use atat::atat_derive::{AtatCmd, AtatEnum};
use responses::MqttError;

use super::NoResponse;

/// `<op_code>` of text valued `+UMQTT` profile parameters. The port (1) and
/// credentials (4) have their own commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttParameter {
    ClientId = 0,
    ServerName = 2,
    IpAddress = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// 31.1 MQTT profile configuration +UMQTT
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTT", NoResponse, timeout_ms = 10000)]
pub struct SetMqttParameter<'a> {
    #[at_arg(position = 0)]
    pub param: MqttParameter,
    #[at_arg(position = 1, len = 128)]
    pub value: &'a str,
}

/// 31.1 MQTT profile configuration +UMQTT
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTT=1,", NoResponse, value_sep = false, timeout_ms = 10000)]
pub struct SetMqttPort {
    #[at_arg(position = 0)]
    pub port: u16,
}

/// 31.1 MQTT profile configuration +UMQTT
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTT=4,", NoResponse, value_sep = false, timeout_ms = 10000)]
pub struct SetMqttCredentials<'a> {
    #[at_arg(position = 0, len = 64)]
    pub username: &'a str,
    #[at_arg(position = 1, len = 64)]
    pub password: &'a str,
}

/// 31.3 MQTT command +UMQTTC
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTTC=1", NoResponse, timeout_ms = 10000)]
pub struct MqttLogin;

/// 31.3 MQTT command +UMQTTC
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTTC=0", NoResponse, timeout_ms = 10000)]
pub struct MqttLogout;

/// 31.3 MQTT command +UMQTTC
///
/// Publishes a text message.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTTC=2,", NoResponse, value_sep = false, timeout_ms = 10000)]
pub struct MqttPublish<'a> {
    #[at_arg(position = 0)]
    pub qos: Qos,
    #[at_arg(position = 1)]
    pub retain: u8,
    #[at_arg(position = 2, len = 128)]
    pub topic: &'a str,
    #[at_arg(position = 3, len = 256)]
    pub message: &'a str,
}

/// 31.3 MQTT command +UMQTTC
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTTC=4,", NoResponse, value_sep = false, timeout_ms = 10000)]
pub struct MqttSubscribe<'a> {
    #[at_arg(position = 0)]
    pub qos: Qos,
    #[at_arg(position = 1, len = 128)]
    pub topic: &'a str,
}

/// 31.4 MQTT error +UMQTTER
#[derive(Clone, AtatCmd)]
#[at_cmd("+UMQTTER", MqttError)]
pub struct GetMqttError;

#[cfg(test)]
mod tests {
    use super::*;
    use atat::AtatCmd;

    #[test]
    fn publish() {
        let mut buf = [0u8; 96];
        let len = MqttPublish {
            qos: Qos::AtMostOnce,
            retain: 0,
            topic: "sensors/t",
            message: "21.5",
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+UMQTTC=2,0,0,\"sensors/t\",\"21.5\"\r\n");
    }

    #[test]
    fn port_and_credentials() {
        let mut buf = [0u8; 64];
        let len = SetMqttPort { port: 1883 }.write(&mut buf);
        assert_eq!(&buf[..len], b"AT+UMQTT=1,1883\r\n");

        let len = SetMqttCredentials {
            username: "u",
            password: "p",
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+UMQTT=4,\"u\",\"p\"\r\n");
    }
}
