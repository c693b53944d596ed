//! MQTT client of the module's internal stack, profile 0.

use core::cell::RefCell;
use core::fmt::Write as _;

use embedded_nal::Ipv4Addr;
use heapless::String;

use crate::command::mqtt::responses::MqttError;
use crate::command::mqtt::{
    GetMqttError, MqttLogin, MqttLogout, MqttParameter, MqttPublish, MqttSubscribe, Qos,
    SetMqttCredentials, SetMqttParameter, SetMqttPort,
};
use crate::error::Error;
use crate::modem::Modem;
use crate::traits::{Clock, Transport};

pub struct Mqtt<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
}

impl<'d, T, C, const N: usize> Mqtt<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(modem: &'d RefCell<Modem<'d, T, C, N>>) -> Self {
        Self { modem }
    }

    pub fn set_client_id(&mut self, client_id: &str) -> Result<(), Error> {
        self.set_parameter(MqttParameter::ClientId, client_id)
    }

    pub fn set_server_name(&mut self, name: &str) -> Result<(), Error> {
        self.set_parameter(MqttParameter::ServerName, name)
    }

    pub fn set_ip_address(&mut self, address: Ipv4Addr) -> Result<(), Error> {
        let mut ip: String<15> = String::new();
        write!(ip, "{}", address).map_err(|_| Error::Overflow)?;
        self.set_parameter(MqttParameter::IpAddress, &ip)
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        self.modem.try_borrow_mut()?.request(&SetMqttPort { port })
    }

    pub fn set_credentials(&mut self, username: &str, password: &str) -> Result<(), Error> {
        self.modem
            .try_borrow_mut()?
            .request(&SetMqttCredentials { username, password })
    }

    /// Connect to the configured broker. The module reports the session
    /// result later with `+UUMQTTC: 1,<result>`.
    pub fn login(&mut self) -> Result<(), Error> {
        self.modem.try_borrow_mut()?.request(&MqttLogin)
    }

    pub fn logout(&mut self) -> Result<(), Error> {
        self.modem.try_borrow_mut()?.request(&MqttLogout)
    }

    pub fn publish(
        &mut self,
        topic: &str,
        message: &str,
        qos: Qos,
        retain: bool,
    ) -> Result<(), Error> {
        debug!("Publishing {} bytes to {:?}", message.len(), topic);
        self.modem.try_borrow_mut()?.request(&MqttPublish {
            qos,
            retain: u8::from(retain),
            topic,
            message,
        })
    }

    pub fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Error> {
        self.modem
            .try_borrow_mut()?
            .request(&MqttSubscribe { qos, topic })
    }

    /// Error codes of the last failed MQTT operation (`AT+UMQTTER`).
    pub fn last_error(&mut self) -> Result<MqttError, Error> {
        self.modem.try_borrow_mut()?.query(&GetMqttError)
    }

    fn set_parameter(&mut self, param: MqttParameter, value: &str) -> Result<(), Error> {
        self.modem
            .try_borrow_mut()?
            .request(&SetMqttParameter { param, value })
    }
}
