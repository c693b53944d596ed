#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod command;
pub mod config;
pub mod error;
pub mod file_utils;
pub mod ftp;
pub mod gprs;
pub mod hex;
pub mod modem;
mod module_timing;
pub mod mqtt;
pub mod nb;
pub mod registration;
pub mod sms;
pub mod socket_buffer;
pub mod ssl;
pub mod traits;

#[cfg(test)]
mod test_helpers;

pub use embedded_nal::Ipv4Addr;

pub use crate::nb::Nb;
pub use config::{Apn, ModemConfig, NetworkConfig};
pub use error::Error;
pub use file_utils::FileUtils;
pub use ftp::{Ftp, FtpState};
pub use gprs::Gprs;
pub use modem::{Modem, Outcome, UrcHandler};
pub use mqtt::Mqtt;
pub use registration::NetworkStatus;
pub use sms::Sms;
pub use socket_buffer::{SocketBuffer, SocketState};
pub use ssl::{Certificate, CertificateLoader};
pub use traits::{Clock, Transport};
