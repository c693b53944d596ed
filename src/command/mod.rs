//! AT Commands for u-blox SARA-R4/N4 NB-IoT and LTE-M modules\
//! Following the [u-blox SARA-R4 AT commands manual](https://www.u-blox.com/sites/default/files/SARA-R4_ATCommands_%28UBX-17003787%29.pdf)
//!
//! Commands are encoded with `atat`; responses that carry more than a bare
//! value are decoded with `atat` as well, everything else is read from the
//! captured response text by the caller.

pub mod device_data_security;
pub mod device_lock;
pub mod file_system;
pub mod ftp;
pub mod general;
pub mod ip_transport_layer;
pub mod mobile_control;
pub mod mqtt;
pub mod psn;
pub mod sms;

use atat::atat_derive::{AtatCmd, AtatResp, AtatUrc};

#[derive(Debug, Clone, AtatResp)]
pub struct NoResponse;

#[derive(Clone, AtatCmd)]
#[at_cmd("", NoResponse)]
pub struct AT;

#[derive(Debug, Clone, AtatUrc)]
pub enum Urc {
    #[at_urc("+UUFTPCR")]
    FtpCommandResult(ftp::urc::FtpCommandResult),
    #[at_urc("+UUSORD")]
    SocketDataAvailable(ip_transport_layer::urc::SocketDataAvailable),
    #[at_urc("+UUSOCL")]
    SocketClosed(ip_transport_layer::urc::SocketClosed),
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::{AtatCmd, AtatUrc};

    #[test]
    fn bare_at() {
        let mut buf = [0u8; 16];
        let len = AT.write(&mut buf);
        assert_eq!(&buf[..len], b"AT\r\n");
    }

    #[test]
    fn ftp_result_urc() {
        match Urc::parse(b"+UUFTPCR: 1,1") {
            Some(Urc::FtpCommandResult(r)) => {
                assert_eq!(r.op_code, 1);
                assert_eq!(r.result, 1);
            }
            _ => panic!("URC not parsed"),
        }
    }

    #[test]
    fn socket_urcs() {
        match Urc::parse(b"+UUSORD: 2,48") {
            Some(Urc::SocketDataAvailable(r)) => assert_eq!((r.socket, r.length), (2, 48)),
            _ => panic!("+UUSORD not parsed"),
        }
        match Urc::parse(b"+UUSOCL: 5") {
            Some(Urc::SocketClosed(r)) => assert_eq!(r.socket, 5),
            _ => panic!("+UUSOCL not parsed"),
        }
    }
}
