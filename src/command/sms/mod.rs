//! ### 11 - Short Messages Service
//!
//! Messages are handled in text mode (`+CMGF=1`). Listing output is read from
//! the response text, since a record body is free text.
pub mod responses;
pub mod types;

use atat::atat_derive::AtatCmd;
use responses::CharacterSet;
use types::{DeleteFlag, MessageFormat};

use super::NoResponse;

/// 11.4 Message format +CMGF
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMGF", NoResponse)]
pub struct SetMessageFormat {
    #[at_arg(position = 0)]
    pub mode: MessageFormat,
}

/// 5.5 Select TE character set +CSCS
///
/// Informs the MT which character set is used by the TE.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CSCS", NoResponse)]
pub struct SetCharacterSet<'a> {
    #[at_arg(position = 0, len = 8)]
    pub chset: &'a str,
}

/// 5.5 Select TE character set +CSCS
#[derive(Clone, AtatCmd)]
#[at_cmd("+CSCS?", CharacterSet)]
pub struct GetCharacterSet;

/// 11.15 Send message +CMGS
///
/// After the `>` prompt the message text is written and terminated with
/// Ctrl-Z.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMGS", NoResponse, timeout_ms = 180000)]
pub struct SendMessage<'a> {
    #[at_arg(position = 0, len = 96)]
    pub da: &'a str,
}

/// 11.12 List message +CMGL
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMGL", NoResponse, timeout_ms = 180000)]
pub struct ListMessages<'a> {
    #[at_arg(position = 0, len = 12)]
    pub stat: &'a str,
}

/// 11.10 Delete message +CMGD
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMGD", NoResponse, timeout_ms = 55000)]
pub struct DeleteMessage {
    #[at_arg(position = 0)]
    pub index: u16,
    #[at_arg(position = 1)]
    pub flag: Option<DeleteFlag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::AtatCmd;

    #[test]
    fn delete_all_read() {
        let mut buf = [0u8; 32];
        let len = DeleteMessage {
            index: 0,
            flag: Some(DeleteFlag::ReadAndSent),
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+CMGD=0,2\r\n");

        let len = DeleteMessage {
            index: 3,
            flag: None,
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+CMGD=3\r\n");
    }

    #[test]
    fn parse_character_set() {
        let chset = GetCharacterSet.parse(Ok(b"+CSCS: \"UCS2\"")).unwrap();
        assert_eq!(chset.chset.as_str(), "UCS2");
    }
}
