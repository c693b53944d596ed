//! Text mode SMS: sending, listing unread messages and reading them back.
//!
//! ```ignore
//! let mut sms = Sms::new(&modem);
//! sms.begin_sms("+15551234")?;
//! sms.write("Hello")?;
//! sms.end_sms()?;
//!
//! while sms.available()? > 0 {
//!     let from = sms.remote_number();
//!     while let Some(byte) = sms.read() { /* ... */ }
//!     sms.flush()?;
//! }
//! ```

pub mod charset;

use core::cell::RefCell;

use embassy_time::Duration;
use heapless::String;

use crate::command::sms::types::DeleteFlag;
use crate::command::sms::{
    DeleteMessage, GetCharacterSet, ListMessages, SendMessage, SetCharacterSet,
};
use crate::error::Error;
use crate::modem::{Modem, Outcome};
use crate::module_timing;
use crate::traits::{Clock, Transport};

pub use charset::Charset;

const CTRL_Z: u8 = 0x1A;
const RECORD_HEADER: &str = "+CMGL: ";
const NEXT_RECORD: &str = "\r\n+CMGL: ";
const UNREAD: &str = "REC UNREAD";

/// How long the module may take to submit a message or list the store.
const SMS_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ListState {
    Idle,
    ListMessages,
    WaitListResponse,
}

/// The message `available` stopped at, as positions in the listing.
#[derive(Debug, Clone)]
struct Record {
    index: u16,
    sender: String<32>,
    timestamp: String<24>,
    body_end: usize,
}

pub struct Sms<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    charset: Option<Charset>,
    state: ListState,
    listing: String<N>,
    cursor: usize,
    record: Option<Record>,
    read_pos: usize,
    utf8: [u8; 4],
    utf8_len: usize,
    utf8_pos: usize,
    sending: bool,
}

impl<'d, T, C, const N: usize> Sms<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(modem: &'d RefCell<Modem<'d, T, C, N>>) -> Self {
        Self {
            modem,
            charset: None,
            state: ListState::Idle,
            listing: String::new(),
            cursor: 0,
            record: None,
            read_pos: 0,
            utf8: [0; 4],
            utf8_len: 0,
            utf8_pos: 0,
            sending: false,
        }
    }

    /// Select the TE character set (`AT+CSCS="<name>"`) and read back what
    /// the module settled on.
    pub fn set_charset(&mut self, name: &str) -> Result<Charset, Error> {
        self.modem
            .try_borrow_mut()?
            .request(&SetCharacterSet { chset: name })?;
        self.charset = None;
        self.charset()
    }

    /// Active character set, queried once with `AT+CSCS?`.
    pub fn charset(&mut self) -> Result<Charset, Error> {
        if let Some(charset) = self.charset {
            return Ok(charset);
        }
        let chset = self.modem.try_borrow_mut()?.query(&GetCharacterSet)?;
        let charset = Charset::from_name(&chset.chset);
        debug!("SMS character set {:?}", charset);
        self.charset = Some(charset);
        Ok(charset)
    }

    /// Address a new message to `to` and wait for the text prompt.
    pub fn begin_sms(&mut self, to: &str) -> Result<(), Error> {
        let charset = self.charset()?;
        let mut da: String<96> = String::new();
        if charset == Charset::Ucs2 {
            for c in to.chars() {
                for digit in charset::encode_ucs2(c) {
                    da.push(char::from(digit)).map_err(|_| Error::Overflow)?;
                }
            }
        } else {
            da.push_str(to).map_err(|_| Error::Overflow)?;
        }

        let mut modem = self.modem.try_borrow_mut()?;
        modem.send_cmd(&SendMessage { da: &da })?;
        if let Err(e) = modem.wait_for_prompt(module_timing::prompt_timeout()) {
            warn!("No SMS prompt: {:?}", e);
            self.sending = false;
            return Err(e);
        }
        self.sending = true;
        Ok(())
    }

    /// Append `text` to the message started with [`Sms::begin_sms`],
    /// encoded for the active character set.
    pub fn write(&mut self, text: &str) -> Result<usize, Error> {
        if !self.sending {
            return Err(Error::Uninitialized);
        }
        let charset = self.charset.unwrap_or(Charset::Other);
        let mut modem = self.modem.try_borrow_mut()?;
        for c in text.chars() {
            let mut buf = [0u8; 4];
            modem.write(charset::encode(charset, c, &mut buf))?;
        }
        Ok(text.len())
    }

    /// Submit the message with Ctrl-Z and wait for the network to accept it.
    pub fn end_sms(&mut self) -> Result<(), Error> {
        if !self.sending {
            return Err(Error::Uninitialized);
        }
        self.sending = false;
        let mut modem = self.modem.try_borrow_mut()?;
        modem.write_direct(&[CTRL_Z])?;
        modem.wait_for_response(SMS_TIMEOUT)?.into_result()
    }

    /// Request the list of unread messages; progress with [`Sms::ready`].
    pub fn start_list(&mut self) {
        self.state = ListState::ListMessages;
    }

    pub fn ready(&mut self) -> nb::Result<(), Error> {
        let cell = self.modem;
        let mut modem = cell.try_borrow_mut().map_err(Error::from)?;
        let mut outcome = match modem.poll_step() {
            Err(nb::Error::Other(e)) => {
                self.state = ListState::Idle;
                return Err(nb::Error::Other(e));
            }
            step => step?,
        };

        loop {
            match self.state {
                ListState::Idle => return Ok(()),
                ListState::ListMessages => {
                    modem.try_send_cmd(&ListMessages { stat: UNREAD })?;
                    self.state = ListState::WaitListResponse;
                    return Err(nb::Error::WouldBlock);
                }
                ListState::WaitListResponse => match outcome {
                    Outcome::Success => {
                        self.listing.clear();
                        for c in modem.response().chars() {
                            if self.listing.push(c).is_err() {
                                warn!("SMS listing cut at {} bytes", N);
                                break;
                            }
                        }
                        self.cursor = 0;
                        self.record = None;
                        self.state = ListState::Idle;
                        return Ok(());
                    }
                    Outcome::Pending => self.state = ListState::ListMessages,
                    outcome => {
                        self.state = ListState::Idle;
                        return Err(nb::Error::Other(
                            outcome.into_result().err().unwrap_or(Error::SequenceAborted),
                        ));
                    }
                },
            }
            outcome = Outcome::Pending;
        }
    }

    /// Move to the next unread message and return the length of its body
    /// as sent by the module, 0 when there is none. A new listing is
    /// requested once the previous one is used up.
    pub fn available(&mut self) -> Result<usize, Error> {
        self.utf8_len = 0;
        self.utf8_pos = 0;
        if let Some(len) = self.next_record() {
            return Ok(len);
        }

        self.listing.clear();
        self.cursor = 0;
        if self.state == ListState::Idle {
            self.charset()?;
            self.start_list();
        }

        let start = self.modem.try_borrow_mut()?.now();
        loop {
            match self.ready() {
                Ok(()) => break,
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }
            let mut modem = self.modem.try_borrow_mut()?;
            if modem.elapsed_since(start) >= SMS_TIMEOUT {
                self.state = ListState::Idle;
                return Err(Error::Timeout);
            }
            modem.delay(module_timing::poll_interval());
        }

        Ok(self.next_record().unwrap_or(0))
    }

    fn next_record(&mut self) -> Option<usize> {
        self.record = None;
        loop {
            let offset = self.cursor + self.listing.get(self.cursor..)?.find(RECORD_HEADER)?;
            let header_start = offset + RECORD_HEADER.len();
            let rest = &self.listing[header_start..];
            let (header, body_start) = match rest.find('\n') {
                Some(eol) => (&rest[..eol], header_start + eol + 1),
                None => (rest, self.listing.len()),
            };
            let body_end = self.listing[body_start..]
                .find(NEXT_RECORD)
                .map_or(self.listing.len(), |end| body_start + end);

            let mut fields = fields(header);
            let index = fields.next().and_then(|i| i.parse().ok());
            let _stat = fields.next();
            let sender = fields.next().unwrap_or("");
            let _alpha = fields.next();
            let timestamp = fields.next().unwrap_or("");

            self.cursor = body_end;
            let Some(index) = index else {
                warn!("Malformed SMS record {:?}", header);
                continue;
            };

            let charset = self.charset.unwrap_or(Charset::Other);
            self.record = Some(Record {
                index,
                sender: decode_address(charset, sender),
                timestamp: truncated(timestamp),
                body_end,
            });
            self.read_pos = body_start;
            return Some(body_end - body_start);
        }
    }

    /// Sender of the current message.
    pub fn remote_number(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.sender.as_str())
    }

    /// Service centre time stamp of the current message, `yy/MM/dd,hh:mm:ss±zz`.
    pub fn timestamp(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.timestamp.as_str())
    }

    /// Storage index of the current message.
    pub fn message_index(&self) -> Option<u16> {
        self.record.as_ref().map(|r| r.index)
    }

    /// Next UTF-8 byte of the current message body.
    pub fn read(&mut self) -> Option<u8> {
        if self.utf8_pos < self.utf8_len {
            let b = self.utf8[self.utf8_pos];
            self.utf8_pos += 1;
            return Some(b);
        }
        let (utf8, len, consumed) = self.decode_next()?;
        self.read_pos += consumed;
        self.utf8 = utf8;
        self.utf8_len = len;
        self.utf8_pos = 1;
        Some(utf8[0])
    }

    /// [`Sms::read`] without consuming.
    pub fn peek(&self) -> Option<u8> {
        if self.utf8_pos < self.utf8_len {
            return Some(self.utf8[self.utf8_pos]);
        }
        self.decode_next().map(|(utf8, _, _)| utf8[0])
    }

    fn decode_next(&self) -> Option<([u8; 4], usize, usize)> {
        let record = self.record.as_ref()?;
        let body = self.listing.as_bytes().get(self.read_pos..record.body_end)?;
        let first = *body.first()?;
        let mut utf8 = [0u8; 4];

        let (c, consumed) = match self.charset.unwrap_or(Charset::Other) {
            Charset::Ucs2 => (charset::decode_ucs2(body.get(..4)?)?, 4),
            Charset::Gsm => (charset::gsm_to_char(first), 1),
            Charset::Ira | Charset::Other => {
                utf8[0] = first;
                return Some((utf8, 1, 1));
            }
        };
        let len = c.encode_utf8(&mut utf8).len();
        Some((utf8, len, consumed))
    }

    /// Delete the current message from the store.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.utf8_len = 0;
        self.utf8_pos = 0;
        let Some(record) = self.record.take() else {
            return Ok(());
        };
        self.modem.try_borrow_mut()?.request(&DeleteMessage {
            index: record.index,
            flag: None,
        })
    }

    /// Delete every message matching `flag` (`AT+CMGD=0,<flag>`). The
    /// usual choice is [`DeleteFlag::ReadAndSent`].
    pub fn clear(&mut self, flag: DeleteFlag) -> Result<(), Error> {
        self.utf8_len = 0;
        self.utf8_pos = 0;
        self.modem.try_borrow_mut()?.request(&DeleteMessage {
            index: 0,
            flag: Some(flag),
        })
    }
}

/// Comma separated fields of a record header; commas inside quotes do not
/// split. Quotes are stripped.
fn fields(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(line.trim_end_matches('\r'));
    core::iter::from_fn(move || {
        let s = rest?;
        let mut quoted = false;
        for (i, c) in s.char_indices() {
            match c {
                '"' => quoted = !quoted,
                ',' if !quoted => {
                    rest = Some(&s[i + 1..]);
                    return Some(s[..i].trim().trim_matches('"'));
                }
                _ => {}
            }
        }
        rest = None;
        Some(s.trim().trim_matches('"'))
    })
}

fn decode_address(charset: Charset, address: &str) -> String<32> {
    if charset != Charset::Ucs2 {
        return truncated(address);
    }
    let mut out = String::new();
    for unit in address.as_bytes().chunks_exact(4) {
        match charset::decode_ucs2(unit) {
            Some(c) if out.push(c).is_ok() => {}
            _ => break,
        }
    }
    out
}

fn truncated<const M: usize>(s: &str) -> String<M> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mock, Reply};
    use std::vec::Vec;

    // Header and body lines are separated by a single CRLF.
    const LISTING: &str = "\r\n+CMGL: 2,\"REC UNREAD\",\"+15551234\",,\"24/03/15,12:30:45+04\"\r\n\
        Hello there\r\n\
        +CMGL: 5,\"REC UNREAD\",\"+15559876\",,\"24/03/15,12:31:02+04\"\r\n\
        OK\r\n\r\nOK\r\n";

    fn read_body<T: Transport, C: Clock, const N: usize>(sms: &mut Sms<'_, T, C, N>) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(b) = sms.read() {
            body.push(b);
        }
        body
    }

    #[test]
    fn send_with_prompt_and_ctrl_z() {
        let (transport, clock, state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"IRA\""]),
            "AT+CMGS=\"+15551234\"" => Reply::prompt_until_ctrl_z("\r\n+CMGS: 17\r\n\r\nOK\r\n"),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        sms.begin_sms("+15551234").unwrap();
        assert_eq!(sms.write("Hello").unwrap(), 5);
        assert_eq!(sms.write(" world").unwrap(), 6);
        sms.end_sms().unwrap();

        assert_eq!(
            state.borrow().commands(),
            ["AT+CSCS?", "AT+CMGS=\"+15551234\""]
        );
        assert_eq!(state.borrow().payloads(), [b"Hello world".to_vec()]);
        assert_eq!(sms.write("late"), Err(Error::Uninitialized));
    }

    #[test]
    fn ucs2_message() {
        let (transport, clock, state) = mock(|cmd| match cmd {
            "AT+CSCS=\"UCS2\"" => Reply::ok(),
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"UCS2\""]),
            "AT+CMGS=\"002B0031\"" => Reply::prompt_until_ctrl_z("\r\nOK\r\n"),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.set_charset("UCS2"), Ok(Charset::Ucs2));
        sms.begin_sms("+1").unwrap();
        sms.write("Hé€").unwrap();
        sms.end_sms().unwrap();
        assert_eq!(state.borrow().payloads(), [b"004800E920AC".to_vec()]);
    }

    #[test]
    fn rejected_recipient() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"GSM\""]),
            _ => Reply::text("\r\n+CMS ERROR: 304\r\n"),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.begin_sms("nope"), Err(Error::ModemRejected(Some(304))));
        assert_eq!(sms.end_sms(), Err(Error::Uninitialized));
    }

    #[test]
    fn list_and_read_messages() {
        let (transport, clock, state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"IRA\""]),
            "AT+CMGL=\"REC UNREAD\"" => Reply::text(LISTING),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.available(), Ok(11));
        assert_eq!(sms.remote_number(), Some("+15551234"));
        assert_eq!(sms.timestamp(), Some("24/03/15,12:30:45+04"));
        assert_eq!(sms.peek(), Some(b'H'));
        assert_eq!(read_body(&mut sms), b"Hello there");
        sms.flush().unwrap();

        // A body reading "OK" is part of the listing.
        assert_eq!(sms.available(), Ok(2));
        assert_eq!(sms.message_index(), Some(5));
        assert_eq!(read_body(&mut sms), b"OK");

        assert_eq!(
            state.borrow().commands(),
            ["AT+CSCS?", "AT+CMGL=\"REC UNREAD\"", "AT+CMGD=2"]
        );
    }

    #[test]
    fn empty_store() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"IRA\""]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.available(), Ok(0));
        assert_eq!(sms.remote_number(), None);
        assert_eq!(sms.read(), None);
        assert_eq!(sms.flush(), Ok(()));
    }

    #[test]
    fn gsm_and_ucs2_bodies_decode_to_utf8() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"UCS2\""]),
            "AT+CMGL=\"REC UNREAD\"" => Reply::text(
                "\r\n+CMGL: 1,\"REC UNREAD\",\"002B0034003900310037\",,\"24/03/15,12:30:45+04\"\r\n\
                 00C4006C20AC\r\n\r\nOK\r\n",
            ),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.available(), Ok(12));
        assert_eq!(sms.remote_number(), Some("+4917"));
        assert_eq!(sms.peek(), Some(0xC3));
        assert_eq!(read_body(&mut sms), "Äl€".as_bytes());

        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"GSM\""]),
            "AT+CMGL=\"REC UNREAD\"" => Reply::text(
                "\r\n+CMGL: 1,\"REC UNREAD\",\"+4917\",,\"24/03/15,12:30:45+04\"\r\n\
                 \u{1e}\u{11}\r\n\r\nOK\r\n",
            ),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.available(), Ok(2));
        assert_eq!(read_body(&mut sms), "ß_".as_bytes());
    }

    #[test]
    fn malformed_record_is_skipped() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+CSCS?" => Reply::lines(&["+CSCS: \"IRA\""]),
            "AT+CMGL=\"REC UNREAD\"" => Reply::text(
                "\r\n+CMGL: x,\"REC UNREAD\",\"+1\",,\"24/03/15,12:30:45+04\"\r\n\
                 garbled\r\n\
                 +CMGL: 7,\"REC UNREAD\",\"+15551234\",,\"24/03/15,12:31:02+04\"\r\n\
                 Hi\r\n\r\nOK\r\n",
            ),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        assert_eq!(sms.available(), Ok(2));
        assert_eq!(sms.message_index(), Some(7));
        assert_eq!(sms.remote_number(), Some("+15551234"));
        assert_eq!(read_body(&mut sms), b"Hi");
    }

    #[test]
    fn clear_read_and_sent() {
        let (transport, clock, state) = mock(|_| Reply::ok());
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut sms = Sms::new(&modem);

        sms.clear(DeleteFlag::ReadAndSent).unwrap();
        assert_eq!(state.borrow().commands(), ["AT+CMGD=0,2"]);
    }

    #[test]
    fn header_fields() {
        let parsed: Vec<&str> =
            fields("3,\"REC UNREAD\",\"+1555\",,\"24/01/01,10:00:00+04\"\r").collect();
        assert_eq!(parsed, ["3", "REC UNREAD", "+1555", "", "24/01/01,10:00:00+04"]);
    }
}
