//! Line accumulation and response classification.
//!
//! Bytes are accumulated until a newline, at which point the completed line
//! is either dropped (command echo, blank line), handed out as a URC, or
//! folded into the response of the command in flight. Terminal markers are
//! matched per line; the latest one seen before [`Ingress::settle`] decides
//! the outcome.

use heapless::{String, Vec};

use crate::error::Error;

/// Number of command bytes kept for echo matching.
pub const ECHO_CAPACITY: usize = 64;

/// First line of a record in a multi-record reply; the line after it is
/// record content and never a terminal marker.
const RECORD_HEADER: &[u8] = b"+CMGL: ";

/// Classification of a command round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Pending,
    Success,
    Error,
    NoCarrier,
    ModemError(Option<u16>),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Numeric form: 0 pending, 1 success, 2 error, 3 no carrier, 4 modem
    /// error.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Pending => 0,
            Outcome::Success => 1,
            Outcome::Error => 2,
            Outcome::NoCarrier => 3,
            Outcome::ModemError(_) => 4,
        }
    }

    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Outcome::Success => Ok(()),
            Outcome::Pending => Err(Error::Busy),
            Outcome::Error => Err(Error::ModemRejected(None)),
            Outcome::NoCarrier => Err(Error::LinkDropped),
            Outcome::ModemError(code) => Err(Error::ModemRejected(code)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingEcho,
    Receiving,
}

/// Transparent data mode after `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Off,
    /// The next `CONNECT` line opens the link.
    Armed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Terminal {
    outcome: Outcome,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ingress<const N: usize> {
    buf: Vec<u8, N>,
    /// Start of the line currently being accumulated.
    line_start: usize,
    /// The buffer holds a URC that has been handed out; clear it on the next
    /// byte.
    discard: bool,
    /// The current line overflowed the buffer; drop bytes until a newline.
    skip_line: bool,
    record_body: bool,
    phase: Phase,
    link: Link,
    terminal: Option<Terminal>,
    echo: String<ECHO_CAPACITY>,
    outcome: Outcome,
    response: String<N>,
}

impl<const N: usize> Default for Ingress<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Ingress<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            line_start: 0,
            discard: false,
            skip_line: false,
            record_body: false,
            phase: Phase::Idle,
            link: Link::Off,
            terminal: None,
            echo: String::new(),
            outcome: Outcome::Pending,
            response: String::new(),
        }
    }

    /// Arm the classifier for a freshly written command.
    pub fn begin_command(&mut self, command: &[u8]) {
        if self.discard || self.phase != Phase::Idle {
            self.buf.clear();
            self.line_start = 0;
            self.discard = false;
        }
        self.terminal = None;
        self.record_body = false;
        self.phase = Phase::AwaitingEcho;
        self.outcome = Outcome::Pending;
        self.response.clear();

        self.echo.clear();
        for &c in command.iter().take(ECHO_CAPACITY) {
            // Commands are ASCII; anything else just shortens the echo prefix.
            if !c.is_ascii() || self.echo.push(c as char).is_err() {
                break;
            }
        }
    }

    /// Drop the command in flight and everything buffered for it.
    pub fn abort(&mut self) {
        self.buf.clear();
        self.line_start = 0;
        self.discard = false;
        self.skip_line = false;
        self.record_body = false;
        self.phase = Phase::Idle;
        self.link = Link::Off;
        self.terminal = None;
        self.outcome = Outcome::Pending;
        self.response.clear();
    }

    /// Treat the next `CONNECT` line as the start of transparent data. It
    /// also resolves a command in flight that has no terminal marker yet.
    pub fn arm_link(&mut self) {
        self.link = Link::Armed;
    }

    /// `CONNECT` has been seen; bytes after it are link data, not lines.
    pub fn link_open(&self) -> bool {
        self.link == Link::Open
    }

    pub fn close_link(&mut self) {
        self.link = Link::Off;
    }

    /// Feed one byte. Returns a URC line when this byte completed one.
    pub fn feed(&mut self, byte: u8) -> Option<&str> {
        if self.discard {
            self.buf.clear();
            self.line_start = 0;
            self.discard = false;
        }

        if self.skip_line {
            if byte == b'\n' {
                self.skip_line = false;
            }
            return None;
        }

        if self.buf.push(byte).is_err() {
            self.make_room();
            if self.skip_line || self.buf.push(byte).is_err() {
                return None;
            }
        }

        if byte != b'\n' {
            return None;
        }

        let start = self.line_start;
        let end = self.buf.len();
        self.line_start = end;
        self.complete_line(start, end)
    }

    fn complete_line(&mut self, start: usize, end: usize) -> Option<&str> {
        let text = trim(&self.buf[start..end]);

        if self.link == Link::Armed && text == b"CONNECT" {
            self.open_link(start, end);
            return None;
        }

        if self.phase == Phase::Receiving {
            if self.record_body {
                self.record_body = false;
            } else if text.starts_with(RECORD_HEADER) {
                self.record_body = true;
            } else if let Some(outcome) = classify(text) {
                self.terminal = Some(Terminal {
                    outcome,
                    start,
                    end,
                });
            }
            return None;
        }

        if text.is_empty() {
            self.discard = true;
            return None;
        }

        if self.phase == Phase::AwaitingEcho {
            if is_echo(text, self.echo.as_bytes()) {
                self.buf.clear();
                self.line_start = 0;
                self.phase = Phase::Receiving;
                return None;
            }

            // Echo disabled: the response starts right away.
            if let Some(outcome) = classify(text) {
                self.phase = Phase::Receiving;
                self.terminal = Some(Terminal {
                    outcome,
                    start,
                    end,
                });
                return None;
            }
        } else if text.starts_with(b"AT") || classify(text).is_some() {
            // Stray echo or late result of a command that has already
            // resolved or was abandoned.
            self.discard = true;
            return None;
        }

        self.discard = true;
        let text = trim(&self.buf[start..end]);
        match core::str::from_utf8(text) {
            Ok(line) => Some(line),
            Err(_) => {
                warn!("Dropping non UTF-8 line of {} bytes", text.len());
                None
            }
        }
    }

    /// Resolve the response at the end of a drain. Returns `true` when a
    /// command outcome became available; any complete lines received after
    /// the terminal marker are then available from [`Ingress::pending_lines`].
    pub fn settle(&mut self) -> bool {
        if self.terminal.is_none() {
            return false;
        }
        self.resolve();
        true
    }

    /// Complete lines left over after a response resolved. Only meaningful
    /// right after [`Ingress::settle`] returned `true`.
    pub fn pending_lines(&self) -> impl Iterator<Item = &str> {
        self.buf[..self.line_start]
            .split(|&c| c == b'\n')
            .map(trim)
            .filter(|line| !line.is_empty() && !line.starts_with(b"AT"))
            .filter_map(|line| core::str::from_utf8(line).ok())
    }

    pub fn drop_pending_lines(&mut self) {
        self.consume(self.line_start);
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn take_outcome(&mut self) -> Outcome {
        core::mem::replace(&mut self.outcome, Outcome::Pending)
    }

    /// Text of the last resolved response.
    pub fn response(&self) -> &str {
        self.response.as_str()
    }

    /// The unterminated line ends with the `>` payload prompt.
    pub fn prompt_seen(&self) -> bool {
        !self.discard && trim(&self.buf[self.line_start..]).last() == Some(&b'>')
    }

    pub fn consume_prompt(&mut self) {
        self.buf.truncate(self.line_start);
    }

    fn resolve(&mut self) {
        let Some(terminal) = self.terminal.take() else {
            return;
        };

        let text = match terminal.outcome {
            Outcome::Success => trim(&self.buf[..terminal.start]),
            _ => trim(&self.buf[terminal.start..terminal.end]),
        };

        self.response.clear();
        match core::str::from_utf8(text) {
            Ok(text) => {
                // Both live in buffers of capacity N.
                let _ = self.response.push_str(text);
            }
            Err(_) => warn!("Response is not valid UTF-8, dropping its text"),
        }

        self.outcome = terminal.outcome;
        self.phase = Phase::Idle;
        self.record_body = false;
        self.consume(terminal.end);
    }

    fn open_link(&mut self, start: usize, end: usize) {
        if self.phase != Phase::Idle {
            if self.terminal.is_none() {
                self.terminal = Some(Terminal {
                    outcome: Outcome::Success,
                    start,
                    end,
                });
            }
            self.resolve();
        }
        self.buf.clear();
        self.line_start = 0;
        self.discard = false;
        self.link = Link::Open;
    }

    fn make_room(&mut self) {
        if self.terminal.is_some() {
            self.resolve();
            if self.line_start > 0 {
                warn!("Ingress buffer full, dropping lines after response");
                self.consume(self.line_start);
            }
        } else if self.line_start > 0 {
            warn!("Ingress buffer full, dropping {} buffered bytes", self.line_start);
            self.consume(self.line_start);
        } else {
            warn!("Line exceeds ingress buffer of {} bytes, resyncing", N);
            self.buf.clear();
            self.skip_line = true;
        }
    }

    /// Remove the first `n` bytes of the buffer.
    fn consume(&mut self, n: usize) {
        let len = self.buf.len();
        let n = n.min(len);
        self.buf.copy_within(n..len, 0);
        self.buf.truncate(len - n);
        self.line_start = self.line_start.saturating_sub(n);
    }
}

fn is_echo(line: &[u8], echo: &[u8]) -> bool {
    (!echo.is_empty() && line.starts_with(echo)) || line.starts_with(b"AT")
}

fn classify(line: &[u8]) -> Option<Outcome> {
    match line {
        b"OK" => Some(Outcome::Success),
        b"ERROR" => Some(Outcome::Error),
        b"NO CARRIER" => Some(Outcome::NoCarrier),
        _ if contains(line, b"CME ERROR") || contains(line, b"CMS ERROR") => {
            Some(Outcome::ModemError(error_code(line)))
        }
        _ => None,
    }
}

fn error_code(line: &[u8]) -> Option<u16> {
    let pos = line.iter().rposition(|&c| c == b':')?;
    core::str::from_utf8(trim(&line[pos + 1..]))
        .ok()?
        .parse()
        .ok()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

pub(crate) fn trim(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;
    use std::vec::Vec as StdVec;

    fn feed_str<const N: usize>(ingress: &mut Ingress<N>, s: &str) -> StdVec<std::string::String> {
        let mut urcs = StdVec::new();
        for &b in s.as_bytes() {
            if let Some(line) = ingress.feed(b) {
                urcs.push(line.to_string());
            }
        }
        urcs
    }

    #[test]
    fn echo_is_not_a_urc() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+CGSN");
        let urcs = feed_str(&mut ingress, "AT+CGSN\r\r\n351234567890123\r\n\r\nOK\r\n");

        assert!(urcs.is_empty());
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(ingress.response(), "351234567890123");
        assert_eq!(ingress.take_outcome(), Outcome::Pending);
    }

    #[test]
    fn lines_while_idle_are_urcs() {
        let mut ingress = Ingress::<256>::new();
        let urcs = feed_str(&mut ingress, "\r\n+UUFTPCR: 1,1\r\n\r\n+CEREG: 5\r\n");

        assert_eq!(urcs, ["+UUFTPCR: 1,1", "+CEREG: 5"]);
        assert!(!ingress.settle());
        assert_eq!(ingress.outcome(), Outcome::Pending);
    }

    #[test]
    fn later_terminal_marker_wins() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+UFTPC=1");
        feed_str(&mut ingress, "AT+UFTPC=1\r\r\nOK\r\n\r\n+CME ERROR: 10\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::ModemError(Some(10)));
        assert_eq!(ingress.response(), "+CME ERROR: 10");

        ingress.begin_command(b"AT+USOCO=0");
        feed_str(&mut ingress, "AT+USOCO=0\r\r\nOK\r\n\r\nNO CARRIER\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::NoCarrier);

        ingress.begin_command(b"AT+CPIN?");
        feed_str(&mut ingress, "AT+CPIN?\r\r\nOK\r\nERROR\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Error);
    }

    #[test]
    fn markers_inside_content_do_not_terminate() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+CSCS?");
        feed_str(&mut ingress, "AT+CSCS?\r\r\n+CSCS: \"OK\"\r\n");
        assert!(!ingress.settle());

        feed_str(&mut ingress, "\r\nOK\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(ingress.response(), "+CSCS: \"OK\"");
    }

    #[test]
    fn record_content_reading_ok_does_not_resolve_a_list() {
        let mut ingress = Ingress::<512>::new();
        ingress.begin_command(b"AT+CMGL=\"REC UNREAD\"");
        feed_str(
            &mut ingress,
            "AT+CMGL=\"REC UNREAD\"\r\r\n+CMGL: 1,\"REC UNREAD\",\"+15551234\",,\"24/01/01,10:00:00+04\"\r\nOK\r\n",
        );
        // The drain ended right after the body; nothing may resolve yet.
        assert!(!ingress.settle());
        assert_eq!(ingress.outcome(), Outcome::Pending);

        feed_str(&mut ingress, "\r\nOK\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(
            ingress.response(),
            "+CMGL: 1,\"REC UNREAD\",\"+15551234\",,\"24/01/01,10:00:00+04\"\r\nOK"
        );
    }

    #[test]
    fn lines_after_the_terminal_marker_are_urcs() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+UFTPC=1");
        let urcs = feed_str(&mut ingress, "AT+UFTPC=1\r\r\nOK\r\n\r\n+UUFTPCR: 1,1\r\n+CEREG");

        assert!(urcs.is_empty());
        assert!(ingress.settle());
        let pending: StdVec<&str> = ingress.pending_lines().collect();
        assert_eq!(pending, ["+UUFTPCR: 1,1"]);
        ingress.drop_pending_lines();

        // The partial line survives and completes as a URC.
        let urcs = feed_str(&mut ingress, ": 1\r\n");
        assert_eq!(urcs, ["+CEREG: 1"]);
    }

    #[test]
    fn terminal_without_echo() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+CMEE=0");
        let urcs = feed_str(&mut ingress, "\r\nOK\r\n");
        assert!(urcs.is_empty());
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(ingress.response(), "");
    }

    #[test]
    fn abandoned_command_leaves_no_trace() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+CGSN");
        feed_str(&mut ingress, "AT+CGSN\r\r\n3512345");
        ingress.abort();
        assert!(!ingress.settle());
        assert_eq!(ingress.outcome(), Outcome::Pending);

        // The late tail of the answer is not taken for a URC or a result.
        let urcs = feed_str(&mut ingress, "67890123\r\n\r\nOK\r\n\r\n+CEREG: 1\r\n");
        assert!(urcs.iter().all(|line| line != "OK"));
        assert_eq!(urcs.last().map(|line| line.as_str()), Some("+CEREG: 1"));
        assert!(!ingress.settle());

        ingress.begin_command(b"AT");
        feed_str(&mut ingress, "AT\r\r\nOK\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
    }

    #[test]
    fn connect_opens_an_armed_link() {
        let mut ingress = Ingress::<256>::new();
        assert_eq!(feed_str(&mut ingress, "\r\nCONNECT\r\n"), ["CONNECT"]);
        assert!(!ingress.link_open());

        ingress.arm_link();
        ingress.begin_command(b"AT+UFTPC=6,\"a.bin\"");
        let urcs = feed_str(&mut ingress, "AT+UFTPC=6,\"a.bin\"\r\r\nOK\r\n\r\nCONNECT\r\n");
        assert!(urcs.is_empty());
        assert!(ingress.link_open());
        assert_eq!(ingress.take_outcome(), Outcome::Success);

        // `CONNECT` in place of `OK` resolves the command as well.
        ingress.close_link();
        ingress.arm_link();
        ingress.begin_command(b"AT+UFTPC=7,\"b.bin\"");
        feed_str(&mut ingress, "AT+UFTPC=7,\"b.bin\"\r\r\nCONNECT\r\n");
        assert!(ingress.link_open());
        assert_eq!(ingress.take_outcome(), Outcome::Success);

        ingress.abort();
        assert!(!ingress.link_open());
    }

    #[test]
    fn error_codes() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+CPIN?");
        feed_str(&mut ingress, "AT+CPIN?\r\r\n+CME ERROR: SIM not inserted\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::ModemError(None));
        assert_eq!(
            Outcome::ModemError(Some(3)).into_result(),
            Err(Error::ModemRejected(Some(3)))
        );
        assert_eq!(Outcome::NoCarrier.into_result(), Err(Error::LinkDropped));
        assert_eq!(Outcome::NoCarrier.code(), 3);

        ingress.begin_command(b"AT+CMGS=\"+1555\"");
        feed_str(&mut ingress, "AT+CMGS=\"+1555\"\r\r\n+CMS ERROR: 304\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::ModemError(Some(304)));
    }

    #[test]
    fn overlong_line_resyncs_at_next_newline() {
        let mut ingress = Ingress::<16>::new();
        let urcs = feed_str(&mut ingress, "+UUSORD: 0,123456789012345678901234567890\r\n+UUSOCL: 0\r\n");
        assert_eq!(urcs, ["+UUSOCL: 0"]);
    }

    #[test]
    fn overflowing_response_keeps_its_tail() {
        let mut ingress = Ingress::<24>::new();
        ingress.begin_command(b"AT+ULSTFILE=0");
        feed_str(&mut ingress, "AT+ULSTFILE=0\r\r\n+ULSTFILE: \"a\",\"b\"\r\n\"c\"\r\nOK\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(ingress.response(), "\"c\"");
    }

    #[test]
    fn payload_prompt() {
        let mut ingress = Ingress::<256>::new();
        ingress.begin_command(b"AT+USECMNG=0,0,\"ca\",5");
        feed_str(&mut ingress, "AT+USECMNG=0,0,\"ca\",5\r\r\n>");
        assert!(ingress.prompt_seen());
        ingress.consume_prompt();
        assert!(!ingress.prompt_seen());

        feed_str(&mut ingress, "\r\n+USECMNG: 0,0,\"ca\",\"5d41402abc4b2a76b9719d911017c592\"\r\n\r\nOK\r\n");
        assert!(ingress.settle());
        assert_eq!(ingress.take_outcome(), Outcome::Success);
        assert_eq!(
            ingress.response(),
            "+USECMNG: 0,0,\"ca\",\"5d41402abc4b2a76b9719d911017c592\""
        );
    }
}
