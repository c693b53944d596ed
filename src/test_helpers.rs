//! Scripted modem on a simulated clock.
//!
//! [`MockTransport`] plays the module side of the serial link: every command
//! line written to it is echoed back with a trailing `\r` and answered by a
//! responder closure. Time only moves when the driver sleeps on
//! [`MockClock`], so timeouts and pacing are exact.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::boxed::Box;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Read, ReadReady, Write};

use crate::traits::{Clock, Transport};

const CTRL_Z: u8 = 0x1A;

pub enum Payload {
    /// Exactly this many bytes follow the prompt.
    Bytes(usize),
    /// Bytes follow until Ctrl-Z, which is not echoed.
    UntilCtrlZ,
}

/// Module side answer to one command line.
pub enum Reply {
    /// Released right after the echo.
    Text(String),
    /// Each part released once the clock has advanced by its delay in ms,
    /// counted from the command write.
    Timed(Vec<(u64, String)>),
    /// Prompt, then raw payload, then `then` once the payload is complete.
    Prompt {
        prompt: String,
        payload: Payload,
        then: String,
    },
    /// `open` parts as for [`Reply::Timed`], then every byte written is link
    /// data until the `+++` escape, after which `then` is released.
    DirectLink {
        open: Vec<(u64, String)>,
        then: String,
    },
    /// Echo only.
    Silent,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::text("\r\nOK\r\n")
    }

    pub fn error() -> Self {
        Reply::text("\r\nERROR\r\n")
    }

    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    /// Response lines followed by `OK`.
    pub fn lines(lines: &[&str]) -> Self {
        let mut text = String::new();
        for line in lines {
            text.push_str("\r\n");
            text.push_str(line);
            text.push_str("\r\n");
        }
        text.push_str("\r\nOK\r\n");
        Reply::Text(text)
    }

    pub fn timed<'a>(parts: impl IntoIterator<Item = (u64, &'a str)>) -> Self {
        Reply::Timed(
            parts
                .into_iter()
                .map(|(delay, text)| (delay, text.to_string()))
                .collect(),
        )
    }

    pub fn direct_link<'a>(open: impl IntoIterator<Item = (u64, &'a str)>, then: &str) -> Self {
        Reply::DirectLink {
            open: open
                .into_iter()
                .map(|(delay, text)| (delay, text.to_string()))
                .collect(),
            then: then.to_string(),
        }
    }

    pub fn prompt(bytes: usize, then: &str) -> Self {
        Reply::Prompt {
            prompt: "\r\n> ".to_string(),
            payload: Payload::Bytes(bytes),
            then: then.to_string(),
        }
    }

    pub fn prompt_until_ctrl_z(then: &str) -> Self {
        Reply::Prompt {
            prompt: "\r\n> ".to_string(),
            payload: Payload::UntilCtrlZ,
            then: then.to_string(),
        }
    }
}

enum Mode {
    Command,
    Link {
        received: Vec<u8>,
        then: String,
    },
    Payload {
        payload: Payload,
        received: Vec<u8>,
        then: String,
    },
}

pub struct MockState {
    now_us: Rc<Cell<u64>>,
    responder: Box<dyn FnMut(&str) -> Reply>,
    mode: Mode,
    line: Vec<u8>,
    rx: VecDeque<u8>,
    scheduled: Vec<(u64, String)>,
    echo_payload: bool,
    writes: Vec<(Instant, String)>,
    payloads: Vec<Vec<u8>>,
    pub ended: bool,
}

impl MockState {
    /// Command lines written so far, without `\r\n`.
    pub fn commands(&self) -> Vec<String> {
        self.writes.iter().map(|(_, cmd)| cmd.clone()).collect()
    }

    pub fn command_times(&self) -> Vec<Instant> {
        self.writes.iter().map(|(at, _)| *at).collect()
    }

    /// Raw payloads received after a prompt or over a direct link.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.clone()
    }

    /// Queue unsolicited output, available immediately.
    pub fn inject(&mut self, text: &str) {
        self.rx.extend(text.as_bytes());
    }

    /// Queue unsolicited output, available `delay_ms` from now.
    pub fn inject_after(&mut self, delay_ms: u64, text: &str) {
        let at = self.now_us.get() + delay_ms * 1000;
        self.scheduled.push((at, text.to_string()));
    }

    pub fn without_payload_echo(&mut self) {
        self.echo_payload = false;
    }

    fn release_due(&mut self) {
        let now = self.now_us.get();
        let mut due: Vec<(u64, String)> = Vec::new();
        self.scheduled.retain(|(at, text)| {
            if *at <= now {
                due.push((*at, text.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, text) in due {
            self.rx.extend(text.as_bytes());
        }
    }

    fn schedule(&mut self, delay_ms: u64, text: String) {
        let at = self.now_us.get() + delay_ms * 1000;
        self.scheduled.push((at, text));
    }

    fn receive(&mut self, byte: u8) {
        match &mut self.mode {
            Mode::Command => {
                if byte != b'\n' {
                    self.line.push(byte);
                    return;
                }
                let mut line = core::mem::take(&mut self.line);
                while line.last() == Some(&b'\r') {
                    line.pop();
                }
                if line.is_empty() {
                    return;
                }
                let cmd = String::from_utf8_lossy(&line).to_string();
                let now = Instant::from_micros(self.now_us.get());
                self.writes.push((now, cmd.clone()));

                self.release_due();
                self.rx.extend(cmd.as_bytes());
                self.rx.push_back(b'\r');

                match (self.responder)(&cmd) {
                    Reply::Text(text) => self.schedule(0, text),
                    Reply::Timed(parts) => {
                        for (delay, text) in parts {
                            self.schedule(delay, text);
                        }
                    }
                    Reply::Prompt {
                        prompt,
                        payload,
                        then,
                    } => {
                        self.schedule(0, prompt);
                        self.mode = Mode::Payload {
                            payload,
                            received: Vec::new(),
                            then,
                        };
                    }
                    Reply::DirectLink { open, then } => {
                        for (delay, text) in open {
                            self.schedule(delay, text);
                        }
                        self.mode = Mode::Link {
                            received: Vec::new(),
                            then,
                        };
                    }
                    Reply::Silent => {}
                }
            }
            Mode::Link { received, then } => {
                received.push(byte);
                if received.ends_with(b"+++") {
                    let mut payload = core::mem::take(received);
                    payload.truncate(payload.len() - 3);
                    let then = core::mem::take(then);
                    self.payloads.push(payload);
                    self.mode = Mode::Command;
                    self.schedule(0, then);
                }
            }
            Mode::Payload {
                payload,
                received,
                then,
            } => {
                let done = match payload {
                    Payload::UntilCtrlZ if byte == CTRL_Z => true,
                    Payload::UntilCtrlZ => {
                        received.push(byte);
                        false
                    }
                    Payload::Bytes(n) => {
                        received.push(byte);
                        received.len() >= *n
                    }
                };
                if byte != CTRL_Z && self.echo_payload {
                    self.rx.push_back(byte);
                }
                if done {
                    let payload = core::mem::take(received);
                    let then = core::mem::take(then);
                    self.payloads.push(payload);
                    self.mode = Mode::Command;
                    self.schedule(0, then);
                }
            }
        }
    }
}

pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl ErrorType for MockTransport {
    type Error = Infallible;
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        state.release_due();
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for MockTransport {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let mut state = self.state.borrow_mut();
        state.release_due();
        Ok(!state.rx.is_empty())
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        for &b in buf {
            state.receive(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn end(&mut self) {
        self.state.borrow_mut().ended = true;
    }
}

#[derive(Debug, Clone)]
pub struct MockClock {
    now_us: Rc<Cell<u64>>,
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_us.set(self.now_us.get() + (u64::from(ns) + 999) / 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us.set(self.now_us.get() + u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_us.set(self.now_us.get() + u64::from(ms) * 1000);
    }
}

impl Clock for MockClock {
    fn now(&mut self) -> Instant {
        Instant::from_micros(self.now_us.get())
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A scripted modem answering through `responder`.
pub fn mock<F>(responder: F) -> (MockTransport, MockClock, Rc<RefCell<MockState>>)
where
    F: FnMut(&str) -> Reply + 'static,
{
    init_logger();

    let now_us = Rc::new(Cell::new(0));
    let state = Rc::new(RefCell::new(MockState {
        now_us: now_us.clone(),
        responder: Box::new(responder),
        mode: Mode::Command,
        line: Vec::new(),
        rx: VecDeque::new(),
        scheduled: Vec::new(),
        echo_payload: true,
        writes: Vec::new(),
        payloads: Vec::new(),
        ended: false,
    }));

    (
        MockTransport {
            state: state.clone(),
        },
        MockClock { now_us },
        state,
    )
}
