//! Blocking and non-blocking AT command engine.
//!
//! A [`Modem`] owns the serial [`Transport`] and a [`Clock`]. Every
//! subsystem shares it through a `&RefCell<Modem>`, so only one command is
//! ever on the line; a second borrow while a command is being driven fails
//! with [`Error::Busy`].

pub mod ingress;
pub mod link;
pub mod pacer;
pub mod urc;

use atat::AtatCmd;
use embassy_time::{Duration, Instant};
use heapless::String;

use crate::command::mobile_control::types::Functionality;
use crate::command::mobile_control::SetModuleFunctionality;
use crate::command::AT;
use crate::config::ModemConfig;
use crate::error::Error;
use crate::fmt::LossyStr;
use crate::module_timing;
use crate::traits::{Clock, Transport};

pub use ingress::{Ingress, Outcome};
pub use link::DirectLink;
pub use pacer::Pacer;
pub use urc::{UrcHandler, UrcRegistry, MAX_URC_HANDLERS};

/// Default size of the line buffer and of a captured response.
pub const DEFAULT_INGRESS_BUF_SIZE: usize = 1024;

/// Largest encoded command line, including `AT` and the terminator.
pub const MAX_COMMAND_LEN: usize = 512;

const READ_CHUNK: usize = 64;

pub struct Modem<'d, T, C, const N: usize = DEFAULT_INGRESS_BUF_SIZE>
where
    T: Transport,
    C: Clock,
{
    transport: T,
    clock: C,
    config: ModemConfig,
    ingress: Ingress<N>,
    link: DirectLink,
    pacer: Pacer,
    urc_handlers: UrcRegistry<'d>,
    in_flight: bool,
    /// Latest time the command in flight may resolve, when driven through
    /// [`Modem::poll_step`].
    deadline: Option<Instant>,
}

impl<'d, T, C, const N: usize> Modem<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_config(transport, clock, ModemConfig::new())
    }

    pub fn with_config(transport: T, clock: C, config: ModemConfig) -> Self {
        Self {
            transport,
            clock,
            pacer: Pacer::new(config.quiet_interval),
            config,
            ingress: Ingress::new(),
            link: DirectLink::new(),
            urc_handlers: UrcRegistry::new(),
            in_flight: false,
            deadline: None,
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Bring up the command channel: send `AT` until the module
    /// answers, optionally soft reset it and try again.
    pub fn begin(&mut self, soft_reset: bool) -> Result<(), Error> {
        self.autosense(module_timing::autosense_timeout())?;
        if soft_reset {
            self.reset()?;
            self.autosense(module_timing::autosense_timeout())?;
        }
        Ok(())
    }

    /// Release the link. Called once the module has been powered off.
    pub fn end(&mut self) {
        self.transport.end();
    }

    /// Retry `AT` until the module answers `OK` or `timeout` elapses.
    pub fn autosense(&mut self, timeout: Duration) -> Result<(), Error> {
        let start = self.clock.now();
        loop {
            match self.noop() {
                Ok(()) => return Ok(()),
                Err(e) => trace!("Autosense: {:?}", e),
            }
            if self.elapsed_since(start) >= timeout {
                error!("Module did not answer AT within {} ms", timeout.as_millis());
                return Err(Error::Timeout);
            }
            self.delay(module_timing::autosense_interval());
        }
    }

    /// `AT+CFUN=15`: silent reset, the module reboots once it has answered.
    pub fn reset(&mut self) -> Result<(), Error> {
        info!("Soft resetting module");
        self.send_cmd(&SetModuleFunctionality {
            fun: Functionality::SilentReset,
            rst: None,
        })?;
        self.wait_for_response(module_timing::soft_reset_time())?
            .into_result()
    }

    /// Plain `AT`, answered with `OK` by a live module.
    pub fn noop(&mut self) -> Result<(), Error> {
        self.send_cmd(&AT)?;
        self.wait_for_response(self.config.response_timeout)?
            .into_result()
    }

    /// Write a command line verbatim, without `\r\n`.
    ///
    /// Drains pending input first and blocks until the line has been quiet
    /// for the configured interval. Any previous outcome and response text
    /// are discarded.
    pub fn send(&mut self, command: &str) -> Result<(), Error> {
        self.poll()?;
        self.wait_quiet();
        self.write_command(command.as_bytes(), None)
    }

    /// Encode and write `cmd`, see [`Modem::send`].
    pub fn send_cmd<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<(), Error> {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        let line = encode(cmd, &mut buf)?;
        self.poll()?;
        self.wait_quiet();
        self.write_command(line, Some(command_timeout::<Cmd>()))
    }

    /// Non-blocking [`Modem::send_cmd`]: `WouldBlock` while a command is
    /// outstanding or the quiet interval has not passed yet.
    pub fn try_send_cmd<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> nb::Result<(), Error> {
        self.poll()?;
        if self.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        let now = self.clock.now();
        if self.pacer.remaining(now).is_some() {
            return Err(nb::Error::WouldBlock);
        }
        let mut buf = [0u8; MAX_COMMAND_LEN];
        let line = encode(cmd, &mut buf)?;
        self.write_command(line, Some(command_timeout::<Cmd>()))?;
        Ok(())
    }

    /// Write raw payload bytes, typically after a `>` prompt. When the module
    /// echoes payload, exactly `data.len()` echoed bytes are discarded.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.write_direct(data)?;
        if self.config.binary_echo {
            self.discard_echo(data.len())?;
        }
        Ok(data.len())
    }

    /// Write raw bytes with no echo handling.
    pub fn write_direct(&mut self, data: &[u8]) -> Result<usize, Error> {
        trace!("--> {:?}", LossyStr(data));
        self.transport.write_all(data).map_err(io_error)?;
        self.transport.flush().map_err(io_error)?;
        Ok(data.len())
    }

    /// Drain everything the transport has buffered.
    ///
    /// URCs are dispatched as their lines complete. A command outcome is
    /// resolved once the drain ends, from the last terminal marker seen.
    ///
    /// Nothing is read while a direct link is open; its data is taken with
    /// [`Modem::read_direct`].
    pub fn poll(&mut self) -> Result<(), Error> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut received = false;

        while !self.ingress.link_open() && self.transport.read_ready().map_err(io_error)? {
            let n = self.transport.read(&mut chunk).map_err(io_error)?;
            if n == 0 {
                break;
            }
            received = true;
            self.ingest(&chunk[..n]);
        }

        if received {
            self.settle();
        }
        Ok(())
    }

    fn ingest(&mut self, bytes: &[u8]) {
        let now = self.clock.now();
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(line) = self.ingress.feed(b) {
                debug!("<-- URC {:?}", line);
                self.pacer.mark(now);
                self.urc_handlers.dispatch(line);
            }
            if self.ingress.link_open() {
                debug!("<-- CONNECT, direct link open");
                self.pacer.mark(now);
                self.link.open(&bytes[i + 1..]);
                return;
            }
        }
    }

    fn settle(&mut self) {
        if !self.ingress.settle() {
            return;
        }

        let now = self.clock.now();
        self.pacer.mark(now);
        trace!(
            "<-- {:?} {:?}",
            self.ingress.outcome(),
            LossyStr(self.ingress.response().as_bytes())
        );

        for line in self.ingress.pending_lines() {
            debug!("<-- URC {:?}", line);
            self.urc_handlers.dispatch(line);
        }
        self.ingress.drop_pending_lines();
    }

    /// Drain input, then take the outcome of the command in flight.
    ///
    /// A resolved outcome is returned exactly once; afterwards, and when no
    /// command is in flight, this returns [`Outcome::Pending`].
    pub fn ready(&mut self) -> Result<Outcome, Error> {
        self.poll()?;
        if !self.in_flight {
            return Ok(Outcome::Pending);
        }
        let outcome = self.ingress.take_outcome();
        if !outcome.is_pending() {
            self.in_flight = false;
        }
        Ok(outcome)
    }

    /// [`Modem::ready`] for state machines: `WouldBlock` while the command in
    /// flight is unresolved, otherwise the outcome (`Pending` meaning there
    /// was no command to wait for).
    ///
    /// A command sent with [`Modem::send_cmd`] or [`Modem::try_send_cmd`]
    /// that is still unresolved after its own timeout is abandoned and
    /// reported as [`Error::Timeout`]; the engine is free again afterwards.
    pub fn poll_step(&mut self) -> nb::Result<Outcome, Error> {
        let waiting = self.in_flight;
        let outcome = self.ready()?;
        if waiting && outcome.is_pending() {
            if let Some(deadline) = self.deadline {
                if self.clock.now() >= deadline {
                    warn!("Command unanswered past its timeout");
                    self.abort();
                    return Err(nb::Error::Other(Error::Timeout));
                }
            }
            return Err(nb::Error::WouldBlock);
        }
        Ok(outcome)
    }

    /// Give up on the command in flight. Buffered input is dropped and a late
    /// answer to the abandoned command is discarded when it arrives.
    pub fn abort(&mut self) {
        if self.in_flight {
            debug!("Abandoning command in flight");
        }
        self.in_flight = false;
        self.deadline = None;
        self.ingress.abort();
        self.link.clear();
    }

    /// Switch to transparent data on the next `CONNECT` line. Until the link
    /// ends, [`Modem::poll`] leaves the transport alone and commands are
    /// refused with [`Error::Busy`].
    pub fn arm_direct_link(&mut self) {
        self.ingress.arm_link();
    }

    pub fn in_direct_link(&self) -> bool {
        self.ingress.link_open()
    }

    /// Read data of the open direct link.
    ///
    /// `WouldBlock` until data arrives. `Ok(0)` once the module has ended the
    /// link with `DISCONNECT` (or no link is open); whatever followed the
    /// marker is processed as ordinary lines.
    pub fn read_direct(&mut self, buf: &mut [u8]) -> nb::Result<usize, Error> {
        if !self.ingress.link_open() || buf.is_empty() {
            return Ok(0);
        }

        let mut chunk = [0u8; READ_CHUNK];
        while self.link.space() > 0 && self.transport.read_ready().map_err(io_error)? {
            let want = self.link.space().min(READ_CHUNK);
            let n = self
                .transport
                .read(&mut chunk[..want])
                .map_err(io_error)?;
            if n == 0 {
                break;
            }
            self.link.push(&chunk[..n]);
        }

        let (n, ended) = self.link.take(buf);
        if ended {
            debug!("<-- DISCONNECT, direct link closed");
            self.ingress.close_link();
            let mut rest = [0u8; link::LINK_BUF_SIZE];
            let len = self.link.drain(&mut rest);
            self.ingest(&rest[..len]);
            self.settle();
        } else if n == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(n)
    }

    /// Return to command mode after the host ended the link, e.g. with the
    /// `+++` escape. Buffered link data is dropped.
    pub fn close_direct_link(&mut self) {
        self.ingress.close_link();
        self.link.clear();
    }

    /// A command has been written and its outcome has not arrived yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight && self.ingress.outcome().is_pending()
    }

    /// Block until the command in flight resolves or `timeout` elapses.
    pub fn wait_for_response(&mut self, timeout: Duration) -> Result<Outcome, Error> {
        let start = self.clock.now();
        loop {
            let outcome = self.ready()?;
            if !outcome.is_pending() {
                return Ok(outcome);
            }
            if self.elapsed_since(start) >= timeout {
                warn!("No response within {} ms", timeout.as_millis());
                self.abort();
                return Err(Error::Timeout);
            }
            self.clock.delay_ms(1);
        }
    }

    /// [`Modem::wait_for_response`], copying the response text into
    /// `capture`. Text beyond its capacity is cut off.
    pub fn wait_for_response_into<const M: usize>(
        &mut self,
        timeout: Duration,
        capture: &mut String<M>,
    ) -> Result<Outcome, Error> {
        let outcome = self.wait_for_response(timeout)?;
        capture.clear();
        for c in self.ingress.response().chars() {
            if capture.push(c).is_err() {
                break;
            }
        }
        Ok(outcome)
    }

    /// Block until the module shows the `>` payload prompt.
    ///
    /// A command that resolves instead of prompting ends the wait with its
    /// error.
    pub fn wait_for_prompt(&mut self, timeout: Duration) -> Result<(), Error> {
        let start = self.clock.now();
        loop {
            self.poll()?;
            if self.ingress.prompt_seen() {
                self.ingress.consume_prompt();
                return Ok(());
            }
            if self.in_flight && !self.ingress.outcome().is_pending() {
                let outcome = self.ingress.take_outcome();
                self.in_flight = false;
                warn!("Expected prompt, got {:?}", outcome);
                return Err(outcome.into_result().err().unwrap_or(Error::Parse));
            }
            if self.elapsed_since(start) >= timeout {
                warn!("No prompt within {} ms", timeout.as_millis());
                self.abort();
                return Err(Error::Timeout);
            }
            self.clock.delay_ms(1);
        }
    }

    /// Send `cmd` and block for its outcome, bounded by the command's own
    /// timeout. Anything but `OK` is an error.
    pub fn request<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<(), Error> {
        self.send_cmd(cmd)?;
        self.wait_for_response(command_timeout::<Cmd>())?
            .into_result()
    }

    /// [`Modem::request`], returning the response text.
    pub fn request_text<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<&str, Error> {
        self.request(cmd)?;
        Ok(self.ingress.response())
    }

    /// [`Modem::request`], decoding the response with `atat`.
    pub fn query<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<Cmd::Response, Error> {
        self.request(cmd)?;
        cmd.parse(Ok(self.ingress.response().as_bytes()))
            .map_err(Error::from)
    }

    /// Text of the last resolved response: the lines before `OK`, or the
    /// error line itself.
    pub fn response(&self) -> &str {
        self.ingress.response()
    }

    pub fn add_urc_handler(&mut self, handler: &'d dyn UrcHandler) {
        self.urc_handlers.add(handler);
    }

    pub fn remove_urc_handler(&mut self, handler: &dyn UrcHandler) {
        self.urc_handlers.remove(handler);
    }

    pub fn now(&mut self) -> Instant {
        self.clock.now()
    }

    pub fn delay(&mut self, duration: Duration) {
        self.clock
            .delay_us(u32::try_from(duration.as_micros()).unwrap_or(u32::MAX));
    }

    pub(crate) fn elapsed_since(&mut self, start: Instant) -> Duration {
        self.clock
            .now()
            .checked_duration_since(start)
            .unwrap_or_else(|| Duration::from_ticks(0))
    }

    fn wait_quiet(&mut self) {
        let now = self.clock.now();
        if let Some(wait) = self.pacer.remaining(now) {
            trace!("Pacing for {} us", wait.as_micros());
            self.delay(wait);
        }
    }

    fn write_command(&mut self, line: &[u8], timeout: Option<Duration>) -> Result<(), Error> {
        if self.ingress.link_open() {
            error!("Command refused, direct link open");
            return Err(Error::Busy);
        }
        trace!("--> {:?}", LossyStr(line));
        let now = self.clock.now();
        self.pacer.mark(now);
        self.deadline = timeout.map(|timeout| now + timeout);
        self.ingress.begin_command(line);
        self.in_flight = true;
        self.transport.write_all(line).map_err(io_error)?;
        self.transport.write_all(b"\r\n").map_err(io_error)?;
        self.transport.flush().map_err(io_error)
    }

    fn discard_echo(&mut self, mut remaining: usize) -> Result<(), Error> {
        let start = self.clock.now();
        let mut chunk = [0u8; READ_CHUNK];
        while remaining > 0 {
            if self.transport.read_ready().map_err(io_error)? {
                let len = remaining.min(chunk.len());
                let n = self.transport.read(&mut chunk[..len]).map_err(io_error)?;
                remaining -= n;
                continue;
            }
            if self.elapsed_since(start) >= self.config.response_timeout {
                warn!("Payload echo incomplete, {} bytes missing", remaining);
                self.abort();
                return Err(Error::Timeout);
            }
            self.clock.delay_ms(1);
        }
        Ok(())
    }
}

fn encode<'b, Cmd: AtatCmd>(cmd: &Cmd, buf: &'b mut [u8]) -> Result<&'b [u8], Error> {
    if Cmd::MAX_LEN > buf.len() {
        error!("Command of up to {} bytes exceeds buffer", Cmd::MAX_LEN);
        return Err(Error::Overflow);
    }
    let len = cmd.write(buf);
    let mut line = &buf[..len];
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    Ok(line)
}

fn command_timeout<Cmd: AtatCmd>() -> Duration {
    Duration::from_millis(u64::from(Cmd::MAX_TIMEOUT_MS))
}

fn io_error<E: embedded_io::Error>(e: E) -> Error {
    Error::Io(e.kind())
}
