//! FTP client driven through the module's internal FTP service.
//!
//! Every `+UFTPC` operation resolves in two stages: the command is first
//! acknowledged with `OK`, the actual result arrives later as a
//! `+UUFTPCR: <op_code>,<result>` URC. The URC is applied by [`FtpState`],
//! which is registered with the modem for as long as the [`Ftp`] session
//! lives.
//!
//! ```ignore
//! let session = FtpState::new();
//! let modem = RefCell::new(Modem::new(serial, clock));
//! let mut ftp = Ftp::new(&modem, &session)?;
//! ftp.configure("user", "secret", true, "")?;
//! ftp.connect_to("ftp.example.com", 21)?;
//! ftp.retrieve("firmware.bin", "fw.bin")?;
//! ```
//!
//! Files can also be streamed over a direct link: the module answers
//! `CONNECT` and the file content follows in place of AT traffic.
//!
//! ```ignore
//! ftp.send_file_begin("log.txt")?;
//! ftp.write(b"boot ok\n")?;
//! ftp.send_file_end()?;
//!
//! ftp.get_file_begin("config.txt")?;
//! let mut buf = [0u8; 64];
//! loop {
//!     match ftp.read(&mut buf) {
//!         Ok(0) => break,
//!         Ok(n) => handle(&buf[..n]),
//!         Err(nb::Error::WouldBlock) => continue,
//!         Err(nb::Error::Other(e)) => return Err(e),
//!     }
//! }
//! ```

use core::cell::RefCell;
use core::fmt::Write as _;

use atat::{AtatCmd, AtatUrc};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Duration;
use embedded_nal::Ipv4Addr;
use heapless::String;

use crate::command::ftp::responses::FtpError;
use crate::command::ftp::types::{FtpOperation, FtpParameter};
use crate::command::ftp::{FtpCommand, GetFtpError, SetFtpNumericParameter, SetFtpParameter};
use crate::command::Urc;
use crate::error::Error;
use crate::modem::{Modem, Outcome, UrcHandler};
use crate::module_timing;
use crate::traits::{Clock, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    Idle,
    /// `+UFTPC` written, waiting for `OK`.
    WaitResponse(FtpOperation),
    /// Acknowledged, waiting for `+UUFTPCR` (or `CONNECT` for a direct link).
    WaitUrc(FtpOperation),
    /// Direct link open, file data flows.
    Link(FtpOperation),
    Close,
    WaitCloseResponse,
    RetrieveError,
    WaitRetrieveError,
}

struct Shared {
    phase: Phase,
    connected: bool,
}

/// Session state updated from `+UUFTPCR` URCs.
pub struct FtpState {
    shared: Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl Default for FtpState {
    fn default() -> Self {
        Self::new()
    }
}

impl FtpState {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                phase: Phase::Idle,
                connected: false,
            })),
        }
    }

    /// Logged in to the server.
    pub fn is_connected(&self) -> bool {
        self.shared.lock(|s| s.borrow().connected)
    }

    fn phase(&self) -> Phase {
        self.shared.lock(|s| s.borrow().phase)
    }

    fn set_phase(&self, phase: Phase) {
        self.shared.lock(|s| s.borrow_mut().phase = phase);
    }

    fn set_connected(&self, connected: bool) {
        self.shared.lock(|s| s.borrow_mut().connected = connected);
    }
}

impl UrcHandler for FtpState {
    fn handle(&self, line: &str) {
        let Some(Urc::FtpCommandResult(result)) = Urc::parse(line.as_bytes()) else {
            return;
        };

        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            let op = match s.phase {
                Phase::WaitResponse(op) | Phase::WaitUrc(op) | Phase::Link(op) => op,
                phase => {
                    debug!("FTP result for op {} in {:?}", result.op_code, phase);
                    return;
                }
            };
            if op as u8 != result.op_code {
                debug!("FTP result for op {} while waiting for {:?}", result.op_code, op);
                return;
            }

            if result.result == 1 {
                match op {
                    FtpOperation::Login => s.connected = true,
                    FtpOperation::Logout => s.connected = false,
                    _ => {}
                }
                s.phase = Phase::Idle;
            } else {
                warn!("FTP {:?} failed", op);
                s.phase = Phase::RetrieveError;
            }
        });
    }
}

pub struct Ftp<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    session: &'d FtpState,
    last_error: Option<FtpError>,
    timeout: Duration,
}

impl<'d, T, C, const N: usize> Ftp<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(
        modem: &'d RefCell<Modem<'d, T, C, N>>,
        session: &'d FtpState,
    ) -> Result<Self, Error> {
        modem.try_borrow_mut()?.add_urc_handler(session);
        Ok(Self {
            modem,
            session,
            last_error: None,
            timeout: module_timing::ftp_operation_timeout(),
        })
    }

    /// Upper bound of the blocking operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Error class and code fetched with `AT+UFTPER` after the last failure.
    pub fn last_error(&self) -> Option<&FtpError> {
        self.last_error.as_ref()
    }

    /// Set credentials and connection mode in one go. Empty strings reset
    /// the parameter to its default.
    pub fn configure(
        &mut self,
        username: &str,
        password: &str,
        passive: bool,
        account: &str,
    ) -> Result<(), Error> {
        self.set_username(username)?;
        self.set_password(password)?;
        self.set_passive(passive)?;
        self.set_account(account)
    }

    pub fn set_server_name(&mut self, host: &str) -> Result<(), Error> {
        self.set_text(FtpParameter::ServerName, host)
    }

    pub fn set_ip_address(&mut self, ip: Ipv4Addr) -> Result<(), Error> {
        let mut addr: String<15> = String::new();
        write!(addr, "{}", ip).map_err(|_| Error::Overflow)?;
        self.set_text(FtpParameter::IpAddress, &addr)
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        self.set_number(FtpParameter::Port, u32::from(port))
    }

    pub fn set_username(&mut self, username: &str) -> Result<(), Error> {
        self.set_text(FtpParameter::Username, username)
    }

    pub fn set_password(&mut self, password: &str) -> Result<(), Error> {
        self.set_text(FtpParameter::Password, password)
    }

    pub fn set_account(&mut self, account: &str) -> Result<(), Error> {
        self.set_text(FtpParameter::Account, account)
    }

    pub fn set_passive(&mut self, passive: bool) -> Result<(), Error> {
        self.set_number(FtpParameter::PassiveMode, u32::from(passive))
    }

    fn set_text(&mut self, param: FtpParameter, value: &str) -> Result<(), Error> {
        let value = (!value.is_empty()).then_some(value);
        self.modem
            .try_borrow_mut()?
            .request(&SetFtpParameter { param, value })
    }

    fn set_number(&mut self, param: FtpParameter, value: u32) -> Result<(), Error> {
        self.modem
            .try_borrow_mut()?
            .request(&SetFtpNumericParameter { param, value })
    }

    /// Configure `host` and `port`, then log in.
    pub fn connect_to(&mut self, host: &str, port: u16) -> Result<(), Error> {
        self.set_server_name(host)?;
        self.set_port(port)?;
        self.connect()
    }

    /// Log in with the configured profile, dropping an existing session
    /// first.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.session.is_connected() {
            self.disconnect()?;
        }
        self.run(FtpOperation::Login, None, None)
    }

    /// Log out. Operations in progress are abandoned; an open direct link
    /// has to be ended first and makes this fail with [`Error::Busy`].
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if matches!(self.session.phase(), Phase::Link(_)) {
            return Err(Error::Busy);
        }
        self.session.set_phase(Phase::Idle);
        if !self.session.is_connected() {
            return Ok(());
        }
        self.session.set_connected(false);
        self.modem.try_borrow_mut()?.request(&FtpCommand {
            op_code: FtpOperation::Logout,
            param1: None,
            param2: None,
        })
    }

    /// Download `remote` from the server into the module file `local`.
    pub fn retrieve(&mut self, remote: &str, local: &str) -> Result<(), Error> {
        self.run(FtpOperation::RetrieveFile, Some(remote), Some(local))
    }

    /// Upload the module file `local` to the server as `remote`.
    pub fn store(&mut self, local: &str, remote: &str) -> Result<(), Error> {
        self.run(FtpOperation::StoreFile, Some(local), Some(remote))
    }

    pub fn delete(&mut self, remote: &str) -> Result<(), Error> {
        self.run(FtpOperation::DeleteFile, Some(remote), None)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        self.run(FtpOperation::RenameFile, Some(from), Some(to))
    }

    pub fn change_directory(&mut self, dir: &str) -> Result<(), Error> {
        self.run(FtpOperation::ChangeDirectory, Some(dir), None)
    }

    pub fn create_directory(&mut self, dir: &str) -> Result<(), Error> {
        self.run(FtpOperation::CreateDirectory, Some(dir), None)
    }

    pub fn remove_directory(&mut self, dir: &str) -> Result<(), Error> {
        self.run(FtpOperation::RemoveDirectory, Some(dir), None)
    }

    /// Open `remote` for upload over a direct link. Data written with
    /// [`Ftp::write`] is stored once [`Ftp::send_file_end`] ends the link.
    pub fn send_file_begin(&mut self, remote: &str) -> Result<(), Error> {
        self.open_link(FtpOperation::StoreDirect, remote)
    }

    /// An upload link is open.
    pub fn is_writable(&self) -> bool {
        self.session.phase() == Phase::Link(FtpOperation::StoreDirect)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.is_writable() {
            return Err(Error::Uninitialized);
        }
        self.modem.try_borrow_mut()?.write_direct(data)
    }

    /// End the upload with the `+++` escape and wait for the server side
    /// result.
    pub fn send_file_end(&mut self) -> Result<(), Error> {
        let op = FtpOperation::StoreDirect;
        if !self.is_writable() {
            return Err(Error::Uninitialized);
        }
        {
            let mut modem = self.modem.try_borrow_mut()?;
            modem.delay(module_timing::escape_guard_time());
            modem.write_direct(b"+++")?;
            modem.close_direct_link();
        }
        self.session.set_phase(Phase::WaitUrc(op));
        self.wait(op)
    }

    /// Start downloading `remote` over a direct link; take the data with
    /// [`Ftp::read`].
    pub fn get_file_begin(&mut self, remote: &str) -> Result<(), Error> {
        self.open_link(FtpOperation::RetrieveDirect, remote)
    }

    /// A download is in progress and its end has not been read yet.
    pub fn available(&self) -> bool {
        self.session.phase() == Phase::Link(FtpOperation::RetrieveDirect)
    }

    /// Read downloaded data.
    ///
    /// `WouldBlock` while waiting for data and, after the last byte, for the
    /// module to report the transfer result. `Ok(0)` once the download has
    /// completed; a failed transfer ends like any other operation.
    pub fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Error> {
        let op = FtpOperation::RetrieveDirect;
        if self.session.phase() == Phase::Link(op) {
            let cell = self.modem;
            let mut modem = cell.try_borrow_mut().map_err(Error::from)?;
            let n = modem.read_direct(buf)?;
            // The result URC may already have been applied while the link
            // closed.
            if !modem.in_direct_link() && self.session.phase() == Phase::Link(op) {
                self.session.set_phase(Phase::WaitUrc(op));
            }
            if n > 0 {
                return Ok(n);
            }
        }
        self.ready().map(|()| 0)
    }

    fn open_link(&mut self, op: FtpOperation, remote: &str) -> Result<(), Error> {
        self.start(op, Some(remote), None)?;
        self.modem.try_borrow_mut()?.arm_direct_link();
        let opened = self.wait(op);
        if opened.is_ok() && self.session.phase() == Phase::Link(op) {
            return Ok(());
        }

        self.modem.try_borrow_mut()?.close_direct_link();
        opened?;
        warn!("FTP {:?} completed without a direct link", op);
        Err(Error::SequenceAborted)
    }

    /// Write `AT+UFTPC=<op>[,<param1>[,<param2>]]`; progress with
    /// [`Ftp::ready`].
    pub fn start(
        &mut self,
        op: FtpOperation,
        param1: Option<&str>,
        param2: Option<&str>,
    ) -> Result<(), Error> {
        if self.session.phase() != Phase::Idle {
            return Err(Error::Busy);
        }
        let mut modem = self.modem.try_borrow_mut()?;
        if modem.is_busy() {
            return Err(Error::Busy);
        }
        modem.send_cmd(&FtpCommand {
            op_code: op,
            param1,
            param2,
        })?;
        self.session.set_phase(Phase::WaitResponse(op));
        Ok(())
    }

    fn run(
        &mut self,
        op: FtpOperation,
        param1: Option<&str>,
        param2: Option<&str>,
    ) -> Result<(), Error> {
        self.start(op, param1, param2)?;
        self.wait(op)
    }

    fn wait(&mut self, op: FtpOperation) -> Result<(), Error> {
        let start = self.modem.try_borrow_mut()?.now();
        loop {
            match self.ready() {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            let mut modem = self.modem.try_borrow_mut()?;
            if modem.elapsed_since(start) >= self.timeout {
                warn!("FTP {:?} timed out in {:?}", op, self.session.phase());
                modem.abort();
                self.session.set_phase(Phase::Idle);
                return Err(Error::Timeout);
            }
            modem.delay(module_timing::poll_interval());
        }
    }

    /// `Ok` once the operation in progress succeeded or its direct link is
    /// open. A failed operation is followed by a logout (if the command
    /// itself was rejected) and by `AT+UFTPER`, then reported as
    /// [`Error::SequenceAborted`].
    pub fn ready(&mut self) -> nb::Result<(), Error> {
        let cell = self.modem;
        let mut modem = cell.try_borrow_mut().map_err(Error::from)?;
        let mut outcome = match modem.poll_step() {
            Err(nb::Error::Other(e)) => {
                warn!("FTP {:?} abandoned: {:?}", self.session.phase(), e);
                self.session.set_phase(Phase::Idle);
                return Err(nb::Error::Other(e));
            }
            step => step?,
        };

        loop {
            match self.session.phase() {
                Phase::Idle => return Ok(()),
                Phase::WaitResponse(op) => match outcome {
                    Outcome::Pending => return Err(nb::Error::WouldBlock),
                    Outcome::Success if modem.in_direct_link() => {
                        self.session.set_phase(Phase::Link(op));
                    }
                    Outcome::Success => {
                        self.session.set_phase(Phase::WaitUrc(op));
                        return Err(nb::Error::WouldBlock);
                    }
                    outcome => {
                        error!("FTP {:?} rejected: {:?}", op, outcome);
                        self.session.set_phase(Phase::Close);
                    }
                },
                Phase::WaitUrc(op) if modem.in_direct_link() => {
                    self.session.set_phase(Phase::Link(op));
                }
                Phase::WaitUrc(_) => return Err(nb::Error::WouldBlock),
                Phase::Link(_) => return Ok(()),
                Phase::Close => {
                    modem.try_send_cmd(&FtpCommand {
                        op_code: FtpOperation::Logout,
                        param1: None,
                        param2: None,
                    })?;
                    self.session.set_connected(false);
                    self.session.set_phase(Phase::WaitCloseResponse);
                    return Err(nb::Error::WouldBlock);
                }
                Phase::WaitCloseResponse => {
                    if outcome.is_pending() {
                        return Err(nb::Error::WouldBlock);
                    }
                    self.session.set_phase(Phase::RetrieveError);
                }
                Phase::RetrieveError => {
                    modem.try_send_cmd(&GetFtpError)?;
                    self.session.set_phase(Phase::WaitRetrieveError);
                    return Err(nb::Error::WouldBlock);
                }
                Phase::WaitRetrieveError => {
                    if outcome.is_pending() {
                        return Err(nb::Error::WouldBlock);
                    }
                    if outcome.is_success() {
                        match GetFtpError.parse(Ok(modem.response().as_bytes())) {
                            Ok(e) => {
                                warn!("FTP error class {}, code {}", e.error_class, e.error_code);
                                self.last_error = Some(e);
                            }
                            Err(_) => warn!("Unreadable FTP error {:?}", modem.response()),
                        }
                    }
                    self.session.set_phase(Phase::Idle);
                    return Err(nb::Error::Other(Error::SequenceAborted));
                }
            }
            outcome = Outcome::Pending;
        }
    }
}

impl<T, C, const N: usize> Drop for Ftp<'_, T, C, N>
where
    T: Transport,
    C: Clock,
{
    fn drop(&mut self) {
        match self.modem.try_borrow_mut() {
            Ok(mut modem) => modem.remove_urc_handler(self.session),
            Err(_) => error!("Modem borrowed, FTP URC handler left registered"),
        }
    }
}
