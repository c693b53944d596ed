//! Receive buffers for module sockets in HEX mode.
//!
//! Data is pulled with `AT+USORD` into one buffer per socket and handed out
//! from there. [`SocketState`] records the `+UUSORD` and `+UUSOCL`
//! notifications, so a reader can see that more data is waiting and stops
//! asking once the module has closed the socket.
//!
//! ```ignore
//! static SOCKETS: SocketState = SocketState::new();
//! let mut sockets = SocketBuffer::new(&modem, &SOCKETS)?;
//! let mut buf = [0u8; 64];
//! let n = sockets.read(0, &mut buf)?;
//! ```

use core::cell::RefCell;
use atat::AtatUrc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::command::ip_transport_layer::ReadSocketData;
use crate::command::Urc;
use crate::error::Error;
use crate::hex;
use crate::modem::{Modem, Outcome, UrcHandler};
use crate::module_timing;
use crate::traits::{Clock, Transport};

/// Sockets the module can have open at once.
pub const MAX_SOCKETS: usize = 7;

/// Largest read requested with `AT+USORD`, and size of each buffer.
pub const SOCKET_BUFFER_SIZE: usize = 512;

/// Response bytes besides the hex data: `+USORD: <socket>,<length>,""`.
const READ_OVERHEAD: usize = 32;

/// `+CME ERROR: 3`, operation not allowed.
const OPERATION_NOT_ALLOWED: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Notice {
    pending: usize,
    closed: bool,
}

impl Notice {
    const CLEAR: Self = Self {
        pending: 0,
        closed: false,
    };
}

/// Socket notifications, updated from URCs.
pub struct SocketState {
    sockets: Mutex<NoopRawMutex, RefCell<[Notice; MAX_SOCKETS]>>,
}

impl Default for SocketState {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketState {
    pub const fn new() -> Self {
        Self {
            sockets: Mutex::new(RefCell::new([Notice::CLEAR; MAX_SOCKETS])),
        }
    }

    /// Bytes announced by the last `+UUSORD` that have not been fetched yet.
    pub fn pending(&self, socket: u8) -> usize {
        self.notice(socket).pending
    }

    /// The module reported the socket closed with `+UUSOCL`.
    pub fn is_closed(&self, socket: u8) -> bool {
        self.notice(socket).closed
    }

    fn notice(&self, socket: u8) -> Notice {
        self.sockets.lock(|s| {
            s.borrow()
                .get(usize::from(socket))
                .copied()
                .unwrap_or(Notice::CLEAR)
        })
    }

    fn update(&self, socket: u8, f: impl FnOnce(&mut Notice)) {
        self.sockets.lock(|s| match s.borrow_mut().get_mut(usize::from(socket)) {
            Some(notice) => f(notice),
            None => warn!("Notification for unknown socket {}", socket),
        });
    }
}

impl UrcHandler for SocketState {
    fn handle(&self, line: &str) {
        match Urc::parse(line.as_bytes()) {
            Some(Urc::SocketDataAvailable(data)) => {
                trace!("Socket {}: {} bytes waiting", data.socket, data.length);
                self.update(data.socket, |n| n.pending = data.length);
            }
            Some(Urc::SocketClosed(closed)) => {
                debug!("Socket {} closed by the module", closed.socket);
                self.update(closed.socket, |n| n.closed = true);
            }
            _ => {}
        }
    }
}

struct Buffer {
    data: [u8; SOCKET_BUFFER_SIZE],
    head: usize,
    len: usize,
}

impl Buffer {
    const EMPTY: Self = Self {
        data: [0; SOCKET_BUFFER_SIZE],
        head: 0,
        len: 0,
    };
}

pub struct SocketBuffer<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    state: &'d SocketState,
    buffers: [Buffer; MAX_SOCKETS],
}

impl<'d, T, C, const N: usize> SocketBuffer<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(
        modem: &'d RefCell<Modem<'d, T, C, N>>,
        state: &'d SocketState,
    ) -> Result<Self, Error> {
        modem.try_borrow_mut()?.add_urc_handler(state);
        Ok(Self {
            modem,
            state,
            buffers: [Buffer::EMPTY; MAX_SOCKETS],
        })
    }

    /// Bytes buffered for `socket`. An empty buffer is refilled with
    /// `AT+USORD` first.
    ///
    /// `Ok(0)` when the module has nothing to deliver or does not answer in
    /// time. [`Error::SocketClosed`] when the read is refused with `ERROR` or
    /// "operation not allowed", or the module has reported the socket closed.
    pub fn available(&mut self, socket: u8) -> Result<usize, Error> {
        let index = slot(socket)?;
        if self.buffers[index].len > 0 {
            return Ok(self.buffers[index].len);
        }
        if self.state.is_closed(socket) {
            return Err(Error::SocketClosed);
        }

        let length = read_len::<N>();
        if length == 0 {
            return Err(Error::Overflow);
        }

        let cell = self.modem;
        let mut modem = cell.try_borrow_mut()?;
        modem.send_cmd(&ReadSocketData { socket, length })?;
        let outcome = match modem.wait_for_response(module_timing::socket_read_timeout()) {
            Ok(outcome) => outcome,
            Err(Error::Timeout) => return Ok(0),
            Err(e) => return Err(e),
        };

        match outcome {
            Outcome::Success => {}
            Outcome::Error | Outcome::ModemError(Some(OPERATION_NOT_ALLOWED)) => {
                return Err(Error::SocketClosed)
            }
            Outcome::ModemError(_) if modem.response().contains("Operation not allowed") => {
                return Err(Error::SocketClosed)
            }
            outcome => {
                debug!("Socket {} read ended with {:?}", socket, outcome);
                return Ok(0);
            }
        }

        let Some(data) = hex_payload(modem.response()) else {
            warn!("Unexpected read response {:?}", modem.response());
            return Ok(0);
        };
        let buffer = &mut self.buffers[index];
        let len = hex::decode_to_slice(data.as_bytes(), &mut buffer.data)?;
        buffer.head = 0;
        buffer.len = len;
        self.state
            .update(socket, |n| n.pending = n.pending.saturating_sub(len));
        Ok(len)
    }

    /// Next byte of `socket` without consuming it.
    pub fn peek(&mut self, socket: u8) -> Result<Option<u8>, Error> {
        if self.available(socket)? == 0 {
            return Ok(None);
        }
        let buffer = &self.buffers[usize::from(socket)];
        Ok(Some(buffer.data[buffer.head]))
    }

    /// Copy up to `buf.len()` buffered bytes of `socket`, refilling an empty
    /// buffer first.
    pub fn read(&mut self, socket: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let avail = self.available(socket)?;
        let buffer = &mut self.buffers[usize::from(socket)];
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&buffer.data[buffer.head..buffer.head + n]);
        buffer.head += n;
        buffer.len -= n;
        Ok(n)
    }

    /// Forget buffered data and notifications of `socket`, e.g. before the
    /// socket number is reused.
    pub fn close(&mut self, socket: u8) -> Result<(), Error> {
        let index = slot(socket)?;
        self.buffers[index].head = 0;
        self.buffers[index].len = 0;
        self.state.update(socket, |n| *n = Notice::CLEAR);
        Ok(())
    }
}

impl<T, C, const N: usize> Drop for SocketBuffer<'_, T, C, N>
where
    T: Transport,
    C: Clock,
{
    fn drop(&mut self) {
        match self.modem.try_borrow_mut() {
            Ok(mut modem) => modem.remove_urc_handler(self.state),
            Err(_) => error!("Modem borrowed, socket URC handler left registered"),
        }
    }
}

fn slot(socket: u8) -> Result<usize, Error> {
    let index = usize::from(socket);
    if index >= MAX_SOCKETS {
        return Err(Error::InvalidSocket);
    }
    Ok(index)
}

/// Read size that keeps the hex response within the modem's line buffer.
const fn read_len<const N: usize>() -> usize {
    let fits = N.saturating_sub(READ_OVERHEAD) / 2;
    if fits < SOCKET_BUFFER_SIZE {
        fits
    } else {
        SOCKET_BUFFER_SIZE
    }
}

/// Hex data of `+USORD: <socket>,<length>,"<data>"`.
fn hex_payload(response: &str) -> Option<&str> {
    let line = response.lines().find(|l| l.starts_with("+USORD: "))?;
    let start = line.find('"')? + 1;
    Some(line[start..].trim_end().trim_end_matches('"'))
}
