use core::cell::BorrowMutError;

use crate::hex::DecodeHexError;

#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    // Command outcomes
    /// `ERROR`, `+CME ERROR` or `+CMS ERROR`, with the numeric code when the
    /// modem reported one.
    ModemRejected(Option<u16>),
    /// `NO CARRIER`
    LinkDropped,
    /// Nothing classifiable arrived within the allotted window.
    Timeout,
    /// A state machine took a fatal branch.
    SequenceAborted,

    // General device errors
    Busy,
    Uninitialized,
    Io(embedded_io::ErrorKind),

    // Sockets
    /// The module no longer knows the socket; reads end here.
    SocketClosed,
    /// Socket numbers run from 0 to 6.
    InvalidSocket,

    // Local buffers and parsing
    Overflow,
    Parse,
    Hex(DecodeHexError),

    Atat(atat::Error),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::ModemRejected(code) => defmt::write!(f, "ModemRejected({:?})", code),
            Self::LinkDropped => defmt::write!(f, "LinkDropped"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::SequenceAborted => defmt::write!(f, "SequenceAborted"),
            Self::Busy => defmt::write!(f, "Busy"),
            Self::Uninitialized => defmt::write!(f, "Uninitialized"),
            Self::Io(e) => defmt::write!(f, "Io({:?})", e),
            Self::SocketClosed => defmt::write!(f, "SocketClosed"),
            Self::InvalidSocket => defmt::write!(f, "InvalidSocket"),
            Self::Overflow => defmt::write!(f, "Overflow"),
            Self::Parse => defmt::write!(f, "Parse"),
            Self::Hex(e) => defmt::write!(f, "Hex({:?})", e),
            Self::Atat(e) => defmt::write!(f, "Atat({:?})", e),
        }
    }
}

impl From<atat::Error> for Error {
    fn from(e: atat::Error) -> Self {
        Self::Atat(e)
    }
}

impl From<BorrowMutError> for Error {
    fn from(_: BorrowMutError) -> Self {
        Self::Busy
    }
}

impl From<DecodeHexError> for Error {
    fn from(e: DecodeHexError) -> Self {
        Self::Hex(e)
    }
}
