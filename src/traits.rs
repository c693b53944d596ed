use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

/// Serial link to the modem.
///
/// Any `embedded-io` byte stream that can report whether a read would block
/// qualifies. `end` is called on shutdown, after the modem has been asked to
/// power off, and is where the implementor releases the physical link.
pub trait Transport: Read + Write + ReadReady {
    fn end(&mut self) {}
}

/// Millisecond time source and blocking sleep.
///
/// The driver never reads a global time driver; all timestamps come from
/// here, so a test clock fully controls timeouts and pacing.
pub trait Clock: DelayNs {
    fn now(&mut self) -> Instant;
}
