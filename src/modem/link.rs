//! Transparent data received after `CONNECT`.
//!
//! The module ends a direct link by sending `DISCONNECT` on a line of its
//! own. Incoming bytes that may be the start of that line are held back until
//! enough has arrived to tell.

use heapless::Vec;

/// Bytes buffered between transport reads and the reader.
pub const LINK_BUF_SIZE: usize = 128;

const END_MARKER: &[u8] = b"\r\nDISCONNECT\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLink {
    buf: Vec<u8, LINK_BUF_SIZE>,
    /// No data handed out yet, so the marker may come without its leading
    /// line break.
    fresh: bool,
}

impl Default for DirectLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectLink {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            fresh: true,
        }
    }

    /// Start a new link with the bytes that followed `CONNECT` in the same
    /// read.
    pub fn open(&mut self, rest: &[u8]) {
        self.buf.clear();
        self.fresh = true;
        self.push(rest);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.fresh = true;
    }

    pub fn space(&self) -> usize {
        LINK_BUF_SIZE - self.buf.len()
    }

    /// Append received bytes. Callers read at most [`DirectLink::space`]
    /// bytes; anything beyond is dropped.
    pub fn push(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.space());
        if n < bytes.len() {
            warn!("Direct link buffer full, dropping {} bytes", bytes.len() - n);
        }
        // Bounded by the capacity check above.
        let _ = self.buf.extend_from_slice(&bytes[..n]);
    }

    /// Move stream data into `out`. Returns the number of bytes written and
    /// whether the end marker has been reached; in that case the bytes that
    /// followed it stay buffered for [`DirectLink::drain`].
    pub fn take(&mut self, out: &mut [u8]) -> (usize, bool) {
        let (deliverable, marker) = self.scan();
        let n = deliverable.min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.consume(n);
        if n > 0 {
            self.fresh = false;
        }

        match marker {
            Some(len) if n == deliverable => {
                self.consume(len);
                (n, true)
            }
            _ => (n, false),
        }
    }

    /// Bytes left over after the link ended, handed back to line mode.
    pub fn drain(&mut self, out: &mut [u8]) -> usize {
        let n = self.buf.len().min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.clear();
        n
    }

    /// Number of bytes that are certainly data, and the length of the end
    /// marker directly behind them if it has fully arrived.
    fn scan(&self) -> (usize, Option<usize>) {
        let bare = &END_MARKER[2..];
        if self.fresh {
            if self.buf.starts_with(bare) {
                return (0, Some(bare.len()));
            }
            if bare.starts_with(&self.buf) {
                return (0, None);
            }
        }

        if let Some(pos) = self
            .buf
            .windows(END_MARKER.len())
            .position(|w| w == END_MARKER)
        {
            return (pos, Some(END_MARKER.len()));
        }

        let held = (1..END_MARKER.len())
            .rev()
            .find(|&k| self.buf.ends_with(&END_MARKER[..k]))
            .unwrap_or(0);
        (self.buf.len() - held, None)
    }

    fn consume(&mut self, n: usize) {
        let len = self.buf.len();
        let n = n.min(len);
        self.buf.copy_within(n..len, 0);
        self.buf.truncate(len - n);
    }
}
