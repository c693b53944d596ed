use core::fmt;

/// Maximum number of handlers registered on one modem.
pub const MAX_URC_HANDLERS: usize = 8;

/// Receiver of unsolicited result codes.
///
/// Handlers are invoked from inside the modem's drain with the trimmed line.
/// The modem is mutably borrowed at that point, so a handler must only record
/// what it saw; issuing commands from a handler fails with `Error::Busy`.
pub trait UrcHandler {
    fn handle(&self, line: &str);
}

/// Fixed-capacity, insertion-ordered set of URC handlers.
#[derive(Clone, Copy)]
pub struct UrcRegistry<'d, const N: usize = MAX_URC_HANDLERS> {
    slots: [Option<&'d dyn UrcHandler>; N],
}

impl<'d, const N: usize> Default for UrcRegistry<'d, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, const N: usize> UrcRegistry<'d, N> {
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Register `handler`. Registering when all slots are taken is a no-op.
    pub fn add(&mut self, handler: &'d dyn UrcHandler) {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(handler),
            None => warn!("All {} URC handler slots taken, handler not registered", N),
        }
    }

    /// Remove every registration of `handler`. Unknown handlers are ignored.
    pub fn remove(&mut self, handler: &dyn UrcHandler) {
        let mut kept = [None; N];
        let registered = self.slots.iter().flatten().filter(|h| !same(**h, handler));
        for (slot, h) in kept.iter_mut().zip(registered) {
            *slot = Some(*h);
        }
        self.slots = kept;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `line` to every handler, in registration order.
    pub fn dispatch(&self, line: &str) {
        // Snapshot, so the set seen by this line is the set at dispatch time.
        let slots = self.slots;
        for handler in slots.iter().flatten() {
            handler.handle(line);
        }
    }
}

impl<'d, const N: usize> fmt::Debug for UrcRegistry<'d, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrcRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

fn same(a: &dyn UrcHandler, b: &dyn UrcHandler) -> bool {
    core::ptr::eq(
        a as *const dyn UrcHandler as *const u8,
        b as *const dyn UrcHandler as *const u8,
    )
}
