use embassy_time::{Duration, Instant};

/// Enforces a minimum gap between the last line activity (a command written,
/// a response or URC received) and the next command.
#[derive(Debug, Clone, PartialEq)]
pub struct Pacer {
    quiet: Duration,
    last_activity: Option<Instant>,
}

impl Pacer {
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_activity: None,
        }
    }

    /// Record line activity at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Time still to wait before a command may be written, if any.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_activity?;
        let elapsed = now
            .checked_duration_since(last)
            .unwrap_or_else(|| Duration::from_ticks(0));
        if elapsed >= self.quiet {
            None
        } else {
            Some(self.quiet - elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_activity_means_no_wait() {
        let pacer = Pacer::new(Duration::from_millis(20));
        assert_eq!(pacer.remaining(Instant::from_millis(0)), None);
    }

    #[test]
    fn waits_out_the_quiet_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(20));
        pacer.mark(Instant::from_millis(100));

        assert_eq!(
            pacer.remaining(Instant::from_millis(105)),
            Some(Duration::from_millis(15))
        );
        assert_eq!(pacer.remaining(Instant::from_millis(120)), None);

        pacer.mark(Instant::from_millis(130));
        assert_eq!(
            pacer.remaining(Instant::from_millis(130)),
            Some(Duration::from_millis(20))
        );
    }
}
