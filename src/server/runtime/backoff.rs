//! Retry pacing for a listener whose `accept()` keeps failing.

use std::time::Duration;

/// Bounds on the pause between failed accepts.
///
/// After a failure the accept loop waits `initial_delay`, then twice that
/// for each further consecutive failure up to `max_delay`. An accepted
/// socket starts the sequence over. Zero durations are raised to one
/// millisecond and swapped bounds are put back in order.
///
/// Defaults are 10 milliseconds and 1 second.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use packetwire::server::{BackoffConfig, ServerConfig};
///
/// let config = ServerConfig::new("127.0.0.1:0".parse().expect("valid address")).accept_backoff(
///     BackoffConfig {
///         initial_delay: Duration::from_millis(50),
///         max_delay: Duration::from_secs(5),
///     },
/// );
/// # drop(config);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Pause after the first failure in a run.
    pub initial_delay: Duration,
    /// Longest pause between retries.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Pacing state for one accept loop.
    pub(super) fn start(self) -> AcceptBackoff {
        let mut floor = self.initial_delay.max(Duration::from_millis(1));
        let mut ceiling = self.max_delay.max(Duration::from_millis(1));
        if floor > ceiling {
            std::mem::swap(&mut floor, &mut ceiling);
        }
        AcceptBackoff {
            floor,
            ceiling,
            next: floor,
        }
    }
}

/// Delay carried between iterations of the accept loop.
#[derive(Debug)]
pub(super) struct AcceptBackoff {
    floor: Duration,
    ceiling: Duration,
    next: Duration,
}

impl AcceptBackoff {
    /// Pause to take after a failed accept. The following failure waits
    /// twice as long, capped at the ceiling.
    pub(super) fn on_failure(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(self.ceiling);
        delay
    }

    /// A socket was accepted; the next failure waits the shortest pause.
    pub(super) fn on_success(&mut self) { self.next = self.floor; }
}
