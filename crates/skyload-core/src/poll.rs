//! Cancellable, time-bounded polling.

use crate::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C into `token`. A second Ctrl-C exits the process.
pub fn install_signal_handler(token: &CancelToken) {
    let token = token.clone();
    let _ = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!("\ncancel requested, stopping at the next poll boundary...");
    });
}

pub trait Sleeper: Send + Sync {
    /// Block for `duration`, returning early once `cancel` is set.
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Sleeps on the calling thread in short slices so cancellation is noticed
/// promptly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        let mut remaining = duration;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    cancel_after: Option<(usize, CancelToken)>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `token` once `count` sleeps have been recorded.
    #[must_use]
    pub fn cancelling_after(mut self, count: usize, token: &CancelToken) -> Self {
        self.cancel_after = Some((count, token.clone()));
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
        let mut sleeps = self
            .sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sleeps.push(duration);
        if let Some((count, ref token)) = self.cancel_after {
            if sleeps.len() >= count {
                token.cancel();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// What one probe observed.
#[derive(Debug)]
pub enum PollStep<T> {
    Done(T),
    /// Not there yet; carries the observed status for logs and timeouts.
    Pending(String),
}

#[derive(Debug)]
pub struct Polled<T> {
    pub value: T,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Probe until it reports done, fails, is cancelled, or `elapsed` reaches
/// `policy.timeout`.
///
/// `elapsed` is logical time: it grows by exactly `policy.interval` after
/// each pending probe, independent of how long the probe itself took. A probe
/// error aborts the loop immediately.
pub fn poll_until<T>(
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancelToken,
    subject: &str,
    mut probe: impl FnMut() -> Result<PollStep<T>, CoreError>,
) -> Result<Polled<T>, CoreError> {
    if policy.interval.is_zero() {
        return Err(CoreError::InvalidPolicy(
            "interval must be greater than zero".to_owned(),
        ));
    }

    let mut elapsed = Duration::ZERO;
    let mut attempts = 0;
    let mut last_status = String::from("unknown");

    while elapsed < policy.timeout {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled {
                identifier: subject.to_owned(),
                elapsed,
            });
        }
        attempts += 1;
        match probe()? {
            PollStep::Done(value) => {
                return Ok(Polled {
                    value,
                    elapsed,
                    attempts,
                })
            }
            PollStep::Pending(status) => {
                debug!(
                    "{subject}: {status} after {}s (attempt {attempts})",
                    elapsed.as_secs()
                );
                last_status = status;
            }
        }
        sleeper.sleep(policy.interval, cancel);
        elapsed += policy.interval;
    }

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled {
            identifier: subject.to_owned(),
            elapsed,
        });
    }
    Err(CoreError::Timeout {
        identifier: subject.to_owned(),
        elapsed,
        last_status,
    })
}
