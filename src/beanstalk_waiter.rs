//! Convergence waiter.
//!
//! Unique responsibility: poll a resource status until it reaches a stable
//! terminal state, backing off exponentially between polls, under an overall
//! deadline.
//!
//! Ordering of one iteration:
//! 1) fetch a fresh status,
//! 2) classify it (Ready returns, Fatal aborts, Transitional continues),
//! 3) check the deadline,
//! 4) sleep, then double the delay up to the cap.
//!
//! The deadline is checked after the fetch, never before it: a Ready status
//! observed by a slow final call still counts as success.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

/// Classification of a raw status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Stable and healthy; stop polling.
    Ready,
    /// The platform is still processing a request; keep polling.
    Transitional,
    /// Unexpected status; stop polling and report it.
    Fatal,
}

impl PollState {
    /// Whether polling stops on this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Fatal)
    }
}

/// Classification table for Beanstalk environment statuses.
///
/// Adding a newly observed transitional status is a one-line change here.
#[must_use]
pub fn classify_environment_status(status: &str) -> PollState {
    match status {
        "Ready" => PollState::Ready,
        "Updating" | "Launching" | "Aborting" => PollState::Transitional,
        _ => PollState::Fatal,
    }
}

/// Shortest delay between two polls.
const MIN_POLL_DELAY: Duration = Duration::from_secs(1);

/// Delay schedule between polls: doubles from `initial` up to `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    initial: Duration,
    cap: Duration,
}

impl BackoffSchedule {
    /// Create a schedule.
    ///
    /// An `initial` delay below one second is raised to one second, and a cap
    /// lower than `initial` is raised to `initial`.
    #[must_use]
    pub const fn new(initial: Duration, cap: Duration) -> Self {
        let initial = if initial.as_nanos() < MIN_POLL_DELAY.as_nanos() {
            MIN_POLL_DELAY
        } else {
            initial
        };
        let cap = if cap.as_nanos() < initial.as_nanos() {
            initial
        } else {
            cap
        };
        Self { initial, cap }
    }

    /// First delay.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Largest delay.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay following `current`.
    #[must_use]
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.cap)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(120))
    }
}

/// Something whose status can be polled.
///
/// Each call must observe fresh remote state: implementations drop any cached
/// snapshot before fetching.
#[async_trait]
pub trait StatusSource: Send {
    /// Error raised when the status cannot be fetched.
    type Error: std::error::Error + Send + 'static;

    /// Fetch the current raw status.
    async fn fetch_status(&mut self) -> Result<String, Self::Error>;
}

/// Successful convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converged {
    /// Number of status fetches performed, including the final Ready one.
    pub polls: u32,
    /// Time elapsed since the wait started.
    pub elapsed: Duration,
}

/// Reasons a wait did not converge.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The resource reported a status outside the known set.
    #[error("unexpected status: {status}")]
    Fatal {
        /// The offending raw status.
        status: String,
    },
    /// The deadline elapsed before the resource became Ready.
    #[error("timeout exceeded after {elapsed:?} (last status: {last_status})")]
    TimedOut {
        /// Time waited.
        elapsed: Duration,
        /// Last observed status.
        last_status: String,
    },
    /// Fetching the status failed.
    #[error("status fetch failed: {0}")]
    Fetch(#[source] E),
}

/// Poll `source` until `classify` reports a terminal state or `deadline` elapses.
///
/// # Errors
///
/// - `WaitError::Fatal` as soon as a status classifies as Fatal (never retried),
/// - `WaitError::TimedOut` when a transitional status is observed past the deadline,
/// - `WaitError::Fetch` when the source fails.
pub async fn wait_until_stable<S, C>(
    source: &mut S,
    classify: C,
    deadline: Duration,
    schedule: BackoffSchedule,
) -> Result<Converged, WaitError<S::Error>>
where
    S: StatusSource + ?Sized,
    C: Fn(&str) -> PollState,
{
    let start = Instant::now();
    let mut wait = schedule.initial();
    let mut polls: u32 = 0;

    loop {
        let status = source.fetch_status().await.map_err(WaitError::Fetch)?;
        polls = polls.saturating_add(1);

        info!(poll = polls, status = %status, "observed status");

        match classify(&status) {
            PollState::Ready => {
                let elapsed = start.elapsed();
                info!(seconds = elapsed.as_secs(), polls, "synchronized");
                return Ok(Converged { polls, elapsed });
            }
            PollState::Transitional => {}
            PollState::Fatal => return Err(WaitError::Fatal { status }),
        }

        let elapsed = start.elapsed();
        if elapsed > deadline {
            return Err(WaitError::TimedOut {
                elapsed,
                last_status: status,
            });
        }

        tokio::time::sleep(wait).await;
        wait = schedule.next(wait);
    }
}
