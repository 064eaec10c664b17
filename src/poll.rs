//! Bounded, fixed-interval, cancellable polling.
//!
//! We have three things to wait for: a new flow definition becoming active, a
//! human finishing a review, and a new table becoming active. None of these
//! services offer a callback, so we ask repeatedly.

use std::{fmt, future::Future, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{error::PipelineError, prelude::*};

/// How often and how long to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of probes. Always at least 1.
    pub max_attempts: u32,
    /// Sleep between probes.
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a new policy.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

/// The result of a single probe.
#[derive(Debug)]
pub enum Probe<T> {
    /// We're done.
    Ready(T),
    /// Not yet. The string describes the current status, for logging.
    Pending(String),
}

/// Why polling stopped without a result.
#[derive(Debug)]
pub enum PollError {
    /// We ran out of attempts.
    Exhausted {
        /// Number of probes made.
        attempts: u32,
        /// Last reported status.
        last_status: String,
    },
    /// The cancellation token fired.
    Cancelled {
        /// Number of probes made.
        attempts: u32,
    },
    /// A probe failed outright.
    Failed(PipelineError),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Exhausted {
                attempts,
                last_status,
            } => write!(f, "gave up after {attempts} attempts ({last_status})"),
            PollError::Cancelled { attempts } => {
                write!(f, "cancelled after {attempts} attempts")
            }
            PollError::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// Call `probe` until it returns [`Probe::Ready`], it fails, `cancel` fires, or
/// `policy.max_attempts` probes have been made.
///
/// We sleep only between probes, never after the last one. The probe is passed
/// the 1-based attempt number.
#[instrument(level = "debug", skip_all, fields(what = %what))]
pub async fn poll_until<T, F, Fut>(
    what: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, PollError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, PipelineError>>,
{
    let mut last_status = String::from("never checked");
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                attempts: attempt - 1,
            });
        }
        match probe(attempt).await.map_err(PollError::Failed)? {
            Probe::Ready(value) => {
                debug!(attempt, "Poll finished");
                return Ok(value);
            }
            Probe::Pending(status) => {
                debug!(attempt, max_attempts = policy.max_attempts, %status, "Still waiting");
                last_status = status;
            }
        }
        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(PollError::Cancelled { attempts: attempt });
                }
                _ = time::sleep(policy.interval) => {}
            }
        }
    }
    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
        last_status,
    })
}
