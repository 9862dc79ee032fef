//! Torrent transfers
//!
//! A transfer client hands a magnet link to a torrent daemon and reports the
//! transfer's progress. [`wait_for_completion`] turns that into a blocking
//! wait bounded by a timeout and a cancellation token.

mod transmission;
mod transmission_types;

pub use transmission::TransmissionClient;

use crate::ProgressEvent;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Consecutive unreachable polls tolerated before the wait gives up
const MAX_POLL_FAILURES: u32 = 3;

/// Errors that can occur while talking to the torrent daemon
#[derive(Debug, Error)]
pub enum TransferError {
    /// The daemon could not be reached
    #[error("Torrent daemon unreachable: {0}")]
    Connection(String),

    /// The daemon rejected the request
    #[error("Torrent daemon rejected request: {0}")]
    Rejected(String),

    /// The daemon answered with something unexpected
    #[error("Unexpected torrent daemon response: {0}")]
    InvalidResponse(String),

    /// The daemon reported the transfer as failed
    #[error("Transfer failed: {0}")]
    Failed(String),

    /// The transfer did not finish in time
    #[error("Transfer did not finish within {0:?}")]
    TimedOut(Duration),

    /// The wait was cancelled
    #[error("Transfer wait cancelled")]
    Cancelled,
}

/// Identifies a transfer within the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHandle(pub i64);

/// State of a transfer as reported by the daemon
#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    InProgress {
        /// Completed share in `[0, 1]`
        fraction: f64,
        total_bytes: u64,
    },
    Completed {
        /// Name of the downloaded file or directory
        name: String,
    },
    Failed {
        reason: String,
    },
}

/// Trait for torrent daemons
pub trait TransferClient {
    /// Starts transferring `resource_locator` into `target_dir`
    fn begin(
        &self,
        resource_locator: &str,
        target_dir: &Path,
    ) -> Result<TransferHandle, TransferError>;

    /// Reports the current state of a transfer
    fn poll(&self, handle: TransferHandle) -> Result<TransferState, TransferError>;
}

/// How long and how often to poll a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

/// Polls a transfer until it completes, returning the downloaded name.
///
/// Emits a [`ProgressEvent::TransferProgress`] per poll. Fails when the
/// daemon reports a failure, the timeout elapses, or `cancel` fires. A daemon
/// that stays unreachable for `MAX_POLL_FAILURES` polls in a row also ends
/// the wait.
pub fn wait_for_completion(
    client: &dyn TransferClient,
    handle: TransferHandle,
    settings: PollSettings,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<String, TransferError> {
    let started = Instant::now();
    let mut poll_failures = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        match client.poll(handle) {
            Ok(TransferState::Completed { name }) => return Ok(name),
            Ok(TransferState::Failed { reason }) => return Err(TransferError::Failed(reason)),
            Ok(TransferState::InProgress {
                fraction,
                total_bytes,
            }) => {
                poll_failures = 0;
                debug!(handle = handle.0, fraction, "transfer in progress");
                progress(ProgressEvent::TransferProgress {
                    fraction,
                    total_bytes,
                });
            }
            Err(TransferError::Connection(reason)) if poll_failures + 1 < MAX_POLL_FAILURES => {
                poll_failures += 1;
                warn!(handle = handle.0, %reason, poll_failures, "transfer poll failed");
            }
            Err(e) => return Err(e),
        }

        if let Some(timeout) = settings.timeout {
            if started.elapsed() >= timeout {
                return Err(TransferError::TimedOut(timeout));
            }
        }

        crate::orchestrator::sleep_unless_cancelled(settings.interval, cancel);
    }
}
