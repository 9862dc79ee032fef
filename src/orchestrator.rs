//! Per-episode acquisition
//!
//! An episode moves from searching to one terminal [`AcquisitionStatus`].
//! Unreachable listings are retried with bounded exponential backoff; every
//! other outcome ends the episode. Subtitles are fetched only after a
//! successful transfer and never change the episode's status.

use crate::config::RetryConfig;
use crate::episode::EpisodeId;
use crate::media_files::find_video_file;
use crate::result_filter::{Candidate, Selection, SelectionThresholds, select};
use crate::search::{SearchError, SearchProvider};
use crate::subtitles::{SubtitleOutcome, SubtitleSourceSelector};
use crate::transfer::{PollSettings, TransferClient, TransferError, wait_for_completion};
use crate::version_matcher::extract_version;
use crate::{AcquisitionStatus, ProgressEvent};
use rand::Rng;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep between cancellation checks
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Errors that end acquisition without an episode status
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The run was cancelled
    #[error("Acquisition cancelled")]
    Cancelled,
}

/// Terminal result for one episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeOutcome {
    pub status: AcquisitionStatus,
    /// Release version of the acquired media, when known
    pub version: Option<String>,
}

impl EpisodeOutcome {
    fn status(status: AcquisitionStatus) -> Self {
        Self {
            status,
            version: None,
        }
    }

    fn success(version: String) -> Self {
        Self {
            status: AcquisitionStatus::Success,
            version: Some(version),
        }
    }
}

/// Trait for anything that can acquire a single episode
///
/// The season runner only depends on this, so it can be driven by stubs.
pub trait EpisodeAcquirer {
    fn acquire(
        &self,
        episode: &EpisodeId,
        directory: &Path,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<EpisodeOutcome, AcquisitionError>;
}

/// Behavior switches for an acquisition run
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    pub thresholds: SelectionThresholds,
    /// Pick the largest release instead of the best seeded one
    pub prefer_largest_size: bool,
    /// Skip the transfer and only fetch subtitles for media already present
    pub subtitles_only: bool,
    pub retry: RetryConfig,
    pub poll: PollSettings,
}

/// Drives search, selection, transfer and subtitles for one episode at a time
pub struct AcquisitionOrchestrator<'a> {
    search: &'a dyn SearchProvider,
    transfer: &'a dyn TransferClient,
    subtitles: &'a SubtitleSourceSelector<'a>,
    settings: AcquisitionSettings,
    cancel: CancellationToken,
}

impl<'a> AcquisitionOrchestrator<'a> {
    pub fn new(
        search: &'a dyn SearchProvider,
        transfer: &'a dyn TransferClient,
        subtitles: &'a SubtitleSourceSelector<'a>,
        settings: AcquisitionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            search,
            transfer,
            subtitles,
            settings,
            cancel,
        }
    }

    /// Fetches the search listing, retrying while the index is unreachable.
    ///
    /// Returns `Ok(None)` once the retries are exhausted.
    fn fetch_listing(
        &self,
        episode: &EpisodeId,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<Option<Vec<Candidate>>, SearchError> {
        let retry = &self.settings.retry;
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                // Surfaced as cancellation by the caller
                return Ok(None);
            }

            attempt += 1;
            progress(ProgressEvent::Searching {
                episode: episode.clone(),
                attempt,
            });

            match self.search.search(&episode.token()) {
                Ok(rows) => {
                    if attempt > 1 {
                        info!(%episode, attempts = attempt, "search succeeded after retry");
                    }
                    return Ok(Some(rows));
                }
                Err(SearchError::Connection(reason)) if attempt <= retry.max_attempts => {
                    let delay = backoff_delay(retry, attempt);
                    warn!(
                        %episode,
                        error = %reason,
                        attempt,
                        max_attempts = retry.max_attempts,
                        delay_ms = delay.as_millis(),
                        "search failed, retrying"
                    );
                    progress(ProgressEvent::RetryScheduled {
                        attempt,
                        max_attempts: retry.max_attempts,
                        delay,
                    });
                    sleep_unless_cancelled(delay, &self.cancel);
                }
                Err(SearchError::Connection(reason)) => {
                    warn!(
                        %episode,
                        error = %reason,
                        attempts = attempt,
                        "search retries exhausted"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Searches, selects and transfers the episode's media
    fn acquire_media(
        &self,
        episode: &EpisodeId,
        directory: &Path,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<EpisodeOutcome, AcquisitionError> {
        let rows = match self.fetch_listing(episode, progress) {
            Ok(Some(rows)) => rows,
            Ok(None) if self.cancel.is_cancelled() => return Err(AcquisitionError::Cancelled),
            Ok(None) => return Ok(EpisodeOutcome::status(AcquisitionStatus::NoConnection)),
            Err(e) => {
                warn!(%episode, error = %e, "search listing unusable");
                return Ok(EpisodeOutcome::status(AcquisitionStatus::GenericError));
            }
        };

        let selection = select(
            &rows,
            &episode.token(),
            self.settings.prefer_largest_size,
            &self.settings.thresholds,
        );

        let (candidate, locator) = match (selection, selection.resource_locator()) {
            (Selection::Chosen(candidate), Some(locator)) => (candidate, locator),
            (Selection::Chosen(_), None) => {
                return Ok(EpisodeOutcome::status(AcquisitionStatus::GenericError));
            }
            (Selection::NoResults | Selection::NoGoodResults, _) => {
                info!(
                    %episode,
                    rows = rows.len(),
                    status = ?selection.status(),
                    "no usable release"
                );
                return Ok(EpisodeOutcome::status(selection.status()));
            }
        };

        info!(
            %episode,
            name = %candidate.name,
            seeders = candidate.seeders,
            leechers = candidate.leechers,
            trusted = candidate.trusted,
            "chose release"
        );
        progress(ProgressEvent::CandidateChosen {
            name: candidate.name.clone(),
            seeders: candidate.seeders,
            leechers: candidate.leechers,
            trusted: candidate.trusted,
        });

        if self.cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        let handle = match self.transfer.begin(locator, directory) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(%episode, error = %e, "could not start transfer");
                return Ok(EpisodeOutcome::status(AcquisitionStatus::GenericError));
            }
        };
        progress(ProgressEvent::TransferStarted {
            name: candidate.name.clone(),
        });

        let name = match wait_for_completion(
            self.transfer,
            handle,
            self.settings.poll,
            &self.cancel,
            progress,
        ) {
            Ok(name) => name,
            Err(TransferError::Cancelled) => return Err(AcquisitionError::Cancelled),
            Err(e) => {
                warn!(%episode, error = %e, "transfer did not complete");
                return Ok(EpisodeOutcome::status(AcquisitionStatus::GenericError));
            }
        };
        progress(ProgressEvent::TransferCompleted { name: name.clone() });

        match extract_version(&name, episode) {
            Some(version) => {
                info!(%episode, %version, "media acquired");
                Ok(EpisodeOutcome::success(version))
            }
            None => {
                warn!(%episode, %name, "no release version in downloaded name");
                Ok(EpisodeOutcome::status(AcquisitionStatus::GenericError))
            }
        }
    }

    /// Version of media already present in `directory`, if any
    fn present_version(&self, episode: &EpisodeId, directory: &Path) -> Option<String> {
        let path = match find_video_file(directory) {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!(%episode, "no media file present");
                return None;
            }
            Err(e) => {
                warn!(%episode, error = %e, "could not scan episode directory");
                return None;
            }
        };

        let stem = path.file_stem()?.to_string_lossy();
        extract_version(&stem, episode)
    }

    fn fetch_subtitles(
        &self,
        episode: &EpisodeId,
        version: &str,
        directory: &Path,
        progress: &mut dyn FnMut(ProgressEvent),
    ) {
        match self.subtitles.acquire(episode, version, directory, progress) {
            SubtitleOutcome::Acquired {
                source,
                language,
                version,
                files,
            } => {
                progress(ProgressEvent::SubtitlesAcquired {
                    source,
                    language,
                    version,
                    file_count: files.len(),
                });
            }
            SubtitleOutcome::Unavailable => {
                info!(%episode, "no subtitles found");
                progress(ProgressEvent::SubtitlesUnavailable {
                    episode: episode.clone(),
                });
            }
        }
    }
}

impl EpisodeAcquirer for AcquisitionOrchestrator<'_> {
    fn acquire(
        &self,
        episode: &EpisodeId,
        directory: &Path,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<EpisodeOutcome, AcquisitionError> {
        if self.cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        if self.settings.subtitles_only {
            let version = self.present_version(episode, directory);
            // Without a version the first listed subtitle wins
            self.fetch_subtitles(episode, version.as_deref().unwrap_or(""), directory, progress);
            return Ok(EpisodeOutcome {
                status: AcquisitionStatus::Success,
                version,
            });
        }

        let outcome = self.acquire_media(episode, directory, progress)?;
        if let Some(version) = &outcome.version {
            self.fetch_subtitles(episode, version, directory, progress);
        }
        Ok(outcome)
    }
}

/// Delay before retry number `attempt` (1-based)
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let delay = Duration::try_from_secs_f64(secs)
        .unwrap_or(config.max_delay)
        .min(config.max_delay);

    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Stretches `delay` by a uniform 0-100%, saturating at [`Duration::MAX`]
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
        .unwrap_or(Duration::MAX)
}

/// Sleeps for `duration` in short slices, returning early on cancellation.
///
/// Returns `false` if the sleep was cut short. A duration too long to
/// represent as a deadline only ends on cancellation.
pub(crate) fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now().checked_add(duration);

    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            return true;
        }
        let remaining = deadline.map_or(SLEEP_SLICE, |deadline| deadline - now);
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
