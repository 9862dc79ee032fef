//! Subtitle sources
//!
//! This module provides the trait implemented by every subtitle site, the
//! concrete sites, and the selector that tries them in priority order.

mod open_subtitles;
mod selector;
mod subscenter;

pub use open_subtitles::OpenSubtitlesSource;
pub use selector::{SubtitleOutcome, SubtitlePreferences, SubtitleSourceSelector};
pub use subscenter::SubscenterSource;

pub use crate::version_matcher::SubtitleCandidate;

use crate::archive::{ArchiveError, DownloadRequest};
use crate::episode::EpisodeId;
use thiserror::Error;

/// Errors that can occur while looking up subtitles
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// The subtitle site could not be reached
    #[error("Subtitle site unreachable: {0}")]
    Unreachable(String),

    /// Downloading or unpacking the chosen subtitle failed
    #[error("Subtitle download failed: {0}")]
    Archive(#[from] ArchiveError),
}

/// Trait for sites that list subtitles per episode
///
/// A source fetches the page for an episode, reads the offered subtitles from
/// it, and knows how to turn one of them into a download request. Choosing
/// among the offered subtitles happens in [`SubtitleSourceSelector`].
pub trait SubtitleSource {
    /// Short name used in logs and progress events
    fn name(&self) -> &'static str;

    /// Fetches the episode page in the given language.
    ///
    /// Returns `Ok(None)` when the site has no page for the episode.
    fn fetch_document(
        &self,
        episode: &EpisodeId,
        language: &str,
    ) -> Result<Option<String>, SubtitleError>;

    /// Reads the offered subtitles from a fetched page, in page order
    fn extract_candidates(&self, document: &str, episode: &EpisodeId) -> Vec<SubtitleCandidate>;

    /// Builds the request that downloads a candidate's archive
    fn download_request(&self, candidate: &SubtitleCandidate) -> DownloadRequest;
}

/// Fetches a page body, mapping 404 to `None`
pub(crate) fn fetch_page(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Option<String>, SubtitleError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::http::random_user_agent())
        .send()
        .map_err(|e| SubtitleError::Unreachable(e.to_string()))?;

    if response.status() == 404 {
        return Ok(None);
    }

    if !response.status().is_success() {
        return Err(SubtitleError::Unreachable(format!(
            "HTTP {} {}",
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("Unknown")
        )));
    }

    response
        .text()
        .map(Some)
        .map_err(|e| SubtitleError::Unreachable(e.to_string()))
}
