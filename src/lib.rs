//! torrent_dd - Download tv series episodes by torrent, with matching subtitles
//!
//! This library searches a torrent index for each episode of a season, picks
//! the best release, hands it to a Transmission daemon and then fetches the
//! subtitles whose release version is closest to the downloaded file.

mod archive;
mod config;
mod episode;
mod http;
mod media_files;
mod orchestrator;
mod result_filter;
mod search;
mod season;
mod subtitles;
mod transfer;
mod version_matcher;

use archive::HttpArchiveDownloader;
use orchestrator::{AcquisitionOrchestrator, AcquisitionSettings};
use search::PirateBayProvider;
use season::{FsDirectoryStore, SeasonRunner};
use subtitles::{OpenSubtitlesSource, SubscenterSource, SubtitlePreferences, SubtitleSourceSelector};
use transfer::{PollSettings, TransmissionClient};

// Re-export error types
pub use archive::ArchiveError;
pub use config::ConfigError;
pub use media_files::MediaFileError;
pub use orchestrator::AcquisitionError;
pub use search::SearchError;
pub use season::{DirectoryError, SeasonError};
pub use subtitles::SubtitleError;
pub use transfer::TransferError;

// Re-export the building blocks
pub use config::{
    Config, HttpConfig, RetryConfig, SearchConfig, SubtitleConfig, TransferConfig,
    TransmissionConfig, default_config_path,
};
pub use episode::EpisodeId;
pub use result_filter::{Candidate, Selection, SelectionThresholds, select};
pub use season::{EpisodeSelection, LAST_EPISODE, SeasonReport, SeasonRequest};
pub use version_matcher::{
    SubtitleCandidate, VersionMatch, extract_version, select_best, similarity,
};

pub use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Terminal status of one episode's acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionStatus {
    /// Media was transferred and its release version identified
    Success,
    /// The torrent index stayed unreachable through every retry
    NoConnection,
    /// The index listed nothing for the episode
    NoResults,
    /// The index listed releases, but none was eligible
    NoGoodResults,
    /// Anything else went wrong for this episode
    GenericError,
}

/// Progress event emitted during a season run
///
/// These events allow library users to track progress and provide feedback
/// while episodes are searched, transferred and subtitled.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Season run started
    SeasonStarted { series: String, season: u32 },

    /// Acquisition of an episode started
    EpisodeStarted {
        episode: EpisodeId,
        directory: PathBuf,
    },

    /// Querying the torrent index
    Searching { episode: EpisodeId, attempt: u32 },

    /// The index was unreachable; the search is retried after `delay`
    RetryScheduled {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },

    /// A release was selected from the listing
    CandidateChosen {
        name: String,
        seeders: u32,
        leechers: u32,
        trusted: bool,
    },

    /// The torrent daemon accepted the release
    TransferStarted { name: String },

    /// Periodic transfer progress
    TransferProgress { fraction: f64, total_bytes: u64 },

    /// The transfer finished
    TransferCompleted { name: String },

    /// Looking up subtitles on a source in a language
    SubtitleSourceAttempted {
        source: &'static str,
        language: String,
    },

    /// Subtitles were downloaded and extracted
    SubtitlesAcquired {
        source: &'static str,
        language: String,
        version: String,
        file_count: usize,
    },

    /// No source had matching subtitles
    SubtitlesUnavailable { episode: EpisodeId },

    /// An episode reached its terminal status
    EpisodeFinished {
        episode: EpisodeId,
        status: AcquisitionStatus,
        version: Option<String>,
    },

    /// The season ended early at this episode
    SeasonStopped {
        episode: u32,
        status: AcquisitionStatus,
    },

    /// Episode directories were tidied up
    CleanupFinished {
        removed_directories: usize,
        removed_files: usize,
    },

    /// Season run complete
    Complete { downloaded: Vec<u32> },
}

/// Per-run choices that are not part of the configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Subtitle language code, e.g. `en` or `he`
    pub language: String,
    /// Try the regional subtitle source first for the regional language
    pub prefer_regional_subtitles: bool,
    /// Pick the largest release instead of the best seeded one
    pub prefer_largest_size: bool,
    /// Only fetch subtitles for media already on disk
    pub subtitles_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            prefer_regional_subtitles: false,
            prefer_largest_size: false,
            subtitles_only: false,
        }
    }
}

/// Top-level error type for torrent_dd operations
#[derive(Debug, Error)]
pub enum TorrentDdError {
    /// Error while loading configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while managing the download directory tree
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// The run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// The shared HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<SeasonError> for TorrentDdError {
    fn from(error: SeasonError) -> Self {
        match error {
            SeasonError::Directory(e) => TorrentDdError::Directory(e),
            SeasonError::Acquisition(AcquisitionError::Cancelled) => TorrentDdError::Cancelled,
        }
    }
}

/// Acquires the requested episodes of a season
///
/// Each episode is searched on the configured torrent index, the best
/// release is transferred by the Transmission daemon into
/// `<download dir>/<Series-Name>/seasonNN/episodeNN`, and subtitles matching
/// the release version are extracted next to it. The season stops at the
/// first episode the index has no usable release for.
///
/// Progress events are emitted through the provided callback, allowing library
/// users to track progress, display status, or remain silent.
///
/// # Arguments
///
/// * `config` - Endpoints, thresholds, retry and polling settings
/// * `request` - Series, season, episodes and download directory
/// * `options` - Subtitle language and per-run switches
/// * `cancel` - Token that aborts the run at the next blocking point
/// * `progress_callback` - Closure called with progress events (can be empty for silent operation)
///
/// # Examples
///
/// ```no_run
/// use torrent_dd::{
///     CancellationToken, Config, EpisodeSelection, ProgressEvent, RunOptions, SeasonRequest,
///     run_season,
/// };
/// use std::path::PathBuf;
///
/// let request = SeasonRequest {
///     series: "The Office".to_string(),
///     season: 1,
///     episodes: EpisodeSelection::FromStart(1),
///     download_dir: PathBuf::from("/media/tv"),
/// };
///
/// let report = run_season(
///     &Config::default(),
///     &request,
///     &RunOptions::default(),
///     CancellationToken::new(),
///     |event| {
///         if let ProgressEvent::EpisodeFinished { episode, status, .. } = event {
///             println!("{episode}: {status:?}");
///         }
///     },
/// )
/// .unwrap();
///
/// println!("downloaded episodes: {:?}", report.downloaded);
/// ```
pub fn run_season<F>(
    config: &Config,
    request: &SeasonRequest,
    options: &RunOptions,
    cancel: CancellationToken,
    mut progress_callback: F,
) -> Result<SeasonReport, TorrentDdError>
where
    F: FnMut(ProgressEvent),
{
    let client = http::build_client(config.http.timeout)?;

    let search = PirateBayProvider::new(client.clone(), config.search.base_url.as_str());
    let transfer = TransmissionClient::new(
        client.clone(),
        config.transmission.url.as_str(),
        config.transmission.username.clone(),
        config.transmission.password.clone(),
    );

    let open_subtitles = OpenSubtitlesSource::new(
        client.clone(),
        config.subtitles.opensubtitles_url.as_str(),
        config.subtitles.opensubtitles_download_url.as_str(),
    );
    let subscenter =
        SubscenterSource::new(client.clone(), config.subtitles.subscenter_url.as_str());
    let archive = HttpArchiveDownloader::new(client);

    let subtitles = SubtitleSourceSelector::new(
        &open_subtitles,
        Some(&subscenter),
        &archive,
        SubtitlePreferences {
            language: options.language.clone(),
            prefer_regional: options.prefer_regional_subtitles,
            regional_language: config.subtitles.regional_language.clone(),
            fallback_language: config.subtitles.fallback_language.clone(),
            min_similarity: config.subtitles.min_similarity,
        },
    );

    let orchestrator = AcquisitionOrchestrator::new(
        &search,
        &transfer,
        &subtitles,
        AcquisitionSettings {
            thresholds: config.search.thresholds,
            prefer_largest_size: options.prefer_largest_size,
            subtitles_only: options.subtitles_only,
            retry: config.retry.clone(),
            poll: PollSettings {
                interval: config.transfer.poll_interval,
                timeout: config.transfer.timeout,
            },
        },
        cancel,
    );

    let store = FsDirectoryStore;
    let runner = SeasonRunner::new(&orchestrator, &store);
    let report = runner.run(request, &mut progress_callback)?;

    progress_callback(ProgressEvent::Complete {
        downloaded: report.downloaded.clone(),
    });

    Ok(report)
}
