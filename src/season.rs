//! Season runs
//!
//! Episodes are acquired one after another into
//! `<download dir>/<Series-Name>/seasonNN/episodeNN`. The first episode the
//! index has nothing usable for ends the season. Afterwards every episode
//! directory created by the run is tidied up.

use crate::episode::EpisodeId;
use crate::orchestrator::{AcquisitionError, EpisodeAcquirer};
use crate::{AcquisitionStatus, ProgressEvent};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Highest episode number tried when running a whole season
pub const LAST_EPISODE: u32 = 20;

/// Metadata files stripped from episode directories after a run
const STRAY_EXTENSION: &str = "nfo";

/// Errors that can occur while managing the download directory tree
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Failed to create a directory
    #[error("Failed to create directory {path}: {source}")]
    CreateFailed { path: PathBuf, source: io::Error },

    /// Failed to read a directory
    #[error("Failed to read directory {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to remove a file or directory
    #[error("Failed to remove {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },
}

/// Errors that abort a season run
#[derive(Debug, Error)]
pub enum SeasonError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

/// Trait for the directory tree episodes are downloaded into
pub trait DirectoryStore {
    /// Creates `path` and its parents if absent, returning whether it was created
    fn ensure_directory(&self, path: &Path) -> Result<bool, DirectoryError>;

    fn list_entries(&self, path: &Path) -> Result<Vec<PathBuf>, DirectoryError>;

    /// Removes `path` if it has no entries, returning whether it was removed
    fn remove_if_empty(&self, path: &Path) -> Result<bool, DirectoryError>;

    /// Removes files directly in `path` with the given extension, returning how many
    fn remove_matching(&self, path: &Path, extension: &str) -> Result<usize, DirectoryError>;
}

/// Directory store backed by the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirectoryStore;

impl DirectoryStore for FsDirectoryStore {
    fn ensure_directory(&self, path: &Path) -> Result<bool, DirectoryError> {
        if path.is_dir() {
            return Ok(false);
        }

        fs::create_dir_all(path).map_err(|e| DirectoryError::CreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(true)
    }

    fn list_entries(&self, path: &Path) -> Result<Vec<PathBuf>, DirectoryError> {
        let read_failed = |e| DirectoryError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let mut entries = fs::read_dir(path)
            .map_err(read_failed)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_failed)?;
        entries.sort();
        Ok(entries)
    }

    fn remove_if_empty(&self, path: &Path) -> Result<bool, DirectoryError> {
        if !self.list_entries(path)?.is_empty() {
            return Ok(false);
        }

        fs::remove_dir(path).map_err(|e| DirectoryError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(true)
    }

    fn remove_matching(&self, path: &Path, extension: &str) -> Result<usize, DirectoryError> {
        let mut removed = 0;

        for entry in self.list_entries(path)? {
            let matches = entry
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));

            if matches && entry.is_file() {
                fs::remove_file(&entry).map_err(|e| DirectoryError::RemoveFailed {
                    path: entry.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Which episodes of the season to acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeSelection {
    Single(u32),
    /// From this episode up to [`LAST_EPISODE`]
    FromStart(u32),
}

impl EpisodeSelection {
    /// Episode numbers in the order they are attempted
    pub fn numbers(&self) -> Vec<u32> {
        match *self {
            EpisodeSelection::Single(episode) => vec![episode],
            EpisodeSelection::FromStart(start) => (start.max(1)..=LAST_EPISODE).collect(),
        }
    }
}

/// A request to acquire (part of) one season
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRequest {
    pub series: String,
    pub season: u32,
    pub episodes: EpisodeSelection,
    pub download_dir: PathBuf,
}

impl SeasonRequest {
    /// `<download dir>/<Series-Name>/seasonNN`
    pub fn season_dir(&self) -> PathBuf {
        let series_dir = self.series.split_whitespace().collect::<Vec<_>>().join("-");
        self.download_dir
            .join(series_dir)
            .join(format!("season{:02}", self.season))
    }
}

/// Mutable bookkeeping for one season run
#[derive(Debug, Default)]
struct SeasonRunState {
    downloaded_episodes: Vec<u32>,
    failed_episodes: Vec<u32>,
    created_directories: BTreeSet<PathBuf>,
}

/// Summary of a finished season run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonReport {
    /// Episodes that reached [`AcquisitionStatus::Success`], in order
    pub downloaded: Vec<u32>,
    /// Episodes that ended in `GenericError` or `NoConnection`
    pub failed: Vec<u32>,
    /// The episode that ended the season early, and why
    pub stopped_at: Option<(u32, AcquisitionStatus)>,
    /// Directories cleanup could not tidy; their contents were left in place
    pub cleanup_failures: Vec<PathBuf>,
}

/// Runs a season request episode by episode
pub struct SeasonRunner<'a> {
    acquirer: &'a dyn EpisodeAcquirer,
    store: &'a dyn DirectoryStore,
}

impl<'a> SeasonRunner<'a> {
    pub fn new(acquirer: &'a dyn EpisodeAcquirer, store: &'a dyn DirectoryStore) -> Self {
        Self { acquirer, store }
    }

    /// Acquires the requested episodes, then cleans up their directories.
    ///
    /// Cleanup runs even when the run is aborted by cancellation.
    pub fn run(
        &self,
        request: &SeasonRequest,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<SeasonReport, SeasonError> {
        progress(ProgressEvent::SeasonStarted {
            series: request.series.clone(),
            season: request.season,
        });

        let mut state = SeasonRunState::default();
        let outcome = self.run_episodes(request, &mut state, progress);
        let cleanup_failures = self.cleanup(&state.created_directories, progress);

        let stopped_at = outcome?;

        info!(
            series = %request.series,
            season = request.season,
            downloaded = ?state.downloaded_episodes,
            "season finished"
        );

        Ok(SeasonReport {
            downloaded: state.downloaded_episodes,
            failed: state.failed_episodes,
            stopped_at,
            cleanup_failures,
        })
    }

    fn run_episodes(
        &self,
        request: &SeasonRequest,
        state: &mut SeasonRunState,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<Option<(u32, AcquisitionStatus)>, SeasonError> {
        let season_dir = request.season_dir();
        self.store.ensure_directory(&season_dir)?;

        for number in request.episodes.numbers() {
            let episode = EpisodeId::new(&request.series, request.season, number);
            let directory = season_dir.join(format!("episode{number:02}"));

            if self.store.ensure_directory(&directory)? {
                debug!(path = %directory.display(), "created episode directory");
            }
            state.created_directories.insert(directory.clone());

            progress(ProgressEvent::EpisodeStarted {
                episode: episode.clone(),
                directory: directory.clone(),
            });

            let outcome = self.acquirer.acquire(&episode, &directory, progress)?;
            info!(%episode, status = ?outcome.status, "episode finished");
            progress(ProgressEvent::EpisodeFinished {
                episode: episode.clone(),
                status: outcome.status,
                version: outcome.version.clone(),
            });

            match outcome.status {
                AcquisitionStatus::Success => state.downloaded_episodes.push(number),
                AcquisitionStatus::GenericError | AcquisitionStatus::NoConnection => {
                    state.failed_episodes.push(number);
                }
                AcquisitionStatus::NoResults | AcquisitionStatus::NoGoodResults => {
                    info!(%episode, status = ?outcome.status, "no more episodes this season");
                    progress(ProgressEvent::SeasonStopped {
                        episode: number,
                        status: outcome.status,
                    });
                    return Ok(Some((number, outcome.status)));
                }
            }
        }

        Ok(None)
    }

    /// Removes empty episode directories and strips `.nfo` files from the rest.
    ///
    /// Failures are logged and do not stop the pass. Returns the directories
    /// that could not be tidied.
    fn cleanup(
        &self,
        directories: &BTreeSet<PathBuf>,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Vec<PathBuf> {
        let mut removed_directories = 0;
        let mut removed_files = 0;
        let mut failures = Vec::new();

        for directory in directories {
            let result = self.store.remove_if_empty(directory).and_then(|removed| {
                if removed {
                    removed_directories += 1;
                    Ok(())
                } else {
                    removed_files += self.store.remove_matching(directory, STRAY_EXTENSION)?;
                    Ok(())
                }
            });

            if let Err(e) = result {
                warn!(path = %directory.display(), error = %e, "cleanup failed");
                failures.push(directory.clone());
            }
        }

        info!(removed_directories, removed_files, "cleanup finished");
        progress(ProgressEvent::CleanupFinished {
            removed_directories,
            removed_files,
        });

        failures
    }
}
