//! Media file lookup for episode directories
//!
//! When only subtitles are requested, the release version comes from a video
//! file that is already present in the episode directory. Files are detected
//! by their content, not their extension.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while scanning an episode directory
#[derive(Debug, Error)]
pub enum MediaFileError {
    /// Path is not a directory
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Failed to read directory
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed { path: PathBuf, source: io::Error },

    /// Failed to read directory entry
    #[error("Failed to read directory entry: {0}")]
    ReadEntryFailed(#[from] io::Error),
}

/// Finds the first video file below `dir_path`, searching subdirectories too.
///
/// Entries are visited in name order so the result is stable.
pub(crate) fn find_video_file(dir_path: &Path) -> Result<Option<PathBuf>, MediaFileError> {
    if !dir_path.is_dir() {
        return Err(MediaFileError::NotADirectory(dir_path.to_path_buf()));
    }

    let mut entries = fs::read_dir(dir_path)
        .map_err(|e| MediaFileError::ReadDirectoryFailed {
            path: dir_path.to_path_buf(),
            source: e,
        })?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if let Some(found) = find_video_file(&path)? {
                return Ok(Some(found));
            }
        } else if path.is_file() && is_video_file(&path) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Sniffs the file header; unreadable files are not videos
fn is_video_file(file_path: &Path) -> bool {
    const HEADER_SIZE: u64 = 8192;

    let mut header = Vec::new();
    let read = File::open(file_path)
        .and_then(|file| file.take(HEADER_SIZE).read_to_end(&mut header));

    read.is_ok() && infer::is_video(&header)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest header `infer` recognizes as an MP4 video
    pub(crate) const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2mp41";

    #[test]
    fn test_finds_video_by_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.nfo"), "release notes").unwrap();
        fs::write(dir.path().join("not-really.mkv"), "plain text").unwrap();
        fs::create_dir(dir.path().join("release")).unwrap();
        let video = dir.path().join("release/The.Office.S01E02.720p.HDTV.mp4");
        fs::write(&video, MP4_HEADER).unwrap();

        assert_eq!(find_video_file(dir.path()).unwrap(), Some(video));
    }

    #[test]
    fn test_empty_directory_has_no_video() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_video_file(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_scan_file_instead_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        File::create(&file).unwrap();

        assert!(matches!(
            find_video_file(&file),
            Err(MediaFileError::NotADirectory(_))
        ));
    }
}
