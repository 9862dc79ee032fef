//! Subtitle archive download
//!
//! Subtitle sites serve zip archives. This module fetches one and unpacks it
//! into an episode directory.

use crate::http::random_user_agent;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while downloading or unpacking an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The download request could not be sent
    #[error("Failed to request {url}: {source}")]
    Request { url: String, source: reqwest::Error },

    /// The server refused the download
    #[error("HTTP {status} while downloading {url}")]
    Http { url: String, status: u16 },

    /// The payload is not a readable zip archive
    #[error("Invalid archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    /// An archive entry could not be written
    #[error("Failed to write {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// Where to fetch an archive from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Sent as `Referer`, together with an `authority` header for the host
    pub referrer: Option<String>,
}

/// Trait for fetching a compressed payload and unpacking it into a directory
pub trait ArchiveDownloader {
    /// Downloads `request` and extracts it into `target_dir`.
    ///
    /// Returns the paths of the extracted files.
    fn download(
        &self,
        request: &DownloadRequest,
        target_dir: &Path,
    ) -> Result<Vec<PathBuf>, ArchiveError>;
}

/// Archive downloader over plain HTTP
pub struct HttpArchiveDownloader {
    client: Client,
}

impl HttpArchiveDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn headers(request: &DownloadRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));

        if let Some(referrer) = &request.referrer {
            if let Ok(value) = HeaderValue::from_str(referrer) {
                headers.insert(REFERER, value);
            }
            let host = reqwest::Url::parse(&request.url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string));
            if let Some(value) = host.and_then(|host| HeaderValue::from_str(&host).ok()) {
                headers.insert(HeaderName::from_static("authority"), value);
            }
        }

        headers
    }
}

impl ArchiveDownloader for HttpArchiveDownloader {
    fn download(
        &self,
        request: &DownloadRequest,
        target_dir: &Path,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        debug!(url = %request.url, "downloading subtitle archive");

        let response = self
            .client
            .get(&request.url)
            .headers(Self::headers(request))
            .send()
            .map_err(|e| ArchiveError::Request {
                url: request.url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(ArchiveError::Http {
                url: request.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let payload = response.bytes().map_err(|e| ArchiveError::Request {
            url: request.url.clone(),
            source: e,
        })?;

        let extracted = extract_zip(&payload, target_dir)?;
        info!(dir = %target_dir.display(), files = extracted.len(), "subtitles extracted");
        Ok(extracted)
    }
}

/// Unpacks an in-memory zip archive into `target_dir`.
///
/// Entries whose names would escape the target directory are skipped.
pub(crate) fn extract_zip(payload: &[u8], target_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(payload))?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path).map_err(|e| ArchiveError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = File::create(&path).map_err(|e| ArchiveError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
        io::copy(&mut entry, &mut file).map_err(|e| ArchiveError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;

        extracted.push(path);
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_zip_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let payload = zip_with(&[
            ("The.Office.S01E02.720p.HDTV.srt", "1\n00:00:01,000 --> 00:00:02,000\nHi\n"),
            ("extras/readme.txt", "thanks"),
        ]);

        let extracted = extract_zip(&payload, dir.path()).unwrap();
        assert_eq!(extracted.len(), 2);
        assert!(dir.path().join("The.Office.S01E02.720p.HDTV.srt").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("extras/readme.txt")).unwrap(),
            "thanks"
        );
    }

    #[test]
    fn test_extract_rejects_non_zip_payload() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_zip(b"<html>blocked</html>", dir.path());
        assert!(matches!(result, Err(ArchiveError::InvalidArchive(_))));
    }

    #[test]
    fn test_referrer_adds_authority_header() {
        let request = DownloadRequest {
            url: "https://dl.opensubtitles.org/en/download/sub/123".to_string(),
            referrer: Some("https://www.opensubtitles.org/en/subtitles/123/x".to_string()),
        };
        let headers = HttpArchiveDownloader::headers(&request);
        assert_eq!(headers["authority"], "dl.opensubtitles.org");
        assert_eq!(headers[REFERER], "https://www.opensubtitles.org/en/subtitles/123/x");

        let plain = DownloadRequest {
            url: "http://www.subscenter.org/he/get/download/he/?id=1".to_string(),
            referrer: None,
        };
        let headers = HttpArchiveDownloader::headers(&plain);
        assert!(headers.get(REFERER).is_none());
        assert!(headers.get("authority").is_none());
    }
}
