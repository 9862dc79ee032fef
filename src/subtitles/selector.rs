//! Subtitle source selection
//!
//! Sources are tried in a fixed priority and the first one that yields an
//! extracted archive wins. Subtitle failures never propagate: the caller only
//! learns whether subtitles were acquired.

use super::{SubtitleError, SubtitleSource};
use crate::ProgressEvent;
use crate::archive::ArchiveDownloader;
use crate::episode::EpisodeId;
use crate::version_matcher::select_best;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which subtitles the user wants
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitlePreferences {
    /// Target language code, e.g. `en` or `he`
    pub language: String,
    /// Try the regional source first when the target language is regional
    pub prefer_regional: bool,
    pub regional_language: String,
    /// Language tried on the general source when the target language fails
    pub fallback_language: String,
    /// Reject the best subtitle when its version similarity is below this
    pub min_similarity: Option<f64>,
}

/// Result of a subtitle lookup for one episode
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleOutcome {
    Acquired {
        source: &'static str,
        language: String,
        version: String,
        files: Vec<PathBuf>,
    },
    Unavailable,
}

/// Tries subtitle sources in priority order:
///
/// 1. the regional source, if the target language is the regional language
///    and the regional source is preferred;
/// 2. the general source in the target language;
/// 3. the general source in the fallback language, unless that is the
///    target language.
pub struct SubtitleSourceSelector<'a> {
    general: &'a dyn SubtitleSource,
    regional: Option<&'a dyn SubtitleSource>,
    archive: &'a dyn ArchiveDownloader,
    preferences: SubtitlePreferences,
}

impl<'a> SubtitleSourceSelector<'a> {
    pub fn new(
        general: &'a dyn SubtitleSource,
        regional: Option<&'a dyn SubtitleSource>,
        archive: &'a dyn ArchiveDownloader,
        preferences: SubtitlePreferences,
    ) -> Self {
        Self {
            general,
            regional,
            archive,
            preferences,
        }
    }

    /// Source and language pairs in the order they are tried
    fn attempts(&self) -> Vec<(&'a dyn SubtitleSource, &str)> {
        let prefs = &self.preferences;
        let mut attempts = Vec::with_capacity(3);

        if prefs.prefer_regional && prefs.language == prefs.regional_language {
            if let Some(regional) = self.regional {
                attempts.push((regional, prefs.language.as_str()));
            }
        }

        attempts.push((self.general, prefs.language.as_str()));

        if prefs.fallback_language != prefs.language {
            attempts.push((self.general, prefs.fallback_language.as_str()));
        }

        attempts
    }

    /// Acquires subtitles matching `downloaded_version` into `target_dir`
    pub fn acquire(
        &self,
        episode: &EpisodeId,
        downloaded_version: &str,
        target_dir: &Path,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> SubtitleOutcome {
        for (source, language) in self.attempts() {
            progress(ProgressEvent::SubtitleSourceAttempted {
                source: source.name(),
                language: language.to_string(),
            });

            match self.try_source(source, episode, downloaded_version, language, target_dir) {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {
                    debug!(source = source.name(), %language, %episode, "no matching subtitles");
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        %language,
                        %episode,
                        error = %e,
                        "subtitle source failed"
                    );
                }
            }
        }

        SubtitleOutcome::Unavailable
    }

    fn try_source(
        &self,
        source: &dyn SubtitleSource,
        episode: &EpisodeId,
        downloaded_version: &str,
        language: &str,
        target_dir: &Path,
    ) -> Result<Option<SubtitleOutcome>, SubtitleError> {
        let Some(document) = source.fetch_document(episode, language)? else {
            return Ok(None);
        };

        let candidates = source.extract_candidates(&document, episode);
        debug!(source = source.name(), count = candidates.len(), "subtitle candidates found");

        let Some(best) = select_best(
            downloaded_version,
            &candidates,
            episode,
            self.preferences.min_similarity,
        ) else {
            return Ok(None);
        };

        info!(
            source = source.name(),
            version = %best.version,
            score = best.score,
            "found subtitles"
        );

        let request = source.download_request(best.candidate);
        let files = self.archive.download(&request, target_dir)?;

        Ok(Some(SubtitleOutcome::Acquired {
            source: source.name(),
            language: language.to_string(),
            version: best.version,
            files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveError, DownloadRequest};
    use crate::subtitles::SubtitleCandidate;
    use std::cell::RefCell;

    /// Serves a fixed page per language and records every fetch
    struct StubSource {
        name: &'static str,
        pages: Vec<(&'static str, Vec<&'static str>)>,
        fetched: RefCell<Vec<String>>,
    }

    impl StubSource {
        fn new(name: &'static str, pages: Vec<(&'static str, Vec<&'static str>)>) -> Self {
            Self {
                name,
                pages,
                fetched: RefCell::new(Vec::new()),
            }
        }
    }

    impl SubtitleSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch_document(
            &self,
            _episode: &EpisodeId,
            language: &str,
        ) -> Result<Option<String>, SubtitleError> {
            self.fetched.borrow_mut().push(language.to_string());
            Ok(self
                .pages
                .iter()
                .find(|(lang, _)| *lang == language)
                .map(|(_, labels)| labels.join("\n")))
        }

        fn extract_candidates(
            &self,
            document: &str,
            _episode: &EpisodeId,
        ) -> Vec<SubtitleCandidate> {
            document
                .lines()
                .enumerate()
                .map(|(index, label)| SubtitleCandidate {
                    version_label: label.to_string(),
                    source_id: format!("{}-{index}", self.name),
                    referrer: None,
                })
                .collect()
        }

        fn download_request(&self, candidate: &SubtitleCandidate) -> DownloadRequest {
            DownloadRequest {
                url: format!("https://{}/{}", self.name, candidate.source_id),
                referrer: None,
            }
        }
    }

    struct StubArchive {
        fail_for: Option<&'static str>,
        requests: RefCell<Vec<String>>,
    }

    impl StubArchive {
        fn new(fail_for: Option<&'static str>) -> Self {
            Self {
                fail_for,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl ArchiveDownloader for StubArchive {
        fn download(
            &self,
            request: &DownloadRequest,
            target_dir: &Path,
        ) -> Result<Vec<PathBuf>, ArchiveError> {
            self.requests.borrow_mut().push(request.url.clone());
            if self.fail_for.is_some_and(|prefix| request.url.starts_with(prefix)) {
                return Err(ArchiveError::Http {
                    url: request.url.clone(),
                    status: 503,
                });
            }
            Ok(vec![target_dir.join("episode.srt")])
        }
    }

    fn preferences(language: &str, prefer_regional: bool) -> SubtitlePreferences {
        SubtitlePreferences {
            language: language.to_string(),
            prefer_regional,
            regional_language: "he".to_string(),
            fallback_language: "en".to_string(),
            min_similarity: None,
        }
    }

    fn episode() -> EpisodeId {
        EpisodeId::new("The Office", 1, 2)
    }

    fn acquire(selector: &SubtitleSourceSelector) -> (SubtitleOutcome, Vec<ProgressEvent>) {
        let mut events = Vec::new();
        let outcome = selector.acquire(
            &episode(),
            "720p.HDTV.x264-LOL",
            Path::new("/tmp/episode02"),
            &mut |event| events.push(event),
        );
        (outcome, events)
    }

    #[test]
    fn test_regional_source_first_when_preferred() {
        let general = StubSource::new("general", vec![("he", vec!["The.Office.S01E02.HDTV"])]);
        let regional = StubSource::new(
            "regional",
            vec![("he", vec!["The.Office.S01E02.720p.HDTV.x264-LOL"])],
        );
        let archive = StubArchive::new(None);
        let selector = SubtitleSourceSelector::new(
            &general,
            Some(&regional),
            &archive,
            preferences("he", true),
        );

        let (outcome, events) = acquire(&selector);

        match outcome {
            SubtitleOutcome::Acquired { source, version, .. } => {
                assert_eq!(source, "regional");
                assert_eq!(version, "720p.HDTV.x264-LOL");
            }
            SubtitleOutcome::Unavailable => panic!("expected subtitles"),
        }
        assert!(general.fetched.borrow().is_empty());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_falls_back_through_general_languages() {
        let general = StubSource::new("general", vec![("en", vec!["The.Office.S01E02.720p.HDTV"])]);
        let regional = StubSource::new("regional", vec![]);
        let archive = StubArchive::new(None);
        let selector = SubtitleSourceSelector::new(
            &general,
            Some(&regional),
            &archive,
            preferences("he", true),
        );

        let (outcome, _) = acquire(&selector);

        assert!(matches!(
            outcome,
            SubtitleOutcome::Acquired { source: "general", ref language, .. } if language == "en"
        ));
        assert_eq!(*regional.fetched.borrow(), vec!["he"]);
        assert_eq!(*general.fetched.borrow(), vec!["he", "en"]);
    }

    #[test]
    fn test_regional_skipped_without_preference() {
        let general = StubSource::new("general", vec![("he", vec!["The.Office.S01E02.720p"])]);
        let regional = StubSource::new("regional", vec![("he", vec!["The.Office.S01E02.720p"])]);
        let archive = StubArchive::new(None);
        let selector = SubtitleSourceSelector::new(
            &general,
            Some(&regional),
            &archive,
            preferences("he", false),
        );

        let (outcome, _) = acquire(&selector);

        assert!(matches!(outcome, SubtitleOutcome::Acquired { source: "general", .. }));
        assert!(regional.fetched.borrow().is_empty());
    }

    #[test]
    fn test_fallback_language_not_repeated() {
        let general = StubSource::new("general", vec![]);
        let archive = StubArchive::new(None);
        let selector =
            SubtitleSourceSelector::new(&general, None, &archive, preferences("en", true));

        let (outcome, events) = acquire(&selector);

        assert_eq!(outcome, SubtitleOutcome::Unavailable);
        assert_eq!(*general.fetched.borrow(), vec!["en"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_download_failure_moves_to_next_attempt() {
        let general = StubSource::new(
            "general",
            vec![
                ("he", vec!["The.Office.S01E02.720p.HDTV.x264-LOL"]),
                (
                    "en",
                    vec![
                        "The.Office.S01E02.HDTV.XviD-FQM",
                        "The.Office.S01E02.720p.HDTV.x264-LOL",
                    ],
                ),
            ],
        );
        let archive = StubArchive::new(Some("https://general/general-0"));
        let selector =
            SubtitleSourceSelector::new(&general, None, &archive, preferences("he", false));

        let (outcome, _) = acquire(&selector);

        assert!(matches!(
            outcome,
            SubtitleOutcome::Acquired { ref language, .. } if language == "en"
        ));
        assert_eq!(
            *archive.requests.borrow(),
            vec!["https://general/general-0", "https://general/general-1"]
        );
    }
}
