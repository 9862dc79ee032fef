//! Release version matching
//!
//! A downloaded file name and a subtitle page label describe the same release
//! in different formats. Both end with a release version (`720p.hdtv.x264-lol`)
//! after the episode token; this module extracts that suffix and finds the
//! subtitle whose version is closest to the one that was downloaded.

use crate::episode::EpisodeId;
use regex::Regex;
use tracing::{debug, warn};

/// A subtitle offered by a subtitle source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCandidate {
    /// Release label shown next to the subtitle
    pub version_label: String,
    /// Opaque identifier the source needs to build a download link
    pub source_id: String,
    /// Page the download must appear to come from, if the source checks it
    pub referrer: Option<String>,
}

/// The subtitle chosen for a downloaded release
#[derive(Debug, Clone, PartialEq)]
pub struct VersionMatch<'a> {
    pub candidate: &'a SubtitleCandidate,
    /// Version extracted from the candidate's label
    pub version: String,
    /// Similarity to the downloaded version, in `[0, 1]`
    pub score: f64,
}

/// Builds the version pattern for an episode.
///
/// Series words are joined by a single-character wildcard so that dotted,
/// spaced and dashed spellings all match.
fn version_regex(episode: &EpisodeId) -> Option<Regex> {
    let series = episode
        .series()
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".");
    let pattern = format!(
        r"(?i){series}.*{detail}\.(.+?)(?:\.mkv)?(?:download at|$)",
        detail = regex::escape(&episode.detail()),
    );

    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(%episode, error = %e, "could not build version pattern");
            None
        }
    }
}

/// Extracts the release version that follows the episode token.
///
/// The version ends at an optional `.mkv` suffix, at a literal `download at`
/// marker, or at the end of the text. Returns `None` when the text does not
/// mention the episode or the version would be empty.
pub fn extract_version(text: &str, episode: &EpisodeId) -> Option<String> {
    capture_version(&version_regex(episode)?, text)
}

fn capture_version(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|version| !version.is_empty())
}

/// Normalized similarity of two strings, ignoring case.
///
/// Computed as `2 * lcs / (len(a) + len(b))`, which equals one minus the
/// insert/delete edit distance over the combined length. Two empty strings
/// are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    (2 * longest_common_subsequence(&a, &b)) as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Chooses the subtitle whose version is most similar to `downloaded_version`.
///
/// Candidates whose label yields no version are ignored. The maximum score
/// wins and an exact tie keeps the earliest candidate. With `min_similarity`
/// set, a best score below it selects nothing.
pub fn select_best<'a>(
    downloaded_version: &str,
    candidates: &'a [SubtitleCandidate],
    episode: &EpisodeId,
    min_similarity: Option<f64>,
) -> Option<VersionMatch<'a>> {
    let regex = version_regex(episode)?;
    let mut best: Option<VersionMatch<'a>> = None;

    for candidate in candidates {
        let Some(version) = capture_version(&regex, &candidate.version_label) else {
            continue;
        };

        let score = similarity(&version, downloaded_version);
        debug!(%version, score, "scored subtitle version");

        if best.as_ref().is_none_or(|current| score > current.score) {
            best = Some(VersionMatch {
                candidate,
                version,
                score,
            });
        }
    }

    match (best, min_similarity) {
        (Some(found), Some(min)) if found.score < min => {
            debug!(
                version = %found.version,
                score = found.score,
                min,
                "best subtitle below threshold"
            );
            None
        }
        (best, _) => best,
    }
}
