//! OpenSubtitles subtitle source
//!
//! Search result cells carry the release label as text and an `onclick`
//! handler that holds both the subtitle id and the page the download has to
//! be referred from.

use super::{SubtitleCandidate, SubtitleError, SubtitleSource, fetch_page};
use crate::archive::DownloadRequest;
use crate::episode::EpisodeId;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

static DOWNLOAD_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"subtitles/(\d+)/").expect("download id pattern is valid"));

static REFERRER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(.+)'").expect("referrer pattern is valid"));

/// Maps two-letter language codes to the three-letter codes the site uses
fn canonical_language(language: &str) -> &str {
    match language {
        "en" => "eng",
        "he" => "heb",
        other => other,
    }
}

/// Subtitle source for opensubtitles.org
pub struct OpenSubtitlesSource {
    client: Client,
    base_url: String,
    download_base_url: String,
}

impl OpenSubtitlesSource {
    /// Creates a source for the site at `base_url`, downloading from `download_base_url`
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        download_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            download_base_url: download_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, episode: &EpisodeId, language: &str) -> String {
        format!(
            "{}/en/search/sublanguageid-all/searchonlytvseries-on/season-{:02}/episode-{:02}/\
             fulltextuseor-on/moviename-{}/sublanguageid-{}",
            self.base_url,
            episode.season(),
            episode.episode(),
            episode.dashed_series(),
            canonical_language(language),
        )
    }
}

impl SubtitleSource for OpenSubtitlesSource {
    fn name(&self) -> &'static str {
        "opensubtitles"
    }

    fn fetch_document(
        &self,
        episode: &EpisodeId,
        language: &str,
    ) -> Result<Option<String>, SubtitleError> {
        let url = self.search_url(episode, language);
        debug!(%url, "fetching opensubtitles page");
        fetch_page(&self.client, &url)
    }

    fn extract_candidates(&self, document: &str, episode: &EpisodeId) -> Vec<SubtitleCandidate> {
        let document = Html::parse_document(document);
        let (Ok(cells), Ok(link)) = (
            Selector::parse("td.sb_star_odd, td.sb_star_even"),
            Selector::parse("a[onclick]"),
        ) else {
            return Vec::new();
        };

        let quoted_series = format!("\"{}\"", episode.series());
        let detail = episode.detail();
        let mut candidates = Vec::new();

        for cell in document.select(&cells) {
            let label = cell.text().collect::<String>().trim().to_string();
            let lowered = label.to_lowercase();
            if !lowered.contains(&quoted_series) || !lowered.contains(&detail) {
                continue;
            }

            let Some(onclick) = cell.select(&link).next().and_then(|a| a.value().attr("onclick"))
            else {
                continue;
            };

            let Some(source_id) = DOWNLOAD_ID_REGEX
                .captures(onclick)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
            else {
                warn!(%onclick, "subtitle link without download id");
                continue;
            };

            let referrer = REFERRER_REGEX
                .captures(onclick)
                .and_then(|caps| caps.get(1))
                .map(|path| format!("{}{}", self.base_url, path.as_str()));

            candidates.push(SubtitleCandidate {
                version_label: label,
                source_id,
                referrer,
            });
        }

        candidates
    }

    fn download_request(&self, candidate: &SubtitleCandidate) -> DownloadRequest {
        DownloadRequest {
            url: format!(
                "{}/en/download/sub/{}",
                self.download_base_url, candidate.source_id
            ),
            referrer: candidate.referrer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <table id="search_results">
          <tr>
            <td class="sb_star_odd">
              <a onclick="reLink('/en/subtitles/7001234/the-office-diversity-day-en');" href="#">"The Office" Diversity Day</a>
              The.Office.US.S01E02.720p.HDTV.x264-CTU
            </td>
          </tr>
          <tr>
            <td class="sb_star_even">
              <a onclick="reLink('/en/subtitles/7005678/the-office-diversity-day-en');" href="#">"The Office" Diversity Day</a>
              The.Office.US.S01E02.HDTV.XviD-LOL
            </td>
          </tr>
          <tr>
            <td class="sb_star_odd">
              <a onclick="reLink('/en/subtitles/7009999/parks');" href="#">"Parks and Recreation" Pilot</a>
              Parks.and.Recreation.S01E02.HDTV
            </td>
          </tr>
          <tr>
            <td class="sb_star_even">
              <a onclick="noop();" href="#">"The Office" Diversity Day</a>
              The.Office.S01E02.WEB
            </td>
          </tr>
        </table>
    "##;

    fn source() -> OpenSubtitlesSource {
        OpenSubtitlesSource::new(
            Client::new(),
            "https://www.opensubtitles.org/",
            "https://dl.opensubtitles.org",
        )
    }

    #[test]
    fn test_search_url_uses_three_letter_language() {
        let url = source().search_url(&EpisodeId::new("The Office", 1, 2), "he");
        assert_eq!(
            url,
            "https://www.opensubtitles.org/en/search/sublanguageid-all/searchonlytvseries-on/\
             season-01/episode-02/fulltextuseor-on/moviename-the-office/sublanguageid-heb"
        );
    }

    #[test]
    fn test_extract_candidates_filters_by_series_and_episode() {
        let episode = EpisodeId::new("The Office", 1, 2);
        let candidates = source().extract_candidates(PAGE, &episode);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_id, "7001234");
        assert_eq!(
            candidates[0].referrer.as_deref(),
            Some("https://www.opensubtitles.org/en/subtitles/7001234/the-office-diversity-day-en")
        );
        assert!(candidates[0].version_label.ends_with("The.Office.US.S01E02.720p.HDTV.x264-CTU"));
        assert_eq!(candidates[1].source_id, "7005678");
    }

    #[test]
    fn test_download_request_carries_referrer() {
        let candidate = SubtitleCandidate {
            version_label: String::new(),
            source_id: "7001234".to_string(),
            referrer: Some("https://www.opensubtitles.org/en/subtitles/7001234/x".to_string()),
        };
        let request = source().download_request(&candidate);
        assert_eq!(request.url, "https://dl.opensubtitles.org/en/download/sub/7001234");
        assert_eq!(request.referrer, candidate.referrer);
    }
}
