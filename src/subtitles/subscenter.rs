//! Subscenter subtitle source (Hebrew subtitles)

use super::{SubtitleCandidate, SubtitleError, SubtitleSource, fetch_page};
use crate::archive::DownloadRequest;
use crate::episode::EpisodeId;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Query string of the download button, e.g. `?id=123&v=...'`
static DOWNLOAD_QUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?(.*?)'").expect("download query pattern is valid"));

/// Subtitle source for subscenter.org.
///
/// The site only serves Hebrew subtitles, so the requested language is
/// ignored. Each version label is paired with the download button at the
/// same position on the page.
pub struct SubscenterSource {
    client: Client,
    base_url: String,
}

impl SubscenterSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn episode_url(&self, episode: &EpisodeId) -> String {
        format!(
            "{}/he/subtitle/series/{}/{:02}/{:02}/",
            self.base_url,
            episode.dashed_series(),
            episode.season(),
            episode.episode()
        )
    }
}

impl SubtitleSource for SubscenterSource {
    fn name(&self) -> &'static str {
        "subscenter"
    }

    fn fetch_document(
        &self,
        episode: &EpisodeId,
        _language: &str,
    ) -> Result<Option<String>, SubtitleError> {
        let url = self.episode_url(episode);
        debug!(%url, "fetching subscenter page");
        fetch_page(&self.client, &url)
    }

    fn extract_candidates(&self, document: &str, _episode: &EpisodeId) -> Vec<SubtitleCandidate> {
        let document = Html::parse_document(document);
        let (Ok(buttons), Ok(versions), Ok(link)) = (
            Selector::parse("div.subsDownloadBtn"),
            Selector::parse("div.subsDownloadVersion"),
            Selector::parse("a[onclick]"),
        ) else {
            return Vec::new();
        };

        document
            .select(&buttons)
            .zip(document.select(&versions))
            .filter_map(|(button, version)| {
                let onclick = button.select(&link).next()?.value().attr("onclick")?;
                let Some(query) = DOWNLOAD_QUERY_REGEX.captures(onclick).and_then(|c| c.get(1))
                else {
                    warn!(%onclick, "download button without query");
                    return None;
                };

                Some(SubtitleCandidate {
                    version_label: version.text().collect::<String>().trim().to_string(),
                    source_id: query.as_str().to_string(),
                    referrer: None,
                })
            })
            .collect()
    }

    fn download_request(&self, candidate: &SubtitleCandidate) -> DownloadRequest {
        DownloadRequest {
            url: format!(
                "{}/he/get/download/he/?{}",
                self.base_url, candidate.source_id
            ),
            referrer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="subsDownloadBtn"><a onclick="downloadSubtitle('/he/get/?id=11&key=abc');">הורדה</a></div>
        <div class="subsDownloadVersion">The.Office.S01E02.720p.HDTV.X264-DIMENSION</div>
        <div class="subsDownloadBtn"><a onclick="downloadSubtitle('/he/get/?id=12&key=def');">הורדה</a></div>
        <div class="subsDownloadVersion">The.Office.S01E02.HDTV.x264-LOL</div>
    "#;

    fn source() -> SubscenterSource {
        SubscenterSource::new(Client::new(), "http://www.subscenter.org")
    }

    #[test]
    fn test_episode_url() {
        let url = source().episode_url(&EpisodeId::new("The Office", 1, 2));
        assert_eq!(url, "http://www.subscenter.org/he/subtitle/series/the-office/01/02/");
    }

    #[test]
    fn test_extract_pairs_buttons_with_versions() {
        let episode = EpisodeId::new("The Office", 1, 2);
        let candidates = source().extract_candidates(PAGE, &episode);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_id, "id=11&key=abc");
        assert_eq!(candidates[0].version_label, "The.Office.S01E02.720p.HDTV.X264-DIMENSION");
        assert_eq!(candidates[1].source_id, "id=12&key=def");

        let request = source().download_request(&candidates[1]);
        assert_eq!(request.url, "http://www.subscenter.org/he/get/download/he/?id=12&key=def");
        assert_eq!(request.referrer, None);
    }
}
