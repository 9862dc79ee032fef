/// The Pirate Bay search provider implementation.
use super::{SearchError, SearchProvider};
use crate::http::random_user_agent;
use crate::result_filter::Candidate;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Search provider for The Pirate Bay listing pages.
///
/// Results are requested ordered by seeders, all categories, first page.
pub struct PirateBayProvider {
    client: Client,
    base_url: String,
}

/// Selectors used to read one listing page
struct ListingSelectors {
    row: Selector,
    cell: Selector,
    magnet: Selector,
    reputation: Selector,
}

impl ListingSelectors {
    fn new() -> Result<Self, SearchError> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| SearchError::Parse(format!("Invalid selector {css}: {e:?}")))
        };

        Ok(Self {
            row: parse("table#searchResult tr")?,
            cell: parse("td")?,
            magnet: parse(r#"a[href^="magnet"]"#)?,
            reputation: parse(r#"[title="VIP"], [title="Trusted"]"#)?,
        })
    }
}

impl PirateBayProvider {
    /// Creates a provider that queries the site at `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/search/<query>/0/99/0`, with the query percent-encoded
    fn search_url(&self, query: &str) -> Result<Url, SearchError> {
        let invalid = || SearchError::InvalidUrl(self.base_url.clone());

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["search", query, "0", "99", "0"]);
        Ok(url)
    }

    /// Parses the rows of a listing page.
    ///
    /// The first row of the result table is its header and is skipped. A page
    /// without a result table is an empty listing. Rows whose peer counts are
    /// not numbers are dropped.
    fn parse_listing(html: &str) -> Result<Vec<Candidate>, SearchError> {
        let document = Html::parse_document(html);
        let selectors = ListingSelectors::new()?;

        let candidates = document
            .select(&selectors.row)
            .skip(1)
            .filter_map(|row| Self::parse_row(row, &selectors))
            .collect();

        Ok(candidates)
    }

    fn parse_row(row: ElementRef, selectors: &ListingSelectors) -> Option<Candidate> {
        let cells: Vec<String> = row
            .select(&selectors.cell)
            .map(|cell| {
                cell.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        let (name, seeders, leechers) = match cells.as_slice() {
            [_, name, seeders, leechers, ..] => (name, seeders, leechers),
            _ => return None,
        };

        let (Ok(seeders), Ok(leechers)) = (seeders.parse::<u32>(), leechers.parse::<u32>()) else {
            debug!(%name, "skipping row with unreadable peer counts");
            return None;
        };

        let resource_locator = row
            .select(&selectors.magnet)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(str::to_string);

        Some(Candidate {
            name: name.clone(),
            seeders,
            leechers,
            resource_locator,
            trusted: row.select(&selectors.reputation).next().is_some(),
        })
    }
}

impl SearchProvider for PirateBayProvider {
    fn search(&self, query: &str) -> Result<Vec<Candidate>, SearchError> {
        let url = self.search_url(query)?;
        debug!(%url, "fetching search listing");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .map_err(|e| SearchError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Connection(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .text()
            .map_err(|e| SearchError::Connection(e.to_string()))?;

        Self::parse_listing(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
        <table id="searchResult">
          <thead><tr><th>Type</th><th>Name</th><th>SE</th><th>LE</th></tr></thead>
          <tr>
            <td class="vertTh">TV</td>
            <td>
              <div class="detName"><a href="/torrent/1">The Office S01E02 720p HDTV x264-LOL</a></div>
              <a href="magnet:?xt=urn:btih:aaa">Magnet</a>
              <img src="vip.gif" title="VIP">
              <font class="detDesc">Uploaded 03-14 2019, Size 700 MiB, ULed by someone</font>
            </td>
            <td>120</td>
            <td>14</td>
          </tr>
          <tr>
            <td class="vertTh">TV</td>
            <td><div class="detName"><a href="/torrent/2">The.Office.S01E02.1080p.WEB</a></div></td>
            <td>33</td>
            <td>2</td>
          </tr>
          <tr>
            <td class="vertTh">TV</td>
            <td><div class="detName">Broken row</div><a href="magnet:?xt=urn:btih:ccc">Magnet</a></td>
            <td>n/a</td>
            <td>1</td>
          </tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_rows() {
        let rows = PirateBayProvider::parse_listing(LISTING).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert!(first.name.contains("The Office S01E02 720p HDTV x264-LOL"));
        assert_eq!(first.size_mib(), Some(700));
        assert_eq!(first.seeders, 120);
        assert_eq!(first.leechers, 14);
        assert_eq!(first.resource_locator.as_deref(), Some("magnet:?xt=urn:btih:aaa"));
        assert!(first.trusted);

        let second = &rows[1];
        assert_eq!(second.seeders, 33);
        assert_eq!(second.resource_locator, None);
        assert!(!second.trusted);
    }

    #[test]
    fn test_search_url_escapes_query() {
        let provider = PirateBayProvider::new(Client::new(), "https://thepiratebay.org/");

        let url = provider.search_url("the.office.s01e02").unwrap();
        assert_eq!(url.as_str(), "https://thepiratebay.org/search/the.office.s01e02/0/99/0");

        let url = provider.search_url("what?.#1.s01e02").unwrap();
        assert_eq!(
            url.as_str(),
            "https://thepiratebay.org/search/what%3F.%231.s01e02/0/99/0"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_page_without_table_is_empty() {
        let rows = PirateBayProvider::parse_listing("<html><body>No hits.</body></html>").unwrap();
        assert!(rows.is_empty());
    }
}
