//! Episode identification
//!
//! Every search query, subtitle lookup and file-name comparison is keyed by a
//! canonical episode token of the form `series.name.s01e02`.

use std::fmt;

/// Identifies a single episode of a series.
///
/// The series name is stored lower-cased, so every token derived from it is
/// already in the form used for case-insensitive substring matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodeId {
    series: String,
    season: u32,
    episode: u32,
}

impl EpisodeId {
    /// Creates an identifier, normalizing whitespace and case of the series name
    pub fn new(series: &str, season: u32, episode: u32) -> Self {
        let series = series
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        Self {
            series,
            season,
            episode,
        }
    }

    /// Lower-cased series name with single spaces between words
    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn season(&self) -> u32 {
        self.season
    }

    pub fn episode(&self) -> u32 {
        self.episode
    }

    /// Zero-padded season/episode part of the token, e.g. `s01e02`
    pub fn detail(&self) -> String {
        format!("s{:02}e{:02}", self.season, self.episode)
    }

    /// Series name with words joined by dots, e.g. `the.office`
    pub fn dotted_series(&self) -> String {
        self.series.replace(' ', ".")
    }

    /// Series name with words joined by dashes, as used in site URLs
    pub fn dashed_series(&self) -> String {
        self.series.replace(' ', "-")
    }

    /// Canonical lower-cased token, e.g. `the.office.s01e02`
    pub fn token(&self) -> String {
        format!("{}.{}", self.dotted_series(), self.detail())
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}
