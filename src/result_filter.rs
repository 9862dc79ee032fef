//! Download candidate selection
//!
//! Search listings are unmoderated: many rows are fakes, wrong episodes or
//! dead torrents. This module decides which row, if any, is worth fetching.

use crate::AcquisitionStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Size as written in listing descriptions, e.g. `Size 700 MiB`
static SIZE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)size (\d+).*mib").expect("size pattern is valid"));

/// One row of a search listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Title plus description text of the row
    pub name: String,
    pub seeders: u32,
    pub leechers: u32,
    /// Magnet link, absent when the row carries none
    pub resource_locator: Option<String>,
    /// Uploader carries a VIP/Trusted reputation marker
    pub trusted: bool,
}

impl Candidate {
    /// Size in MiB parsed from the row description
    pub fn size_mib(&self) -> Option<u64> {
        SIZE_REGEX
            .captures(&self.name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn mentions(&self, token: &str) -> bool {
        let name = self.name.to_lowercase();
        let token = token.to_lowercase();
        name.contains(&token) || name.contains(&token.replace('.', " "))
    }

    fn is_eligible(&self, token: &str, thresholds: &SelectionThresholds) -> bool {
        if self.resource_locator.is_none() || !self.mentions(token) {
            return false;
        }

        let popular =
            self.seeders > thresholds.min_seeders && self.leechers > thresholds.min_leechers;
        let vouched_for = self.trusted && self.seeders > thresholds.trusted_min_seeders;

        popular || vouched_for
    }
}

/// Peer-count thresholds a row must exceed to be considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionThresholds {
    pub min_seeders: u32,
    pub min_leechers: u32,
    /// Applies to trusted uploaders, who need no leechers at all
    pub trusted_min_seeders: u32,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        let min_seeders = 50;
        Self {
            min_seeders,
            min_leechers: 5,
            trusted_min_seeders: min_seeders / 5,
        }
    }
}

/// Outcome of a selection over one listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// The best eligible row
    Chosen(&'a Candidate),
    /// The listing was empty
    NoResults,
    /// Rows were listed but none was eligible
    NoGoodResults,
}

impl Selection<'_> {
    pub fn status(&self) -> AcquisitionStatus {
        match self {
            Selection::Chosen(_) => AcquisitionStatus::Success,
            Selection::NoResults => AcquisitionStatus::NoResults,
            Selection::NoGoodResults => AcquisitionStatus::NoGoodResults,
        }
    }

    pub fn resource_locator(&self) -> Option<&str> {
        match self {
            Selection::Chosen(candidate) => candidate.resource_locator.as_deref(),
            Selection::NoResults | Selection::NoGoodResults => None,
        }
    }
}

/// Picks the best download candidate for an episode token.
///
/// A row is eligible when it has a resource locator, mentions the token (or
/// the token with dots replaced by spaces) and either exceeds both the seeder
/// and leecher thresholds or is trusted and exceeds the trusted seeder
/// threshold.
///
/// With `prefer_largest_size` the eligible row with the largest parsed size
/// wins; rows without a parseable size only compete when no eligible row has
/// one. Otherwise the row with the most seeders wins. Exact ties keep the
/// earliest row.
pub fn select<'a>(
    rows: &'a [Candidate],
    episode_token: &str,
    prefer_largest_size: bool,
    thresholds: &SelectionThresholds,
) -> Selection<'a> {
    if rows.is_empty() {
        return Selection::NoResults;
    }

    let eligible: Vec<&Candidate> = rows
        .iter()
        .filter(|row| row.is_eligible(episode_token, thresholds))
        .collect();

    let by_size = if prefer_largest_size {
        first_max_by_key(
            eligible.iter().filter_map(|row| row.size_mib().map(|size| (*row, size))),
        )
    } else {
        None
    };

    let best = by_size.or_else(|| first_max_by_key(eligible.iter().map(|row| (*row, row.seeders))));

    match best {
        Some(row) => Selection::Chosen(row),
        None => Selection::NoGoodResults,
    }
}

/// Returns the first item carrying the maximum key
fn first_max_by_key<'a, K: Ord>(
    items: impl Iterator<Item = (&'a Candidate, K)>,
) -> Option<&'a Candidate> {
    let mut best: Option<(&Candidate, K)> = None;
    for (row, key) in items {
        let replace = match &best {
            Some((_, best_key)) => key > *best_key,
            None => true,
        };
        if replace {
            best = Some((row, key));
        }
    }
    best.map(|(row, _)| row)
}
