//! Torrent search listings
//!
//! A search provider turns an episode token into the raw rows of a listing.
//! Choosing among those rows is left to [`crate::result_filter`].
mod pirate_bay;

pub use pirate_bay::PirateBayProvider;

use crate::result_filter::Candidate;
use thiserror::Error;

/// Errors that can occur while fetching a search listing
#[derive(Debug, Error)]
pub enum SearchError {
    /// The listing site could not be reached
    #[error("Search site unreachable: {0}")]
    Connection(String),

    /// The site answered but the listing could not be read
    #[error("Failed to parse search listing: {0}")]
    Parse(String),

    /// The configured site address cannot carry a search path
    #[error("Invalid search site URL {0}")]
    InvalidUrl(String),
}

/// Trait for sites that list downloadable releases of an episode
pub trait SearchProvider {
    /// Fetches every row listed for `query`, in the site's order.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Connection`] when the site cannot be reached,
    /// which callers treat as a transient failure worth retrying.
    fn search(&self, query: &str) -> Result<Vec<Candidate>, SearchError>;
}
