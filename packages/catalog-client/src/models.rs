//! Catalog API response models

use serde::{Deserialize, Serialize};

/// Search scope understood by the catalog service
///
/// Searches start scoped to `Songs`; callers widen to `Videos` when a
/// songs-scoped query produces nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Songs,
    Videos,
}

impl SearchScope {
    /// The filter value sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Videos => "videos",
        }
    }

    /// Parse a scope from a string, e.g. the suffix of a `research_<scope>` action
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "songs" => Some(Self::Songs),
            "videos" => Some(Self::Videos),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single track returned by catalog search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Track title
    pub title: String,
    /// Credited artists
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    /// Catalog-wide external identifier
    #[serde(rename = "videoId")]
    pub video_id: String,
    /// Thumbnail variants, smallest first
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
}

/// An artist reference inside a search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

/// A thumbnail variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

/// Lyrics for a catalog track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lyrics {
    /// Full lyrics text
    pub lyrics: String,
    /// Attribution for the lyrics provider
    #[serde(default)]
    pub source: Option<String>,
}

/// Catalog API error response body
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: String,
}
