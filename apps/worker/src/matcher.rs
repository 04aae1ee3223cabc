//! Fuzzy catalog matching for library migration
//!
//! Scores catalog search results against a local track's title and artist,
//! filters out candidates that share no artist token with the target, and
//! classifies the survivors into auto-apply / ambiguous / no-match.
//!
//! Title similarity is pinned to `strsim::normalized_levenshtein` over
//! case-folded titles; changing the primitive shifts every score and breaks
//! golden outputs, so it is deliberately the only one used.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tunedock_catalog_client::{CatalogClient, CatalogResult, SearchResult, SearchScope};

/// Default score threshold a candidate must clear
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Maximum number of candidates serialized into a choice event
pub const MAX_CANDIDATES: usize = 10;

/// A scored catalog candidate for one local file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Adjusted score in [0, 1], rounded to 3 decimals
    pub score: f64,
    /// Candidate title as returned by the catalog
    pub title: String,
    /// Candidate artist names
    pub artists: Vec<String>,
    /// Catalog external id
    pub external_id: String,
    /// First thumbnail URL, if any
    pub thumbnail_url: Option<String>,
}

/// How a set of surviving candidates should be handled
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// No candidate cleared the threshold
    NoMatch,
    /// Exactly one survivor; safe to auto-apply
    Single(MatchCandidate),
    /// More than one survivor; resolution depends on the fallback policy
    Ambiguous(Vec<MatchCandidate>),
}

/// What to do when a match is ambiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Ask a human through the choice broker
    #[default]
    Manual,
    /// Auto-apply the top-scored survivor, no runner-up margin check
    Best,
    /// Log the ambiguity with candidates attached and take no action
    Skip,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "manual" => Self::Manual,
            "best" => Self::Best,
            _ => Self::Skip,
        })
    }
}

/// Normalized title similarity in [0, 1]
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Fraction of the comma-split target-artist tokens that match a candidate
/// artist, where "match" means case-insensitive substring in either
/// direction. `None` when no token matches at all.
fn artist_match_ratio(target_artist: &str, candidate_artists: &[String]) -> Option<f64> {
    let tokens: Vec<String> = target_artist
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    let candidates: Vec<String> = candidate_artists
        .iter()
        .map(|a| a.to_lowercase())
        .collect();

    let matched = tokens
        .iter()
        .filter(|token| {
            candidates
                .iter()
                .any(|cand| cand.contains(token.as_str()) || token.contains(cand.as_str()))
        })
        .count();

    if matched == 0 {
        None
    } else {
        Some(matched as f64 / tokens.len() as f64)
    }
}

/// Filter and score catalog results against a target track
///
/// A candidate is discarded when none of the target-artist tokens matches
/// any of its artists, regardless of title similarity. Survivors are scored
/// `similarity * (0.7 + 0.3 * matched/total)`, sorted descending, cut at the
/// threshold, and truncated to [`MAX_CANDIDATES`].
pub fn filter_song_matches(
    target_title: &str,
    target_artist: &str,
    results: &[SearchResult],
    threshold: f64,
) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = results
        .iter()
        .filter_map(|result| {
            let artist_names: Vec<String> =
                result.artists.iter().map(|a| a.name.clone()).collect();
            let ratio = artist_match_ratio(target_artist, &artist_names)?;
            let similarity = title_similarity(target_title, &result.title);
            let score = round3(similarity * (0.7 + 0.3 * ratio));
            Some(MatchCandidate {
                score,
                title: result.title.clone(),
                artists: artist_names,
                external_id: result.video_id.clone(),
                thumbnail_url: result.thumbnails.first().map(|t| t.url.clone()),
            })
        })
        .filter(|c| c.score >= threshold)
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Classify surviving candidates
pub fn classify(mut candidates: Vec<MatchCandidate>) -> MatchOutcome {
    match candidates.len() {
        0 => MatchOutcome::NoMatch,
        1 => MatchOutcome::Single(candidates.remove(0)),
        _ => MatchOutcome::Ambiguous(candidates),
    }
}

/// Search one catalog scope and score the results
pub async fn search_scope(
    client: &CatalogClient,
    title: &str,
    artist: &str,
    scope: SearchScope,
    threshold: f64,
) -> CatalogResult<Vec<MatchCandidate>> {
    let query = format!("{} {}", title, artist);
    let results = client.search(&query, scope).await?;
    let candidates = filter_song_matches(title, artist, &results, threshold);
    debug!(
        title = %title,
        scope = %scope,
        raw = results.len(),
        surviving = candidates.len(),
        "Scored catalog results"
    );
    Ok(candidates)
}

/// Find candidates for a track: songs scope first, widening to videos when
/// nothing clears the threshold
pub async fn find_matches(
    client: &CatalogClient,
    title: &str,
    artist: &str,
    threshold: f64,
) -> CatalogResult<Vec<MatchCandidate>> {
    let candidates = search_scope(client, title, artist, SearchScope::Songs, threshold).await?;
    if !candidates.is_empty() {
        return Ok(candidates);
    }
    search_scope(client, title, artist, SearchScope::Videos, threshold).await
}
