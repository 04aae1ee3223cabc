//! Music catalog search client for Tunedock
//!
//! This crate provides a client for the remote music catalog service,
//! enabling:
//! - Fuzzy track search scoped to songs or videos
//! - Timed-lyrics lookup for a catalog track
//!
//! # Example
//!
//! ```rust,no_run
//! use tunedock_catalog_client::{CatalogClient, SearchScope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::new("https://catalog.example.com")?;
//!
//! let results = client.search("Midnight Drive Artist", SearchScope::Songs).await?;
//! for result in results {
//!     println!("{} ({})", result.title, result.video_id);
//! }
//!
//! if let Some(lyrics) = client.lyrics("dQw4w9WgXcQ").await? {
//!     println!("{}", lyrics.lyrics);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `CATALOG_API_URL`: base URL of the catalog service (required for `from_env`)

mod client;
mod error;
mod models;

pub use client::CatalogClient;
pub use error::{CatalogError, CatalogResult};
pub use models::{ArtistRef, Lyrics, SearchResult, SearchScope, Thumbnail};
