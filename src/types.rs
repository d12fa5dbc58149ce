//! Shared types exchanged between the catalog, the HTTP layer and the CLI.
//!
//! [`PhotoRecord`] is serialized as-is by `GET /photos-list` and
//! `folio catalog --json`, so its field names are the public JSON contract.

use crate::metadata::DateSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One original in the catalog.
///
/// A snapshot: recomputed on every listing, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    /// `/photos/<filename>`
    pub url: String,
    /// Base name within the originals directory; the identity key.
    pub filename: String,
    /// `/photos/thumbnails/<stem>.webp`
    pub thumbnail_url: String,
    /// Resolved capture time, RFC 3339 in UTC. `null` only when the file's
    /// modification time could not be read.
    pub date: Option<DateTime<Utc>>,
    pub date_source: DateSource,
}
