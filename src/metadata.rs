//! Capture-date resolution.
//!
//! Every photo in the catalog gets exactly one timestamp, taken from the first
//! source that yields a usable value:
//!
//! | Priority | Source | [`DateSource`] |
//! |---|---|---|
//! | 1 | EXIF `DateTimeOriginal` | `exif_original` |
//! | 2 | EXIF `DateTime` | `exif_datetime` |
//! | 3 | Filename timestamp ([`naming::parse_filename_timestamp`]) | `filename` |
//! | 4 | Filesystem modification time | `file_mtime` |
//!
//! EXIF and `YYYYMMDD_HHMMSS` filename values are wall-clock times and are
//! interpreted in the server's local zone. A wall-clock time the zone skips
//! (DST gap) counts as absent; an ambiguous one (DST overlap) takes the
//! earlier instant.
//!
//! Resolution never fails. Unreadable or malformed metadata simply falls
//! through to the next source; the timestamp is absent only when even the
//! modification time cannot be read.

use crate::imaging::ImageBackend;
use crate::naming::{self, FilenameTimestamp};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a resolved timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    ExifOriginal,
    ExifDatetime,
    Filename,
    FileMtime,
}

impl DateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExifOriginal => "exif_original",
            Self::ExifDatetime => "exif_datetime",
            Self::Filename => "filename",
            Self::FileMtime => "file_mtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub timestamp: Option<DateTime<Utc>>,
    pub source: DateSource,
}

/// Resolve the capture timestamp of the photo at `path`.
pub fn resolve<B: ImageBackend + ?Sized>(backend: &B, path: &Path) -> ResolvedDate {
    let exif = backend.read_capture_dates(path);
    if let Some(ts) = exif.original.and_then(local_to_utc) {
        return ResolvedDate {
            timestamp: Some(ts),
            source: DateSource::ExifOriginal,
        };
    }
    if let Some(ts) = exif.modified.and_then(local_to_utc) {
        return ResolvedDate {
            timestamp: Some(ts),
            source: DateSource::ExifDatetime,
        };
    }

    let from_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(naming::parse_filename_timestamp)
        .and_then(|ts| match ts {
            FilenameTimestamp::Local(naive) => local_to_utc(naive),
            FilenameTimestamp::Epoch(instant) => Some(instant),
        });
    if let Some(ts) = from_name {
        return ResolvedDate {
            timestamp: Some(ts),
            source: DateSource::Filename,
        };
    }

    let mtime = std::fs::metadata(path).and_then(|m| m.modified());
    if let Err(e) = &mtime {
        log::warn!("cannot read modification time of {}: {}", path.display(), e);
    }
    ResolvedDate {
        timestamp: mtime.ok().map(DateTime::<Utc>::from),
        source: DateSource::FileMtime,
    }
}

/// Interpret a wall-clock time in the local zone.
fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
