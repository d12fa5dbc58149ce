//! Filename conventions for originals.
//!
//! Everything the server knows about a photo without opening it comes from its
//! name: whether it is a photo at all, the stem its derivatives and thumbnail
//! are stored under, the public URLs, and an optional capture timestamp that
//! phone cameras and messengers encode in the name.
//!
//! ## Filename timestamps
//!
//! Three shapes are recognized, checked in this order:
//!
//! - `20230601_120000_IMG.jpg`: date and time prefix followed by `_`
//! - `IMG_20230601_120000.jpg`: the same pair anywhere in the name
//! - `1685620800000_photo.jpg`: a 13-digit Unix epoch in milliseconds
//!
//! The first two are local wall-clock times. Calendar-invalid values
//! (`20231301_...`, `20230230_...`) are rejected so the caller falls through to
//! the next source instead of carrying a bogus date.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// File extensions served as photos, compared case-insensitively.
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Extension of `name` (text after the last dot), if it has one.
///
/// A leading dot is not an extension separator: `.hidden` has none.
pub fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(i) if i > 0 => Some(&name[i + 1..]),
        _ => None,
    }
}

/// Name without its last extension: `a.b.jpg` → `a.b`.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

pub fn is_photo_filename(name: &str) -> bool {
    extension(name).is_some_and(|ext| {
        PHOTO_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

/// Reduce a client-supplied file reference to a bare basename.
///
/// Only the last `/`-separated segment survives, so `../../etc/passwd` becomes
/// `passwd`. Returns `None` for names that could still escape or confuse the
/// originals directory: empty, `.`, `..`, or containing `\` or NUL.
pub fn sanitize_basename(raw: &str) -> Option<&str> {
    let base = raw.trim_end_matches('/').rsplit('/').next()?;
    if base.is_empty() || base == "." || base == ".." || base.contains(['\\', '\0']) {
        return None;
    }
    Some(base)
}

pub fn photo_url(filename: &str) -> String {
    format!("/photos/{filename}")
}

pub fn thumbnail_url(filename: &str) -> String {
    format!("/photos/thumbnails/{}.webp", file_stem(filename))
}

/// A capture timestamp recovered from a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameTimestamp {
    /// Wall-clock time with no zone (`YYYYMMDD_HHMMSS`).
    Local(NaiveDateTime),
    /// Absolute instant (epoch milliseconds).
    Epoch(DateTime<Utc>),
}

/// Parse a capture timestamp out of a filename. See the [module docs](self).
pub fn parse_filename_timestamp(name: &str) -> Option<FilenameTimestamp> {
    let bytes = name.as_bytes();

    if bytes.get(15) == Some(&b'_')
        && let Some(ts) = date_time_at(bytes, 0)
    {
        return Some(FilenameTimestamp::Local(ts));
    }

    // Leftmost occurrence only; a later valid pair does not rescue an invalid one.
    let found = (0..bytes.len().saturating_sub(14)).find(|&i| {
        digits(bytes, i, 8).is_some() && bytes[i + 8] == b'_' && digits(bytes, i + 9, 6).is_some()
    });
    if let Some(i) = found
        && let Some(ts) = date_time_at(bytes, i)
    {
        return Some(FilenameTimestamp::Local(ts));
    }

    if bytes.get(13) == Some(&b'_')
        && let Some(millis) = digits(bytes, 0, 13)
        && let Some(ts) = DateTime::from_timestamp_millis(millis as i64)
    {
        return Some(FilenameTimestamp::Epoch(ts));
    }

    None
}

/// `YYYYMMDD_HHMMSS` starting at `start`, validated against the calendar.
fn date_time_at(bytes: &[u8], start: usize) -> Option<NaiveDateTime> {
    let date = digits(bytes, start, 8)?;
    if bytes.get(start + 8) != Some(&b'_') {
        return None;
    }
    let time = digits(bytes, start + 9, 6)?;

    let (year, month, day) = (date / 10_000, (date / 100) % 100, date % 100);
    let (hour, minute, second) = (time / 10_000, (time / 100) % 100, time % 100);
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
        hour as u32,
        minute as u32,
        second as u32,
    )
}

/// Exactly `len` ASCII digits at `start`, as a number.
fn digits(bytes: &[u8], start: usize, len: usize) -> Option<u64> {
    let run = bytes.get(start..start + len)?;
    if !run.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(run.iter().fold(0, |acc, d| acc * 10 + u64::from(d - b'0')))
}
