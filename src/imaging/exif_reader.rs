//! EXIF capture-date extraction.
//!
//! Reads two tags through `kamadak-exif`:
//! - DateTimeOriginal (`0x9003`, Exif IFD): when the shutter fired
//! - DateTime (`0x0132`, IFD0): last modification by camera or editor
//!
//! The container (JPEG APP1, PNG eXIf, WebP EXIF chunk) is detected by
//! `kamadak-exif` itself. Any failure along the way yields empty dates: the
//! caller owns the fallback chain.

use super::backend::CaptureDates;
use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const EXIF_FORMATS: &[&str] = &["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Read EXIF capture dates from an image file.
pub fn read_capture_dates(path: &Path) -> CaptureDates {
    let Ok(file) = File::open(path) else {
        return CaptureDates::default();
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => dates_from_exif(&exif),
        Err(e) => {
            log::debug!("no usable EXIF in {}: {}", path.display(), e);
            CaptureDates::default()
        }
    }
}

fn dates_from_exif(exif: &exif::Exif) -> CaptureDates {
    let ascii = |tag: Tag| -> Option<NaiveDateTime> {
        let field = exif
            .get_field(tag, In::PRIMARY)
            .or_else(|| exif.fields().find(|f| f.tag == tag))?;
        match &field.value {
            Value::Ascii(parts) => parts
                .first()
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .and_then(parse_exif_datetime),
            _ => None,
        }
    };

    CaptureDates {
        original: ascii(Tag::DateTimeOriginal),
        modified: ascii(Tag::DateTime),
    }
}

/// Parse an EXIF date string (`YYYY:MM:DD HH:MM:SS`).
///
/// Trailing NULs and padding are ignored. Calendar-invalid values, including
/// the all-zero placeholder some cameras write, are rejected.
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    EXIF_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}
