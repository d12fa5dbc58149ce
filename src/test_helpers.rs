//! Shared test utilities for the folio test suite.
//!
//! Provides synthetic image writers (plain JPEG/PNG, JPEG with an EXIF block),
//! modification-time pinning, and a photo-directory builder.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_test_jpeg(&tmp.path().join("a.jpg"), 64, 48);
//! set_mtime(&tmp.path().join("a.jpg"), utc(2020, 1, 1, 0, 0, 0));
//! ```

use chrono::{DateTime, TimeZone, Utc};
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Write a small valid JPEG with the given dimensions.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    fs::write(path, encode_jpeg(width, height)).unwrap();
}

/// Write a small valid PNG with the given dimensions.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// Build a little-endian TIFF block holding `DateTime` in IFD0 and
/// `DateTimeOriginal` in the Exif sub-IFD. Values must be 19 characters
/// (`YYYY:MM:DD HH:MM:SS`).
pub fn exif_tiff_block(date_time: Option<&str>, original: Option<&str>) -> Vec<u8> {
    const ASCII: u16 = 2;
    const LONG: u16 = 4;
    fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    for v in date_time.iter().chain(original.iter()) {
        assert_eq!(v.len(), 19, "EXIF dates are 19 characters");
    }

    let ifd0_entries = date_time.is_some() as u32 + original.is_some() as u32;
    let ifd0_size = 2 + 12 * ifd0_entries + 4;
    let exif_ifd_offset = 8 + ifd0_size;
    let exif_ifd_size = if original.is_some() { 2 + 12 + 4 } else { 0 };
    let data_offset = exif_ifd_offset + exif_ifd_size;
    let date_time_offset = data_offset;
    let original_offset = data_offset + if date_time.is_some() { 20 } else { 0 };

    let mut out = Vec::new();
    out.extend_from_slice(b"II*\0");
    out.extend_from_slice(&8u32.to_le_bytes());

    // IFD0, entries sorted by tag
    out.extend_from_slice(&(ifd0_entries as u16).to_le_bytes());
    if date_time.is_some() {
        entry(&mut out, 0x0132, ASCII, 20, date_time_offset);
    }
    if original.is_some() {
        entry(&mut out, 0x8769, LONG, 1, exif_ifd_offset);
    }
    out.extend_from_slice(&0u32.to_le_bytes());

    if original.is_some() {
        out.extend_from_slice(&1u16.to_le_bytes());
        entry(&mut out, 0x9003, ASCII, 20, original_offset);
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    for v in date_time.iter().chain(original.iter()) {
        out.extend_from_slice(v.as_bytes());
        out.push(0);
    }
    out
}

/// Write a JPEG whose APP1 segment carries the given EXIF dates.
pub fn write_jpeg_with_exif(path: &Path, date_time: Option<&str>, original: Option<&str>) {
    let jpeg = encode_jpeg(32, 24);
    let tiff = exif_tiff_block(date_time, original);
    let segment_len = (2 + 6 + tiff.len()) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    fs::write(path, out).unwrap();
}

// =========================================================================
// Timestamps
// =========================================================================

/// A UTC instant, for readable assertions.
pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Pin a file's modification time.
pub fn set_mtime(path: &Path, when: impl Into<SystemTime>) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(when.into()).unwrap();
}

/// Write a fake original (arbitrary bytes) with a pinned modification time.
pub fn write_original(dir: &Path, name: &str, mtime: DateTime<Utc>) {
    let path = dir.join(name);
    fs::write(&path, name.as_bytes()).unwrap();
    set_mtime(&path, mtime);
}
