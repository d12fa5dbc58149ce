//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the callers that decide which derivative to produce
//! ([`resize`](crate::resize), [`thumbnails`](crate::thumbnails)) and the
//! [`backend`](super::backend) that does the pixel work. A mock backend can
//! stand in for the real one without touching the callers.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`OutputFormat`]: The three encodings a derivative can be served in.
//! - [`RenderParams`]: A derivative: source, target width, format, quality.
//! - [`ThumbnailParams`]: A precomputed thumbnail: source, output path, bounding box, quality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quality(u32);

impl Quality {
    pub const DEFAULT: u32 = 80;

    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Encoding of a generated derivative.
///
/// `jpg` is accepted as an alias everywhere a format is parsed, but the
/// canonical name (used for cache directories, extensions and MIME types) is
/// always `jpeg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(rename = "webp")]
    WebP,
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Parse a user-supplied format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(Self::WebP),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Canonical name, also the cache directory and file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parameters for rendering one derivative into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub source: PathBuf,
    /// Upper bound on the output width. The source is never enlarged.
    pub width: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Parameters for a thumbnail written straight to disk (fit inside a box).
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: Quality,
}
