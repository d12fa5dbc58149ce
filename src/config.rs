//! Server configuration.
//!
//! Loaded from a single TOML file (`folio.toml` by default). Every key is
//! optional; a missing file means stock defaults. Unknown keys are rejected so
//! typos fail loudly instead of being silently ignored.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! photos_root = "photos"          # Directory holding the originals
//!
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [resize]
//! default_width = 640             # Width when the request has none
//! max_width = 5000                # Widest derivative a client may request
//! default_quality = 80            # Quality when the request has none (1-100)
//! default_format = "webp"         # webp, jpeg or png
//! generation_timeout_secs = 10    # Request gives up (503) after this long
//! # max_pixels = 100000000        # Reject larger originals (unset = no limit)
//!
//! [thumbnails]
//! width = 600                     # Bounding box for precomputed thumbnails
//! height = 600
//! quality = 90
//!
//! [cache]
//! sweep_on_start = true           # Delete derivatives of deleted originals
//!
//! [processing]
//! # max_processes = 4             # Worker threads (unset = all cores)
//! ```
//!
//! Command-line flags (`--photos`, `--bind`) override the file.

use crate::imaging::{OutputFormat, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "folio.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration loaded from `folio.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory holding the originals. Derivatives and thumbnails live in
    /// its `resized/` and `thumbnails/` subdirectories.
    pub photos_root: PathBuf,
    pub server: HttpConfig,
    pub resize: ResizeConfig,
    pub thumbnails: ThumbnailsConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            photos_root: PathBuf::from("photos"),
            server: HttpConfig::default(),
            resize: ResizeConfig::default(),
            thumbnails: ThumbnailsConfig::default(),
            cache: CacheConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resize;
        if r.max_width == 0 {
            return Err(ConfigError::Validation(
                "resize.max_width must be positive".into(),
            ));
        }
        if r.default_width == 0 || r.default_width > r.max_width {
            return Err(ConfigError::Validation(format!(
                "resize.default_width must be 1-{}",
                r.max_width
            )));
        }
        if !(1..=100).contains(&r.default_quality) {
            return Err(ConfigError::Validation(
                "resize.default_quality must be 1-100".into(),
            ));
        }
        if r.generation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "resize.generation_timeout_secs must be positive".into(),
            ));
        }
        if r.max_pixels == Some(0) {
            return Err(ConfigError::Validation(
                "resize.max_pixels must be positive when set".into(),
            ));
        }
        let t = &self.thumbnails;
        if t.width == 0 || t.height == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.width and thumbnails.height must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&t.quality) {
            return Err(ConfigError::Validation(
                "thumbnails.quality must be 1-100".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Cache root for resized derivatives.
    pub fn resized_dir(&self) -> PathBuf {
        self.photos_root.join(crate::cache::RESIZED_DIR)
    }

    /// Output directory for precomputed thumbnails.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.photos_root.join(crate::thumbnails::THUMBNAILS_DIR)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

/// On-demand resize settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub default_width: u32,
    pub max_width: u32,
    pub default_quality: u32,
    /// Used when the client names no format and does not accept WebP, and
    /// when it names one we cannot produce.
    pub default_format: OutputFormat,
    pub generation_timeout_secs: u64,
    /// Largest original, in pixels, the server will decode. Unset means no
    /// limit, which suits a single trusted operator.
    pub max_pixels: Option<u64>,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            default_width: 640,
            max_width: 5000,
            default_quality: Quality::DEFAULT,
            default_format: OutputFormat::WebP,
            generation_timeout_secs: 10,
            max_pixels: None,
        }
    }
}

impl ResizeConfig {
    pub fn default_quality(&self) -> Quality {
        Quality::new(self.default_quality)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Precomputed thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub width: u32,
    pub height: u32,
    pub quality: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 600,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Run the orphan sweep before the server starts accepting requests.
    pub sweep_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_on_start: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of image processing worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading and validation
// =============================================================================

/// Parse and validate config from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// A missing file yields the stock defaults. A file that exists but does not
/// parse, has unknown keys or out-of-range values is an error.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    if !path.exists() {
        log::debug!("{} not found, using defaults", path.display());
        return Ok(ServerConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock `folio.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Folio Configuration
# ===================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory holding the original photos. Derivatives are cached in its
# resized/ subdirectory, precomputed thumbnails in thumbnails/.
photos_root = "photos"

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Address and port to listen on.
bind = "127.0.0.1:3000"

# ---------------------------------------------------------------------------
# On-demand resizing (GET /photos/resize)
# ---------------------------------------------------------------------------
[resize]
# Width used when a request does not name one.
default_width = 640

# Widest derivative a client may request. Wider requests are rejected (400).
max_width = 5000

# Encoding quality used when a request does not name one (1 = worst, 100 = best).
default_quality = 80

# Format used when the client names none and does not accept WebP,
# or names one that cannot be produced. One of: webp, jpeg, png.
default_format = "webp"

# Seconds a request waits for a derivative before answering 503.
# Generation keeps running in the background and fills the cache.
generation_timeout_secs = 10

# Largest original, in pixels (width * height), that will be decoded.
# Unset means no limit. Set it when originals come from untrusted uploads.
# max_pixels = 100000000

# ---------------------------------------------------------------------------
# Precomputed thumbnails (folio thumbnails)
# ---------------------------------------------------------------------------
[thumbnails]
# Bounding box; thumbnails keep the original aspect ratio.
width = 600
height = 600

# WebP quality (1-100).
quality = 90

# ---------------------------------------------------------------------------
# Derivative cache
# ---------------------------------------------------------------------------
[cache]
# Delete cached derivatives of deleted originals when the server starts.
sweep_on_start = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of image processing worker threads.
# Omit to use all available CPU cores. Values above the core count are clamped.
# max_processes = 4
"##
}
