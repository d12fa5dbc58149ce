//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, read_capture_dates, render and thumbnail.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`,
//! `webp` and `kamadak-exif` crates.

use super::params::{RenderParams, ThumbnailParams};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("{path} has {pixels} pixels, above the configured limit of {limit}")]
    PixelLimit {
        path: PathBuf,
        pixels: u64,
        limit: u64,
    },
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Capture timestamps embedded in an image's EXIF block.
///
/// Both values are wall-clock times with no zone attached, exactly as the
/// camera wrote them:
/// - `original`: EXIF `DateTimeOriginal` (`0x9003`), when the shutter fired
/// - `modified`: EXIF `DateTime` (`0x0132`), last write by camera or editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureDates {
    pub original: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

/// Trait for image processing backends.
///
/// `Send + Sync` because a single backend instance is shared by every worker
/// thread of the processing pool.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Read embedded EXIF capture dates. Missing or malformed metadata is
    /// reported as empty dates, not as an error.
    fn read_capture_dates(&self, path: &Path) -> CaptureDates;

    /// Decode, resize and encode a derivative, returning the encoded bytes.
    fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError>;

    /// Decode, fit inside a box and write a WebP thumbnail to disk.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock backend that records operations without decoding anything.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// Capture dates are keyed by file name, since parallel callers make
    /// call order unpredictable.
    #[derive(Default)]
    pub struct MockBackend {
        pub capture_dates: Mutex<HashMap<String, CaptureDates>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        pub render_delay: Option<Duration>,
        pub fail_decode: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        ReadCaptureDates(String),
        Render {
            source: String,
            width: u32,
            format: String,
            quality: u32,
        },
        Thumbnail {
            source: String,
            output: String,
            max_width: u32,
            max_height: u32,
        },
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_capture_dates(dates: Vec<(&str, CaptureDates)>) -> Self {
            Self {
                capture_dates: Mutex::new(
                    dates
                        .into_iter()
                        .map(|(name, d)| (name.to_string(), d))
                        .collect(),
                ),
                ..Self::default()
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                render_delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_decode: true,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn render_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Render { .. }))
                .count()
        }

        /// The bytes `render` produces for a given request. Deterministic, so
        /// tests can compare responses byte for byte.
        pub fn expected_bytes(params: &RenderParams) -> Vec<u8> {
            format!(
                "{}|{}|{}|{}",
                file_name(&params.source),
                params.width,
                params.format,
                params.quality.value()
            )
            .into_bytes()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(file_name(path)));
            Ok(Dimensions {
                width: 4000,
                height: 3000,
            })
        }

        fn read_capture_dates(&self, path: &Path) -> CaptureDates {
            let name = file_name(path);
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::ReadCaptureDates(name.clone()));
            self.capture_dates
                .lock()
                .unwrap()
                .get(&name)
                .copied()
                .unwrap_or_default()
        }

        fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Render {
                source: file_name(&params.source),
                width: params.width,
                format: params.format.to_string(),
                quality: params.quality.value(),
            });
            if let Some(delay) = self.render_delay {
                std::thread::sleep(delay);
            }
            if self.fail_decode {
                return Err(BackendError::Decode {
                    path: params.source.clone(),
                    reason: "mock decode failure".into(),
                });
            }
            Ok(Self::expected_bytes(params))
        }

        fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Thumbnail {
                source: file_name(&params.source),
                output: file_name(&params.output),
                max_width: params.max_width,
                max_height: params.max_height,
            });
            if self.fail_decode {
                return Err(BackendError::Decode {
                    path: params.source.clone(),
                    reason: "mock decode failure".into(),
                });
            }
            if let Some(parent) = params.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&params.output, b"mock thumbnail")?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_render() {
        let backend = MockBackend::new();
        let params = RenderParams {
            source: "/photos/a.jpg".into(),
            width: 320,
            format: crate::imaging::OutputFormat::WebP,
            quality: crate::imaging::Quality::new(75),
        };

        let bytes = backend.render(&params).unwrap();
        assert_eq!(bytes, b"a.jpg|320|webp|75".to_vec());

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Render {
                width: 320,
                quality: 75,
                ..
            }
        ));
        assert_eq!(backend.render_count(), 1);
    }

    #[test]
    fn mock_returns_configured_capture_dates() {
        let when = chrono::NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        let backend = MockBackend::with_capture_dates(vec![(
            "a.jpg",
            CaptureDates {
                original: Some(when),
                modified: None,
            },
        )]);

        assert_eq!(
            backend.read_capture_dates(Path::new("/x/a.jpg")).original,
            Some(when)
        );
        assert_eq!(
            backend.read_capture_dates(Path::new("/x/b.jpg")),
            CaptureDates::default()
        );
    }

    #[test]
    fn failing_mock_reports_decode_error() {
        let backend = MockBackend::failing();
        let result = backend.render(&RenderParams {
            source: "/photos/broken.jpg".into(),
            width: 100,
            format: crate::imaging::OutputFormat::Png,
            quality: crate::imaging::Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::Decode { .. })));
    }
}
