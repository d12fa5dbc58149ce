//! Image processing on the `image` crate ecosystem.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Capture dates** | `kamadak-exif` (JPEG APP1, PNG eXIf, WebP EXIF) |
//! | **Render** | Lanczos3 fit-to-width, JPEG/PNG via `image`, WebP via `webp` |
//! | **Thumbnail** | Lanczos3 fit-inside-box, WebP |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **EXIF**: capture-date extraction used by the backend

pub mod backend;
mod calculations;
pub mod exif_reader;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, CaptureDates, Dimensions, ImageBackend};
pub use calculations::{fit_inside, fit_width};
pub use params::{OutputFormat, Quality, RenderParams, ThumbnailParams};
pub use rust_backend::RustBackend;
