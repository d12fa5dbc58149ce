//! # Folio
//!
//! On-demand image delivery for a photo portfolio. A single directory of
//! originals is the data source: the server lists it as a chronological
//! catalog and produces resized derivatives the first time a client asks for
//! them.
//!
//! # Architecture
//!
//! ```text
//! GET /photos/resize?file=…  →  resize  →  cache  →  imaging   (bytes, cached on disk)
//! GET /photos-list           →  catalog →  metadata            (JSON, newest first)
//! GET /photos/<path>         →  static files                   (originals, thumbnails)
//! ```
//!
//! All image and directory work runs on a bounded rayon pool; the async
//! server only waits on it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`server`] | warp routes, response headers, status mapping, startup and shutdown |
//! | [`resize`] | Request validation and derivative generation with a deadline |
//! | [`cache`] | Content-addressed derivative cache: single-flight, freshness, atomic writes, sweep |
//! | [`catalog`] | Lists originals and orders them by capture date |
//! | [`metadata`] | Capture date resolution: EXIF → filename → mtime |
//! | [`naming`] | Photo extensions, basename sanitizing, filename timestamps, URLs |
//! | [`thumbnails`] | Batch generation of the gallery thumbnails the catalog links to |
//! | [`imaging`] | Pure-Rust decode, resize, encode and EXIF reading |
//! | [`config`] | `folio.toml` loading and validation |
//! | [`types`] | Catalog record serialized to clients |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Cache Key Is the Path
//!
//! A derivative's location encodes everything that determines its bytes:
//!
//! ```text
//! resized/<format>/<width>/<stem>.<ext>          default quality
//! resized/<format>/<width>/q<quality>/<stem>.<ext>
//! ```
//!
//! A cached file is valid as long as it is at least as new as its original.
//! Replacing an original invalidates every derivative of it without any
//! index to maintain.
//!
//! ## One Generation per Key
//!
//! Concurrent requests for the same missing derivative wait on a per-key lock
//! and the losers read what the winner wrote. A thundering herd on a new photo
//! costs one decode.
//!
//! ## Timeouts Do Not Cancel
//!
//! A request that outlives `generation_timeout_secs` gets a 503, but the job
//! keeps running on the pool and lands in the cache. The retry is a hit.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod resize;
pub mod server;
pub mod thumbnails;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
