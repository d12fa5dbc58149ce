//! On-demand derivatives: request parsing, generation and cache integration.
//!
//! A request names an original and optionally a width, quality and format:
//!
//! ```text
//! GET /photos/resize?file=IMG_1.jpg&w=320&q=75&fmt=jpeg
//! ```
//!
//! | Parameter | Alias | Default | Rule |
//! |---|---|---|---|
//! | `file` | | required | basename only, photo extension |
//! | `w` | `width` | 640 | integer in `1..=max_width` |
//! | `q` | `quality` | 80 | missing, unparseable or 0 → default; above 100 → 100 |
//! | `fmt` | `format` | negotiated | `webp`, `jpeg`/`jpg`, `png`; anything else → configured default |
//!
//! Without a format, WebP is chosen when the `Accept` header lists
//! `image/webp`, otherwise the configured default format.
//!
//! [`ResizeService`] turns a parsed [`ResizeRequest`] into bytes. Generation is
//! CPU-bound and runs on a dedicated rayon pool; async callers wait on a
//! oneshot channel with a deadline. A request that misses its deadline fails
//! with [`ResizeError::Timeout`], but the generation keeps running and fills
//! the cache for the next request.

use crate::cache::{Derivative, DerivativeCache, DerivativeKey};
use crate::config::ResizeConfig;
use crate::imaging::{BackendError, ImageBackend, OutputFormat, Quality, RenderParams};
use crate::naming;
use rayon::ThreadPool;
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("missing file parameter")]
    MissingFile,
    #[error("invalid file name: {0}")]
    InvalidFile(String),
    #[error("invalid width: {0}")]
    InvalidWidth(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("original not found: {0}")]
    NotFound(String),
    #[error("cannot decode {file}: {reason}")]
    SourceDecode { file: String, reason: String },
    #[error("generation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("image processing failed: {0}")]
    Imaging(BackendError),
    #[error("worker pool dropped the job")]
    WorkerGone,
}

/// Parse a format name strictly. The HTTP endpoint falls back to the default
/// format instead; this is for callers that want an unknown name to fail.
pub fn parse_format(name: &str) -> Result<OutputFormat, ResizeError> {
    OutputFormat::parse(name).ok_or_else(|| ResizeError::UnsupportedFormat(name.to_string()))
}

/// A validated resize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    pub basename: String,
    pub width: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}

impl ResizeRequest {
    /// Validate query parameters. See the [module docs](self) for the rules.
    ///
    /// Nothing here touches the filesystem.
    pub fn from_query(
        query: &HashMap<String, String>,
        accept: Option<&str>,
        config: &ResizeConfig,
    ) -> Result<Self, ResizeError> {
        let param = |a: &str, b: &str| {
            query
                .get(a)
                .or_else(|| query.get(b))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let file = param("file", "file").ok_or(ResizeError::MissingFile)?;
        let basename = naming::sanitize_basename(file)
            .filter(|name| naming::is_photo_filename(name))
            .ok_or_else(|| ResizeError::InvalidFile(file.to_string()))?;

        let width = match param("w", "width") {
            None => config.default_width,
            Some(raw) => match raw.parse::<u32>() {
                Ok(w) if w > 0 && w <= config.max_width => w,
                _ => return Err(ResizeError::InvalidWidth(raw.to_string())),
            },
        };

        let quality = match param("q", "quality").and_then(|raw| raw.parse::<u32>().ok()) {
            Some(q) if q > 0 => Quality::new(q),
            _ => config.default_quality(),
        };

        let format = match param("fmt", "format") {
            Some(name) => OutputFormat::parse(name).unwrap_or_else(|| {
                log::debug!(
                    "unknown format {:?}, using {}",
                    name,
                    config.default_format
                );
                config.default_format
            }),
            None if accept.is_some_and(|a| a.contains("image/webp")) => OutputFormat::WebP,
            None => config.default_format,
        };

        Ok(Self {
            basename: basename.to_string(),
            width,
            format,
            quality,
        })
    }

    pub fn key(&self) -> DerivativeKey {
        DerivativeKey {
            basename: self.basename.clone(),
            width: self.width,
            format: self.format,
            quality: self.quality,
        }
    }
}

struct Shared<B> {
    photos_root: PathBuf,
    backend: B,
    cache: DerivativeCache,
}

/// Produces derivatives through the cache on a bounded worker pool.
///
/// Cheap to clone; clones share the backend, cache and pool.
pub struct ResizeService<B> {
    shared: Arc<Shared<B>>,
    pool: Arc<ThreadPool>,
    timeout: Duration,
}

impl<B> Clone for ResizeService<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pool: Arc::clone(&self.pool),
            timeout: self.timeout,
        }
    }
}

impl<B: ImageBackend + 'static> ResizeService<B> {
    pub fn new(
        photos_root: impl Into<PathBuf>,
        backend: B,
        cache: DerivativeCache,
        pool: Arc<ThreadPool>,
        timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                photos_root: photos_root.into(),
                backend,
                cache,
            }),
            pool,
            timeout,
        }
    }

    pub fn photos_root(&self) -> &Path {
        &self.shared.photos_root
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn cache(&self) -> &DerivativeCache {
        &self.shared.cache
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Decode, resize and encode one derivative, bypassing the cache.
    pub fn generate(
        &self,
        original: &Path,
        width: u32,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ResizeError> {
        let params = RenderParams {
            source: original.to_path_buf(),
            width,
            format,
            quality,
        };
        self.shared.backend.render(&params).map_err(|e| {
            let file = original
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match e {
                BackendError::Decode { reason, .. } => {
                    log::warn!("cannot decode {}: {}", file, reason);
                    ResizeError::SourceDecode { file, reason }
                }
                BackendError::PixelLimit { pixels, limit, .. } => {
                    let reason = format!("{pixels} pixels exceeds the limit of {limit}");
                    log::warn!("refusing {}: {}", file, reason);
                    ResizeError::SourceDecode { file, reason }
                }
                BackendError::Io(e) => ResizeError::Io(e),
                other => {
                    log::error!("generating {} failed: {}", file, other);
                    ResizeError::Imaging(other)
                }
            }
        })
    }

    /// Serve a request from the cache, generating on a miss. Blocking.
    pub fn get(&self, request: &ResizeRequest) -> Result<Derivative, ResizeError> {
        let original = self.shared.photos_root.join(&request.basename);
        if !original.is_file() {
            return Err(ResizeError::NotFound(request.basename.clone()));
        }
        let result = self.shared.cache.get_or_create(&original, &request.key(), || {
            self.generate(&original, request.width, request.format, request.quality)
        });
        match result {
            Err(ResizeError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Err(ResizeError::NotFound(request.basename.clone()))
            }
            other => other,
        }
    }

    /// [`get`](Self::get) on the worker pool, waiting at most the configured
    /// timeout.
    pub async fn serve(&self, request: ResizeRequest) -> Result<Derivative, ResizeError> {
        let service = self.clone();
        let basename = request.basename.clone();
        let job = run_on_pool(&self.pool, move || service.get(&request));
        match tokio::time::timeout(self.timeout, job).await {
            Ok(Some(result)) => result,
            Ok(None) => Err(ResizeError::WorkerGone),
            Err(_) => {
                log::warn!(
                    "{} not ready after {:?}; generation continues in the background",
                    basename,
                    self.timeout
                );
                Err(ResizeError::Timeout(self.timeout))
            }
        }
    }
}

/// Run a blocking job on `pool` and await its result. `None` if the job
/// panicked; the panic is logged and the pool keeps running.
pub async fn run_on_pool<T, F>(pool: &ThreadPool, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    pool.spawn(move || match panic::catch_unwind(AssertUnwindSafe(job)) {
        // The receiver is gone when the request timed out; the work is done
        // either way.
        Ok(result) => {
            let _ = tx.send(result);
        }
        Err(payload) => log::error!("worker job panicked: {}", panic_message(&*payload)),
    });
    rx.await.ok()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
