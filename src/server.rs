//! HTTP surface: resize endpoint, catalog endpoint and static files.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /photos/resize?file=…` | derivative via [`ResizeService`] |
//! | `GET /photos-list` | catalog JSON via [`catalog::list_photos`] |
//! | `GET /photos/<path>` | originals, thumbnails and cached derivatives from disk |
//!
//! Handlers never block the async runtime: image and directory work runs on
//! the rayon pool owned by the [`ResizeService`] and is awaited through a
//! oneshot channel.
//!
//! ## Resize responses
//!
//! | Status | When |
//! |---|---|
//! | 200 | derivative body, `Content-Type` of the chosen format |
//! | 304 | `If-None-Match` matches the derivative's ETag |
//! | 400 | missing or invalid `file` or width |
//! | 404 | original does not exist |
//! | 500 | decode or encode failure (no paths in the body) |
//! | 503 | generation exceeded the timeout; retry shortly |
//!
//! Successful responses carry `Cache-Control: public, max-age=604800,
//! immutable`, `Vary: Accept`, a SHA-256 `ETag` and `X-Cache: HIT|MISS`.

use crate::cache::{self, DerivativeCache, DiskStore};
use crate::catalog;
use crate::config::{self, ResizeConfig, ServerConfig};
use crate::imaging::{ImageBackend, OutputFormat, RustBackend};
use crate::resize::{self, ResizeError, ResizeRequest, ResizeService};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use warp::http::header::{self, HeaderName, HeaderValue};
use warp::http::{Response, StatusCode};
use warp::hyper::Body;
use warp::{Filter, Rejection, Reply};

const CACHE_CONTROL: &str = "public, max-age=604800, immutable";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: warp::Error,
    },
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything the handlers share.
pub struct AppState<B> {
    pub resize: ResizeService<B>,
    pub resize_config: Arc<ResizeConfig>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            resize: self.resize.clone(),
            resize_config: Arc::clone(&self.resize_config),
        }
    }
}

impl AppState<RustBackend> {
    /// Production wiring: disk cache under `<photos>/resized`, the pure-Rust
    /// backend, and a worker pool sized by `processing.max_processes`.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let threads = config::effective_threads(&config.processing);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("folio-worker-{i}"))
            .build()?;
        log::debug!("worker pool: {} threads", threads);

        let store = DiskStore::new(config.resized_dir());
        log::debug!("derivative cache at {}", store.root().display());
        let cache = DerivativeCache::new(store, config.resize.default_quality());
        let resize = ResizeService::new(
            &config.photos_root,
            RustBackend::with_pixel_limit(config.resize.max_pixels),
            cache,
            Arc::new(pool),
            config.resize.generation_timeout(),
        );
        Ok(Self {
            resize,
            resize_config: Arc::new(config.resize.clone()),
        })
    }
}

fn with_state<B: ImageBackend + 'static>(
    state: AppState<B>,
) -> impl Filter<Extract = (AppState<B>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All routes, with access logging under the `folio::http` target.
pub fn routes<B: ImageBackend + 'static>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let resize = warp::path!("photos" / "resize")
        .and(warp::get())
        .and(
            warp::query::<HashMap<String, String>>()
                .or(warp::any().map(HashMap::new))
                .unify(),
        )
        .and(warp::header::optional::<String>("accept"))
        .and(warp::header::optional::<String>("if-none-match"))
        .and(with_state(state.clone()))
        .and_then(resize_handler);

    let list = warp::path!("photos-list")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(catalog_handler);

    let files = warp::path("photos").and(warp::fs::dir(state.resize.photos_root().to_path_buf()));

    resize
        .or(list)
        .or(files)
        .with(warp::log("folio::http"))
}

async fn resize_handler<B: ImageBackend + 'static>(
    query: HashMap<String, String>,
    accept: Option<String>,
    if_none_match: Option<String>,
    state: AppState<B>,
) -> Result<Response<Body>, Infallible> {
    let request = match ResizeRequest::from_query(&query, accept.as_deref(), &state.resize_config)
    {
        Ok(request) => request,
        Err(e) => return Ok(error_response(&e)),
    };
    let format = request.format;

    let derivative = match state.resize.serve(request).await {
        Ok(derivative) => derivative,
        Err(e) => return Ok(error_response(&e)),
    };

    let etag = format!("\"{:x}\"", Sha256::digest(&derivative.bytes));
    let not_modified = if_none_match.is_some_and(|tags| {
        tags.split(',')
            .any(|t| t.trim() == etag || t.trim() == "*")
    });

    let mut response = if not_modified {
        with_status(Response::new(Body::empty()), StatusCode::NOT_MODIFIED)
    } else {
        let mut r = Response::new(Body::from(derivative.bytes));
        set_header(
            &mut r,
            header::CONTENT_TYPE,
            HeaderValue::from_static(format.mime_type()),
        );
        r
    };
    set_header(
        &mut response,
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL),
    );
    set_header(&mut response, header::VARY, HeaderValue::from_static("Accept"));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        set_header(&mut response, header::ETAG, value);
    }
    set_header(
        &mut response,
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(derivative.status.header_value()),
    );
    Ok(response)
}

async fn catalog_handler<B: ImageBackend + 'static>(
    state: AppState<B>,
) -> Result<Response<Body>, Infallible> {
    let pool = Arc::clone(state.resize.pool());
    let service = state.resize.clone();
    let listed = resize::run_on_pool(&pool, move || {
        catalog::list_photos(service.backend(), service.photos_root())
    })
    .await;

    Ok(match listed {
        Some(Ok(records)) => warp::reply::json(&records).into_response(),
        Some(Err(e)) => {
            log::error!("{}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "cannot list photos")
        }
        None => json_error(StatusCode::INTERNAL_SERVER_ERROR, "cannot list photos"),
    })
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
    .into_response()
}

/// Map a resize failure to a plain-text response. Internal details stay in
/// the log.
fn error_response(error: &ResizeError) -> Response<Body> {
    let (status, message): (StatusCode, String) = match error {
        ResizeError::MissingFile => (StatusCode::BAD_REQUEST, "Missing file parameter".into()),
        ResizeError::InvalidFile(_) => (StatusCode::BAD_REQUEST, "Invalid file parameter".into()),
        ResizeError::InvalidWidth(_) => (StatusCode::BAD_REQUEST, "Invalid width".into()),
        ResizeError::UnsupportedFormat(name) => {
            (StatusCode::BAD_REQUEST, format!("Unsupported format: {name}"))
        }
        ResizeError::NotFound(_) => (StatusCode::NOT_FOUND, "File not found".into()),
        ResizeError::Timeout(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Image is still being generated, retry shortly".into(),
        ),
        ResizeError::SourceDecode { .. }
        | ResizeError::Io(_)
        | ResizeError::Imaging(_)
        | ResizeError::WorkerGone => {
            log::error!("resize failed: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error".into())
        }
    };

    let mut response = with_status(Response::new(Body::from(message)), status);
    set_header(
        &mut response,
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let ResizeError::Timeout(after) = error {
        set_header(
            &mut response,
            header::RETRY_AFTER,
            HeaderValue::from(after.as_secs().max(1)),
        );
    }
    response
}

fn with_status(mut response: Response<Body>, status: StatusCode) -> Response<Body> {
    *response.status_mut() = status;
    response
}

fn set_header(response: &mut Response<Body>, name: HeaderName, value: HeaderValue) {
    response.headers_mut().insert(name, value);
}

/// Remove derivatives of deleted originals, logging the outcome. Failures are
/// logged, never fatal.
pub fn sweep_on_start(photos_root: &Path, cache_root: &Path) {
    match cache::sweep_orphans(photos_root, cache_root) {
        Ok(report) if report.removed.is_empty() => {
            log::info!("cache sweep: {} derivatives, none orphaned", report.scanned)
        }
        Ok(report) => log::info!(
            "cache sweep: removed {} of {} derivatives ({} bytes)",
            report.removed.len(),
            report.scanned,
            report.bytes_freed
        ),
        Err(e) => log::warn!("cache sweep skipped: {}", e),
    }
}

/// Run the server until Ctrl-C.
pub async fn run(config: &ServerConfig) -> Result<(), ServerError> {
    if !config.photos_root.is_dir() {
        log::warn!(
            "photos directory {} does not exist yet",
            config.photos_root.display()
        );
    } else if config.cache.sweep_on_start {
        sweep_on_start(&config.photos_root, &config.resized_dir());
    }

    let state = AppState::from_config(config)?;
    let default_format: OutputFormat = state.resize_config.default_format;
    let (addr, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(config.server.bind, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("cannot listen for Ctrl-C: {}", e);
            }
        })
        .map_err(|source| ServerError::Bind {
            addr: config.server.bind,
            source,
        })?;

    log::info!(
        "serving {} on http://{} (default format {})",
        config.photos_root.display(),
        addr,
        default_format
    );
    server.await;
    log::info!("shut down");
    Ok(())
}
