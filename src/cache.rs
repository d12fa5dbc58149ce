//! Derivative cache for resized and transcoded photos.
//!
//! Decoding a 24-megapixel original and re-encoding it takes hundreds of
//! milliseconds; serving the stored result takes microseconds. Every
//! derivative is generated once and served from the cache afterwards.
//!
//! # Design
//!
//! ## Keys and paths
//!
//! A [`DerivativeKey`] is (original basename, width, format, quality). It maps
//! to exactly one path under the cache root (`<photos>/resized`):
//!
//! ```text
//! resized/<format>/<width>/<stem>.<ext>             # default quality
//! resized/<format>/<width>/q<quality>/<stem>.<ext>  # any other quality
//! ```
//!
//! Keeping the default-quality layout flat means the common case has the
//! shortest URL-independent path and existing caches stay valid.
//!
//! ## Freshness
//!
//! A stored derivative is fresh when its modification time is at or after the
//! original's. Touching an original therefore regenerates all of its
//! derivatives on next request. Rewriting an original while preserving its
//! mtime is not detected.
//!
//! ## Single flight
//!
//! Concurrent requests for one key inside one process generate it once. The
//! first caller takes a per-key lock and generates; the others wait on the
//! lock, re-check freshness, and are served the stored result. Different keys
//! never wait on each other.
//!
//! ## Failure
//!
//! - A failed generation stores nothing; the next request tries again.
//! - A failed write is logged and counted, and the generated bytes are still
//!   returned to the caller.
//!
//! ## Storage
//!
//! Storage is behind the [`DerivativeStore`] trait. [`DiskStore`] writes each
//! derivative to a hidden temporary sibling and renames it into place, so a
//! reader sees either the old file or the complete new one. [`MemoryStore`]
//! keeps everything in a map, for tests and throwaway deployments.
//!
//! ## Orphans
//!
//! Derivatives of deleted originals are never served but still take disk
//! space. [`sweep_orphans`] removes them.

use crate::imaging::{OutputFormat, Quality};
use crate::naming;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Directory under the photos root that holds all derivatives.
pub const RESIZED_DIR: &str = "resized";

/// Identity of one derivative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    pub basename: String,
    pub width: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}

impl DerivativeKey {
    /// Path of this derivative relative to the cache root.
    pub fn relative_path(&self, default_quality: Quality) -> PathBuf {
        let mut path = PathBuf::from(self.format.extension());
        path.push(self.width.to_string());
        if self.quality != default_quality {
            path.push(format!("q{}", self.quality.value()));
        }
        path.push(format!(
            "{}.{}",
            naming::file_stem(&self.basename),
            self.format.extension()
        ));
        path
    }
}

/// A derivative as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredDerivative {
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

/// Backing storage for derivatives, addressed by path relative to the cache
/// root.
pub trait DerivativeStore: Send + Sync {
    /// Read a derivative. `Ok(None)` when nothing is stored at `path`.
    fn load(&self, path: &Path) -> io::Result<Option<StoredDerivative>>;

    /// Store a derivative, replacing any previous one. Last write wins.
    fn save(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Derivatives as files under a root directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

const TEMP_SUFFIX: &str = ".tmp";

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

fn temp_path(target: &Path) -> PathBuf {
    let n = NEXT_TEMP.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.{}{}", name, std::process::id(), n, TEMP_SUFFIX))
}

/// Write `bytes` to a hidden temporary sibling of `target`, then rename it
/// into place. Readers see the old file or the complete new one, never a
/// partial write. Creates missing parent directories.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = temp_path(target);
    if let Err(e) = fs::write(&temp, bytes).and_then(|()| fs::rename(&temp, target)) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

impl DerivativeStore for DiskStore {
    fn load(&self, path: &Path) -> io::Result<Option<StoredDerivative>> {
        let mut file = match fs::File::open(self.root.join(path)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let modified = file.metadata()?.modified()?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Some(StoredDerivative { bytes, modified }))
    }

    fn save(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        write_atomic(&self.root.join(path), bytes)
    }
}

/// Derivatives in process memory. Stamped with the time of the write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PathBuf, StoredDerivative>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DerivativeStore for MemoryStore {
    fn load(&self, path: &Path) -> io::Result<Option<StoredDerivative>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned())
    }

    fn save(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                path.to_path_buf(),
                StoredDerivative {
                    bytes: bytes.to_vec(),
                    modified: SystemTime::now(),
                },
            );
        Ok(())
    }
}

/// Whether a derivative was served from storage or generated for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Generated,
}

impl CacheStatus {
    /// Value of the `X-Cache` response header.
    pub fn header_value(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Generated => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Derivative {
    pub bytes: Vec<u8>,
    pub status: CacheStatus,
}

/// Per-key mutexes. Entries hold only weak references, so a key's mutex is
/// freed once no caller holds it.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl KeyedLocks {
    fn acquire(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        if locks.len() >= 64 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.to_path_buf(), Arc::downgrade(&lock));
        lock
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    generated: AtomicU64,
    write_failures: AtomicU64,
}

/// Snapshot of cache activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub generated: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.generated
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits,
                self.generated,
                self.total()
            )?;
        } else {
            write!(f, "{} generated", self.generated)?;
        }
        if self.write_failures > 0 {
            write!(f, ", {} not stored", self.write_failures)?;
        }
        Ok(())
    }
}

/// Single-flight, freshness-checked derivative cache.
pub struct DerivativeCache {
    store: Box<dyn DerivativeStore>,
    default_quality: Quality,
    locks: KeyedLocks,
    counters: Counters,
}

impl DerivativeCache {
    /// `default_quality` selects which quality uses the flat path layout.
    pub fn new(store: impl DerivativeStore + 'static, default_quality: Quality) -> Self {
        Self {
            store: Box::new(store),
            default_quality,
            locks: KeyedLocks::default(),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            generated: self.counters.generated.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Return the derivative for `key`, generating it with `generate` when
    /// nothing fresh is stored.
    ///
    /// `original` is the source file; its modification time decides
    /// freshness. A missing original is an `io::ErrorKind::NotFound` error.
    /// Blocks while another caller generates the same key.
    pub fn get_or_create<E, F>(
        &self,
        original: &Path,
        key: &DerivativeKey,
        generate: F,
    ) -> Result<Derivative, E>
    where
        E: From<io::Error>,
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        let original_mtime = fs::metadata(original)?.modified()?;
        let path = key.relative_path(self.default_quality);

        if let Some(hit) = self.fresh(&path, original_mtime) {
            return Ok(hit);
        }

        let lock = self.locks.acquire(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have generated it while we waited.
        if let Some(hit) = self.fresh(&path, original_mtime) {
            return Ok(hit);
        }

        let bytes = generate()?;
        self.counters.generated.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.store.save(&path, &bytes) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("failed to store derivative {}: {}", path.display(), e);
        }
        Ok(Derivative {
            bytes,
            status: CacheStatus::Generated,
        })
    }

    fn fresh(&self, path: &Path, original_mtime: SystemTime) -> Option<Derivative> {
        match self.store.load(path) {
            Ok(Some(stored)) if stored.modified >= original_mtime => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(Derivative {
                    bytes: stored.bytes,
                    status: CacheStatus::Hit,
                })
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("failed to read derivative {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Outcome of an orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Derivative files examined.
    pub scanned: usize,
    /// Files deleted, relative to the cache root.
    pub removed: Vec<PathBuf>,
    pub bytes_freed: u64,
}

/// Delete derivatives whose original no longer exists in `photos_root`, plus
/// temporary files left behind by interrupted writes.
///
/// A derivative belongs to any original with the same stem. Directories left
/// empty are removed. A missing `cache_root` is an empty sweep; an unreadable
/// `photos_root` is an error, since nothing could be safely judged orphaned.
pub fn sweep_orphans(photos_root: &Path, cache_root: &Path) -> io::Result<SweepReport> {
    let mut stems = HashSet::new();
    for entry in fs::read_dir(photos_root)? {
        let name = entry?.file_name();
        if let Some(name) = name.to_str()
            && naming::is_photo_filename(name)
        {
            stems.insert(naming::file_stem(name).to_string());
        }
    }

    let mut report = SweepReport::default();
    if !cache_root.is_dir() {
        return Ok(report);
    }

    for entry in WalkDir::new(cache_root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("sweep: {}", e);
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            // Succeeds only when empty.
            let _ = fs::remove_dir(path);
            continue;
        }

        report.scanned += 1;
        let name = entry.file_name().to_string_lossy();
        let orphaned = is_temp_file(&name) || !stems.contains(naming::file_stem(&name));
        if !orphaned {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(path) {
            Ok(()) => {
                log::debug!("sweep: removed {}", path.display());
                report.bytes_freed += size;
                report
                    .removed
                    .push(path.strip_prefix(cache_root).unwrap_or(path).to_path_buf());
            }
            Err(e) => log::warn!("sweep: cannot remove {}: {}", path.display(), e),
        }
    }

    report.removed.sort();
    Ok(report)
}
