//! Photo catalog: the chronologically ordered list of originals.
//!
//! ## Directory layout
//!
//! ```text
//! photos/                          # Originals root
//! ├── 20230601_120000_B.jpg        # Original (listed)
//! ├── photo_A.jpg                  # Original (listed)
//! ├── notes.txt                    # Not a photo (ignored)
//! ├── thumbnails/                  # Precomputed thumbnails (ignored)
//! │   └── photo_A.webp
//! └── resized/                     # Derivative cache (ignored)
//!     └── webp/640/photo_A.webp
//! ```
//!
//! Only regular files directly inside the root with a photo extension
//! (`jpg`, `jpeg`, `png`, `webp`, any case) are listed.
//!
//! ## Ordering
//!
//! Each listed file gets a capture date from [`metadata::resolve`]. The result
//! is sorted most recent first; photos without a date go last; equal dates
//! fall back to filename order so repeated listings are identical.
//!
//! ## Failure model
//!
//! An unreadable directory fails the whole listing. Anything wrong with a
//! single file (a stat failure, a non-UTF-8 name, a file deleted while the
//! listing runs) drops that file with a warning and the rest of the listing
//! proceeds.

use crate::imaging::ImageBackend;
use crate::metadata;
use crate::naming;
use crate::types::PhotoRecord;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot list photos in {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Names of the photo files directly inside `dir`, in byte order.
pub fn photo_filenames(dir: &Path) -> Result<Vec<String>, CatalogError> {
    let read_err = |source| CatalogError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let Ok(filename) = entry.file_name().into_string() else {
            log::warn!(
                "skipping non-UTF-8 file name {:?} in {}",
                entry.file_name(),
                dir.display()
            );
            continue;
        };
        if !naming::is_photo_filename(&filename) {
            continue;
        }
        // Follows symlinks, so a link to a photo is listed like the photo.
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => names.push(filename),
            Ok(_) => {}
            Err(e) => log::warn!("skipping {}: {}", filename, e),
        }
    }
    names.sort();
    Ok(names)
}

/// List the originals in `dir`, newest first.
///
/// Metadata resolution runs on the current rayon pool; call it from inside
/// [`rayon::ThreadPool::install`] to bound the parallelism.
pub fn list_photos<B: ImageBackend + ?Sized>(
    backend: &B,
    dir: &Path,
) -> Result<Vec<PhotoRecord>, CatalogError> {
    let mut records = resolve_records(backend, dir, photo_filenames(dir)?);
    sort_records(&mut records);
    Ok(records)
}

/// Resolve a record per filename. A file with no readable timestamp has
/// vanished or cannot be stat'ed, so it is dropped.
fn resolve_records<B: ImageBackend + ?Sized>(
    backend: &B,
    dir: &Path,
    filenames: Vec<String>,
) -> Vec<PhotoRecord> {
    filenames
        .into_par_iter()
        .filter_map(|filename| {
            let resolved = metadata::resolve(backend, &dir.join(&filename));
            let Some(date) = resolved.timestamp else {
                log::warn!("dropping {} from the catalog: no readable date", filename);
                return None;
            };
            Some(PhotoRecord {
                url: naming::photo_url(&filename),
                thumbnail_url: naming::thumbnail_url(&filename),
                date: Some(date),
                date_source: resolved.source,
                filename,
            })
        })
        .collect()
}

/// Sort records in catalog order: dated before undated, newest first, then
/// filename ascending by byte order.
pub fn sort_records(records: &mut [PhotoRecord]) {
    records.sort_by(catalog_order);
}

fn catalog_order(a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
    let by_date = match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then_with(|| a.filename.as_bytes().cmp(b.filename.as_bytes()))
}
