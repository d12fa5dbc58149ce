//! Precomputed gallery thumbnails.
//!
//! The catalog advertises `/photos/thumbnails/<stem>.webp` for every original.
//! This batch produces those files: each original is fitted inside the
//! configured box (600×600 by default, aspect ratio preserved, never
//! enlarged) and written as WebP.
//!
//! ## Output Structure
//!
//! ```text
//! photos/
//! ├── IMG_1.jpg
//! ├── IMG_2.png
//! └── thumbnails/
//!     ├── IMG_1.webp
//!     └── IMG_2.webp
//! ```
//!
//! A thumbnail newer than its original is left alone unless `force` is set.
//! Thumbnails are written atomically. When two originals share a stem
//! (`a.jpg`, `a.png`) the first in filename order gets `a.webp` and the other
//! is reported as failed.
//! Originals are processed in parallel on the current rayon pool; one
//! failing original is reported and the batch continues.

use crate::catalog::{self, CatalogError};
use crate::config::ThumbnailsConfig;
use crate::imaging::{ImageBackend, Quality, ThumbnailParams};
use crate::naming;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Directory under the photos root that holds precomputed thumbnails.
pub const THUMBNAILS_DIR: &str = "thumbnails";

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome for one original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailStatus {
    Created,
    /// Existing thumbnail is newer than the original.
    Fresh,
    Failed(String),
}

/// Progress events emitted while the batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailEvent {
    Started { total: usize },
    Processed { filename: String, status: ThumbnailStatus },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailReport {
    pub created: usize,
    pub fresh: usize,
    /// `(filename, reason)` for each original that could not be processed.
    pub failed: Vec<(String, String)>,
}

/// Generate thumbnails for every original in `photos_root`.
pub fn generate_thumbnails<B: ImageBackend + ?Sized>(
    backend: &B,
    photos_root: &Path,
    config: &ThumbnailsConfig,
    force: bool,
    events: Option<Sender<ThumbnailEvent>>,
) -> Result<ThumbnailReport, ThumbnailError> {
    let filenames = catalog::photo_filenames(photos_root)?;
    let out_dir = photos_root.join(THUMBNAILS_DIR);
    fs::create_dir_all(&out_dir)?;

    let emit = |event: ThumbnailEvent| {
        if let Some(tx) = &events {
            let _ = tx.send(event);
        }
    };
    emit(ThumbnailEvent::Started {
        total: filenames.len(),
    });

    // Filenames are sorted, so the first original with a given stem owns
    // its thumbnail.
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let jobs: Vec<(String, Option<String>)> = filenames
        .iter()
        .map(|filename| {
            let owner = owners
                .entry(naming::file_stem(filename))
                .or_insert(filename.as_str());
            let shared_with = (*owner != filename.as_str()).then(|| owner.to_string());
            (filename.clone(), shared_with)
        })
        .collect();

    let statuses: Vec<(String, ThumbnailStatus)> = jobs
        .into_par_iter()
        .map(|(filename, shared_with)| {
            let status = match shared_with {
                Some(owner) => {
                    log::warn!(
                        "{} and {} share a thumbnail name; keeping the one for {}",
                        owner,
                        filename,
                        owner
                    );
                    ThumbnailStatus::Failed(format!("thumbnail name already used by {owner}"))
                }
                None => thumbnail_one(backend, photos_root, &out_dir, &filename, config, force),
            };
            emit(ThumbnailEvent::Processed {
                filename: filename.clone(),
                status: status.clone(),
            });
            (filename, status)
        })
        .collect();

    let mut report = ThumbnailReport::default();
    for (filename, status) in statuses {
        match status {
            ThumbnailStatus::Created => report.created += 1,
            ThumbnailStatus::Fresh => report.fresh += 1,
            ThumbnailStatus::Failed(reason) => report.failed.push((filename, reason)),
        }
    }
    Ok(report)
}

fn thumbnail_one<B: ImageBackend + ?Sized>(
    backend: &B,
    photos_root: &Path,
    out_dir: &Path,
    filename: &str,
    config: &ThumbnailsConfig,
    force: bool,
) -> ThumbnailStatus {
    let source = photos_root.join(filename);
    let output = out_dir.join(format!("{}.webp", naming::file_stem(filename)));

    if !force && is_fresh(&source, &output) {
        return ThumbnailStatus::Fresh;
    }

    let params = ThumbnailParams {
        source,
        output,
        max_width: config.width,
        max_height: config.height,
        quality: Quality::new(config.quality),
    };
    match backend.thumbnail(&params) {
        Ok(()) => ThumbnailStatus::Created,
        Err(e) => {
            log::warn!("thumbnail for {} failed: {}", filename, e);
            ThumbnailStatus::Failed(e.to_string())
        }
    }
}

fn is_fresh(source: &Path, output: &Path) -> bool {
    let mtime = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (mtime(source), mtime(output)) {
        (Some(src), Some(out)) => out >= src,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::{set_mtime, utc, write_original, write_test_jpeg};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn config() -> ThumbnailsConfig {
        ThumbnailsConfig::default()
    }

    #[test]
    fn creates_one_thumbnail_per_original() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2020, 1, 1, 0, 0, 0));
        write_original(tmp.path(), "b.png", utc(2020, 1, 1, 0, 0, 0));
        write_original(tmp.path(), "notes.txt", utc(2020, 1, 1, 0, 0, 0));

        let backend = MockBackend::new();
        let report = generate_thumbnails(&backend, tmp.path(), &config(), false, None).unwrap();

        assert_eq!(report.created, 2);
        assert!(tmp.path().join("thumbnails/a.webp").is_file());
        assert!(tmp.path().join("thumbnails/b.webp").is_file());

        let mut ops = backend.get_operations();
        ops.sort_by_key(|op| format!("{op:?}"));
        assert_eq!(
            ops,
            vec![
                RecordedOp::Thumbnail {
                    source: "a.jpg".into(),
                    output: "a.webp".into(),
                    max_width: 600,
                    max_height: 600,
                },
                RecordedOp::Thumbnail {
                    source: "b.png".into(),
                    output: "b.webp".into(),
                    max_width: 600,
                    max_height: 600,
                },
            ]
        );
    }

    #[test]
    fn fresh_thumbnails_are_skipped_unless_forced() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2020, 1, 1, 0, 0, 0));
        fs::create_dir_all(tmp.path().join(THUMBNAILS_DIR)).unwrap();
        write_original(
            &tmp.path().join(THUMBNAILS_DIR),
            "a.webp",
            utc(2021, 1, 1, 0, 0, 0),
        );

        let backend = MockBackend::new();
        let report = generate_thumbnails(&backend, tmp.path(), &config(), false, None).unwrap();
        assert_eq!((report.created, report.fresh), (0, 1));
        assert!(backend.get_operations().is_empty());

        let report = generate_thumbnails(&backend, tmp.path(), &config(), true, None).unwrap();
        assert_eq!((report.created, report.fresh), (1, 0));
    }

    #[test]
    fn stale_thumbnail_is_regenerated() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2022, 1, 1, 0, 0, 0));
        fs::create_dir_all(tmp.path().join(THUMBNAILS_DIR)).unwrap();
        write_original(
            &tmp.path().join(THUMBNAILS_DIR),
            "a.webp",
            utc(2021, 1, 1, 0, 0, 0),
        );

        let report =
            generate_thumbnails(&MockBackend::new(), tmp.path(), &config(), false, None).unwrap();
        assert_eq!(report.created, 1);
    }

    #[test]
    fn failures_are_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2020, 1, 1, 0, 0, 0));

        let report =
            generate_thumbnails(&MockBackend::failing(), tmp.path(), &config(), false, None)
                .unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a.jpg");
    }

    #[test]
    fn shared_stem_keeps_first_original() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2020, 1, 1, 0, 0, 0));
        write_original(tmp.path(), "a.png", utc(2020, 1, 1, 0, 0, 0));

        let backend = MockBackend::new();
        let report = generate_thumbnails(&backend, tmp.path(), &config(), false, None).unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a.png");
        assert!(report.failed[0].1.contains("a.jpg"));
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Thumbnail {
                source: "a.jpg".into(),
                output: "a.webp".into(),
                max_width: 600,
                max_height: 600,
            }]
        );
    }

    #[test]
    fn events_report_progress() {
        let tmp = TempDir::new().unwrap();
        write_original(tmp.path(), "a.jpg", utc(2020, 1, 1, 0, 0, 0));

        let (tx, rx) = mpsc::channel();
        generate_thumbnails(&MockBackend::new(), tmp.path(), &config(), false, Some(tx)).unwrap();
        let events: Vec<_> = rx.iter().collect();

        assert_eq!(
            events,
            vec![
                ThumbnailEvent::Started { total: 1 },
                ThumbnailEvent::Processed {
                    filename: "a.jpg".into(),
                    status: ThumbnailStatus::Created,
                },
            ]
        );
    }

    #[test]
    fn real_thumbnail_fits_box() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("wide.jpg");
        write_test_jpeg(&source, 1200, 400);
        set_mtime(&source, utc(2020, 1, 1, 0, 0, 0));

        let report =
            generate_thumbnails(&RustBackend::new(), tmp.path(), &config(), false, None).unwrap();
        assert_eq!(report.created, 1);

        let thumb = image::open(tmp.path().join("thumbnails/wide.webp")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (600, 200));
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join(THUMBNAILS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("wide.webp")]);
    }

    #[test]
    fn missing_photos_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = generate_thumbnails(
            &MockBackend::new(),
            &tmp.path().join("nope"),
            &config(),
            false,
            None,
        );
        assert!(matches!(result, Err(ThumbnailError::Catalog(_))));
    }
}
