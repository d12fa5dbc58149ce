//! CLI output formatting.
//!
//! Every command's human-readable output is built by a pure `format_*`
//! function returning lines, with a thin `print_*` wrapper. Tests assert on
//! the lines; the wrappers only print them.
//!
//! # Output Format
//!
//! ## Catalog
//!
//! ```text
//! Photos (2)
//! 001 20230601_120000_B.jpg
//!     Date: 2023-06-01 12:00:00 UTC (filename)
//! 002 photo_A.jpg
//!     Date: 2020-01-01 00:00:00 UTC (file_mtime)
//! ```
//!
//! ## Thumbnails
//!
//! ```text
//! Thumbnails for 3 photos
//!     a.jpg: created
//!     b.jpg: fresh
//!     c.jpg: failed (Failed to decode c.jpg: ...)
//! 1 created, 1 fresh, 1 failed
//! ```
//!
//! ## Sweep
//!
//! ```text
//! Removed webp/640/deleted.webp
//! Swept 12 derivatives: 1 removed (48213 bytes freed)
//! ```

use crate::cache::SweepReport;
use crate::thumbnails::{ThumbnailEvent, ThumbnailReport, ThumbnailStatus};
use crate::types::PhotoRecord;

/// Positional header: `001 name`.
fn entry_header(position: usize, name: &str) -> String {
    format!("{:03} {}", position, name)
}

// ============================================================================
// Catalog
// ============================================================================

pub fn format_catalog(records: &[PhotoRecord]) -> Vec<String> {
    let mut lines = vec![format!("Photos ({})", records.len())];
    for (i, record) in records.iter().enumerate() {
        lines.push(entry_header(i + 1, &record.filename));
        let date = record
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(format!(
            "    Date: {} ({})",
            date,
            record.date_source.as_str()
        ));
    }
    lines
}

pub fn print_catalog(records: &[PhotoRecord]) {
    for line in format_catalog(records) {
        println!("{}", line);
    }
}

// ============================================================================
// Thumbnails
// ============================================================================

/// Format a single thumbnail progress event as display lines.
pub fn format_thumbnail_event(event: &ThumbnailEvent) -> Vec<String> {
    match event {
        ThumbnailEvent::Started { total } => {
            vec![format!("Thumbnails for {} photos", total)]
        }
        ThumbnailEvent::Processed { filename, status } => {
            let status = match status {
                ThumbnailStatus::Created => "created".to_string(),
                ThumbnailStatus::Fresh => "fresh".to_string(),
                ThumbnailStatus::Failed(reason) => format!("failed ({})", reason),
            };
            vec![format!("    {}: {}", filename, status)]
        }
    }
}

pub fn format_thumbnail_report(report: &ThumbnailReport) -> Vec<String> {
    let mut summary = format!("{} created, {} fresh", report.created, report.fresh);
    if !report.failed.is_empty() {
        summary.push_str(&format!(", {} failed", report.failed.len()));
    }
    vec![summary]
}

pub fn print_thumbnail_report(report: &ThumbnailReport) {
    for line in format_thumbnail_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Sweep
// ============================================================================

pub fn format_sweep_report(report: &SweepReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .removed
        .iter()
        .map(|path| format!("Removed {}", path.display()))
        .collect();
    if report.removed.is_empty() {
        lines.push(format!(
            "Swept {} derivatives: nothing to remove",
            report.scanned
        ));
    } else {
        lines.push(format!(
            "Swept {} derivatives: {} removed ({} bytes freed)",
            report.scanned,
            report.removed.len(),
            report.bytes_freed
        ));
    }
    lines
}

pub fn print_sweep_report(report: &SweepReport) {
    for line in format_sweep_report(report) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DateSource;
    use crate::test_helpers::utc;
    use std::path::PathBuf;

    fn record(name: &str, date: Option<chrono::DateTime<chrono::Utc>>, source: DateSource) -> PhotoRecord {
        PhotoRecord {
            url: crate::naming::photo_url(name),
            filename: name.into(),
            thumbnail_url: crate::naming::thumbnail_url(name),
            date,
            date_source: source,
        }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    #[test]
    fn catalog_lines() {
        let records = vec![
            record(
                "20230601_120000_B.jpg",
                Some(utc(2023, 6, 1, 12, 0, 0)),
                DateSource::Filename,
            ),
            record("gone.jpg", None, DateSource::FileMtime),
        ];
        assert_eq!(
            format_catalog(&records),
            vec![
                "Photos (2)",
                "001 20230601_120000_B.jpg",
                "    Date: 2023-06-01 12:00:00 UTC (filename)",
                "002 gone.jpg",
                "    Date: unknown (file_mtime)",
            ]
        );
    }

    #[test]
    fn empty_catalog() {
        assert_eq!(format_catalog(&[]), vec!["Photos (0)"]);
    }

    // =========================================================================
    // Thumbnails
    // =========================================================================

    #[test]
    fn thumbnail_events() {
        assert_eq!(
            format_thumbnail_event(&ThumbnailEvent::Started { total: 3 }),
            vec!["Thumbnails for 3 photos"]
        );
        assert_eq!(
            format_thumbnail_event(&ThumbnailEvent::Processed {
                filename: "a.jpg".into(),
                status: ThumbnailStatus::Created,
            }),
            vec!["    a.jpg: created"]
        );
        assert_eq!(
            format_thumbnail_event(&ThumbnailEvent::Processed {
                filename: "c.jpg".into(),
                status: ThumbnailStatus::Failed("bad data".into()),
            }),
            vec!["    c.jpg: failed (bad data)"]
        );
    }

    #[test]
    fn thumbnail_report_summary() {
        let clean = ThumbnailReport {
            created: 2,
            fresh: 5,
            failed: vec![],
        };
        assert_eq!(format_thumbnail_report(&clean), vec!["2 created, 5 fresh"]);

        let with_failures = ThumbnailReport {
            created: 1,
            fresh: 0,
            failed: vec![("c.jpg".into(), "bad".into())],
        };
        assert_eq!(
            format_thumbnail_report(&with_failures),
            vec!["1 created, 0 fresh, 1 failed"]
        );
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    #[test]
    fn sweep_report_lines() {
        let report = SweepReport {
            scanned: 12,
            removed: vec![PathBuf::from("webp/640/deleted.webp")],
            bytes_freed: 48213,
        };
        assert_eq!(
            format_sweep_report(&report),
            vec![
                "Removed webp/640/deleted.webp",
                "Swept 12 derivatives: 1 removed (48213 bytes freed)",
            ]
        );
    }

    #[test]
    fn sweep_report_nothing_removed() {
        let report = SweepReport {
            scanned: 4,
            ..SweepReport::default()
        };
        assert_eq!(
            format_sweep_report(&report),
            vec!["Swept 4 derivatives: nothing to remove"]
        );
    }
}
