//! CLI output formatting.
//!
//! Every image is shown by its positional index and filename, with sizes and
//! failures as indented context lines.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! Images
//! 001 IMG_0042.jpg (4032x3024)
//!     Size: 5.1 MB → 1.8 MB
//! 002 cat.png (800x600)
//!     Size: 412 KB
//!
//! Failed
//!     notes.jpg: Decode failed: ...
//!
//! Loaded 2 images, 1 failed
//! ```
//!
//! ## Export
//!
//! ```text
//! 001 Hello_World.jpg
//! 002 captioned-IMG_0042.jpg
//!
//! Skipped
//!     raw.png
//!
//! Exported 2 files to out/
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::export::DirectoryArchive;
use crate::session::{ExportReport, IngestReport};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte size with one decimal above a kilobyte.
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.0} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

pub fn format_ingest_output(report: &IngestReport) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.added.is_empty() {
        lines.push("Images".to_string());
        for (i, item) in report.added.iter().enumerate() {
            lines.push(format!(
                "{} {} ({}x{})",
                format_index(i + 1),
                item.filename,
                item.width,
                item.height
            ));
            if item.stored_size != item.original_size {
                lines.push(format!(
                    "{}Size: {} → {}",
                    indent(1),
                    format_size(item.original_size),
                    format_size(item.stored_size)
                ));
            } else if item.original_size > 0 {
                lines.push(format!("{}Size: {}", indent(1), format_size(item.original_size)));
            }
        }
    }

    if !report.failed.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Failed".to_string());
        for failure in &report.failed {
            lines.push(format!("{}{}: {}", indent(1), failure.filename, failure.source));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let mut summary = format!("Loaded {}", plural(report.added.len(), "image", "images"));
    if !report.failed.is_empty() {
        summary.push_str(&format!(", {} failed", report.failed.len()));
    }
    lines.push(summary);
    lines
}

pub fn print_ingest_output(report: &IngestReport) {
    for line in format_ingest_output(report) {
        println!("{}", line);
    }
}

pub fn format_export_output(report: &ExportReport<DirectoryArchive>) -> Vec<String> {
    let mut lines = Vec::new();

    for (i, entry) in report.archive.entries.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), entry.filename));
    }

    if !report.skipped.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Skipped".to_string());
        for item in &report.skipped {
            lines.push(format!("{}{}", indent(1), item.filename));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Exported {} to {}/",
        plural(report.archive.entries.len(), "file", "files"),
        report.archive.dir.display()
    ));
    lines
}

pub fn print_export_output(report: &ExportReport<DirectoryArchive>) {
    for line in format_export_output(report) {
        println!("{}", line);
    }
}
