use std::collections::BTreeSet;
use unicode_width::UnicodeWidthStr;

use crate::db::models::{DbStats, SubjectSummary, Version, VersionMeta};
use crate::jobs::Job;
use crate::models::is_installed;
use crate::render::StructuredDocument;

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Left-align `s` in a column `width` cells wide.
fn pad(s: &str, width: usize) -> String {
    let s = truncate(s, width);
    let fill = width.saturating_sub(UnicodeWidthStr::width(s.as_str()));
    format!("{s}{}", " ".repeat(fill))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Subjects with stored summaries, for `vsum list`.
pub fn print_subject_list(subjects: &[SubjectSummary]) {
    if subjects.is_empty() {
        println!("No summaries stored yet.");
        return;
    }

    println!("{} subject{}:\n", subjects.len(), plural(subjects.len()));
    println!("  {} {:<9} {:<12}", pad("SUBJECT", 52), "VERSIONS", "LAST");
    println!("  {}", "-".repeat(76));

    for s in subjects {
        let date_short = s.last_generated_at.get(..10).unwrap_or(&s.last_generated_at);
        println!(
            "  {} {:<9} {:<12}",
            pad(&s.subject, 52),
            s.versions,
            date_short
        );
    }
}

/// Version history for `vsum versions`.
pub fn print_versions(subject: &str, versions: &[VersionMeta], latest: Option<i64>) {
    if versions.is_empty() {
        println!("No versions for {subject}");
        return;
    }

    println!("{subject}: {} version{}\n", versions.len(), plural(versions.len()));
    for v in versions {
        let marker = if Some(v.version) == latest { "*" } else { " " };
        println!(
            "  {marker} {}  {}",
            pad(&v.display_label(), 30),
            truncate(&v.model_used, 40)
        );
    }
    if latest.is_some() {
        println!("\n  * current");
    }
}

/// Job history for `vsum jobs`.
pub fn print_jobs(subject: &str, jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs for {subject}");
        return;
    }

    println!("{} job{} for {subject}:\n", jobs.len(), plural(jobs.len()));
    println!("  {:<38} {:<11} {:>5}  {:<20}", "TASK", "STATUS", "PCT", "CREATED");
    println!("  {}", "-".repeat(76));
    for job in jobs {
        let pct = job
            .progress_percent
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<38} {:<11} {:>5}  {:<20}",
            job.task_id, job.status, pct, job.created_at
        );
        if let Some(ref err) = job.error {
            println!("    └─ {}", truncate(err, 72));
        }
    }
}

/// One job's state for `vsum status`.
pub fn print_job(job: &Job) {
    println!("Job: {}", job.task_id);
    println!("  Subject:  {}", job.subject);
    println!("  Status:   {}", job.status);
    if let Some(p) = job.progress_percent {
        println!("  Progress: {p}%");
    }
    if let Some(ref model) = job.model_hint {
        println!("  Model:    {model}");
    }
    println!("  Created:  {}", job.created_at);
    println!("  Updated:  {}", job.updated_at);
    if let Some(ref err) = job.error {
        println!("  Error:    {err}");
    }
}

/// Single-line progress for `generate` and `watch`.
pub fn progress_line(job: &Job) -> String {
    let filled = usize::from(job.progress_percent.unwrap_or(0)) / 5;
    format!(
        "[{}{}] {:>3}% {} {}",
        "#".repeat(filled),
        ".".repeat(20 - filled),
        job.progress_percent.unwrap_or(0),
        job.status,
        truncate(&job.subject, 40)
    )
}

/// A stored version rendered as markdown, for `vsum show`.
pub fn print_version(version: &Version, doc: &StructuredDocument) {
    println!("# {}", version.subject);
    println!(
        "{} • {} • {}\n",
        version_label(version),
        version.model_used,
        format_duration(version.processing_time_seconds)
    );
    print_document(doc);
}

pub fn print_document(doc: &StructuredDocument) {
    if doc.is_empty() {
        println!("(empty summary)");
    } else {
        println!("{}", doc.to_markdown());
    }
}

fn version_label(version: &Version) -> String {
    format!("v{} {}", version.version, version.generated_at)
}

/// Installed models for `vsum models`.
pub fn print_models(installed: &BTreeSet<String>, default_model: &str) {
    if installed.is_empty() {
        println!("No models installed. Try: vsum pull {default_model}");
        return;
    }
    println!("{} model{} installed:\n", installed.len(), plural(installed.len()));
    for name in installed {
        println!("  {name}");
    }
    let note = if is_installed(installed, default_model) {
        "installed"
    } else {
        "not installed"
    };
    println!("\n  Default: {default_model} ({note})");
}

/// Print database stats for `vsum info`.
pub fn print_stats(stats: &DbStats, schema_version: &str, db_path: &str) {
    println!("vsum v{}", env!("CARGO_PKG_VERSION"));
    println!("  Schema:      v{schema_version}");
    println!("  Database:    {db_path}");
    println!("  Size:        {}", format_bytes(stats.db_size_bytes));
    println!("  Subjects:    {}", stats.subjects);
    println!("  Versions:    {}", stats.versions);
    println!(
        "  Jobs:        {} ({} active, {} failed)",
        stats.jobs, stats.active_jobs, stats.failed_jobs
    );
    if stats.versions > 0 {
        println!(
            "  Avg. time:   {}",
            format_duration(stats.avg_processing_seconds)
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
