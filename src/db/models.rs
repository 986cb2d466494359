use serde::{Deserialize, Serialize};

/// A stored summary snapshot. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub subject: String,
    pub version: i64,
    pub model_used: String,
    pub generated_at: String,
    pub processing_time_seconds: f64,
    pub summary_text: String,
    pub transcript_text: Option<String>,
    pub task_id: Option<String>,
}

/// Listing entry for a version (no text bodies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: i64,
    pub model_used: String,
    pub generated_at: String,
    pub processing_time_seconds: f64,
    pub task_id: Option<String>,
}

impl VersionMeta {
    /// Short label such as `v3 • 10/19/26 • 2.5m`.
    pub fn display_label(&self) -> String {
        let date = chrono::DateTime::parse_from_rfc3339(&self.generated_at)
            .map(|d| d.format("%m/%d/%y").to_string())
            .unwrap_or_else(|_| self.generated_at.get(..10).unwrap_or("").to_string());
        let mut label = format!("v{} • {}", self.version, date);
        if self.processing_time_seconds > 0.0 {
            label.push_str(&format!(" • {:.1}m", self.processing_time_seconds / 60.0));
        }
        label
    }
}

/// Data needed to append a new version (number is assigned by the store).
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub subject: String,
    pub model_used: String,
    pub processing_time_seconds: f64,
    pub summary_text: String,
    pub transcript_text: Option<String>,
    /// Producing job, if any, with its creation sequence number.
    pub job: Option<(String, i64)>,
}

/// Row returned by `vsum list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub versions: i64,
    pub latest_version: i64,
    pub last_generated_at: String,
}

/// Stats returned by `vsum info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub subjects: i64,
    pub versions: i64,
    pub jobs: i64,
    pub active_jobs: i64,
    pub failed_jobs: i64,
    pub avg_processing_seconds: f64,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_label_includes_minutes_when_timed() {
        let meta = VersionMeta {
            version: 3,
            model_used: "llama3.2".into(),
            generated_at: "2026-10-19T08:00:00Z".into(),
            processing_time_seconds: 150.0,
            task_id: None,
        };
        assert_eq!(meta.display_label(), "v3 • 10/19/26 • 2.5m");
    }

    #[test]
    fn display_label_without_timing() {
        let meta = VersionMeta {
            version: 1,
            model_used: String::new(),
            generated_at: "2026-01-02T00:00:00Z".into(),
            processing_time_seconds: 0.0,
            task_id: None,
        };
        assert_eq!(meta.display_label(), "v1 • 01/02/26");
    }
}
