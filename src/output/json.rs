use anyhow::Result;
use serde::Serialize;

use crate::db::models::Version;
use crate::render::StructuredDocument;

/// Pretty-print any serializable value as JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// `vsum show --json` payload: version metadata plus its rendered document.
#[derive(Debug, Serialize)]
pub struct RenderedVersion<'a> {
    pub subject: &'a str,
    pub version: i64,
    pub model_used: &'a str,
    pub generated_at: &'a str,
    pub processing_time_seconds: f64,
    pub task_id: Option<&'a str>,
    pub document: &'a StructuredDocument,
}

impl<'a> RenderedVersion<'a> {
    pub fn new(version: &'a Version, document: &'a StructuredDocument) -> Self {
        RenderedVersion {
            subject: &version.subject,
            version: version.version,
            model_used: &version.model_used,
            generated_at: &version.generated_at,
            processing_time_seconds: version.processing_time_seconds,
            task_id: version.task_id.as_deref(),
            document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::parse_summary;

    #[test]
    fn rendered_version_uses_camel_case_document_fields() {
        let version = Version {
            subject: "a.mp4".into(),
            version: 2,
            model_used: "llama3.2:3b".into(),
            generated_at: "2026-10-19T08:00:00Z".into(),
            processing_time_seconds: 3.0,
            summary_text: "DETAILED SUMMARY\n1) Install".into(),
            transcript_text: None,
            task_id: Some("t-1".into()),
        };
        let doc = parse_summary(&version.summary_text, None);
        let value = serde_json::to_value(RenderedVersion::new(&version, &doc)).unwrap();

        assert_eq!(value["version"], 2);
        assert_eq!(value["task_id"], "t-1");
        assert_eq!(value["document"]["keyPoints"], serde_json::json!([]));
        assert_eq!(
            value["document"]["sections"][0]["steps"][0],
            serde_json::json!({ "stepNumber": 1, "text": "Install" })
        );
        assert!(value["document"].get("body").is_none());
    }
}
