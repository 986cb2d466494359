//! Machine-readable chapter block embedded in transcript text.
//!
//! Format: the literal `[JUMP_POINTS]` followed by a JSON array of objects,
//! e.g. `[JUMP_POINTS][{"seconds": 83, "title": "Install"}]`. Time may be
//! given as `seconds`, `t` or `time`; the label as `title` or `label`.

use serde_json::Value;
use tracing::debug;

use super::timestamps::parse_timestamp;
use super::{Chapter, PLACEHOLDER_LABEL};

pub const JUMP_POINTS_MARKER: &str = "[JUMP_POINTS]";

const MAX_LABEL_CHARS: usize = 100;

/// Chapters from the sidecar block, in array order. Missing or malformed
/// blocks yield an empty list.
pub fn parse_sidecar(transcript: &str) -> Vec<Chapter> {
    let Some(pos) = transcript.find(JUMP_POINTS_MARKER) else {
        return Vec::new();
    };
    let rest = &transcript[pos + JUMP_POINTS_MARKER.len()..];

    let Some(block) = first_balanced_array(rest) else {
        debug!("Jump point marker present but no complete array follows");
        return Vec::new();
    };

    let items: Vec<Value> = match serde_json::from_str(block) {
        Ok(items) => items,
        Err(e) => {
            debug!("Ignoring malformed jump point block: {e}");
            return Vec::new();
        }
    };

    items.iter().filter_map(chapter_from_value).collect()
}

/// Transcript text with a chapter block appended after a blank line.
pub fn append_sidecar(transcript: &str, chapters: &[Chapter]) -> String {
    if chapters.is_empty() {
        return transcript.to_string();
    }
    let records: Vec<Value> = chapters
        .iter()
        .map(|c| serde_json::json!({ "seconds": c.seconds, "title": c.label }))
        .collect();
    format!(
        "{}\n\n{}{}",
        transcript.trim_end(),
        JUMP_POINTS_MARKER,
        Value::Array(records)
    )
}

/// Transcript text with any chapter block removed.
pub fn strip_sidecar(transcript: &str) -> &str {
    match transcript.find(JUMP_POINTS_MARKER) {
        Some(pos) => transcript[..pos].trim_end(),
        None => transcript,
    }
}

fn chapter_from_value(item: &Value) -> Option<Chapter> {
    let obj = item.as_object()?;
    let time = ["seconds", "t", "time"].iter().find_map(|k| obj.get(*k))?;

    let seconds = match time {
        Value::Number(n) => {
            let f = n.as_f64()?;
            if !in_range(f) {
                return None;
            }
            f.round() as u32
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| in_range(*f))
            .map(|f| f.round() as u32)
            .or_else(|| parse_timestamp(s))?,
        _ => return None,
    };

    let label = ["title", "label"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(MAX_LABEL_CHARS).collect::<String>())
        .unwrap_or_else(|| PLACEHOLDER_LABEL.to_string());

    Some(Chapter { seconds, label })
}

fn in_range(seconds: f64) -> bool {
    seconds.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&seconds.round())
}

/// The first `[...]` region with balanced brackets, ignoring brackets inside
/// JSON strings.
fn first_balanced_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(chapters: &[Chapter]) -> Vec<(u32, &str)> {
        chapters.iter().map(|c| (c.seconds, c.label.as_str())).collect()
    }

    #[test]
    fn accepts_synonymous_field_names() {
        let t = r#"transcript body

[JUMP_POINTS][{"seconds": 83, "title": "Install"}, {"t": 120.4, "label": "Configure"}, {"time": "2:30", "title": "Run"}]"#;
        assert_eq!(
            pairs(&parse_sidecar(t)),
            vec![(83, "Install"), (120, "Configure"), (150, "Run")]
        );
    }

    #[test]
    fn brackets_inside_labels_do_not_end_the_block() {
        let t = r#"[JUMP_POINTS][{"seconds": 5, "title": "Arrays [part 1]"}] trailing [junk"#;
        assert_eq!(pairs(&parse_sidecar(t)), vec![(5, "Arrays [part 1]")]);
    }

    #[test]
    fn malformed_blocks_yield_nothing() {
        assert!(parse_sidecar("no marker here").is_empty());
        assert!(parse_sidecar("[JUMP_POINTS] {not an array}").is_empty());
        assert!(parse_sidecar("[JUMP_POINTS][{\"seconds\": 5,").is_empty());
        assert!(parse_sidecar("[JUMP_POINTS][{\"seconds\": }]").is_empty());
    }

    #[test]
    fn skips_records_without_usable_time() {
        let t = r#"[JUMP_POINTS][{"title": "no time"}, {"seconds": -3, "title": "neg"}, "str", {"seconds": 7}]"#;
        assert_eq!(pairs(&parse_sidecar(t)), vec![(7, PLACEHOLDER_LABEL)]);
    }

    #[test]
    fn out_of_range_times_are_skipped() {
        let t = r#"[JUMP_POINTS][{"t": "2000000:00:00", "title": "x"}, {"time": "99999999:00"}, {"seconds": 1e12}, {"seconds": 9, "title": "ok"}]"#;
        assert_eq!(pairs(&parse_sidecar(t)), vec![(9, "ok")]);

        let doc = crate::render::parse_summary(
            "KEY POINTS\n- a",
            Some(r#"[JUMP_POINTS][{"t": "2000000:00:00", "title": "x"}]"#),
        );
        assert_eq!(doc.key_points, vec!["a"]);
        assert!(doc.chapters.is_empty());
    }

    #[test]
    fn append_then_strip_restores_transcript() {
        let chapters = vec![Chapter {
            seconds: 42,
            label: "Answer".into(),
        }];
        let combined = append_sidecar("spoken words\n", &chapters);
        assert!(combined.starts_with("spoken words\n\n[JUMP_POINTS]"));
        assert_eq!(pairs(&parse_sidecar(&combined)), vec![(42, "Answer")]);
        assert_eq!(strip_sidecar(&combined), "spoken words");
        assert_eq!(append_sidecar("plain", &[]), "plain");
    }
}
