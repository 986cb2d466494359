//! Structured rendering of generated summaries.
//!
//! `parse_summary` is a pure function over `(summary_text, transcript_text)`:
//! the same input always yields the same [`StructuredDocument`]. It never
//! fails; text it cannot structure degrades to a plain bulleted section or a
//! single verbatim block.

pub mod normalize;
pub mod sidecar;
pub mod timestamps;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use normalize::{BULLET_GLYPHS, DETAILED_SUMMARY, KEY_POINTS};
use timestamps::{find_timestamps, format_timestamp};

/// Label used when a timestamp has no surrounding text.
pub const PLACEHOLDER_LABEL: &str = "Jump";

const DEFAULT_SECTION: &str = "Overview";
const MAX_HEADER_CHARS: usize = 100;
const MAX_LABEL_CHARS: usize = 100;

/// A seekable point in the video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub seconds: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    pub bullet_points: Vec<String>,
    pub steps: Vec<Step>,
}

impl Section {
    fn titled(title: impl Into<String>) -> Self {
        Section {
            title: title.into(),
            ..Default::default()
        }
    }

    fn has_content(&self) -> bool {
        !self.bullet_points.is_empty() || !self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDocument {
    pub key_points: Vec<String>,
    pub sections: Vec<Section>,
    pub chapters: Vec<Chapter>,
    /// Verbatim text, set only when nothing else could be structured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    KeyPoints,
    Details,
}

/// Line-scan accumulator: current mode plus the open subsection.
struct DocumentBuilder {
    mode: Mode,
    current: Option<Section>,
    key_points: Vec<String>,
    sections: Vec<Section>,
    chapters: Vec<Chapter>,
}

impl DocumentBuilder {
    fn new() -> Self {
        DocumentBuilder {
            mode: Mode::None,
            current: None,
            key_points: Vec::new(),
            sections: Vec::new(),
            chapters: Vec::new(),
        }
    }

    fn close_section(&mut self) {
        if let Some(section) = self.current.take() {
            if section.has_content() {
                self.sections.push(section);
            }
        }
    }

    fn open_section(&mut self, title: &str) {
        self.close_section();
        self.current = Some(Section::titled(title));
    }

    fn section_mut(&mut self) -> &mut Section {
        self.current
            .get_or_insert_with(|| Section::titled(DEFAULT_SECTION))
    }

    fn feed(&mut self, raw_line: &str) {
        let line = raw_line.trim();
        if line.is_empty() {
            return;
        }

        // Timestamps are collected before the line is classified, on every path.
        self.chapters.extend(chapters_in_line(line));

        let item = strip_list_marker(line);
        let bare = strip_decoration(item);

        if bare.eq_ignore_ascii_case(KEY_POINTS) {
            self.close_section();
            self.mode = Mode::KeyPoints;
            return;
        }
        if bare.eq_ignore_ascii_case(DETAILED_SUMMARY) {
            self.mode = Mode::Details;
            if self.current.is_none() {
                self.current = Some(Section::titled(DEFAULT_SECTION));
            }
            return;
        }

        if let Some((title, inline)) = match_header(bare, self.mode) {
            self.open_section(&title);
            self.mode = Mode::Details;
            if !inline.is_empty() {
                self.section_mut().bullet_points.push(inline);
            }
            return;
        }

        if is_decoration_only(item) {
            return;
        }

        match self.mode {
            Mode::None => {}
            Mode::KeyPoints => self.key_points.push(item.to_string()),
            Mode::Details => match parse_step(item) {
                Some(step) => self.section_mut().steps.push(step),
                None => self.section_mut().bullet_points.push(item.to_string()),
            },
        }
    }

    fn finish(mut self, normalized: &str, original: &str, transcript: Option<&str>) -> StructuredDocument {
        self.close_section();
        for section in &mut self.sections {
            section.steps.sort_by_key(|s| s.step_number);
        }

        let mut doc = StructuredDocument {
            key_points: self.key_points,
            sections: self.sections,
            chapters: Vec::new(),
            body: None,
        };

        if doc.key_points.is_empty() && doc.sections.is_empty() {
            apply_fallback(&mut doc, normalized, original);
        }

        let sidecar = transcript.map(sidecar::parse_sidecar).unwrap_or_default();
        doc.chapters = merge_chapters(self.chapters, sidecar);
        doc
    }
}

/// Parse generated summary text (plus optional transcript sidecar) into a
/// structured document.
pub fn parse_summary(summary_text: &str, transcript_text: Option<&str>) -> StructuredDocument {
    let lines = normalize::normalize(summary_text);
    let mut builder = DocumentBuilder::new();
    for line in &lines {
        builder.feed(line);
    }
    builder.finish(&lines.join("\n"), summary_text, transcript_text)
}

/// Off-format input: bullet fragments become one unnamed section, anything
/// else is kept as a single verbatim block.
fn apply_fallback(doc: &mut StructuredDocument, normalized: &str, original: &str) {
    let fragments: Vec<String> = normalized
        .split(|c: char| BULLET_GLYPHS.contains(&c))
        .map(|f| f.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|f| !f.is_empty())
        .collect();

    if fragments.len() > 1 {
        doc.sections.push(Section {
            title: String::new(),
            bullet_points: fragments,
            steps: Vec::new(),
        });
    } else if !original.trim().is_empty() {
        doc.body = Some(original.trim().to_string());
    }
}

/// Body chapters first, then sidecar chapters; the first entry for a given
/// second wins. The result is ordered by time.
pub fn merge_chapters(body: Vec<Chapter>, sidecar: Vec<Chapter>) -> Vec<Chapter> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Chapter> = body
        .into_iter()
        .chain(sidecar)
        .filter(|c| seen.insert(c.seconds))
        .collect();
    merged.sort_by_key(|c| c.seconds);
    merged
}

fn chapters_in_line(line: &str) -> Vec<Chapter> {
    let matches = find_timestamps(line);
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let after_end = matches.get(i + 1).map_or(line.len(), |next| next.start);
            let before_start = if i == 0 { 0 } else { matches[i - 1].end };

            let label = [&line[m.end..after_end], &line[before_start..m.start]]
                .into_iter()
                .map(clean_label)
                .find(|l| !l.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_LABEL.to_string());

            Chapter {
                seconds: m.seconds,
                label,
            }
        })
        .collect()
}

fn clean_label(fragment: &str) -> String {
    const EDGE: &[char] = &['-', '–', '—', ':', '|', '(', ')', '[', ']', ',', ';', '.', '*', '#', '_'];
    let trimmed = strip_list_marker(fragment.trim()).trim_matches(|c: char| c.is_whitespace() || EDGE.contains(&c));
    let without_step = step_re()
        .captures(trimmed)
        .and_then(|c| c.get(2))
        .map_or(trimmed, |m| m.as_str());
    without_step
        .trim_matches(|c: char| c.is_whitespace() || EDGE.contains(&c))
        .chars()
        .take(MAX_LABEL_CHARS)
        .collect()
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})(?:\)\s*|\.\s+)(\S.*)$").expect("step regex is valid")
    })
}

fn parse_step(item: &str) -> Option<Step> {
    let caps = step_re().captures(item)?;
    let step_number = caps.get(1)?.as_str().parse().ok()?;
    let text = caps.get(2)?.as_str().trim().to_string();
    Some(Step { step_number, text })
}

/// Subsection header grammar. Returns the title and any inline content that
/// followed it on the same line.
///
/// Known header phrases are recognized in every mode. A generic line ending
/// in a colon only counts outside the key points list, where such lines are
/// ordinary takeaways.
fn match_header(bare: &str, mode: Mode) -> Option<(String, String)> {
    if let Some(m) = normalize::header_phrase_at_start().find(bare) {
        let rest = strip_decoration(&bare[m.end()..]);
        if rest.is_empty() {
            return Some((bare[..m.end()].to_string(), String::new()));
        }
        if let Some(inline) = rest.strip_prefix(':') {
            return Some((bare[..m.end()].to_string(), strip_decoration(inline).to_string()));
        }
        if bare.ends_with(':') {
            return Some((header_title(bare), String::new()));
        }
        return None;
    }

    if mode == Mode::KeyPoints || parse_step(bare).is_some() {
        return None;
    }
    if bare.ends_with(':') && bare.chars().count() <= MAX_HEADER_CHARS {
        let title = header_title(bare);
        if !title.is_empty() {
            return Some((title, String::new()));
        }
    }
    None
}

fn header_title(bare: &str) -> String {
    strip_decoration(bare.trim_end_matches(|c: char| c == ':' || c.is_whitespace()))
        .to_string()
}

/// Drop a leading bullet glyph or `-`/`*`/`+` list marker.
fn strip_list_marker(line: &str) -> &str {
    let line = line
        .trim_start_matches(|c: char| BULLET_GLYPHS.contains(&c))
        .trim_start();
    for marker in ["- ", "* ", "+ ", "– "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    line
}

/// Trim markdown emphasis and heading characters from both ends.
fn strip_decoration(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '#' | '_'))
}

fn is_decoration_only(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || matches!(c, '*' | '#' | '_' | '-' | '=' | '~'))
}

impl StructuredDocument {
    pub fn is_empty(&self) -> bool {
        self.key_points.is_empty()
            && self.sections.is_empty()
            && self.chapters.is_empty()
            && self.body.is_none()
    }

    /// Markdown rendering used by `vsum show`.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        if !self.key_points.is_empty() {
            out.push_str("## Key Points\n\n");
            for point in &self.key_points {
                out.push_str(&format!("- {point}\n"));
            }
            out.push('\n');
        }

        for section in &self.sections {
            if !section.title.is_empty() {
                out.push_str(&format!("## {}\n\n", section.title));
            }
            for bullet in &section.bullet_points {
                out.push_str(&format!("- {bullet}\n"));
            }
            for step in &section.steps {
                out.push_str(&format!("{}. {}\n", step.step_number, step.text));
            }
            out.push('\n');
        }

        if let Some(body) = &self.body {
            out.push_str(body);
            out.push_str("\n\n");
        }

        if !self.chapters.is_empty() {
            out.push_str("## Jump Points\n\n");
            for chapter in &self.chapters {
                out.push_str(&format!(
                    "- [{}] {}\n",
                    format_timestamp(chapter.seconds),
                    chapter.label
                ));
            }
            out.push('\n');
        }

        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, text: &str) -> Step {
        Step {
            step_number: n,
            text: text.to_string(),
        }
    }

    #[test]
    fn key_points_and_overview_section() {
        let doc = parse_summary(
            "KEY POINTS\n- Fast\n- Simple\nDETAILED SUMMARY\nOverview:\nThis covers setup.\n1) Install\n2) Configure",
            None,
        );
        assert_eq!(doc.key_points, vec!["Fast", "Simple"]);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title, "Overview");
        assert_eq!(doc.sections[0].bullet_points, vec!["This covers setup."]);
        assert_eq!(
            doc.sections[0].steps,
            vec![step(1, "Install"), step(2, "Configure")]
        );
        assert!(doc.chapters.is_empty());
        assert!(doc.body.is_none());
    }

    #[test]
    fn plain_sentence_falls_back_to_single_block() {
        let doc = parse_summary("Just a plain sentence.", None);
        assert!(doc.key_points.is_empty());
        assert!(doc.sections.is_empty());
        assert_eq!(doc.body.as_deref(), Some("Just a plain sentence."));
    }

    #[test]
    fn unmarked_bullets_fall_back_to_unnamed_section() {
        let doc = parse_summary("First idea • Second idea • Third idea", None);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title, "");
        assert_eq!(
            doc.sections[0].bullet_points,
            vec!["First idea", "Second idea", "Third idea"]
        );
        assert!(doc.body.is_none());
    }

    #[test]
    fn empty_input_gives_empty_document() {
        let doc = parse_summary("   \n  ", Some(""));
        assert!(doc.is_empty());
    }

    #[test]
    fn body_timestamp_wins_over_sidecar_duplicate() {
        let doc = parse_summary(
            "at 1:23 we cover X",
            Some(r#"words [JUMP_POINTS][{"seconds":83,"title":"X restated"},{"seconds":200,"title":"Later"}]"#),
        );
        assert_eq!(
            doc.chapters,
            vec![
                Chapter {
                    seconds: 83,
                    label: "we cover X".into()
                },
                Chapter {
                    seconds: 200,
                    label: "Later".into()
                },
            ]
        );
    }

    #[test]
    fn chapter_labels_prefer_text_after_then_before() {
        let doc = parse_summary(
            "KEY POINTS\n- 0:00 Intro, 1m30s Setup\n- Wrap-up — 1:02:03\n- 4m\n- again at 0:00 duplicate",
            None,
        );
        let got: Vec<(u32, &str)> = doc
            .chapters
            .iter()
            .map(|c| (c.seconds, c.label.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (0, "Intro"),
                (90, "Setup"),
                (240, PLACEHOLDER_LABEL),
                (3723, "Wrap-up")
            ]
        );
    }

    #[test]
    fn generator_shaped_output() {
        let raw = "**KEY POINTS:**\n• Rust ownership prevents data races • Borrowing is checked at compile time\n\n\
**DETAILED SUMMARY:**\n• The talk opens with memory safety (0:45).\n\
*KEY CONCEPTS, METHODOLOGIES, AND TECHNICAL DETAILS:** • Ownership — one owner per value • Lifetimes — scope of references\n\
*STEP-BY-STEP PROCESSES OR WORKFLOWS MENTIONED:**\n2\nRun cargo build\n1\nInstall rustup\n\
Prerequisites: basic C knowledge";
        let doc = parse_summary(raw, None);

        assert_eq!(
            doc.key_points,
            vec![
                "Rust ownership prevents data races",
                "Borrowing is checked at compile time"
            ]
        );
        let titles: Vec<&str> = doc.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Overview",
                "KEY CONCEPTS, METHODOLOGIES, AND TECHNICAL DETAILS",
                "STEP-BY-STEP PROCESSES OR WORKFLOWS MENTIONED",
                "Prerequisites"
            ]
        );
        assert_eq!(
            doc.sections[0].bullet_points,
            vec!["The talk opens with memory safety (0:45)."]
        );
        assert_eq!(
            doc.sections[1].bullet_points,
            vec!["Ownership — one owner per value", "Lifetimes — scope of references"]
        );
        assert_eq!(
            doc.sections[2].steps,
            vec![step(1, "Install rustup"), step(2, "Run cargo build")]
        );
        assert_eq!(doc.sections[3].bullet_points, vec!["basic C knowledge"]);
        assert_eq!(doc.chapters.len(), 1);
        assert_eq!(doc.chapters[0].seconds, 45);
        assert_eq!(doc.chapters[0].label, "The talk opens with memory safety");
    }

    #[test]
    fn colon_lines_in_key_points_stay_key_points() {
        let doc = parse_summary("KEY POINTS\n- Remember this:\n- Cargo: the build tool", None);
        assert_eq!(doc.key_points, vec!["Remember this:", "Cargo: the build tool"]);
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn known_header_without_colon_opens_section() {
        let doc = parse_summary("Introduction\nWhy this matters\nKey Features\nSpeed", None);
        let titles: Vec<&str> = doc.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Introduction", "Key Features"]);
        assert_eq!(doc.sections[1].bullet_points, vec!["Speed"]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let raw = "SUMMARY\nKEY POINTS • a at 2:00 • b\nDETAILED SUMMARY\nOverview: intro 90s\n1. one\n3) three";
        let sidecar = Some("t [JUMP_POINTS][{\"t\": 5, \"label\": \"start\"}]");
        let first = parse_summary(raw, sidecar);
        let second = parse_summary(raw, sidecar);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.sections[0].bullet_points, vec!["intro 90s"]);
    }

    #[test]
    fn markdown_rendering_lists_chapters() {
        let doc = parse_summary("KEY POINTS\n- Fast at 1:05", None);
        let md = doc.to_markdown();
        assert!(md.starts_with("## Key Points\n\n- Fast at 1:05"));
        assert!(md.ends_with("## Jump Points\n\n- [1:05] Fast at"));
    }
}
