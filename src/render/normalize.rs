//! Text normalization ahead of the line scan.
//!
//! Generators are inconsistent about line breaks: headings arrive mid-line,
//! bullets are glued together, and step numbers are split from their text.
//! Everything here rewrites line structure only; no content is dropped apart
//! from a leading "SUMMARY" label.

use regex::Regex;
use std::sync::OnceLock;

pub const KEY_POINTS: &str = "KEY POINTS";
pub const DETAILED_SUMMARY: &str = "DETAILED SUMMARY";

/// Bullet glyphs that are folded into `•` and forced onto a new line.
pub const BULLET_GLYPHS: [char; 5] = ['•', '●', '▪', '◦', '‣'];

/// Known subsection headings, recognized even without a trailing colon.
const HEADER_PHRASES: &str = r"key[ \t]+concepts(?:,?[ \t]+methodologies,?(?:[ \t]+and)?[ \t]+technical[ \t]+details)?|tools(?:,?[ \t]+frameworks,?(?:[ \t]+or)?[ \t]+technologies(?:[ \t]+referenced)?)?|prerequisites(?:[ \t]+or[ \t]+background[ \t]+knowledge(?:[ \t]+discussed)?)?|practical[ \t]+applications(?:[ \t]+and[ \t]+real[-‑ ]world[ \t]+use[ \t]+cases)?|step[-‑ ]by[-‑ ]step(?:[ \t]+(?:processes|process|guide|instructions)(?:[ \t]+or[ \t]+workflows)?(?:[ \t]+mentioned)?)?|introduction|overview|key[ \t]+features";

fn leading_summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\A[\s*#_]*summary[ \t*#_]*(?::[ \t*#_]*|\n|\z)")
            .expect("summary label regex is valid")
    })
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)[*#_]*[ \t]*\b(key[ \t]+points|detailed[ \t]+summary)\b[ \t]*[*#_]*[ \t]*:?[ \t]*[*#_]*",
        )
        .expect("section marker regex is valid")
    })
}

fn decorated_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)[*#]+[ \t]*\b(?:{HEADER_PHRASES})\b[ \t]*(?::|[*#]+)"))
            .expect("decorated header regex is valid")
    })
}

/// Matches a known header phrase at the very start of a line.
pub(crate) fn header_phrase_at_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^(?:{HEADER_PHRASES})\b")).expect("header regex is valid")
    })
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}$").expect("bare number regex is valid"))
}

/// Apply every normalization pass and return the rewritten lines.
pub fn normalize(raw: &str) -> Vec<String> {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = strip_summary_label(&text);
    let text = split_bullets(text);
    let text = isolate_markers(&text);
    let text = isolate_decorated_headers(&text);
    merge_orphan_numbers(text.lines())
}

fn strip_summary_label(text: &str) -> &str {
    match leading_summary_re().find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

fn split_bullets(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if BULLET_GLYPHS.contains(&ch) {
            out.push('\n');
            out.push('•');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Put KEY POINTS / DETAILED SUMMARY on their own canonical lines. A bare
/// phrase inside prose is left alone unless it is decorated, followed by a
/// colon, or alone on its line.
fn isolate_markers(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let mut out = String::new();
        let mut last = 0;
        for caps in marker_re().captures_iter(line) {
            let (Some(whole), Some(phrase)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let decorated = whole
                .as_str()
                .contains(|c: char| matches!(c, '*' | '#' | '_' | ':'));
            let alone = line[..whole.start()].trim().is_empty()
                && line[whole.end()..].trim().is_empty();
            if !(decorated || alone) {
                continue;
            }

            let canonical = if phrase.as_str().to_lowercase().starts_with("key") {
                KEY_POINTS
            } else {
                DETAILED_SUMMARY
            };
            out.push_str(&line[last..whole.start()]);
            out.push('\n');
            out.push_str(canonical);
            out.push('\n');
            last = whole.end();
        }
        out.push_str(&line[last..]);
        lines.push(out);
    }
    lines.join("\n")
}

/// Break the line before a decorated header phrase that appears mid-line.
fn isolate_decorated_headers(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let mut out = String::new();
        let mut last = 0;
        for m in decorated_header_re().find_iter(line) {
            if line[..m.start()].trim().is_empty() {
                continue;
            }
            out.push_str(&line[last..m.start()]);
            out.push('\n');
            last = m.start();
        }
        out.push_str(&line[last..]);
        lines.push(out);
    }
    lines.join("\n")
}

/// Fuse a line holding only a step number onto the content line after it.
fn merge_orphan_numbers<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    let lines: Vec<&str> = lines.collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let current = lines[i].trim();
        if bare_number_re().is_match(current) {
            if let Some(next) = lines.get(i + 1).map(|l| l.trim()) {
                if !next.is_empty() && !bare_number_re().is_match(next) {
                    out.push(format!("{current}) {next}"));
                    i += 2;
                    continue;
                }
            }
        }
        out.push(lines[i].to_string());
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_empty(lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    #[test]
    fn strips_leading_summary_label_only() {
        assert_eq!(non_empty(normalize("**SUMMARY:**\nHello")), vec!["Hello"]);
        assert_eq!(non_empty(normalize("Summary\nHello")), vec!["Hello"]);
        assert_eq!(
            non_empty(normalize("Summary of the talk")),
            vec!["Summary of the talk"]
        );
    }

    #[test]
    fn inline_bullets_become_lines() {
        assert_eq!(
            non_empty(normalize("Intro • one ● two")),
            vec!["Intro", "• one", "• two"]
        );
    }

    #[test]
    fn markers_are_isolated_and_canonical() {
        let lines = non_empty(normalize("**Key Points:** • Fast\ntext **DETAILED SUMMARY:** more"));
        assert_eq!(
            lines,
            vec!["KEY POINTS", "• Fast", "text", "DETAILED SUMMARY", "more"]
        );
    }

    #[test]
    fn plain_prose_mentions_are_not_markers() {
        assert_eq!(
            non_empty(normalize("the key points are simple")),
            vec!["the key points are simple"]
        );
    }

    #[test]
    fn decorated_headers_move_to_line_start() {
        let lines = non_empty(normalize(
            "watch the pitfalls. *KEY CONCEPTS, METHODOLOGIES, AND TECHNICAL DETAILS:** • Term — meaning",
        ));
        assert_eq!(
            lines,
            vec![
                "watch the pitfalls.",
                "*KEY CONCEPTS, METHODOLOGIES, AND TECHNICAL DETAILS:**",
                "• Term — meaning"
            ]
        );
    }

    #[test]
    fn orphan_step_numbers_are_fused() {
        assert_eq!(
            non_empty(normalize("1\nInstall\n2\nConfigure\n3")),
            vec!["1) Install", "2) Configure", "3"]
        );
    }
}
