//! Post-processing of raw model output before it is stored.

use regex::Regex;
use std::sync::OnceLock;

/// Lead-ins models add despite being told not to.
const FILLER_PHRASES: &[&str] = &[
    r"the summary of the transcript in the requested format:?\s*",
    r"here is the summary of the transcript:?\s*",
    r"here's the summary:?\s*",
    r"summary of the transcript:?\s*",
    r"here is a comprehensive summary:?\s*",
    r"here's a comprehensive summary:?\s*",
    r"based on the transcript:?\s*",
    r"transcript summary:?\s*",
];

const ECHO_PREFIXES: &[&str] = &["Summary:", "Here is", "Here are", "This video", "The video"];

struct Patterns {
    filler: Regex,
    intro: Regex,
    dash_bullet: Regex,
    sentence_split: Regex,
    blank_runs: Regex,
    space_runs: Regex,
    glued_bullet: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        filler: Regex::new(&format!("(?i){}", FILLER_PHRASES.join("|")))
            .expect("filler regex is valid"),
        intro: Regex::new(r"(?i)\A(?:here is|here are|this is|the following|below are)[^\n]*?:")
            .expect("intro regex is valid"),
        dash_bullet: Regex::new(r"(?m)^[ \t]*[-*][ \t]+").expect("bullet regex is valid"),
        sentence_split: Regex::new(r"[.!?]+\s+").expect("sentence regex is valid"),
        blank_runs: Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank line regex is valid"),
        space_runs: Regex::new(r"[ \t]{2,}").expect("space regex is valid"),
        glued_bullet: Regex::new(r"([.!?])[ \t]*•").expect("glued bullet regex is valid"),
    })
}

/// Strip echoes and filler, normalize list markers and whitespace.
///
/// Section markers, header decoration and numbered steps are left intact so
/// the renderer can still find them.
pub fn clean_summary(raw: &str) -> String {
    let p = patterns();
    let mut summary = p.filler.replace_all(raw.trim(), "").trim().to_string();

    for prefix in ECHO_PREFIXES {
        if let Some(rest) = summary.strip_prefix(prefix) {
            summary = rest.trim_start().to_string();
        }
    }

    summary = p.intro.replace(&summary, "").trim().to_string();
    summary = p.dash_bullet.replace_all(&summary, "• ").into_owned();

    if !summary.contains('•') && summary.chars().count() > 100 {
        let sentences: Vec<&str> = p.sentence_split.split(&summary).collect();
        if sentences.len() > 2 {
            let bullets: Vec<String> = sentences
                .iter()
                .map(|s| s.trim())
                .filter(|s| s.chars().count() > 20)
                .map(|s| format!("• {s}"))
                .collect();
            if !bullets.is_empty() {
                summary = bullets.join("\n");
            }
        }
    }

    summary = p.blank_runs.replace_all(&summary, "\n\n").into_owned();
    summary = p.space_runs.replace_all(&summary, " ").into_owned();
    summary = p.glued_bullet.replace_all(&summary, "$1\n•").into_owned();
    summary.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_echoes_and_filler() {
        let raw = "Here is the summary of the transcript:\n**KEY POINTS:**\n- Fast   builds\n* Small binaries";
        assert_eq!(
            clean_summary(raw),
            "**KEY POINTS:**\n• Fast builds\n• Small binaries"
        );
    }

    #[test]
    fn keeps_markers_and_numbered_steps() {
        let raw = "**DETAILED SUMMARY:**\n1) Install\n2. Configure\n\n\n\n*TOOLS, FRAMEWORKS, OR TECHNOLOGIES REFERENCED:**\n• cargo";
        assert_eq!(
            clean_summary(raw),
            "**DETAILED SUMMARY:**\n1) Install\n2. Configure\n\n*TOOLS, FRAMEWORKS, OR TECHNOLOGIES REFERENCED:**\n• cargo"
        );
    }

    #[test]
    fn glued_bullets_get_their_own_line() {
        assert_eq!(
            clean_summary("• One thing. • Another thing!•Third"),
            "• One thing.\n• Another thing!\n•Third"
        );
    }

    #[test]
    fn long_prose_is_split_into_bullets() {
        let raw = "The speaker introduces ownership in depth. Borrowing rules are then explained with examples. Ok. Lifetimes close out the session nicely";
        assert_eq!(
            clean_summary(raw),
            "• The speaker introduces ownership in depth\n• Borrowing rules are then explained with examples\n• Lifetimes close out the session nicely"
        );
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(clean_summary("  Just a plain sentence.  "), "Just a plain sentence.");
    }
}
