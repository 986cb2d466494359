//! Heuristic jump points picked from transcript timing.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::subtitles::Segment;
use crate::render::Chapter;

pub const MAX_JUMP_POINTS: usize = 8;

const WINDOW_SECONDS: f64 = 20.0;
const WINDOW_CHARS: usize = 220;
/// Best-scoring windows kept before the rest are sampled evenly.
const TOP_PICKS: usize = 3;
const MAX_TITLE_CHARS: usize = 80;

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)intro|introduction|overview|setup|install|configure|demo|example|concept|definition|recap|summary|conclusion|next steps|best practice|tip|gotcha|issue|troubleshoot",
        )
        .expect("keyword regex is valid")
    })
}

/// A stretch of transcript starting at `seconds`.
#[derive(Debug, Clone, PartialEq)]
struct Window {
    seconds: u32,
    snippet: String,
}

/// Group cues into windows of roughly 20 seconds or 220 characters.
fn windows(segments: &[Segment]) -> Vec<Window> {
    let mut out = Vec::new();
    let mut texts: Vec<&str> = Vec::new();
    let mut start: Option<f64> = None;

    for seg in segments {
        let window_start = *start.get_or_insert(seg.start);
        texts.push(seg.text.trim());
        let chars: usize = texts.iter().map(|t| t.chars().count()).sum();
        if seg.end - window_start >= WINDOW_SECONDS || chars >= WINDOW_CHARS {
            push_window(&mut out, window_start, &texts);
            texts.clear();
            start = None;
        }
    }
    if let Some(window_start) = start {
        push_window(&mut out, window_start, &texts);
    }
    out
}

fn push_window(out: &mut Vec<Window>, start: f64, texts: &[&str]) {
    let joined = texts.join(" ").replace('\n', " ");
    let snippet: String = joined.trim().chars().take(WINDOW_CHARS).collect();
    if !snippet.is_empty() {
        out.push(Window {
            seconds: start.max(0.0).round() as u32,
            snippet,
        });
    }
}

fn score(window: &Window) -> f64 {
    let mut score = window.snippet.chars().count() as f64 / 200.0;
    if keyword_re().is_match(&window.snippet) {
        score += 2.0;
    }
    score
}

/// First sentence of the snippet, shortened for display.
fn title(snippet: &str) -> String {
    let first = snippet.split(". ").next().unwrap_or(snippet).trim();
    if first.chars().count() > MAX_TITLE_CHARS {
        let cut: String = first.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}

/// Pick up to `max_points` chapters: the strongest few windows, then an even
/// spread over the rest. Result is sorted by time, one chapter per second.
pub fn select_jump_points(segments: &[Segment], max_points: usize) -> Vec<Chapter> {
    if max_points == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f64, Window)> = windows(segments)
        .into_iter()
        .map(|w| (score(&w), w))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let top = TOP_PICKS.min(max_points).min(scored.len());
    let rest = scored.split_off(top);
    let mut picked: Vec<Window> = scored.into_iter().map(|(_, w)| w).collect();

    let need = max_points - picked.len();
    if need > 0 && !rest.is_empty() {
        let step = (rest.len() / need).max(1);
        picked.extend(rest.into_iter().step_by(step).take(need).map(|(_, w)| w));
    }

    let by_second: BTreeMap<u32, Window> = picked.into_iter().map(|w| (w.seconds, w)).collect();
    by_second
        .into_values()
        .map(|w| Chapter {
            seconds: w.seconds,
            label: title(&w.snippet),
        })
        .collect()
}
