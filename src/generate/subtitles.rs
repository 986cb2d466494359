//! Subtitle sidecars (`.vtt`, `.srt`, `.txt`) stored next to a video.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::Result;

/// Extensions tried, in order, when looking for a video's subtitles.
pub const SUBTITLE_EXTENSIONS: [&str; 3] = ["vtt", "srt", "txt"];

/// One timed cue.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Transcript loaded from a subtitle file.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub text: String,
}

/// Subtitle file for `video`: the path itself if it already is one, else a
/// sibling with the same stem.
pub fn find_subtitle_file(video: &Path) -> Option<PathBuf> {
    let ext = video
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if ext.is_some_and(|e| SUBTITLE_EXTENSIONS.contains(&e.as_str())) && video.is_file() {
        return Some(video.to_path_buf());
    }
    SUBTITLE_EXTENSIONS
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Read and parse a subtitle file.
pub fn load_transcript(path: &Path) -> Result<Transcript> {
    let content = std::fs::read_to_string(path)?;
    let is_plain = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));

    if is_plain {
        return Ok(Transcript {
            segments: Vec::new(),
            text: content.trim().to_string(),
        });
    }

    let segments = parse_cues(&content);
    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Transcript { segments, text })
}

fn timing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*((?:\d+:)?\d{1,2}:\d{2}[.,]\d{1,3})\s*-->\s*((?:\d+:)?\d{1,2}:\d{2}[.,]\d{1,3})")
            .expect("cue timing regex is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("markup regex is valid"))
}

/// Parse WebVTT or SubRip cues. Both formats share the `start --> end`
/// timing line; headers, cue ids and NOTE blocks are skipped.
pub fn parse_cues(content: &str) -> Vec<Segment> {
    let content = content.replace("\r\n", "\n");
    let mut segments = Vec::new();

    for block in content.split("\n\n") {
        let mut lines = block.lines().skip_while(|l| !l.contains("-->"));
        let Some(timing) = lines.next() else {
            continue;
        };
        let Some(caps) = timing_re().captures(timing) else {
            continue;
        };
        let (Some(start), Some(end)) = (
            caps.get(1).and_then(|m| parse_cue_time(m.as_str())),
            caps.get(2).and_then(|m| parse_cue_time(m.as_str())),
        ) else {
            continue;
        };

        let text = lines
            .map(|l| tag_re().replace_all(l.trim(), "").into_owned())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            continue;
        }

        // Rolling captions repeat the previous cue's text.
        if segments.last().is_some_and(|prev: &Segment| prev.text == text) {
            continue;
        }
        segments.push(Segment { start, end, text });
    }
    segments
}

/// `HH:MM:SS.mmm`, `MM:SS.mmm`, or the SubRip comma form, to seconds.
fn parse_cue_time(raw: &str) -> Option<f64> {
    let raw = raw.replace(',', ".");
    let parts: Vec<&str> = raw.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [h, m, s] => (
            h.parse::<f64>().ok()?,
            m.parse::<f64>().ok()?,
            s.parse::<f64>().ok()?,
        ),
        _ => return None,
    };
    Some(h * 3600.0 + m * 60.0 + s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VTT: &str = "WEBVTT\n\nNOTE generated by a captioning tool\n\n1\n00:00:01.000 --> 00:00:04.500 align:start\nWelcome to the <b>intro</b>.\n\n00:01:02.250 --> 00:01:05.000\nNow we install\nthe toolchain.\n";

    const SRT: &str = "1\r\n00:00:00,500 --> 00:00:02,000\r\nHello there\r\n\r\n2\r\n01:00:00,000 --> 01:00:03,000\r\nAn hour in\r\n";

    #[test]
    fn parses_webvtt_cues() {
        let segments = parse_cues(VTT);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 1.0);
        assert_eq!(segments[0].end, 4.5);
        assert_eq!(segments[0].text, "Welcome to the intro.");
        assert_eq!(segments[1].start, 62.25);
        assert_eq!(segments[1].text, "Now we install the toolchain.");
    }

    #[test]
    fn parses_subrip_cues() {
        let segments = parse_cues(SRT);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.5);
        assert_eq!(segments[0].text, "Hello there");
        assert_eq!(segments[1].start, 3600.0);
    }

    #[test]
    fn repeated_rolling_captions_are_collapsed() {
        let vtt = "WEBVTT\n\n00:00.000 --> 00:02.000\nsame line\n\n00:02.000 --> 00:04.000\nsame line\n\n00:04.000 --> 00:06.000\nnext line\n";
        let texts: Vec<String> = parse_cues(vtt).into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["same line", "next line"]);
    }

    #[test]
    fn finds_sibling_subtitles_and_loads_them() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("lesson.mp4");
        assert!(find_subtitle_file(&video).is_none());

        std::fs::write(dir.path().join("lesson.srt"), SRT).unwrap();
        let found = find_subtitle_file(&video).unwrap();
        assert_eq!(found.extension().unwrap(), "srt");

        let transcript = load_transcript(&found).unwrap();
        assert_eq!(transcript.text, "Hello there An hour in");
        assert_eq!(transcript.segments.len(), 2);

        // VTT wins over SRT when both exist.
        std::fs::write(dir.path().join("lesson.vtt"), VTT).unwrap();
        assert_eq!(find_subtitle_file(&video).unwrap().extension().unwrap(), "vtt");
    }

    #[test]
    fn plain_text_transcripts_have_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.txt");
        std::fs::write(&path, "  just words \n").unwrap();
        assert_eq!(find_subtitle_file(&path).unwrap(), path);

        let transcript = load_transcript(&path).unwrap();
        assert!(transcript.segments.is_empty());
        assert_eq!(transcript.text, "just words");
    }
}
