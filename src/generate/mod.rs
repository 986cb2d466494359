//! Summary generation for a video subject.

pub mod cleanup;
pub mod jump_points;
pub mod prompt;
pub mod subtitles;

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::OllamaClient;
use crate::render::sidecar::{append_sidecar, strip_sidecar};

/// Progress milestones reported while a job runs.
pub mod milestones {
    pub const TRANSCRIPT_LOOKUP: u8 = 5;
    pub const TRANSCRIPT_LOADED: u8 = 20;
    pub const TRANSCRIPT_CHECKED: u8 = 50;
    pub const SUMMARIZING: u8 = 65;
    pub const SUMMARY_READY: u8 = 85;
    pub const JUMP_POINTS_READY: u8 = 95;
}

/// Output of one generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub summary_text: String,
    /// May carry a `[JUMP_POINTS]` block.
    pub transcript_text: Option<String>,
    pub processing_time_seconds: f64,
    pub model_used: String,
}

/// Produces summary text for a subject. Runs on a job's worker thread.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        subject: &str,
        model_hint: Option<&str>,
        progress: &dyn Fn(u8),
    ) -> Result<Generation>;
}

/// Summarizes a video's subtitle sidecar with a local Ollama model.
pub struct OllamaGenerator {
    client: OllamaClient,
    default_model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, default_model: impl Into<String>) -> Self {
        OllamaGenerator {
            client,
            default_model: default_model.into(),
        }
    }
}

impl Generator for OllamaGenerator {
    fn generate(
        &self,
        subject: &str,
        model_hint: Option<&str>,
        progress: &dyn Fn(u8),
    ) -> Result<Generation> {
        let started = Instant::now();
        let model = model_hint.unwrap_or(self.default_model.as_str());

        progress(milestones::TRANSCRIPT_LOOKUP);
        let path = subtitles::find_subtitle_file(Path::new(subject)).ok_or_else(|| {
            Error::GenerationFailed(format!(
                "No subtitles found for {subject} (looked for .vtt, .srt, .txt)"
            ))
        })?;
        debug!("Reading transcript from {}", path.display());
        let transcript = subtitles::load_transcript(&path)?;
        progress(milestones::TRANSCRIPT_LOADED);

        // A .txt transcript may already carry a chapter block from an earlier run.
        let text = strip_sidecar(transcript.text.trim());
        check_transcript(text)?;
        progress(milestones::TRANSCRIPT_CHECKED);

        info!("Summarizing {} characters with {model}", text.chars().count());
        progress(milestones::SUMMARIZING);
        let reply = self.client.generate(model, &prompt::build_prompt(text))?;
        if reply.response.trim().is_empty() {
            return Err(Error::GenerationFailed("Model returned empty summary".into()));
        }
        debug!(
            "{model} produced {} tokens in {:.1}s",
            reply.eval_count,
            reply.total_duration as f64 / 1e9
        );
        let summary_text = cleanup::clean_summary(&prompt::with_response_lead(&reply.response));
        progress(milestones::SUMMARY_READY);

        let chapters = jump_points::select_jump_points(&transcript.segments, jump_points::MAX_JUMP_POINTS);
        debug!("Selected {} jump points", chapters.len());
        progress(milestones::JUMP_POINTS_READY);

        Ok(Generation {
            summary_text,
            transcript_text: Some(append_sidecar(text, &chapters)),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            model_used: model.to_string(),
        })
    }
}

fn check_transcript(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(Error::GenerationFailed("Empty transcript provided".into()));
    }
    let len = text.chars().count();
    if len > prompt::MAX_TRANSCRIPT_CHARS {
        return Err(Error::GenerationFailed(format!(
            "Transcript too long: {len} characters (max {})",
            prompt::MAX_TRANSCRIPT_CHARS
        )));
    }
    Ok(())
}
