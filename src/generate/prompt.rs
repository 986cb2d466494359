//! Summary prompt construction.

/// Transcripts longer than this are rejected outright.
pub const MAX_TRANSCRIPT_CHARS: usize = 50_000;
/// Transcript budget inside the prompt; longer input keeps its head and tail.
pub const PROMPT_TRANSCRIPT_CHARS: usize = 15_000;

const TRUNCATION_NOTE: &str = "\n\n[... content truncated ...]\n\n";

/// Prompt text ends here; the model continues the key points list.
pub const RESPONSE_LEAD: &str = "**KEY POINTS:**\n•";

/// Keep the opening and closing halves of an over-long transcript, which is
/// where the introduction and the conclusion live.
pub fn truncate_transcript(transcript: &str, max_chars: usize) -> String {
    let total = transcript.chars().count();
    if total <= max_chars {
        return transcript.to_string();
    }
    let half = max_chars / 2;
    let head: String = transcript.chars().take(half).collect();
    let tail: String = transcript.chars().skip(total - half).collect();
    format!("{head}{TRUNCATION_NOTE}{tail}")
}

pub fn build_prompt(transcript: &str) -> String {
    let transcript = truncate_transcript(transcript, PROMPT_TRANSCRIPT_CHARS);
    format!(
        r#"You explain technical material clearly. Read the transcript below and write a structured, information-dense summary. Start directly with the sections; no preamble.

RESPONSE FORMAT:

**KEY POINTS:**
• 3 to 6 bullets with the core takeaways
• At least one thing the viewer can do after watching

**DETAILED SUMMARY:**
• Concrete details and small examples
• Explain important concepts and decisions
• For any process, a short numbered guide: 1) step 2) step 3) step
• Caveats and pitfalls where relevant
• Mention timestamps (M:SS) for notable moments when the transcript makes them clear

*KEY CONCEPTS, METHODOLOGIES, AND TECHNICAL DETAILS:**
• term — one-line meaning

*TOOLS, FRAMEWORKS, OR TECHNOLOGIES REFERENCED:**
• name — what it was used for

*PREREQUISITES OR BACKGROUND KNOWLEDGE DISCUSSED:**
• what the viewer should know beforehand

*PRACTICAL APPLICATIONS AND REAL-WORLD USE CASES:**
• where and how to apply this

*STEP-BY-STEP PROCESSES OR WORKFLOWS MENTIONED:**
• concise numbered steps, if any

Rules:
- Short bullets, no narrative filler.
- Do not repeat these instructions or say "the transcript says".
- Use • bullets and numbered lists as shown.

Transcript:
{transcript}

{RESPONSE_LEAD}"#
    )
}

/// The model's reply with the section lead the prompt ended on restored.
pub fn with_response_lead(reply: &str) -> String {
    let reply = reply.trim_start();
    if reply.to_ascii_lowercase().contains("key points") {
        reply.to_string()
    } else {
        format!("{RESPONSE_LEAD} {reply}")
    }
}
