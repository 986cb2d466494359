use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::{is_installed, ModelRegistry, PullOutcome};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Long enough for a large model to summarize a long transcript.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// Blocking client for the Ollama HTTP API.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    stop: Vec<&'static str>,
}

/// Subset of the `/api/generate` response we use.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    /// Nanoseconds spent by the server.
    #[serde(default)]
    pub total_duration: u64,
    #[serde(default)]
    pub eval_count: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(Error::Other(format!(
                "Ollama returned {status} for {path}: {text}"
            )));
        }
        Ok(resp.json()?)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(Error::Other(format!(
                "Ollama returned {status} for {path}: {text}"
            )));
        }
        Ok(resp.json()?)
    }

    /// Run a single non-streaming completion.
    pub fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse> {
        debug!("Generating with {model} ({} prompt chars)", prompt.len());
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.4,
                top_p: 0.9,
                num_predict: 3500,
                stop: vec!["</summary>", "\n\n---"],
            },
        };
        self.post_json("/api/generate", &request)
    }
}

impl ModelRegistry for OllamaClient {
    fn list_installed(&self) -> Result<BTreeSet<String>> {
        let tags: TagsResponse = self.get_json("/api/tags")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn request_pull(&self, name: &str) -> Result<PullOutcome> {
        if is_installed(&self.list_installed()?, name) {
            return Ok(PullOutcome { cached: true });
        }

        info!("Pulling model {name}");
        let body = serde_json::json!({ "name": name, "stream": false });
        let _: serde_json::Value = self
            .post_json("/api/pull", &body)
            .map_err(|e| Error::PullFailed(format!("{name}: {e}")))?;
        Ok(PullOutcome { cached: false })
    }
}
