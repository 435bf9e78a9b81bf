use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{GenerationRequest, LlmClient};
use super::StructuringError;
use crate::config::{DEFAULT_OLLAMA_URL, DEFAULT_TIMEOUT_SECS};

/// Vision-capable models in order of preference.
const PREFERRED_MODELS: &[&str] = &[
    "medgemma",
    "gemma3",
    "llama3.2-vision",
    "qwen2.5vl",
    "llava",
];

/// Ollama HTTP client for local inference.
#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Ollama at localhost:11434 with the default timeout.
    pub fn default_local() -> Result<Self, StructuringError> {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_TIMEOUT_SECS)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// First preferred model that is installed locally.
    pub fn find_best_model(&self) -> Result<String, StructuringError> {
        pick_preferred(&self.list_models()?)
    }

    fn send_error(&self, e: reqwest::Error) -> StructuringError {
        if e.is_connect() {
            StructuringError::BackendUnavailable(format!(
                "cannot connect to Ollama at {}",
                self.base_url
            ))
        } else if e.is_timeout() {
            StructuringError::BackendUnavailable(format!(
                "request timed out after {}s",
                self.timeout_secs
            ))
        } else {
            StructuringError::HttpClient(e.to_string())
        }
    }
}

/// Pick the first preferred model present in `available`.
fn pick_preferred(available: &[String]) -> Result<String, StructuringError> {
    PREFERRED_MODELS
        .iter()
        .find_map(|preferred| {
            available
                .iter()
                .find(|m| m.starts_with(preferred))
                .cloned()
        })
        .ok_or(StructuringError::NoModelAvailable)
}

/// Map a non-success HTTP response to the error taxonomy.
fn status_error(status: u16, body: String) -> StructuringError {
    if status == 503 || status == 429 || body.to_lowercase().contains("overloaded") {
        StructuringError::BackendUnavailable(format!("status {status}: {body}"))
    } else {
        StructuringError::Backend { status, body }
    }
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    images: &'a [String],
    format: &'a Value,
    stream: bool,
    options: GenerateOptions,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String, StructuringError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: &request.system,
            images: &request.images,
            format: &request.format,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| StructuringError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| StructuringError::MalformedResponse(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Outcome a `MockLlmClient` replays on every call.
#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Unavailable(String),
    Status(u16, String),
}

/// Mock LLM client for testing: replays a configured reply and records the
/// last request it received.
#[derive(Debug)]
pub struct MockLlmClient {
    reply: MockReply,
    available_models: Vec<String>,
    last_request: Mutex<Option<GenerationRequest>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::with_reply(MockReply::Text(response.to_string()))
    }

    /// Every call fails with `BackendUnavailable`.
    pub fn unavailable(reason: &str) -> Self {
        Self::with_reply(MockReply::Unavailable(reason.to_string()))
    }

    /// Every call fails with a non-retryable backend status.
    pub fn failing(status: u16, body: &str) -> Self {
        Self::with_reply(MockReply::Status(status, body.to_string()))
    }

    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            available_models: vec!["medgemma:latest".to_string()],
            last_request: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        match &self.reply {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Unavailable(reason) => {
                Err(StructuringError::BackendUnavailable(reason.clone()))
            }
            MockReply::Status(status, body) => Err(status_error(*status, body.clone())),
        }
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        Ok(self.available_models.clone())
    }
}
