use crate::config::{ApiConfig, ApiProvider};
use crate::types::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Backend failures as seen by the summarizer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Network failure, timeout or server-side error
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// HTTP 429 or an exhausted quota
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other refusal (bad key, bad request)
    #[error("backend rejected the request: {0}")]
    Rejected(String),

    /// The backend answered without any text
    #[error("empty response from backend")]
    EmptyResponse,
}

/// Trait for LLM adapters that turn a prompt into text
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Get the name of this LLM adapter
    fn adapter_name(&self) -> String;

    /// Send one prompt and return the raw completion text
    async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError>;
}

/// Builds the adapter named by the configuration. Returns `None` when no
/// provider is configured or its API key is missing, in which case every
/// summary is produced offline.
pub fn build_adapter(api: &ApiConfig) -> Result<Option<Arc<dyn LlmAdapter>>> {
    if api.provider == ApiProvider::None {
        info!("No summarization backend configured, summaries will be produced offline");
        return Ok(None);
    }

    let api_key = match std::env::var(&api.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!("{} is not set, summaries will be produced offline", api.api_key_env);
            return Ok(None);
        }
    };

    let client = Client::builder()
        .timeout(Duration::from_secs(api.timeout_seconds))
        .build()?;

    let adapter: Arc<dyn LlmAdapter> = match api.provider {
        ApiProvider::Gemini => {
            let mut adapter = GeminiAdapter::new(client, api_key, api.model.clone())
                .with_generation(api.temperature, api.max_tokens);
            if let Some(base_url) = &api.base_url {
                adapter = adapter.with_base_url(base_url.clone());
            }
            Arc::new(adapter)
        }
        ApiProvider::Openai => {
            let mut adapter = OpenAiAdapter::new(client, api_key, api.model.clone())
                .with_generation(api.temperature, api.max_tokens);
            if let Some(base_url) = &api.base_url {
                adapter = adapter.with_base_url(base_url.clone());
            }
            Arc::new(adapter)
        }
        ApiProvider::None => return Ok(None),
    };

    info!("Using summarization backend: {}", adapter.adapter_name());
    Ok(Some(adapter))
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::QuotaExceeded(detail)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        LlmError::Unavailable(detail)
    } else {
        LlmError::Rejected(detail)
    }
}

fn classify_transport(error: reqwest::Error) -> LlmError {
    LlmError::Unavailable(error.to_string())
}

// --- Gemini ---

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

/// Google Gemini `generateContent` backend
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiAdapter {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            temperature: 0.3,
            max_tokens: 1000,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    fn adapter_name(&self) -> String {
        format!("Gemini ({})", self.model)
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        debug!("Calling Gemini model {}", self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(format!("unreadable Gemini response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(LlmError::Rejected(error.message));
        }

        body.candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(|part| part.text)
            .find(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

// --- OpenAI-compatible ---

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI `chat/completions` backend, or any server speaking the same API
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiAdapter {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            temperature: 0.3,
            max_tokens: 1000,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn adapter_name(&self) -> String {
        format!("OpenAI ({})", self.model)
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a helpful assistant that summarizes news articles.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Calling OpenAI model {}", self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(format!("unreadable OpenAI response: {}", e)))?;

        body.choices
            .into_iter()
            .map(|choice| choice.message.content)
            .find(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

// --- Mock ---

/// Mock LLM adapter for development and testing.
///
/// Answers summary prompts with a well-formed JSON object derived from the
/// article title. Failures and malformed answers can be scripted per title.
pub struct MockLlmAdapter {
    name: String,
    response_delay_ms: u64,
    failures: Vec<(String, LlmError)>,
    malformed_always: Vec<String>,
    malformed_once: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockLlmAdapter {
    pub fn new(name: String) -> Self {
        Self {
            name,
            response_delay_ms: 0,
            failures: Vec::new(),
            malformed_always: Vec::new(),
            malformed_once: Vec::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    /// Fail every prompt whose title contains `title_fragment`.
    pub fn fail_for(mut self, title_fragment: &str, error: LlmError) -> Self {
        self.failures.push((title_fragment.to_string(), error));
        self
    }

    /// Answer with prose instead of JSON for matching titles.
    pub fn malformed_for(mut self, title_fragment: &str) -> Self {
        self.malformed_always.push(title_fragment.to_string());
        self
    }

    /// Answer with prose on the first call only for matching titles.
    pub fn malformed_once_for(mut self, title_fragment: &str) -> Self {
        self.malformed_once.push(title_fragment.to_string());
        self
    }

    /// Number of prompts received for a title.
    pub fn calls_for(&self, title: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(title).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.values().sum()).unwrap_or(0)
    }

    async fn simulate_processing(&self) {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
    }

    fn extract_title(&self, text: &str) -> Option<String> {
        let title_start = text.find("Title: ")?;
        let title_portion = &text[title_start + 7..];
        let title = match title_portion.find('\n') {
            Some(title_end) => &title_portion[..title_end],
            None => title_portion,
        };
        Some(title.trim().to_string())
    }

    fn record_call(&self, key: &str) -> usize {
        match self.calls.lock() {
            Ok(mut calls) => {
                let count = calls.entry(key.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => 1,
        }
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock LLM Adapter ({})", self.name)
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        self.simulate_processing().await;

        let Some(title) = self.extract_title(prompt) else {
            self.record_call("");
            return Ok(format!("Welcome to today's newsletter, curated by {}.", self.name));
        };
        let attempt = self.record_call(&title);

        if let Some((_, error)) = self.failures.iter().find(|(fragment, _)| title.contains(fragment.as_str())) {
            return Err(error.clone());
        }

        let malformed = self.malformed_always.iter().any(|fragment| title.contains(fragment.as_str()))
            || (attempt == 1 && self.malformed_once.iter().any(|fragment| title.contains(fragment.as_str())));
        if malformed {
            return Ok(format!("Sure! Here is a summary of {} without any structure.", title));
        }

        let answer = serde_json::json!({
            "summary": format!("{} summarized by {}.", title, self.name),
            "key_points": [format!("Key point about {}", title)],
            "quotes": [],
        });
        Ok(format!("```json\n{}\n```", answer))
    }
}
