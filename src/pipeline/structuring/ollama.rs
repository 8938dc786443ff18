use std::sync::Mutex;

use super::ollama_types::{ChatRequest, ChatResponse, GenerationOptions};
use super::types::{ChatMessage, LlmClient, VisionClient};
use super::StructuringError;

/// Ollama HTTP client for text and vision inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client for the Ollama instance at `base_url`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_chat(&self, request: &ChatRequest<'_>) -> Result<String, StructuringError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::OllamaConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    StructuringError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    StructuringError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

impl LlmClient for OllamaClient {
    fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, StructuringError> {
        self.post_chat(&ChatRequest {
            model,
            messages,
            stream: false,
            format: Some("json"),
            options: Some(options),
        })
    }
}

impl VisionClient for OllamaClient {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage {
            images: Some(images.to_vec()),
            ..ChatMessage::user(user_prompt)
        });

        let options = GenerationOptions::deterministic();
        self.post_chat(&ChatRequest {
            model,
            messages: &messages,
            stream: false,
            format: None,
            options: Some(&options),
        })
    }
}

/// Mock LLM client for testing. Returns a configurable response and
/// records every conversation it receives.
pub struct MockLlmClient {
    response: Result<String, String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails as if Ollama were down.
    pub fn unreachable() -> Self {
        Self {
            response: Err("http://localhost:11434".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Conversations received so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn chat(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<String, StructuringError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.response
            .clone()
            .map_err(StructuringError::OllamaConnection)
    }
}
