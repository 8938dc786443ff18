use serde::{Deserialize, Serialize};

use super::ollama_types::GenerationOptions;
use super::StructuringError;

/// One turn of an Ollama `/api/chat` conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images (vision requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::with_role("system", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn user(content: &str) -> Self {
        Self::with_role("user", content)
    }

    fn with_role(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            images: None,
        }
    }
}

/// Generative-text capability constrained to JSON output (allows mocking).
pub trait LlmClient: Send + Sync {
    /// Run one non-streaming chat completion and return the reply content.
    fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, StructuringError>;
}

/// Vision-capable model access, consumed by the OCR engine.
pub trait VisionClient {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError>;
}
