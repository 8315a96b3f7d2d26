//! Language-model access for every pipeline stage.
//!
//! All model calls go through [`ChatBackend`]. The HTTP implementation in
//! [`http`] speaks the OpenAI, Anthropic, OpenRouter and Moonshot APIs.

pub mod http;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use serde_json::Value;
use tracing::error;

pub use http::{HttpChatBackend, DEFAULT_MAX_OUTPUT_TOKENS};

use crate::error::PreviewArError;

/// Supported language-model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Claude,
    OpenRouter,
    Kimi,
}

impl Provider {
    /// Parse a provider name, case-insensitively. Accepts a few common aliases.
    pub fn parse(name: &str) -> Result<Provider, PreviewArError> {
        match name.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Provider::OpenAi),
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openrouter" => Ok(Provider::OpenRouter),
            "kimi" | "moonshot" => Ok(Provider::Kimi),
            _ => Err(PreviewArError::UnknownProvider(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
            Provider::OpenRouter => "openrouter",
            Provider::Kimi => "kimi",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-5",
            Provider::Claude => "claude-sonnet-4-20250514",
            Provider::OpenRouter => "openai/gpt-5",
            Provider::Kimi => "moonshot-v1-128k-vision-preview",
        }
    }

    /// Environment variable consulted before the keychain.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Claude => "ANTHROPIC_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Kimi => "MOONSHOT_API_KEY",
        }
    }

    pub fn keychain_service(&self) -> String {
        format!("previewar-{}-api", self.as_str())
    }

    pub fn all() -> [Provider; 4] {
        [
            Provider::OpenAi,
            Provider::Claude,
            Provider::OpenRouter,
            Provider::Kimi,
        ]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    ImageBase64 { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn has_image(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::ImageBase64 { .. }))
    }
}

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Strict output schema as `(name, schema)`. Only honoured by providers
    /// that support `json_schema` response formats; others get JSON mode.
    pub json_schema: Option<(String, Value)>,
    /// Ask for a single JSON object reply (provider JSON mode). Implied by a
    /// schema. Leave unset for replies that are bare arrays.
    pub json_object: bool,
}

impl ChatRequest {
    pub fn new(system: Option<&str>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.map(|s| s.to_string()),
            messages,
            json_schema: None,
            json_object: false,
        }
    }

    pub fn with_schema(mut self, name: &str, schema: Value) -> Self {
        self.json_schema = Some((name.to_string(), schema));
        self.json_object = true;
        self
    }

    pub fn expect_json_object(mut self) -> Self {
        self.json_object = true;
        self
    }
}

/// Something that can answer a chat request with the model's text reply.
pub trait ChatBackend: Send + Sync {
    fn complete(&self, request: &ChatRequest)
        -> impl Future<Output = Result<String, String>> + Send;
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip markdown code fences from an LLM reply if present.
/// Providers without strict JSON mode often wrap JSON in ```json ... ```,
/// sometimes all on one line.
pub fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let body = match fenced.find('\n') {
        Some(pos) => &fenced[pos + 1..],
        None => {
            let fenced = fenced.trim_start_matches('`');
            // Language tag directly followed by the payload: ```json {...}```
            let untagged = fenced.trim_start_matches(|c: char| c.is_ascii_alphabetic());
            if untagged.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '[') {
                untagged
            } else {
                fenced
            }
        }
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Strip fences and parse the reply as JSON.
pub fn parse_json_reply(text: &str) -> Result<Value, String> {
    let cleaned = strip_markdown_json(text);
    serde_json::from_str(&cleaned).map_err(|e| {
        let shown = truncate_chars(&cleaned, 500);
        let ellipsis = if shown.len() < cleaned.len() { "..." } else { "" };
        let msg = format!(
            "Failed to parse LLM response as JSON: {}. Raw response (first 500 chars): {}{}",
            e, shown, ellipsis
        );
        error!("{}", msg);
        msg
    })
}
