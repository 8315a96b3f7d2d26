use std::time::Duration;

use serde_json::{json, Value};
use tracing::{error, info};

use super::{truncate_chars, ChatBackend, ChatMessage, ChatRequest, ContentPart, Provider};

/// LLM calls can be slow for large HTML payloads and vision requests.
const API_TIMEOUT_SECS: u64 = 120;
/// Reasoning models spend part of this budget before emitting any text.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 16_384;

/// Chat backend that talks to a hosted provider over HTTPS.
pub struct HttpChatBackend {
    provider: Provider,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new(provider: Provider, model: &str, api_key: &str) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            provider,
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            client,
        })
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens.max(1);
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}

impl ChatBackend for HttpChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, String> {
        let (endpoint, body) = build_request_body(self.provider, &self.model, self.max_output_tokens, request);
        let provider = self.provider.as_str();

        info!(
            "Calling provider '{}' model '{}' ({} messages)",
            provider,
            self.model,
            request.messages.len()
        );

        let builder = self.client.post(endpoint).json(&body);
        let builder = match self.provider {
            Provider::Claude => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            _ => builder.header("Authorization", format!("Bearer {}", self.api_key)),
        };

        let response = builder.send().await.map_err(|e| {
            let msg = if e.is_timeout() {
                format!(
                    "LLM API timeout after {}s for provider '{}'",
                    API_TIMEOUT_SECS, provider
                )
            } else {
                format!("LLM API request failed for {}: {}", provider, e)
            };
            error!("{}", msg);
            msg
        })?;

        let body_text = handle_api_response(response, provider).await?;
        extract_reply_text(self.provider, &body_text)
    }
}

/// Endpoint and JSON body for a request to the given provider.
pub fn build_request_body(
    provider: Provider,
    model: &str,
    max_output_tokens: u32,
    request: &ChatRequest,
) -> (&'static str, Value) {
    match provider {
        Provider::Claude => {
            let messages: Vec<Value> = request.messages.iter().map(claude_message).collect();
            let mut body = json!({
                "model": model,
                "max_tokens": max_output_tokens,
                "messages": messages,
            });
            let system = request.system.clone().unwrap_or_else(|| {
                "Always respond with valid JSON only, no markdown formatting or code blocks."
                    .to_string()
            });
            body["system"] = json!(system);
            ("https://api.anthropic.com/v1/messages", body)
        }
        Provider::OpenAi | Provider::OpenRouter | Provider::Kimi => {
            let mut messages = Vec::new();
            if let Some(system) = &request.system {
                messages.push(json!({"role": "system", "content": system}));
            }
            messages.extend(request.messages.iter().map(openai_message));

            let response_format = match (&request.json_schema, provider) {
                (Some((name, schema)), Provider::OpenAi) => json!({
                    "type": "json_schema",
                    "json_schema": {"name": name, "strict": true, "schema": schema}
                }),
                _ => json!({"type": "json_object"}),
            };

            let token_field = match provider {
                Provider::OpenAi => "max_completion_tokens",
                _ => "max_tokens",
            };

            let mut body = json!({
                "model": model,
                "messages": messages,
            });
            body[token_field] = json!(max_output_tokens);
            // JSON object mode rejects bare array replies, so callers opt in.
            if request.json_object {
                body["response_format"] = response_format;
            }

            let endpoint = match provider {
                Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
                Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
                _ => "https://api.moonshot.cn/v1/chat/completions",
            };
            (endpoint, body)
        }
    }
}

fn openai_message(message: &ChatMessage) -> Value {
    if !message.has_image() && message.content.len() == 1 {
        if let ContentPart::Text(text) = &message.content[0] {
            return json!({"role": message.role, "content": text});
        }
    }

    let parts: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({"type": "text", "text": text}),
            ContentPart::ImageBase64 { media_type, data } => json!({
                "type": "image_url",
                "image_url": {"url": format!("data:{};base64,{}", media_type, data)}
            }),
        })
        .collect();
    json!({"role": message.role, "content": parts})
}

fn claude_message(message: &ChatMessage) -> Value {
    let parts: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({"type": "text", "text": text}),
            ContentPart::ImageBase64 { media_type, data } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data}
            }),
        })
        .collect();
    json!({"role": message.role, "content": parts})
}

/// Check the status and read the body text.
async fn handle_api_response(response: reqwest::Response, provider: &str) -> Result<String, String> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let shown = truncate_chars(&body, 1024);
        let ellipsis = if shown.len() < body.len() { "..." } else { "" };
        let msg = format!("LLM API error: {} from {} - {}{}", status, provider, shown, ellipsis);
        error!("{}", msg);
        return Err(msg);
    }
    response
        .text()
        .await
        .map_err(|e| format!("Failed to read API response body from {}: {}", provider, e))
}

/// Pull the assistant text out of a provider response wrapper.
pub fn extract_reply_text(provider: Provider, body_text: &str) -> Result<String, String> {
    let resp_json: Value = serde_json::from_str(body_text).map_err(|e| {
        let msg = format!("Failed to parse {} API response wrapper: {}", provider, e);
        error!("{}", msg);
        msg
    })?;

    let (text, truncated) = match provider {
        // { "content": [{"type": "text", "text": "..."}], "stop_reason": "end_turn" }
        Provider::Claude => (
            resp_json["content"]
                .as_array()
                .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str())),
            resp_json["stop_reason"].as_str() == Some("max_tokens"),
        ),
        // { "choices": [{"message": {"content": "..."}, "finish_reason": "stop"}] }
        _ => (
            resp_json["choices"][0]["message"]["content"].as_str(),
            resp_json["choices"][0]["finish_reason"].as_str() == Some("length"),
        ),
    };

    if truncated {
        let msg = format!(
            "{} reply was cut off at the output token limit; raise max_output_tokens in the settings",
            provider
        );
        error!("{}", msg);
        return Err(msg);
    }

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => {
            let msg = format!("Empty text content in {} API response", provider);
            error!("{}", msg);
            Err(msg)
        }
        None => {
            let msg = format!("No text content in {} API response", provider);
            error!("{}", msg);
            Err(msg)
        }
    }
}
