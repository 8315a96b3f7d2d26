//! Segmentation target and inpainting negative prompt for the best image.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::image_prep::{prepare_image_for_vision, vision_media_type};
use crate::llm::{strip_markdown_json, ChatBackend, ChatMessage, ChatRequest, ContentPart};

const VISION_SYSTEM_PROMPT: &str = "You are a concise vision assistant that outputs strict JSON only.";

/// What the downstream segmentation and inpainting steps need.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptResult {
    pub target_object: String,
    pub negative_prompt: String,
    pub best_image_url: Option<String>,
}

/// First usable product name, or `"product"`.
pub fn pick_target_object(product_names: &[String]) -> String {
    product_names
        .iter()
        .map(|n| n.trim())
        .find(|n| !n.is_empty())
        .unwrap_or("product")
        .to_string()
}

pub fn build_negative_prompt_request(target_object: &str, image_base64: &str) -> ChatRequest {
    let text = format!(
        "You are given a product image and the target object name.\n\
         Target/main object: '{target_object}'.\n\n\
         1) Look at the image and identify physical objects that are NOT the target object.\n   \
         Examples for a couch: blankets, pillows, throws, people, pets, tables, lamps, rugs, \
         background furniture, decor, plants, clutter, text, logos, watermarks, reflections.\n\
         2) Only list objects that could reasonably be suppressed or excluded when inpainting \
         or generating images.\n\
         3) Do NOT include the main target object or clear synonyms of it.\n\
         4) Return ONLY a JSON object of the form:\n   \
         {{\"negative_objects\": [\"blanket\", \"pillow\", \"person\", ...]}}\n   \
         No extra text, no markdown."
    );

    ChatRequest::new(
        Some(VISION_SYSTEM_PROMPT),
        vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text(text),
                ContentPart::ImageBase64 {
                    media_type: vision_media_type().to_string(),
                    data: image_base64.to_string(),
                },
            ],
        }],
    )
    .expect_json_object()
}

/// Lowercase, trim, drop excluded names and deduplicate in first-seen order.
pub fn clean_negative_objects(raw: &[Value], exclude: &[String]) -> Vec<String> {
    let excluded: HashSet<String> = exclude.iter().map(|e| e.trim().to_lowercase()).collect();
    let mut seen = HashSet::new();

    raw.iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && !excluded.contains(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// The raw `negative_objects` list; anything unexpected yields an empty list.
pub fn parse_negative_objects(reply: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(&strip_markdown_json(reply)) {
        Ok(Value::Object(mut map)) => match map.remove("negative_objects") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("Negative-object reply is not valid JSON: {}", e);
            Vec::new()
        }
    }
}

/// Ask a vision model which non-target objects appear in the image and
/// return them as a comma-separated negative prompt.
pub async fn generate_negative_prompt<B: ChatBackend>(
    target_object: &str,
    aliases: &[String],
    image_bytes: &[u8],
    backend: &B,
) -> Result<String, String> {
    let Some(image_base64) = prepare_image_for_vision(image_bytes)? else {
        warn!("Skipping negative prompt for '{}': image too small", target_object);
        return Ok(String::new());
    };
    let request = build_negative_prompt_request(target_object, &image_base64);
    let reply = backend.complete(&request).await?;

    let mut exclude = aliases.to_vec();
    exclude.push(target_object.to_string());
    let objects = clean_negative_objects(&parse_negative_objects(&reply), &exclude);

    info!(
        "Found {} non-target objects around '{}'",
        objects.len(),
        target_object
    );
    Ok(objects.join(", "))
}
