use serde_json::Value;
use tracing::{info, warn};

use super::prompts::{build_dimensions_prompt, dimensions_json_schema};
use super::types::Dimensions;
use crate::llm::{parse_json_reply, ChatBackend, ChatMessage, ChatRequest};

/// Parse `{length, width, height}` from the model reply.
pub fn parse_dimensions(reply: &str) -> Result<Dimensions, String> {
    let value = parse_json_reply(reply)?;
    let obj = value
        .as_object()
        .ok_or_else(|| "Model did not return a JSON object for dimensions".to_string())?;

    let field = |name: &str| -> Option<f64> {
        let raw = obj.get(name)?;
        let parsed = inches_value(raw);
        if parsed.is_none() && !raw.is_null() {
            warn!("Ignoring unparseable {} value: {}", name, raw);
        }
        parsed
    };

    Ok(Dimensions {
        length: field("length"),
        width: field("width"),
        height: field("height"),
    })
}

/// A number, or a numeric string optionally suffixed with `in`, `inches` or `"`.
fn inches_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim().to_lowercase();
            let number = trimmed
                .strip_suffix("inches")
                .or_else(|| trimmed.strip_suffix("in"))
                .or_else(|| trimmed.strip_suffix('"'))
                .unwrap_or(trimmed.as_str())
                .trim();
            number.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Ask the model to settle noisy dimension strings into inches.
pub async fn choose_dimensions<B: ChatBackend>(
    candidates: &[String],
    backend: &B,
) -> Result<Dimensions, String> {
    if candidates.is_empty() {
        info!("No dimension candidates, skipping dimension selection");
        return Ok(Dimensions::default());
    }

    let request = ChatRequest::new(None, vec![ChatMessage::user(build_dimensions_prompt(candidates))])
        .with_schema("dimensions", dimensions_json_schema());
    let reply = backend.complete(&request).await?;
    let dims = parse_dimensions(&reply)?;

    info!(
        "Chose dimensions L={:?} W={:?} H={:?} from {} candidates",
        dims.length,
        dims.width,
        dims.height,
        candidates.len()
    );
    Ok(dims)
}
