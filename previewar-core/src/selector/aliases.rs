use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{info, warn};

use super::prompts::{build_alias_prompt, ALIAS_SYSTEM_PROMPT};
use crate::llm::{strip_markdown_json, ChatBackend, ChatMessage, ChatRequest};

/// Merge the model's aliases with the seeds: trimmed, lowercased, sorted and
/// deduplicated. A reply that is not JSON contributes nothing.
pub fn parse_aliases(reply: &str, seeds: &[String]) -> Vec<String> {
    let aliases: Vec<Value> = match serde_json::from_str::<Value>(&strip_markdown_json(reply)) {
        Ok(Value::Array(items)) => items,
        // Some models wrap the list, e.g. {"aliases": [...]}
        Ok(Value::Object(map)) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("Alias reply is not valid JSON ({}), keeping seed names only", e);
            Vec::new()
        }
    };

    normalized_pool(
        seeds
            .iter()
            .map(String::as_str)
            .chain(aliases.iter().filter_map(Value::as_str)),
    )
}

fn normalized_pool<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Expand product nouns with synonyms and commonly co-pictured objects.
/// Never fails: on a backend error the normalised seeds are returned.
pub async fn expand_aliases<B: ChatBackend>(seeds: &[String], backend: &B) -> Vec<String> {
    if seeds.is_empty() {
        return Vec::new();
    }

    let request = ChatRequest::new(
        Some(ALIAS_SYSTEM_PROMPT),
        vec![ChatMessage::user(build_alias_prompt(seeds))],
    );

    match backend.complete(&request).await {
        Ok(reply) => {
            let names = parse_aliases(&reply, seeds);
            info!("Expanded {} seed names to {} aliases", seeds.len(), names.len());
            names
        }
        Err(e) => {
            warn!("Alias expansion failed: {}, using seed names", e);
            normalized_pool(seeds.iter().map(String::as_str))
        }
    }
}
