use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::prompts::{build_ranking_prompt, RANKING_SYSTEM_PROMPT};
use super::types::{Dimensions, ImageRanking, ImageScore};
use crate::llm::{strip_markdown_json, ChatBackend, ChatMessage, ChatRequest};

/// Parse the ranking reply and settle on a best image from `candidates`.
///
/// The model's own pick wins when it is one of the candidates. Otherwise the
/// candidate with the lowest integer occlusion score is used, then the first
/// candidate. The reasoning records which fallback applied.
pub fn parse_ranking(reply: &str, candidates: &[String]) -> ImageRanking {
    let data = match serde_json::from_str::<Value>(&strip_markdown_json(reply)) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Ranking reply is not a JSON object, ignoring it");
            Map::new()
        }
        Err(e) => {
            warn!("Ranking reply is not valid JSON: {}", e);
            Map::new()
        }
    };

    let scores: BTreeMap<String, ImageScore> = data
        .get("scores")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .map(|(url, entry)| (url.clone(), parse_score(entry)))
                .collect()
        })
        .unwrap_or_default();

    let model_reasoning = data
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let model_choice = data.get("best_image_url").and_then(Value::as_str).map(str::trim);

    let (best_image_url, reasoning) = match model_choice {
        Some(choice) if candidates.iter().any(|c| c == choice) => (Some(choice.to_string()), model_reasoning),
        _ => {
            if let Some(choice) = model_choice {
                warn!("Model picked '{}', which is not a candidate", choice);
            }
            match lowest_occlusion(candidates, &scores) {
                Some(url) => (
                    Some(url),
                    prefixed("Picked the candidate with the lowest occlusion score.", &model_reasoning),
                ),
                None => match candidates.first() {
                    Some(first) => (
                        Some(first.clone()),
                        prefixed("No usable model choice; defaulted to the first candidate.", &model_reasoning),
                    ),
                    None => (None, model_reasoning),
                },
            }
        }
    };

    ImageRanking {
        best_image_url,
        reasoning,
        scores,
    }
}

fn parse_score(entry: &Value) -> ImageScore {
    let (raw_score, notes) = match entry {
        Value::Object(obj) => (
            obj.get("occlusion_score"),
            obj.get("notes").and_then(Value::as_str).unwrap_or("").to_string(),
        ),
        other => (Some(other), String::new()),
    };
    ImageScore {
        occlusion_score: raw_score.and_then(integer_score),
        notes,
    }
}

/// Integers, and floats with no fractional part, count as scores.
fn integer_score(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

/// Lowest scored candidate; ties go to the earlier candidate.
fn lowest_occlusion(candidates: &[String], scores: &BTreeMap<String, ImageScore>) -> Option<String> {
    candidates
        .iter()
        .filter_map(|url| scores.get(url)?.occlusion_score.map(|s| (url, s)))
        .fold(None, |best: Option<(&String, i64)>, (url, score)| match best {
            Some((_, best_score)) if best_score <= score => best,
            _ => Some((url, score)),
        })
        .map(|(url, _)| url.clone())
}

fn prefixed(prefix: &str, reasoning: &str) -> String {
    if reasoning.is_empty() {
        prefix.to_string()
    } else {
        format!("{} {}", prefix, reasoning)
    }
}

/// Ask the model which image shows the product least occluded.
pub async fn rank_images<B: ChatBackend>(
    image_urls: &[String],
    product_names: &[String],
    dimensions: Option<&Dimensions>,
    backend: &B,
) -> Result<ImageRanking, String> {
    if image_urls.is_empty() {
        return Ok(ImageRanking {
            best_image_url: None,
            reasoning: "No images provided.".to_string(),
            scores: BTreeMap::new(),
        });
    }

    let request = ChatRequest::new(
        Some(RANKING_SYSTEM_PROMPT),
        vec![ChatMessage::user(build_ranking_prompt(image_urls, product_names, dimensions))],
    )
    .expect_json_object();
    let reply = backend.complete(&request).await?;
    let ranking = parse_ranking(&reply, image_urls);

    info!(
        "Ranked {} images, best: {}",
        image_urls.len(),
        ranking.best_image_url.as_deref().unwrap_or("<none>")
    );
    Ok(ranking)
}
