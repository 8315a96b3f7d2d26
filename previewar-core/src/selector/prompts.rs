use serde_json::json;

use super::types::Dimensions;

pub const ALIAS_SYSTEM_PROMPT: &str = "You are a precise, terse product taxonomy assistant.";
pub const RANKING_SYSTEM_PROMPT: &str = "You are a meticulous product image judge.";

/// Prompt asking for short aliases of the seed product nouns.
pub fn build_alias_prompt(seeds: &[String]) -> String {
    format!(
        "You are helping expand concise product nouns for ranking images.\n\
         Rules:\n \
         - Return ONLY a JSON array of short names.\n \
         - Include plural/singular variants if common (e.g., 'sofa','sofas').\n \
         - Include things that you may also have with the object. For example couches may have pillows.\n \
         - Exclude brands, model numbers, materials unless essential to identity.\n \
         - Keep each item <= 3 words. No duplicates. Lowercase.\n\n\
         Seed names: {}\n",
        serde_json::to_string(seeds).unwrap_or_else(|_| "[]".to_string())
    )
}

/// Ranking instructions followed by the JSON payload the model judges.
pub fn build_ranking_prompt(
    image_urls: &[String],
    product_names: &[String],
    dimensions: Option<&Dimensions>,
) -> String {
    let payload = json!({
        "product_names": product_names,
        "dimensions_hint": dimensions.map_or_else(|| json!({}), |d| json!(d)),
        "image_urls": image_urls,
    });

    format!(
        "You are ranking candidate product images by how unobstructed the MAIN object is.\n\
         Consider the product identity from the provided names. Measurement overlays are permitted.\n\
         Hard rules:\n \
         - Minimize objects covering/obscuring the main object (occlusions). Best is 0.\n \
         - If tie: prefer front-facing, centered, entire object in frame.\n \
         - Okay to have an image with measurement overlays.\n \
         - A measurement/diagram-style image, if available, is preferred over other images.\n \
         - Output strictly in JSON with keys: best_image_url, reasoning, scores.\n   \
         Where 'scores' maps each URL to an object with: occlusion_score (integer; lower is better), notes.\n\n\
         Payload:\n{}",
        payload
    )
}

/// Prompt asking the model to settle on length/width/height in inches.
pub fn build_dimensions_prompt(candidates: &[String]) -> String {
    let listed: Vec<String> = candidates.iter().map(|c| format!("- {}", c)).collect();
    format!(
        "Candidate dimension strings:\n{}\n\n\
         Rules:\n\
         - Prefer explicitly labeled product/item dimensions.\n\
         - Prefer product/item over package/box dimensions.\n\
         - Resolve synonyms: depth=breadth=width (unless clearly LxWxH triplet says otherwise); height is vertical.\n\
         - Normalize to inches (1 in = 2.54 cm; 25.4 mm = 1 in).\n\
         - Depth is the same as width.\n\
         - Use null for a value you cannot determine.\n\
         Return ONLY a JSON object in the format: {{\"length\": <number|null>, \"width\": <number|null>, \"height\": <number|null>}}",
        listed.join("\n")
    )
}

pub fn dimensions_json_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "length": {"type": ["number", "null"], "description": "Length in inches"},
            "width": {"type": ["number", "null"], "description": "Width (or depth) in inches"},
            "height": {"type": ["number", "null"], "description": "Height in inches"}
        },
        "required": ["length", "width", "height"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_prompt_lists_seeds_as_json() {
        let prompt = build_alias_prompt(&["sectional".to_string(), "couch".to_string()]);
        assert!(prompt.contains("Seed names: [\"sectional\",\"couch\"]"));
        assert!(prompt.contains("JSON array"));
        assert!(!prompt.contains("JSON object"));
    }

    #[test]
    fn test_ranking_prompt_carries_payload() {
        let dims = Dimensions {
            length: Some(84.0),
            width: None,
            height: Some(33.0),
        };
        let prompt = build_ranking_prompt(
            &["https://x.com/a.jpg".to_string()],
            &["sofa".to_string()],
            Some(&dims),
        );
        assert!(prompt.contains("Best is 0"));
        assert!(prompt.contains("JSON with keys"));
        let payload_start = prompt.find("Payload:\n").unwrap() + "Payload:\n".len();
        let payload: serde_json::Value = serde_json::from_str(&prompt[payload_start..]).unwrap();
        assert_eq!(payload["product_names"][0], "sofa");
        assert_eq!(payload["dimensions_hint"]["length"], 84.0);
        assert!(payload["dimensions_hint"]["width"].is_null());
        assert_eq!(payload["image_urls"][0], "https://x.com/a.jpg");
    }

    #[test]
    fn test_ranking_prompt_without_dimensions() {
        let prompt = build_ranking_prompt(&[], &[], None);
        assert!(prompt.contains("\"dimensions_hint\":{}"));
    }

    #[test]
    fn test_dimensions_prompt_lists_candidates() {
        let prompt = build_dimensions_prompt(&["84 in W".to_string(), "Package: 90 x 40 x 30 in".to_string()]);
        assert!(prompt.starts_with("Candidate dimension strings:\n- 84 in W\n- Package: 90 x 40 x 30 in\n"));
        assert!(prompt.contains("Depth is the same as width"));
        assert!(prompt.contains("JSON object"));
    }
}
