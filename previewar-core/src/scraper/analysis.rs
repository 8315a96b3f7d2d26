use std::collections::HashSet;

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::bot_wall::detect_bot_wall;
use super::http_client::ScraperHttpClient;
use super::page_filter::{collect_image_urls, filter_product_html, resolve_url, MAX_FILTERED_CHARS};
use super::types::PageAnalysis;
use crate::llm::{parse_json_reply, truncate_chars, ChatBackend, ChatMessage, ChatRequest};

pub fn build_page_analysis_prompt(filtered_html: &str, page_url: &str) -> String {
    format!(
        r#"You are a precise information extraction model. Extract product DIMENSIONS and IMAGE URLS from product page HTML.

# INPUT
Page URL: {page_url}
The relevant HTML of the product page:
<HTML>
{filtered_html}
</HTML>

# TASK
1) Find the product's physical dimensions anywhere in the HTML (bullets, specs tables, description blocks).
2) Collect ALL product image URLs (primary + gallery). Prefer full-resolution URLs.

# HOW TO EXTRACT
- Look in product detail tables ("Product Dimensions", "Item Dimensions LxWxH"), bullets and description blocks.
- Dimension patterns look like "Dimensions: 12.5 x 8 x 3 inches", "Item Dimensions LxWxH: 10 x 5 x 2 in", "Height: 15 cm".
- Convert cm/mm to inches (1 inch = 2.54 cm; 10 mm = 1 cm).
- Return actual values and absolute image URLs, never CSS selectors.
- Deduplicate image URLs.

# IMAGE URL RULES
- Prefer the highest-resolution variant ("hiRes", "data-old-hires", "mainImage", largest gallery entry).
- Resolve relative URLs against the page URL.
- Include ALL product images, primary first if identifiable.

# OUTPUT FORMAT (STRICT)
Return ONLY a single JSON object. No prose, no markdown, no explanations.
{{
  "potential_dimension_values": [<string>, ...],
  "image_urls": [<string>, ...]
}}
Normalize units to inches inside the strings (e.g. "31.8 cm" -> "12.52 in"). The JSON must be valid: no trailing commas, no comments."#
    )
}

/// Parse the analysis reply. Missing arrays are empty, non-string entries
/// are ignored and image URLs are made absolute.
pub fn parse_page_analysis(reply: &str, page_url: &str) -> Result<PageAnalysis, String> {
    let value = parse_json_reply(reply)?;
    if !value.is_object() {
        return Err("Model did not return a JSON object for page analysis".to_string());
    }

    let strings = |key: &str| -> Vec<String> {
        value[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let image_urls = strings("image_urls")
        .iter()
        .filter_map(|raw| resolve_url(raw, base.as_ref()))
        .filter(|u| seen.insert(u.clone()))
        .collect();

    Ok(PageAnalysis {
        potential_dimension_values: strings("potential_dimension_values"),
        image_urls,
        bot_wall: None,
    })
}

/// Extract dimension strings and image URLs from a fetched product page.
pub async fn analyze_page<B: ChatBackend>(
    html: &str,
    page_url: &str,
    company: Option<&str>,
    backend: &B,
) -> Result<PageAnalysis, String> {
    let bot_wall = detect_bot_wall(html);
    if let Some(wall) = bot_wall {
        warn!("{} detected at {}, results may be empty", wall.describe(), page_url);
    }

    let mut filtered = filter_product_html(html, company);
    if filtered.trim().is_empty() {
        warn!("Filtered HTML for {} is empty, falling back to page text", page_url);
        let text = ScraperHttpClient::html_to_text(html);
        filtered = truncate_chars(&text, MAX_FILTERED_CHARS).to_string();
    }
    info!(
        "Analyzing {} ({} chars of {} after filtering)",
        page_url,
        filtered.len(),
        html.len()
    );

    let prompt = build_page_analysis_prompt(&filtered, page_url);
    let request = ChatRequest::new(None, vec![ChatMessage::user(prompt)]).expect_json_object();
    let reply = backend.complete(&request).await?;

    let mut analysis = parse_page_analysis(&reply, page_url)?;
    let from_model = analysis.image_urls.len();
    for url in collect_image_urls(html, page_url) {
        if !analysis.image_urls.contains(&url) {
            analysis.image_urls.push(url);
        }
    }
    info!(
        "Found {} dimension strings and {} image URLs ({} from markup)",
        analysis.potential_dimension_values.len(),
        analysis.image_urls.len(),
        analysis.image_urls.len() - from_model
    );

    analysis.bot_wall = bot_wall;
    Ok(analysis)
}
