//! Choosing the best product image and settling the product's size.

pub mod aliases;
pub mod dimensions;
pub mod prompts;
pub mod ranking;
pub mod types;
pub mod validation;

use std::collections::HashSet;

use url::Url;

pub use aliases::{expand_aliases, parse_aliases};
pub use dimensions::{choose_dimensions, parse_dimensions};
pub use ranking::{parse_ranking, rank_images};
pub use types::{BestImage, Dimensions, ImageRanking, ImageScore, ProductReport, ValidationWarning};
pub use validation::validate_dimensions;

/// Default cap on candidate images sent for ranking.
pub const DEFAULT_MAX_IMAGES: usize = 30;

/// Trim, keep only http(s) URLs, drop exact duplicates and cap the list.
/// `None` or `Some(0)` means no cap.
pub fn normalize_url_list(urls: &[String], max_images: Option<usize>) -> Vec<String> {
    let cap = max_images.filter(|&n| n > 0);
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();

    for raw in urls {
        if cap.is_some_and(|n| cleaned.len() >= n) {
            break;
        }
        let url = raw.trim();
        if url.is_empty() || seen.contains(url) {
            continue;
        }
        let is_web = Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
        if !is_web {
            continue;
        }
        seen.insert(url.to_string());
        cleaned.push(url.to_string());
    }

    cleaned
}
