//! Reduce a product page to the fragments that carry images and specs.
//!
//! Product pages are routinely several megabytes of markup. Dimensions live in
//! `<span>`/`<td>` cells (and `<li>` bullets on IKEA), images in `<img>`, so
//! everything else is dropped before the page is sent to a model.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::llm::truncate_chars;

/// Upper bound on the filtered HTML sent to a model.
pub const MAX_FILTERED_CHARS: usize = 120_000;

/// Tags whose innermost occurrences are kept for the given retailer.
pub fn kept_tags(company: Option<&str>) -> &'static [&'static str] {
    let is_ikea = company.is_some_and(|c| c.to_lowercase().contains("ikea"));
    if is_ikea {
        &["img", "li", "span", "td"]
    } else {
        &["img", "span", "td"]
    }
}

/// Keep every `<img>` and every innermost `<span>`/`<td>` (plus `<li>` for
/// IKEA) in document order, joined by single spaces.
///
/// An element that contains another element with the same tag name is not
/// kept itself; its children are searched instead. Once an element is kept
/// its subtree is not visited again.
pub fn filter_product_html(html: &str, company: Option<&str>) -> String {
    let document = Html::parse_document(html);
    let tags = kept_tags(company);

    let mut fragments: Vec<String> = Vec::new();
    let mut stack: Vec<ElementRef> = vec![document.root_element()];

    while let Some(element) = stack.pop() {
        let name = element.value().name();
        if tags.contains(&name) && (name == "img" || !has_same_tag_descendant(element, name)) {
            fragments.push(element.html());
            continue;
        }

        let children: Vec<ElementRef> = element.children().filter_map(ElementRef::wrap).collect();
        stack.extend(children.into_iter().rev());
    }

    let joined = fragments.join(" ");
    truncate_chars(&joined, MAX_FILTERED_CHARS).to_string()
}

fn has_same_tag_descendant(element: ElementRef, name: &str) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|d| d.value().name() == name)
}

/// Collect image URLs straight from the markup, without a model.
///
/// Per `<img>` the first usable candidate wins, in order: `data-old-hires`,
/// the largest entry of `data-a-dynamic-image`, `data-zoom-image`, the widest
/// `srcset` entry, `data-src`, `src`. `og:image` meta tags come first since
/// they usually point at the primary product shot.
pub fn collect_image_urls(html: &str, base_url: &str) -> Vec<String> {
    let (Ok(meta), Ok(img)) = (
        Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#),
        Selector::parse("img"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let mut push = |raw: &str| {
        if let Some(resolved) = resolve_url(raw, base.as_ref()) {
            if seen.insert(resolved.clone()) {
                urls.push(resolved);
            }
        }
    };

    for element in document.select(&meta) {
        if let Some(content) = element.value().attr("content") {
            push(content);
        }
    }

    for element in document.select(&img) {
        let attrs = element.value();
        if is_tracking_pixel(attrs.attr("width"), attrs.attr("height")) {
            continue;
        }

        let candidates = [
            attrs.attr("data-old-hires").map(str::to_string),
            attrs.attr("data-a-dynamic-image").and_then(largest_dynamic_image),
            attrs.attr("data-zoom-image").map(str::to_string),
            attrs.attr("srcset").and_then(largest_srcset_candidate),
            attrs.attr("data-src").map(str::to_string),
            attrs.attr("src").map(str::to_string),
        ];

        if let Some(best) = candidates
            .into_iter()
            .flatten()
            .map(|c| c.trim().to_string())
            .find(|c| !c.is_empty() && !c.starts_with("data:"))
        {
            push(&best);
        }
    }

    urls
}

/// Resolve a possibly relative URL against the page URL. Only http(s) results
/// are returned.
pub fn resolve_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
        Err(_) => return None,
    };

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn is_tracking_pixel(width: Option<&str>, height: Option<&str>) -> bool {
    let tiny = |v: Option<&str>| v.and_then(|s| s.trim().parse::<u32>().ok()).is_some_and(|n| n <= 1);
    tiny(width) || tiny(height)
}

/// Pick the widest candidate from a `srcset` attribute. Density descriptors
/// (`2x`) are compared the same way as width descriptors.
fn largest_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            let size = parts
                .next()
                .and_then(|d| d.trim_end_matches(|c: char| c == 'w' || c == 'x').parse::<f64>().ok())
                .unwrap_or(1.0);
            Some((url.to_string(), size))
        })
        .fold(None, |best: Option<(String, f64)>, (url, size)| match best {
            Some((_, best_size)) if best_size >= size => best,
            _ => Some((url, size)),
        })
        .map(|(url, _)| url)
}

/// Amazon stores `{"url": [width, height], ...}` in `data-a-dynamic-image`.
fn largest_dynamic_image(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value
        .as_object()?
        .iter()
        .map(|(url, dims)| {
            let w = dims[0].as_f64().unwrap_or(0.0);
            let h = dims[1].as_f64().unwrap_or(0.0);
            (url.clone(), w * h)
        })
        .fold(None, |best: Option<(String, f64)>, (url, area)| match best {
            Some((_, best_area)) if best_area >= area => best,
            _ => Some((url, area)),
        })
        .map(|(url, _)| url)
}
