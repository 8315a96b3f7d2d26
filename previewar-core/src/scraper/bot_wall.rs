//! Detection of anti-automation interstitials served instead of a product page.
//!
//! Pages are fetched as static HTML, so these walls cannot be clicked through.
//! Detecting them lets the pipeline explain an empty scrape instead of
//! silently returning nothing.

use serde::{Deserialize, Serialize};

/// Kind of interstitial found on a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotWall {
    /// Amazon's "Continue shopping" / robot-check page.
    AmazonSafeguard,
    /// "Press & Hold" human challenge (PerimeterX, used by Wayfair and others).
    PressAndHold,
    /// Cloudflare browser check or generic "verify you are human" captcha.
    Captcha,
}

impl BotWall {
    pub fn describe(&self) -> &'static str {
        match self {
            BotWall::AmazonSafeguard => "Amazon bot safeguard page",
            BotWall::PressAndHold => "press-and-hold human challenge",
            BotWall::Captcha => "captcha / browser verification page",
        }
    }
}

/// Markers that only appear on the real Amazon product page.
const AMAZON_PRODUCT_MARKERS: &[&str] = &["id=\"producttitle\"", "id=\"landingimage\"", "id=\"add-to-cart-button\""];

const AMAZON_SAFEGUARD_MARKERS: &[&str] = &[
    "continue shopping",
    "/errors/validatecaptcha",
    "type the characters you see in this image",
    "sorry, we just need to make sure you're not a robot",
    "api-services-support@amazon.com",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "verify you are human",
    "are you a robot",
    "cf-challenge",
    "challenge-platform",
    "checking your browser before accessing",
    "g-recaptcha",
    "h-captcha",
];

/// Inspect fetched HTML for a known interstitial.
pub fn detect_bot_wall(html: &str) -> Option<BotWall> {
    let lower = html.to_lowercase();

    let has_product_markers = AMAZON_PRODUCT_MARKERS.iter().any(|m| lower.contains(m));
    if !has_product_markers && AMAZON_SAFEGUARD_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(BotWall::AmazonSafeguard);
    }

    if is_press_and_hold(&lower) {
        return Some(BotWall::PressAndHold);
    }

    if CAPTCHA_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(BotWall::Captcha);
    }

    None
}

fn is_press_and_hold(lower: &str) -> bool {
    lower.contains("px-captcha")
        || lower.contains("press &amp; hold")
        || lower.contains("press & hold")
        || lower.contains("press and hold")
}
