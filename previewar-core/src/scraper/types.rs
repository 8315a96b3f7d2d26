use serde::{Deserialize, Serialize};

use super::bot_wall::BotWall;

/// Retailer and product nouns identified for a product page URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductInfo {
    /// Retailer hosting the page (e.g. "IKEA", "Amazon")
    pub company_name: String,
    /// Short nouns for the product being sold (e.g. ["sectional", "couch"])
    #[serde(rename = "product_name")]
    pub product_names: Vec<String>,
}

/// What the page analysis found in the product HTML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageAnalysis {
    /// Raw dimension strings, already normalised towards inches by the model
    pub potential_dimension_values: Vec<String>,
    /// Absolute image URLs, primary image first when identifiable
    pub image_urls: Vec<String>,
    /// Interstitial detected instead of (or on top of) the product page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_wall: Option<BotWall>,
}
