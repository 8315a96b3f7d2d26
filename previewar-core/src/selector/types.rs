use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scraper::BotWall;

/// Product size in inches. Depth is reported as width.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Dimensions {
    pub fn is_empty(&self) -> bool {
        self.length.is_none() && self.width.is_none() && self.height.is_none()
    }
}

/// Per-image occlusion assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageScore {
    /// Number of occluding objects; lower is better. None when the model
    /// returned something that is not an integer.
    pub occlusion_score: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageRanking {
    pub best_image_url: Option<String>,
    pub reasoning: String,
    pub scores: BTreeMap<String, ImageScore>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BestImage {
    pub image_url: Option<String>,
    pub reasoning: String,
}

/// Everything learned about one product page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductReport {
    pub url: String,
    pub company_name: String,
    /// Product nouns as identified from the page, in the model's order
    #[serde(default)]
    pub identified_names: Vec<String>,
    /// Seed product names plus model-suggested aliases, lowercase and sorted
    pub product_names: Vec<String>,
    pub dimensions: Dimensions,
    pub all_image_urls: Vec<String>,
    pub best_image: BestImage,
    pub scores: BTreeMap<String, ImageScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_wall: Option<BotWall>,
    pub generated_at: DateTime<Utc>,
}

/// A warning about an implausible value.
/// Warnings are informational; they never abort the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub value: String,
}
