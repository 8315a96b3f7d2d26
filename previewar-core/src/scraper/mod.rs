//! Fetching product pages and pulling product facts out of them.

pub mod analysis;
pub mod bot_wall;
pub mod http_client;
pub mod page_filter;
pub mod types;
pub mod url_info;

pub use analysis::analyze_page;
pub use bot_wall::{detect_bot_wall, BotWall};
pub use http_client::{ClientOptions, ScraperHttpClient};
pub use types::{PageAnalysis, ProductInfo};
pub use url_info::identify_product;
