pub mod cache;
pub mod config;
pub mod error;
pub mod image_prep;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod scraper;
pub mod selector;
mod writer;

pub use config::Settings;
pub use error::PreviewArError;
pub use llm::{ChatBackend, HttpChatBackend, Provider};
pub use pipeline::Pipeline;
pub use prompt::PromptResult;
pub use selector::ProductReport;
pub use writer::write_atomic;
