use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewArError {
    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No API key configured for '{provider}'. Set {env_var} or run `previewar key set {provider} <KEY>`.")]
    MissingApiKey { provider: String, env_var: String },

    #[error("Unknown AI provider: '{0}'. Supported: openai, claude, openrouter, kimi")]
    UnknownProvider(String),
}

impl From<PreviewArError> for String {
    fn from(err: PreviewArError) -> Self {
        err.to_string()
    }
}
