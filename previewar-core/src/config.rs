//! User settings and API key storage.

use std::path::{Path, PathBuf};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PreviewArError;
use crate::llm::{Provider, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::scraper::ClientOptions;
use crate::selector::DEFAULT_MAX_IMAGES;
use crate::writer::write_atomic;

/// Keychain user name shared by all provider entries.
const KEYCHAIN_USER: &str = "previewar";

/// Upper bound for `cache_ttl_days`, ten years.
pub const MAX_CACHE_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub provider: String,
    /// Model override; the provider default is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_images: usize,
    pub cache_ttl_days: i64,
    pub respect_robots: bool,
    pub requests_per_second: f64,
    pub output_dir: PathBuf,
    pub dump_html: bool,
    /// Output token budget per model call.
    pub max_output_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi.as_str().to_string(),
            model: None,
            max_images: DEFAULT_MAX_IMAGES,
            cache_ttl_days: 7,
            respect_robots: true,
            requests_per_second: 1.0,
            output_dir: PathBuf::from("."),
            dump_html: false,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when None.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Settings, PreviewArError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Settings::default()),
            },
        };

        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PreviewArError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| PreviewArError::Config(format!("Invalid config {:?}: {}", path, e)))?;

        settings.validate()?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Reject values that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<(), PreviewArError> {
        self.provider()?;
        if !(1..=MAX_CACHE_TTL_DAYS).contains(&self.cache_ttl_days) {
            return Err(PreviewArError::Config(format!(
                "cache_ttl_days must be between 1 and {}, got {}",
                MAX_CACHE_TTL_DAYS, self.cache_ttl_days
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(PreviewArError::Config(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Write settings as TOML, atomically.
    pub fn save(&self, path: &Path) -> Result<(), PreviewArError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PreviewArError::Config(format!("Failed to serialize settings: {}", e)))?;
        write_atomic(path, content.as_bytes())
            .map_err(|e| PreviewArError::Config(format!("Failed to write {:?}: {}", path, e)))?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider, PreviewArError> {
        Provider::parse(&self.provider)
    }

    /// Configured model, or the provider's default.
    pub fn effective_model(&self) -> Result<String, PreviewArError> {
        match &self.model {
            Some(m) if !m.trim().is_empty() => Ok(m.trim().to_string()),
            _ => Ok(self.provider()?.default_model().to_string()),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            requests_per_second: self.requests_per_second,
            respect_robots: self.respect_robots,
            ..ClientOptions::default()
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("previewar").join("config.toml"))
}

/// Directory for the report cache, created on demand.
pub fn cache_dir() -> Result<PathBuf, PreviewArError> {
    let dir = dirs::cache_dir()
        .map(|d| d.join("previewar"))
        .ok_or_else(|| PreviewArError::Config("Could not determine cache directory".to_string()))?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| PreviewArError::Config(format!("Failed to create {:?}: {}", dir, e)))?;
    Ok(dir)
}

/// Where an API key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Keychain,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Environment => "environment",
            KeySource::Keychain => "keychain",
        }
    }
}

fn keychain_entry(provider: Provider) -> Result<Entry, PreviewArError> {
    Entry::new(&provider.keychain_service(), KEYCHAIN_USER).map_err(|e| {
        warn!("Failed to create keyring entry for {}: {}", provider, e);
        PreviewArError::Keychain(e.to_string())
    })
}

pub fn set_api_key(provider: Provider, key: &str) -> Result<(), PreviewArError> {
    info!("Setting API key for provider: {}", provider);
    keychain_entry(provider)?.set_password(key.trim()).map_err(|e| {
        warn!("Failed to set password for {}: {}", provider, e);
        PreviewArError::Keychain(e.to_string())
    })
}

pub fn get_api_key(provider: Provider) -> Result<Option<String>, PreviewArError> {
    match keychain_entry(provider)?.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => {
            warn!("Failed to get password for {}: {}", provider, e);
            Err(PreviewArError::Keychain(e.to_string()))
        }
    }
}

/// Remove the stored key. Returns false when there was nothing to delete.
pub fn delete_api_key(provider: Provider) -> Result<bool, PreviewArError> {
    info!("Deleting API key for provider: {}", provider);
    match keychain_entry(provider)?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => {
            warn!("Failed to delete credential for {}: {}", provider, e);
            Err(PreviewArError::Keychain(e.to_string()))
        }
    }
}

fn env_key(provider: Provider) -> Option<String> {
    std::env::var(provider.env_var())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Find the API key: environment variable first, then the keychain.
pub fn resolve_api_key(provider: Provider) -> Result<String, PreviewArError> {
    resolve_api_key_with(provider, env_key(provider), || get_api_key(provider))
}

fn resolve_api_key_with(
    provider: Provider,
    from_env: Option<String>,
    from_keychain: impl FnOnce() -> Result<Option<String>, PreviewArError>,
) -> Result<String, PreviewArError> {
    if let Some(key) = from_env {
        info!("Using {} key from {}", provider, provider.env_var());
        return Ok(key);
    }

    let stored = from_keychain().unwrap_or_else(|e| {
        warn!("Keychain lookup for {} failed: {}", provider, e);
        None
    });
    match stored.filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(key),
        None => Err(PreviewArError::MissingApiKey {
            provider: provider.as_str().to_string(),
            env_var: provider.env_var().to_string(),
        }),
    }
}

/// Where the key for `provider` would come from, if anywhere.
pub fn api_key_source(provider: Provider) -> Option<KeySource> {
    if env_key(provider).is_some() {
        return Some(KeySource::Environment);
    }
    match get_api_key(provider) {
        Ok(Some(_)) => Some(KeySource::Keychain),
        _ => None,
    }
}
