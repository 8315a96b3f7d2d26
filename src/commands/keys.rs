use anyhow::Result;
use previewar_core::config::{api_key_source, delete_api_key, set_api_key};
use previewar_core::Provider;

pub fn set(provider: Provider, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        anyhow::bail!("API key for {} cannot be empty", provider);
    }
    set_api_key(provider, key)?;
    println!("Stored {} API key in the keychain", provider);
    Ok(())
}

pub fn delete(provider: Provider) -> Result<()> {
    if delete_api_key(provider)? {
        println!("Deleted {} API key from the keychain", provider);
    } else {
        println!("No {} API key stored in the keychain", provider);
    }
    Ok(())
}

pub fn status() -> Result<()> {
    for provider in Provider::all() {
        let source = api_key_source(provider).map_or("not configured", |s| s.as_str());
        println!("{:<11} {:<15} ({})", provider.as_str(), source, provider.env_var());
    }
    Ok(())
}
