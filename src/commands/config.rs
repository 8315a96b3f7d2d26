use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use previewar_core::config::default_config_path;
use previewar_core::Settings;

pub fn show(settings: &Settings) -> Result<()> {
    print!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}

pub fn init(path: Option<&Path>, force: bool) -> Result<()> {
    let path = write_defaults(path, force)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn write_defaults(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite it", path.display());
    }

    Settings::default().save(&path)?;
    Ok(path)
}
