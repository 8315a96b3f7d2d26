use anyhow::{anyhow, Result};
use previewar_core::cache::CACHE_DB_FILE;
use previewar_core::config::cache_dir;
use previewar_core::pipeline::clear_cache;

pub async fn clear(all: bool) -> Result<()> {
    let db_path = cache_dir()?.join(CACHE_DB_FILE);
    let removed = clear_cache(db_path, all).await.map_err(|e| anyhow!(e))?;
    let kind = if all { "cached" } else { "expired" };
    println!("Removed {} {} reports", removed, kind);
    Ok(())
}
