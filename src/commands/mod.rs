pub mod cache;
pub mod config;
pub mod keys;
pub mod product;

use anyhow::Result;
use serde::Serialize;

/// Pretty-print a result to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
