use anyhow::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Write `bytes` to `target_path` atomically.
///
/// The data goes to a temporary file next to the target, which is then
/// renamed over it, so readers never see a half-written file.
pub fn write_atomic(target_path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match target_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => anyhow::bail!("Target path has no parent directory: {:?}", target_path),
    };

    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(target_path)?;

    info!("Wrote {} bytes to {:?}", bytes.len(), target_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("deeper").join("page.html");

        write_atomic(&target, b"<html></html>").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<html></html>");
    }

    #[test]
    fn test_write_atomic_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("best_image.png");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp file left behind");
    }
}
