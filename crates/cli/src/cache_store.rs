use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extrato_classify::ClassificationCache;

/// `<cache dir>/extrato/ai-cache.json`, when the platform has a cache dir.
pub fn default_cache_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "extrato", "Extrato")
        .map(|dirs| dirs.cache_dir().join("ai-cache.json"))
}

/// A missing or unreadable file is an empty cache; the next save replaces it.
pub fn load(path: &Path) -> ClassificationCache {
    if !path.exists() {
        return ClassificationCache::new();
    }
    let entries = std::fs::read(path)
        .with_context(|| format!("reading {}", path.display()))
        .and_then(|bytes| {
            serde_json::from_slice::<BTreeMap<String, String>>(&bytes)
                .with_context(|| format!("parsing AI cache {}", path.display()))
        });
    match entries {
        Ok(entries) => {
            tracing::debug!(path = %path.display(), entries = entries.len(), "loaded ai cache");
            ClassificationCache::from_snapshot(entries)
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::warn!(%error, "ignoring damaged ai cache");
            ClassificationCache::new()
        }
    }
}

/// Write through a temp file in the same directory and rename it into
/// place, so an interrupted save never leaves a truncated cache.
pub fn save(cache: &ClassificationCache, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let snapshot = cache.snapshot();
    let json = serde_json::to_vec_pretty(&snapshot)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), entries = snapshot.len(), "saved ai cache");
    Ok(())
}
