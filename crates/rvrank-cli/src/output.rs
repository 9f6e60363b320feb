//! JSON output files under `output/`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;

pub(crate) const OUTPUT_DIR: &str = "output";

/// `output/<prefix>_<YYYYmmdd_HHMMSS>.json`
pub(crate) fn timestamped_path(prefix: &str, now: DateTime<Local>) -> PathBuf {
    Path::new(OUTPUT_DIR).join(format!("{prefix}_{}.json", now.format("%Y%m%d_%H%M%S")))
}

/// Newest file in `dir` named `<prefix>_*.json`, by modification time.
pub(crate) fn latest_with_prefix(dir: &Path, prefix: &str) -> anyhow::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&format!("{prefix}_")) || !name.ends_with(".json") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
