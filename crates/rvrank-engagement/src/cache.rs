//! On-disk backing for the credential store.
//!
//! The cache file holds `{"timestamp": ..., "cookie_string": ...}`. Older
//! files carry a naive local timestamp without an offset; those are read as
//! local time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialArtifact;
use crate::error::EngagementError;

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    timestamp: String,
    cookie_string: String,
}

#[derive(Debug, Clone)]
pub struct CookieCache {
    path: PathBuf,
}

impl CookieCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached artifact. A missing, unreadable or corrupt file is
    /// treated as "nothing cached".
    pub async fn load(&self) -> Option<CredentialArtifact> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read cookie cache");
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt cookie cache");
                return None;
            }
        };

        let Some(acquired_at) = parse_timestamp(&record.timestamp) else {
            tracing::warn!(
                path = %self.path.display(),
                timestamp = %record.timestamp,
                "ignoring cookie cache with unparseable timestamp"
            );
            return None;
        };

        if record.cookie_string.trim().is_empty() {
            return None;
        }

        Some(CredentialArtifact::new(&record.cookie_string, acquired_at))
    }

    /// Writes `artifact` to the cache file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::CacheIo`] if the file cannot be written and
    /// [`EngagementError::CacheEncode`] if the record cannot be serialized.
    pub async fn save(&self, artifact: &CredentialArtifact) -> Result<(), EngagementError> {
        let record = CacheRecord {
            timestamp: artifact.acquired_at().to_rfc3339(),
            cookie_string: artifact.cookie().to_owned(),
        };
        let body = serde_json::to_string_pretty(&record).map_err(EngagementError::CacheEncode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), "cookie cache written");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> EngagementError {
        EngagementError::CacheIo {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| Some(naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeDelta};

    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CookieCache::new(dir.path().join(".cookie_cache.json"));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn save_then_load_keeps_cookie_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CookieCache::new(dir.path().join("nested").join(".cookie_cache.json"));
        let acquired_at = DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let artifact = CredentialArtifact::new("datadome=abc; session=1", acquired_at);

        cache.save(&artifact).await.unwrap();
        let loaded = cache.load().await.unwrap();

        assert_eq!(loaded, artifact);
        assert!(!dir.path().join("nested").join(".cookie_cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookie_cache.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(CookieCache::new(path).load().await.is_none());
    }

    #[tokio::test]
    async fn empty_cookie_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookie_cache.json");
        tokio::fs::write(
            &path,
            r#"{"timestamp": "2026-03-01T12:30:00+00:00", "cookie_string": "  "}"#,
        )
        .await
        .unwrap();
        assert!(CookieCache::new(path).load().await.is_none());
    }

    #[tokio::test]
    async fn naive_timestamp_is_read_as_local_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookie_cache.json");
        tokio::fs::write(
            &path,
            r#"{"timestamp": "2026-03-01T12:30:00.123456", "cookie_string": "datadome=abc"}"#,
        )
        .await
        .unwrap();

        let loaded = CookieCache::new(path).load().await.unwrap();
        let local = loaded.acquired_at().with_timezone(&Local);
        assert_eq!(local.year(), 2026);
        assert_eq!(local.naive_local().format("%H:%M:%S").to_string(), "12:30:00");
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        let parsed = parse_timestamp("2026-03-01T12:30:00-05:00").unwrap();
        assert_eq!(parsed - parsed, TimeDelta::zero());
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T17:30:00+00:00");
    }
}
