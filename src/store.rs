// src/store.rs
//! Entity store: lookup by id, enumerate, save (last writer wins).

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::{DerivedFeed, SourceFeed};

#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn source(&self, sid: &str) -> Result<Option<SourceFeed>>;
    async fn sources(&self) -> Result<Vec<SourceFeed>>;
    /// Insert or replace the whole record.
    async fn save_source(&self, feed: &SourceFeed) -> Result<()>;

    async fn derived(&self, sid: &str) -> Result<Option<DerivedFeed>>;
    async fn all_derived(&self) -> Result<Vec<DerivedFeed>>;
    async fn derived_for_source(&self, source_sid: &str) -> Result<Vec<DerivedFeed>>;
    /// Insert or replace the whole record.
    async fn save_derived(&self, feed: &DerivedFeed) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    sources: BTreeMap<String, SourceFeed>,
    #[serde(default)]
    derived: BTreeMap<String, DerivedFeed>,
}

/// In-memory maps mirrored to a single JSON document after every save.
pub struct JsonFeedStore {
    path: Option<PathBuf>,
    inner: RwLock<Snapshot>,
    // Held from snapshot copy to swap so concurrent saves never drop each other.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFeedStore {
    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(Snapshot::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open (or start) the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing feed store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading feed store {}", path.display()))
            }
        };
        tracing::debug!(
            path = %path.display(),
            sources = snapshot.sources.len(),
            derived = snapshot.derived.len(),
            "feed store opened"
        );
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(snapshot),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `change` to a copy of the snapshot, write the copy and only then make it
    /// visible. A failed write leaves both memory and disk as they were.
    async fn commit(&self, change: impl FnOnce(&mut Snapshot) + Send) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.inner.read().clone();
        change(&mut next);
        self.persist(&next).await?;
        *self.inner.write() = next;
        Ok(())
    }

    async fn persist(&self, snap: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(snap).context("serializing feed store")?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl FeedStore for JsonFeedStore {
    async fn source(&self, sid: &str) -> Result<Option<SourceFeed>> {
        Ok(self.inner.read().sources.get(sid).cloned())
    }

    async fn sources(&self) -> Result<Vec<SourceFeed>> {
        Ok(self.inner.read().sources.values().cloned().collect())
    }

    async fn save_source(&self, feed: &SourceFeed) -> Result<()> {
        self.commit(|snap| {
            snap.sources.insert(feed.sid.clone(), feed.clone());
        })
        .await
    }

    async fn derived(&self, sid: &str) -> Result<Option<DerivedFeed>> {
        Ok(self.inner.read().derived.get(sid).cloned())
    }

    async fn all_derived(&self) -> Result<Vec<DerivedFeed>> {
        Ok(self.inner.read().derived.values().cloned().collect())
    }

    async fn derived_for_source(&self, source_sid: &str) -> Result<Vec<DerivedFeed>> {
        Ok(self
            .inner
            .read()
            .derived
            .values()
            .filter(|d| d.source_sid == source_sid)
            .cloned()
            .collect())
    }

    async fn save_derived(&self, feed: &DerivedFeed) -> Result<()> {
        self.commit(|snap| {
            snap.derived.insert(feed.sid.clone(), feed.clone());
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");

        let store = JsonFeedStore::open(&path).unwrap();
        let mut s = SourceFeed::new("s1", "http://example.com/rss", 10);
        s.etag = Some("\"v1\"".into());
        store.save_source(&s).await.unwrap();
        store
            .save_derived(&DerivedFeed::new("d1", "s1", "de"))
            .await
            .unwrap();
        store
            .save_derived(&DerivedFeed::new("d2", "other", "fr"))
            .await
            .unwrap();

        let reopened = JsonFeedStore::open(&path).unwrap();
        assert_eq!(reopened.source("s1").await.unwrap(), Some(s));
        let for_s1 = reopened.derived_for_source("s1").await.unwrap();
        assert_eq!(for_s1.len(), 1);
        assert_eq!(for_s1[0].sid, "d1");
        assert!(reopened.source("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");
        let store = JsonFeedStore::open(&path).unwrap();
        let mut s = SourceFeed::new("s1", "http://example.com/rss", 10);
        s.etag = Some("\"v1\"".into());
        store.save_source(&s).await.unwrap();

        // A directory where the temp file goes makes the write fail.
        let tmp = path.with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();
        let mut newer = s.clone();
        newer.etag = Some("\"v2\"".into());
        assert!(store.save_source(&newer).await.is_err());
        assert!(store
            .save_derived(&DerivedFeed::new("d1", "s1", "de"))
            .await
            .is_err());

        assert_eq!(store.source("s1").await.unwrap(), Some(s.clone()));
        assert!(store.derived("d1").await.unwrap().is_none());
        assert_eq!(JsonFeedStore::open(&path).unwrap().source("s1").await.unwrap(), Some(s));

        std::fs::remove_dir(&tmp).unwrap();
        store.save_source(&newer).await.unwrap();
        assert_eq!(store.source("s1").await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn in_memory_store_writes_nothing() {
        let store = JsonFeedStore::in_memory();
        store
            .save_source(&SourceFeed::new("s", "http://x", 1))
            .await
            .unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.sources().await.unwrap().len(), 1);
    }
}
