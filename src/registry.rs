// src/registry.rs
//! Startup registration of the configured feeds.
//!
//! Entries are upserted by `sid`. Sync state (validators, sizes, counters, flags)
//! survives a restart; only state invalidated by a configuration change is reset.
//! Derived feeds that end up behind their source are reported back so the caller can
//! schedule them; a source answering "not modified" would never cascade into them.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config::{AppConfig, DerivedEntry, SourceEntry};
use crate::model::{DerivedFeed, SourceFeed};
use crate::store::FeedStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub sources_added: usize,
    pub sources_updated: usize,
    pub derived_added: usize,
    pub derived_updated: usize,
    /// Configured derived feeds not current with their source, in config order.
    pub stale_derived: Vec<String>,
}

pub async fn register_feeds(store: &dyn FeedStore, cfg: &AppConfig) -> Result<Registration> {
    let mut reg = Registration::default();

    for entry in &cfg.sources {
        match store.source(&entry.sid).await? {
            None => {
                let feed = SourceFeed::new(&entry.sid, &entry.url, entry.update_frequency)
                    .with_translator(&entry.translator);
                store
                    .save_source(&feed)
                    .await
                    .with_context(|| format!("registering source feed {}", entry.sid))?;
                reg.sources_added += 1;
            }
            Some(mut existing) => {
                if apply_source(&mut existing, entry) {
                    store
                        .save_source(&existing)
                        .await
                        .with_context(|| format!("updating source feed {}", entry.sid))?;
                    reg.sources_updated += 1;
                }
            }
        }
    }

    for entry in &cfg.derived {
        match store.derived(&entry.sid).await? {
            None => {
                let feed = DerivedFeed::new(&entry.sid, &entry.source, &entry.language)
                    .with_flags(entry.translate_title, entry.translate_content);
                store
                    .save_derived(&feed)
                    .await
                    .with_context(|| format!("registering derived feed {}", entry.sid))?;
                reg.derived_added += 1;
            }
            Some(mut existing) => {
                if apply_derived(&mut existing, entry) {
                    store
                        .save_derived(&existing)
                        .await
                        .with_context(|| format!("updating derived feed {}", entry.sid))?;
                    reg.derived_updated += 1;
                }
            }
        }
    }

    for entry in &cfg.derived {
        let (Some(derived), Some(source)) = (
            store.derived(&entry.sid).await?,
            store.source(&entry.source).await?,
        ) else {
            continue;
        };
        if !derived.is_current_with(&source) {
            reg.stale_derived.push(derived.sid);
        }
    }

    info!(
        sources_added = reg.sources_added,
        sources_updated = reg.sources_updated,
        derived_added = reg.derived_added,
        derived_updated = reg.derived_updated,
        stale_derived = reg.stale_derived.len(),
        "feeds registered"
    );
    Ok(reg)
}

/// Returns true when anything changed.
fn apply_source(feed: &mut SourceFeed, entry: &SourceEntry) -> bool {
    let mut changed = false;
    if feed.feed_url != entry.url {
        // Validators belong to the old URL.
        feed.feed_url = entry.url.clone();
        feed.etag = None;
        feed.modified = None;
        changed = true;
    }
    if feed.update_frequency != entry.update_frequency {
        feed.update_frequency = entry.update_frequency;
        changed = true;
    }
    if feed.translator != entry.translator {
        feed.translator = entry.translator.clone();
        changed = true;
    }
    changed
}

fn apply_derived(feed: &mut DerivedFeed, entry: &DerivedEntry) -> bool {
    let stale = feed.source_sid != entry.source
        || feed.language != entry.language
        || feed.translate_title != entry.translate_title
        || feed.translate_content != entry.translate_content;
    if !stale {
        return false;
    }
    feed.source_sid = entry.source.clone();
    feed.language = entry.language.clone();
    feed.translate_title = entry.translate_title;
    feed.translate_content = entry.translate_content;
    feed.modified = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFeedStore;

    fn config(toml: &str) -> AppConfig {
        AppConfig::from_toml_str(toml).unwrap()
    }

    const BASE: &str = r#"
[[sources]]
sid = "news"
url = "https://example.com/rss"
update_frequency = 15

[[derived]]
sid = "news-de"
source = "news"
language = "de"
"#;

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let store = JsonFeedStore::in_memory();
        let cfg = config(BASE);
        let first = register_feeds(&store, &cfg).await.unwrap();
        assert_eq!(first.sources_added, 1);
        assert_eq!(first.derived_added, 1);

        let second = register_feeds(&store, &cfg).await.unwrap();
        assert_eq!(second, Registration::default());
    }

    #[tokio::test]
    async fn url_change_resets_validators_only() {
        let store = JsonFeedStore::in_memory();
        register_feeds(&store, &config(BASE)).await.unwrap();

        let mut src = store.source("news").await.unwrap().unwrap();
        src.etag = Some("\"v1\"".into());
        src.modified = Some("Mon, 01 Jan 2024 00:00:00 GMT".into());
        src.size = 42;
        store.save_source(&src).await.unwrap();

        let moved = BASE.replace("https://example.com/rss", "https://example.org/feed");
        let reg = register_feeds(&store, &config(&moved)).await.unwrap();
        assert_eq!(reg.sources_updated, 1);

        let src = store.source("news").await.unwrap().unwrap();
        assert_eq!(src.feed_url, "https://example.org/feed");
        assert_eq!(src.etag, None);
        assert_eq!(src.modified, None);
        assert_eq!(src.size, 42);
    }

    #[tokio::test]
    async fn language_change_forces_rederive() {
        let store = JsonFeedStore::in_memory();
        register_feeds(&store, &config(BASE)).await.unwrap();

        let mut d = store.derived("news-de").await.unwrap().unwrap();
        d.modified = Some("Mon, 01 Jan 2024 00:00:00 GMT".into());
        d.total_tokens = 900;
        store.save_derived(&d).await.unwrap();

        let changed = BASE.replace("language = \"de\"", "language = \"fr\"");
        register_feeds(&store, &config(&changed)).await.unwrap();

        let d = store.derived("news-de").await.unwrap().unwrap();
        assert_eq!(d.language, "fr");
        assert_eq!(d.modified, None);
        assert_eq!(d.total_tokens, 900);
    }

    #[tokio::test]
    async fn reports_derived_feeds_behind_their_source() {
        let store = JsonFeedStore::in_memory();
        register_feeds(&store, &config(BASE)).await.unwrap();

        let mut src = store.source("news").await.unwrap().unwrap();
        src.modified = Some("Tue, 02 Jan 2024 09:00:00 GMT".into());
        store.save_source(&src).await.unwrap();
        let mut d = store.derived("news-de").await.unwrap().unwrap();
        d.modified = src.modified.clone();
        store.save_derived(&d).await.unwrap();

        let added = format!(
            "{BASE}\n[[derived]]\nsid = \"news-ja\"\nsource = \"news\"\nlanguage = \"ja\"\n"
        );
        let reg = register_feeds(&store, &config(&added)).await.unwrap();
        assert_eq!(reg.derived_added, 1);
        assert_eq!(reg.stale_derived, vec!["news-ja".to_string()]);

        // A reset makes an existing feed stale too.
        let changed = added.replace("language = \"de\"", "language = \"fr\"");
        let reg = register_feeds(&store, &config(&changed)).await.unwrap();
        assert_eq!(
            reg.stale_derived,
            vec!["news-de".to_string(), "news-ja".to_string()]
        );
    }
}
