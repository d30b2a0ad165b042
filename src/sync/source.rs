// src/sync/source.rs
use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use serde::Serialize;

use super::FeedSyncer;
use crate::feed::parse_feed;
use crate::fetch::{classify, FetchResponse, Markers, Staleness};
use crate::model::SourceFeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Send the stored validators.
    Conditional,
    /// Ignore stored validators (used when the raw document is missing).
    Unconditional,
}

/// When a source run arms the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    Never,
    /// Only if the run succeeds; a failing run is retried and the retry re-arms.
    OnSuccess,
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Failed {
        reason: String,
    },
    Unchanged,
    Updated {
        size: u64,
        modified: String,
        etag: Option<String>,
        title: String,
    },
}

impl FetchOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::Unchanged => "unchanged",
            Self::Updated { .. } => "updated",
        }
    }
}

impl FeedSyncer {
    /// One fetch run outside the polling loop (never re-arms).
    pub async fn refresh_source(&self, sid: &str) -> Result<Option<FetchOutcome>> {
        self.update_source(sid, FetchMode::Conditional, Rearm::Never)
            .await
    }

    /// Fetch one source feed, persist its state, re-arm per `rearm` and cascade when
    /// the content changed. `Ok(None)` when the feed no longer exists.
    ///
    /// Only store failures are returned as `Err`; transport, parse and file errors
    /// end up as `valid = false`.
    pub async fn update_source(
        &self,
        sid: &str,
        mode: FetchMode,
        rearm: Rearm,
    ) -> Result<Option<FetchOutcome>> {
        let Some(mut feed) = self.store.source(sid).await? else {
            tracing::debug!(sid, "source feed gone, skipping fetch");
            return Ok(None);
        };
        tracing::debug!(sid, url = %feed.feed_url, ?mode, "update source feed");

        let outcome = self.fetch_into(&mut feed, mode).await;
        match &outcome {
            FetchOutcome::Failed { reason } => {
                tracing::error!(sid, url = %feed.feed_url, error = %reason, "source feed fetch failed")
            }
            FetchOutcome::Unchanged => {
                tracing::debug!(sid, url = %feed.feed_url, "source feed is up to date, skip")
            }
            FetchOutcome::Updated { size, .. } => {
                tracing::info!(sid, url = %feed.feed_url, size, "source feed updated")
            }
        }
        counter!("feed_fetch_total", "outcome" => outcome.label()).increment(1);

        let result = self.commit_run(&feed, &outcome).await;
        let arm = match rearm {
            Rearm::Never => false,
            Rearm::OnSuccess => result.is_ok(),
            Rearm::Always => true,
        };
        if arm {
            self.rearm(&feed);
        }
        result?;
        Ok(Some(outcome))
    }

    // Every fallible step runs before anything is scheduled, so an `Err` here leaves
    // nothing armed and the store as it was; the retry repeats the whole run.
    async fn commit_run(&self, feed: &SourceFeed, outcome: &FetchOutcome) -> Result<()> {
        let dependents = if outcome.is_updated() {
            self.store
                .derived_for_source(&feed.sid)
                .await
                .with_context(|| format!("listing feeds derived from {}", feed.sid))?
        } else {
            Vec::new()
        };
        self.store
            .save_source(feed)
            .await
            .with_context(|| format!("saving source feed {}", feed.sid))?;
        self.cascade(feed, &dependents);
        Ok(())
    }

    // Metadata changes only once the outcome is known; a failure leaves the
    // validators and size of the last good fetch in place.
    async fn fetch_into(&self, feed: &mut SourceFeed, mode: FetchMode) -> FetchOutcome {
        match self.try_fetch(feed, mode).await {
            Ok(outcome) => {
                if let FetchOutcome::Updated {
                    size,
                    modified,
                    etag,
                    title,
                } = &outcome
                {
                    if !title.is_empty() {
                        feed.name = title.clone();
                    }
                    feed.size = *size;
                    feed.modified = Some(modified.clone());
                    feed.etag = etag.clone();
                }
                feed.valid = true;
                outcome
            }
            Err(e) => {
                feed.valid = false;
                FetchOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    async fn try_fetch(&self, feed: &SourceFeed, mode: FetchMode) -> Result<FetchOutcome> {
        self.files
            .ensure_dir()
            .await
            .context("creating feed directory")?;

        let markers = match mode {
            FetchMode::Conditional => Markers::new(feed.modified.clone(), feed.etag.clone()),
            FetchMode::Unconditional => Markers::default(),
        };
        let response = self
            .fetcher
            .conditional_fetch(&feed.feed_url, &markers)
            .await?;

        if classify(&markers, &response) == Staleness::Unchanged {
            return Ok(FetchOutcome::Unchanged);
        }
        let FetchResponse::Content {
            body,
            etag,
            last_modified,
        } = response
        else {
            return Ok(FetchOutcome::Unchanged);
        };

        let parsed =
            parse_feed(&body).with_context(|| format!("parsing feed from {}", feed.feed_url))?;
        let size = self
            .files
            .write(&feed.sid, &body)
            .await
            .context("writing raw feed")?;

        Ok(FetchOutcome::Updated {
            size,
            modified: last_modified.unwrap_or_else(http_date_now),
            etag,
            title: parsed.title,
        })
    }
}

/// Current time as an HTTP date, usable as `If-Modified-Since` on the next fetch.
fn http_date_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
