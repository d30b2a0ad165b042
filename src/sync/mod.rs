// src/sync/mod.rs
//! Source polling loop and the cascade into derived (translated) feeds.
//!
//! Per source feed the loop has two states: a fetch run, then an armed timer for the
//! next run `update_frequency` minutes later. The timer is armed after every run that
//! will not be retried, whatever its outcome, so a single bad fetch never ends the loop.
//! Derived feeds are never self-scheduled: a source run that brought new content
//! schedules one derive run per dependent feed.

pub mod derive;
pub mod source;

pub use derive::DeriveOutcome;
pub use source::{FetchMode, FetchOutcome, Rearm};

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use crate::fetch::FeedFetcher;
use crate::files::FeedFiles;
use crate::model::{DerivedFeed, SourceFeed};
use crate::queue::{RunContext, Task, TaskHandler, TaskScheduler};
use crate::store::FeedStore;
use crate::translate::FeedTranslator;

pub struct FeedSyncer {
    store: Arc<dyn FeedStore>,
    fetcher: Arc<dyn FeedFetcher>,
    translator: Arc<dyn FeedTranslator>,
    files: FeedFiles,
    scheduler: Arc<dyn TaskScheduler>,
    cascade_delay: Duration,
}

impl FeedSyncer {
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetcher: Arc<dyn FeedFetcher>,
        translator: Arc<dyn FeedTranslator>,
        files: FeedFiles,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        crate::metrics::describe_all();
        Self {
            store,
            fetcher,
            translator,
            files,
            scheduler,
            cascade_delay: Duration::from_secs(1),
        }
    }

    pub fn with_cascade_delay(mut self, delay: Duration) -> Self {
        self.cascade_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    pub fn files(&self) -> &FeedFiles {
        &self.files
    }

    /// Arm one fetch per known source, `update_frequency` from now. Called once at startup;
    /// afterwards every source re-arms itself.
    pub async fn schedule_all(&self) -> Result<usize> {
        let sources = self.store.sources().await?;
        for feed in &sources {
            self.rearm(feed);
        }
        tracing::info!(sources = sources.len(), "source feed polling armed");
        Ok(sources.len())
    }

    fn rearm(&self, feed: &SourceFeed) {
        let delay = feed.poll_interval();
        tracing::debug!(
            sid = %feed.sid,
            delay_secs = delay.as_secs(),
            "next source feed fetch armed"
        );
        self.scheduler.schedule(Task::fetch(&feed.sid), delay);
    }

    /// Schedule a derive run for every feed in `dependents` (the feeds derived from `source`).
    fn cascade(&self, source: &SourceFeed, dependents: &[DerivedFeed]) {
        if dependents.is_empty() {
            return;
        }
        for derived in dependents {
            self.scheduler
                .schedule(Task::derive(&derived.sid), self.cascade_delay);
        }
        tracing::debug!(
            sid = %source.sid,
            dependents = dependents.len(),
            "cascade scheduled"
        );
        counter!("feed_cascade_total").increment(dependents.len() as u64);
    }

    /// Schedule derive runs outside a cascade, e.g. for feeds registered at startup
    /// that are behind a source which keeps answering "not modified".
    pub fn schedule_derive(&self, sids: &[String]) -> usize {
        for sid in sids {
            self.scheduler.schedule(Task::derive(sid), self.cascade_delay);
        }
        if !sids.is_empty() {
            tracing::info!(derived = sids.len(), "stale translated feeds scheduled");
        }
        sids.len()
    }
}

#[async_trait]
impl TaskHandler for FeedSyncer {
    async fn run(&self, task: &Task, ctx: RunContext) -> Result<()> {
        match task {
            Task::FetchSource(sid) => {
                let rearm = if ctx.is_last_attempt() {
                    Rearm::Always
                } else {
                    Rearm::OnSuccess
                };
                self.update_source(sid, FetchMode::Conditional, rearm)
                    .await
                    .map(|_| ())
            }
            Task::DeriveFeed(sid) => self.update_derived(sid).await.map(|_| ()),
        }
    }
}
