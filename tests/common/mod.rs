// tests/common/mod.rs
//
// Shared fakes for the collaborator traits. Each test binary pulls in what it needs.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use feed_translator::feed::Feed;
use feed_translator::fetch::{FeedFetcher, FetchError, FetchResponse, Markers};
use feed_translator::files::FeedFiles;
use feed_translator::model::{DerivedFeed, SourceFeed};
use feed_translator::queue::{Task, TaskScheduler};
use feed_translator::store::{FeedStore, JsonFeedStore};
use feed_translator::sync::FeedSyncer;
use feed_translator::translate::{FeedTranslator, TranslateRequest, Translation};

pub const RSS: &str = include_str!("../fixtures/news_rss.xml");
pub const ATOM: &str = include_str!("../fixtures/news_atom.xml");

// ---- Fetcher -------------------------------------------------------------

pub enum Reply {
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    NotModified,
    Status(u16),
}

impl Reply {
    pub fn content(body: &str, etag: Option<&str>, last_modified: Option<&str>) -> Self {
        Self::Content {
            body: body.as_bytes().to_vec(),
            etag: etag.map(String::from),
            last_modified: last_modified.map(String::from),
        }
    }
}

/// Answers from a script, one reply per call. An exhausted script answers HTTP 500.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(String, Markers)>>,
}

impl ScriptedFetcher {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<(String, Markers)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn conditional_fetch(
        &self,
        url: &str,
        markers: &Markers,
    ) -> Result<FetchResponse, FetchError> {
        self.calls.lock().push((url.to_string(), markers.clone()));
        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Status(500));
        match reply {
            Reply::Content {
                body,
                etag,
                last_modified,
            } => Ok(FetchResponse::Content {
                body,
                etag,
                last_modified,
            }),
            Reply::NotModified if markers.is_empty() => {
                Err(FetchError::UnexpectedNotModified(url.to_string()))
            }
            Reply::NotModified => Ok(FetchResponse::NotModified),
            Reply::Status(code) => Err(FetchError::Status {
                status: reqwest::StatusCode::from_u16(code)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                url: url.to_string(),
            }),
        }
    }
}

// ---- Scheduler -----------------------------------------------------------

#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(Task, Duration)>>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<(Task, Duration)> {
        std::mem::take(&mut *self.scheduled.lock())
    }

    pub fn count(&self, task: &Task) -> usize {
        self.scheduled.lock().iter().filter(|(t, _)| t == task).count()
    }
}

impl TaskScheduler for RecordingScheduler {
    fn schedule(&self, task: Task, delay: Duration) {
        self.scheduled.lock().push((task, delay));
    }
}

// ---- Translator ----------------------------------------------------------

/// Prefixes titles with `[lang]` and reports a fixed usage.
pub struct FixedTranslator {
    pub tokens: u64,
    pub characters: u64,
    pub no_result: bool,
    pub fail: bool,
    requests: Mutex<Vec<String>>,
}

impl FixedTranslator {
    pub fn tokens(tokens: u64) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            characters: 3000,
            no_result: false,
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn characters(characters: u64) -> Arc<Self> {
        Arc::new(Self {
            tokens: 0,
            characters,
            no_result: false,
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn no_result() -> Arc<Self> {
        Arc::new(Self {
            tokens: 0,
            characters: 0,
            no_result: true,
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            tokens: 0,
            characters: 0,
            no_result: false,
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Target languages requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl FeedTranslator for FixedTranslator {
    async fn translate(
        &self,
        feed: &Feed,
        request: &TranslateRequest<'_>,
    ) -> Result<Option<Translation>> {
        self.requests
            .lock()
            .push(request.target_language.to_string());
        if self.fail {
            bail!("translation backend unavailable");
        }
        if self.no_result {
            return Ok(None);
        }
        let mut out = feed.clone();
        out.language = Some(request.target_language.to_string());
        out.title = format!("[{}] {}", request.target_language, feed.title);
        for entry in &mut out.entries {
            entry.title = format!("[{}] {}", request.target_language, entry.title);
        }
        Ok(Some(Translation {
            feed: out,
            tokens: self.tokens,
            characters: self.characters,
        }))
    }
}

// ---- Store ---------------------------------------------------------------

/// In-memory store whose source saves and dependent lookups can be made to fail.
pub struct FlakyStore {
    inner: JsonFeedStore,
    fail_saves: Mutex<usize>,
    fail_lookups: Mutex<usize>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: JsonFeedStore::in_memory(),
            fail_saves: Mutex::new(0),
            fail_lookups: Mutex::new(0),
        })
    }

    /// Fail the next `n` source saves.
    pub fn fail_next_saves(&self, n: usize) {
        *self.fail_saves.lock() = n;
    }

    /// Fail the next `n` `derived_for_source` calls.
    pub fn fail_next_lookups(&self, n: usize) {
        *self.fail_lookups.lock() = n;
    }
}

fn take_failure(left: &Mutex<usize>) -> bool {
    let mut left = left.lock();
    if *left > 0 {
        *left -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl FeedStore for FlakyStore {
    async fn source(&self, sid: &str) -> Result<Option<SourceFeed>> {
        self.inner.source(sid).await
    }

    async fn sources(&self) -> Result<Vec<SourceFeed>> {
        self.inner.sources().await
    }

    async fn save_source(&self, feed: &SourceFeed) -> Result<()> {
        if take_failure(&self.fail_saves) {
            bail!("store unavailable");
        }
        self.inner.save_source(feed).await
    }

    async fn derived(&self, sid: &str) -> Result<Option<DerivedFeed>> {
        self.inner.derived(sid).await
    }

    async fn all_derived(&self) -> Result<Vec<DerivedFeed>> {
        self.inner.all_derived().await
    }

    async fn derived_for_source(&self, source_sid: &str) -> Result<Vec<DerivedFeed>> {
        if take_failure(&self.fail_lookups) {
            bail!("store unavailable");
        }
        self.inner.derived_for_source(source_sid).await
    }

    async fn save_derived(&self, feed: &DerivedFeed) -> Result<()> {
        self.inner.save_derived(feed).await
    }
}

// ---- Wiring --------------------------------------------------------------

pub struct Harness {
    pub syncer: Arc<FeedSyncer>,
    pub store: Arc<dyn FeedStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub scheduler: Arc<RecordingScheduler>,
    pub translator: Arc<FixedTranslator>,
    pub files: FeedFiles,
}

pub fn harness(
    data_root: &Path,
    store: Arc<dyn FeedStore>,
    fetcher: Arc<ScriptedFetcher>,
    translator: Arc<FixedTranslator>,
) -> Harness {
    let scheduler = RecordingScheduler::new();
    let files = FeedFiles::new(data_root);
    let syncer = Arc::new(
        FeedSyncer::new(
            store.clone(),
            fetcher.clone(),
            translator.clone(),
            files.clone(),
            scheduler.clone(),
        )
        .with_cascade_delay(Duration::from_secs(1)),
    );
    Harness {
        syncer,
        store,
        fetcher,
        scheduler,
        translator,
        files,
    }
}

pub async fn seed_source(store: &dyn FeedStore, feed: SourceFeed) {
    store.save_source(&feed).await.expect("seed source");
}

pub async fn seed_derived(store: &dyn FeedStore, feed: DerivedFeed) {
    store.save_derived(&feed).await.expect("seed derived");
}
