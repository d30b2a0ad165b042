// src/translate/mod.rs
//! Translation engines and the feed-level translation step.

pub mod deepl;
pub mod openai;

pub use deepl::DeepLEngine;
pub use openai::OpenAiEngine;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::TranslatorsConfig;
use crate::feed::Feed;

#[derive(Debug, Clone, Copy)]
pub struct TranslateRequest<'a> {
    pub target_language: &'a str,
    pub engine: &'a str,
    pub translate_title: bool,
    pub translate_content: bool,
}

/// Result of a translation run. Engines bill either by tokens or by characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub feed: Feed,
    pub tokens: u64,
    pub characters: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Tokens(u64),
    Characters(u64),
}

impl Translation {
    /// Tokens win whenever the engine reported any.
    pub fn usage(&self) -> Usage {
        if self.tokens > 0 {
            Usage::Tokens(self.tokens)
        } else {
            Usage::Characters(self.characters)
        }
    }
}

/// The translation step as the deriver sees it. `Ok(None)` means "no result".
#[async_trait]
pub trait FeedTranslator: Send + Sync {
    async fn translate(
        &self,
        feed: &Feed,
        request: &TranslateRequest<'_>,
    ) -> Result<Option<Translation>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Same length and order as the input texts.
    pub texts: Vec<String>,
    pub tokens: u64,
    pub characters: u64,
}

#[async_trait]
pub trait TranslationEngine: Send + Sync {
    fn name(&self) -> &'static str;
    async fn translate_texts(&self, texts: &[String], target_language: &str)
        -> Result<EngineOutput>;
}

/// Returns texts unchanged; counts characters. Always available as `copy`.
pub struct CopyEngine;

#[async_trait]
impl TranslationEngine for CopyEngine {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn translate_texts(
        &self,
        texts: &[String],
        _target_language: &str,
    ) -> Result<EngineOutput> {
        Ok(EngineOutput {
            texts: texts.to_vec(),
            tokens: 0,
            characters: count_chars(texts),
        })
    }
}

pub(crate) fn count_chars(texts: &[String]) -> u64 {
    texts.iter().map(|t| t.chars().count() as u64).sum()
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    FeedTitle,
    EntryTitle(usize),
    Summary(usize),
    Content(usize),
}

/// Engine registry keyed by engine id.
pub struct TranslatorSet {
    engines: BTreeMap<String, Arc<dyn TranslationEngine>>,
}

impl Default for TranslatorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslatorSet {
    pub fn new() -> Self {
        let mut engines: BTreeMap<String, Arc<dyn TranslationEngine>> = BTreeMap::new();
        engines.insert("copy".to_string(), Arc::new(CopyEngine));
        Self { engines }
    }

    pub fn with_engine(mut self, id: impl Into<String>, engine: Arc<dyn TranslationEngine>) -> Self {
        self.engines.insert(id.into(), engine);
        self
    }

    pub fn from_config(cfg: &TranslatorsConfig) -> Result<Self> {
        let mut set = Self::new();
        if let Some(openai) = &cfg.openai {
            set = set.with_engine("openai", Arc::new(OpenAiEngine::new(openai)?));
        }
        if let Some(deepl) = &cfg.deepl {
            set = set.with_engine("deepl", Arc::new(DeepLEngine::new(deepl)?));
        }
        tracing::info!(engines = ?set.engine_ids(), "translation engines ready");
        Ok(set)
    }

    pub fn engine_ids(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl FeedTranslator for TranslatorSet {
    async fn translate(
        &self,
        feed: &Feed,
        request: &TranslateRequest<'_>,
    ) -> Result<Option<Translation>> {
        let Some(engine) = self.engines.get(request.engine) else {
            tracing::warn!(engine = request.engine, "unknown translation engine");
            return Ok(None);
        };

        let (slots, texts) = collect_texts(feed, request);
        let mut out = feed.clone();
        out.language = Some(request.target_language.to_string());
        if texts.is_empty() {
            return Ok(Some(Translation {
                feed: out,
                tokens: 0,
                characters: 0,
            }));
        }

        let output = engine
            .translate_texts(&texts, request.target_language)
            .await?;
        if output.texts.len() != texts.len() {
            bail!(
                "{} returned {} texts for {} inputs",
                engine.name(),
                output.texts.len(),
                texts.len()
            );
        }

        for (slot, text) in slots.into_iter().zip(output.texts) {
            match slot {
                Slot::FeedTitle => out.title = text,
                Slot::EntryTitle(i) => out.entries[i].title = text,
                Slot::Summary(i) => out.entries[i].summary = Some(text),
                Slot::Content(i) => out.entries[i].content = Some(text),
            }
        }

        Ok(Some(Translation {
            feed: out,
            tokens: output.tokens,
            characters: output.characters,
        }))
    }
}

fn collect_texts(feed: &Feed, request: &TranslateRequest<'_>) -> (Vec<Slot>, Vec<String>) {
    let mut slots = Vec::new();
    let mut texts = Vec::new();
    let mut push = |slot: Slot, text: &str| {
        if !text.trim().is_empty() {
            slots.push(slot);
            texts.push(text.to_string());
        }
    };

    if request.translate_title {
        push(Slot::FeedTitle, &feed.title);
    }
    for (i, entry) in feed.entries.iter().enumerate() {
        if request.translate_title {
            push(Slot::EntryTitle(i), &entry.title);
        }
        if request.translate_content {
            if let Some(summary) = entry.summary.as_deref() {
                push(Slot::Summary(i), summary);
            }
            if let Some(content) = entry.content.as_deref() {
                push(Slot::Content(i), content);
            }
        }
    }
    (slots, texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Entry;

    struct Upper;

    #[async_trait]
    impl TranslationEngine for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }
        async fn translate_texts(&self, texts: &[String], _lang: &str) -> Result<EngineOutput> {
            Ok(EngineOutput {
                texts: texts.iter().map(|t| t.to_uppercase()).collect(),
                tokens: 7,
                characters: 0,
            })
        }
    }

    fn sample() -> Feed {
        Feed {
            title: "news".into(),
            entries: vec![Entry {
                title: "hello".into(),
                summary: Some("<p>body</p>".into()),
                ..Entry::default()
            }],
            ..Feed::default()
        }
    }

    fn request<'a>(engine: &'a str, title: bool, content: bool) -> TranslateRequest<'a> {
        TranslateRequest {
            target_language: "de",
            engine,
            translate_title: title,
            translate_content: content,
        }
    }

    #[tokio::test]
    async fn flags_select_which_texts_are_sent() {
        let set = TranslatorSet::new().with_engine("upper", Arc::new(Upper));

        let titles = set
            .translate(&sample(), &request("upper", true, false))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(titles.feed.title, "NEWS");
        assert_eq!(titles.feed.entries[0].title, "HELLO");
        assert_eq!(titles.feed.entries[0].summary.as_deref(), Some("<p>body</p>"));
        assert_eq!(titles.feed.language.as_deref(), Some("de"));
        assert_eq!(titles.usage(), Usage::Tokens(7));

        let content = set
            .translate(&sample(), &request("upper", false, true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.feed.title, "news");
        assert_eq!(content.feed.entries[0].summary.as_deref(), Some("<P>BODY</P>"));
    }

    #[tokio::test]
    async fn unknown_engine_yields_no_result() {
        let set = TranslatorSet::new();
        let out = set
            .translate(&sample(), &request("nope", true, true))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn copy_engine_bills_characters() {
        let set = TranslatorSet::new();
        let out = set
            .translate(&sample(), &request("copy", true, false))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.usage(), Usage::Characters(("news".len() + "hello".len()) as u64));
        assert_eq!(out.feed.entries[0].title, "hello");
    }
}
