// src/model.rs
//! Persisted feed records.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An externally hosted feed that is polled every `update_frequency` minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFeed {
    pub sid: String,
    pub feed_url: String,
    #[serde(default)]
    pub name: String,
    /// Poll interval in minutes.
    pub update_frequency: u32,
    /// Engine id used by every derived feed of this source.
    #[serde(default = "default_translator")]
    pub translator: String,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub size: u64,
}

fn default_translator() -> String {
    "copy".to_string()
}

impl SourceFeed {
    pub fn new(sid: impl Into<String>, feed_url: impl Into<String>, update_frequency: u32) -> Self {
        Self {
            sid: sid.into(),
            feed_url: feed_url.into(),
            name: String::new(),
            update_frequency,
            translator: default_translator(),
            modified: None,
            etag: None,
            valid: false,
            size: 0,
        }
    }

    pub fn with_translator(mut self, engine: impl Into<String>) -> Self {
        self.translator = engine.into();
        self
    }

    /// Delay until the next fetch. A zero frequency is treated as one minute.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.update_frequency.max(1)) * 60)
    }
}

/// A per-language translated copy of a [`SourceFeed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedFeed {
    pub sid: String,
    /// `sid` of the source this feed is derived from.
    pub source_sid: String,
    pub language: String,
    #[serde(default = "default_true")]
    pub translate_title: bool,
    #[serde(default)]
    pub translate_content: bool,
    /// The source's `modified` as of the last successful derivation.
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_characters: u64,
    #[serde(default)]
    pub size: u64,
}

fn default_true() -> bool {
    true
}

impl DerivedFeed {
    pub fn new(
        sid: impl Into<String>,
        source_sid: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            sid: sid.into(),
            source_sid: source_sid.into(),
            language: language.into(),
            translate_title: true,
            translate_content: false,
            modified: None,
            status: false,
            total_tokens: 0,
            total_characters: 0,
            size: 0,
        }
    }

    pub fn with_flags(mut self, translate_title: bool, translate_content: bool) -> Self {
        self.translate_title = translate_title;
        self.translate_content = translate_content;
        self
    }

    /// True when this copy reflects the source's current content.
    pub fn is_current_with(&self, source: &SourceFeed) -> bool {
        self.modified == source.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_is_minutes_and_never_zero() {
        let s = SourceFeed::new("a", "http://x", 15);
        assert_eq!(s.poll_interval(), Duration::from_secs(900));
        let z = SourceFeed::new("b", "http://x", 0);
        assert_eq!(z.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn never_fetched_and_never_derived_counts_as_current() {
        let s = SourceFeed::new("s", "http://x", 5);
        let d = DerivedFeed::new("d", "s", "de");
        assert!(d.is_current_with(&s));
    }

    #[test]
    fn record_defaults_fill_missing_fields() {
        let s: SourceFeed =
            serde_json::from_str(r#"{"sid":"s","feed_url":"http://x","update_frequency":30}"#)
                .unwrap();
        assert_eq!(s.translator, "copy");
        assert!(!s.valid);
        let d: DerivedFeed =
            serde_json::from_str(r#"{"sid":"d","source_sid":"s","language":"fr"}"#).unwrap();
        assert!(d.translate_title);
        assert!(!d.translate_content);
    }
}
