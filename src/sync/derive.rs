// src/sync/derive.rs
use anyhow::{anyhow, bail, Context, Result};
use metrics::counter;
use serde::Serialize;

use super::{FeedSyncer, FetchMode, FetchOutcome, Rearm};
use crate::feed::{parse_feed, render_atom};
use crate::model::{DerivedFeed, SourceFeed};
use crate::translate::{TranslateRequest, Usage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeriveOutcome {
    UpToDate,
    /// The referenced source feed does not exist; nothing was touched.
    DanglingSource,
    Unparsable,
    NoTranslation,
    Derived {
        size: u64,
        tokens: u64,
        characters: u64,
    },
    Failed {
        reason: String,
    },
}

impl DeriveOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::DanglingSource => "dangling_source",
            Self::Unparsable => "unparsable",
            Self::NoTranslation => "no_translation",
            Self::Derived { .. } => "derived",
            Self::Failed { .. } => "failed",
        }
    }
}

impl FeedSyncer {
    /// Bring one derived feed up to date with its source. `Ok(None)` when the derived
    /// feed no longer exists.
    pub async fn update_derived(&self, sid: &str) -> Result<Option<DeriveOutcome>> {
        let Some(mut derived) = self.store.derived(sid).await? else {
            tracing::debug!(sid, "derived feed gone, skipping");
            return Ok(None);
        };
        let Some(source) = self.store.source(&derived.source_sid).await? else {
            tracing::error!(
                sid,
                source = %derived.source_sid,
                language = %derived.language,
                "cannot translate feed, source feed does not exist"
            );
            counter!("feed_derive_total", "outcome" => "dangling_source").increment(1);
            return Ok(Some(DeriveOutcome::DanglingSource));
        };
        if derived.is_current_with(&source) {
            tracing::debug!(sid, source = %source.sid, "translated feed is up to date, skip");
            counter!("feed_derive_total", "outcome" => "up_to_date").increment(1);
            return Ok(Some(DeriveOutcome::UpToDate));
        }

        let outcome = match self.derive_into(&mut derived, source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                derived.status = false;
                DeriveOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        };
        match &outcome {
            DeriveOutcome::Derived {
                size,
                tokens,
                characters,
            } => tracing::info!(
                sid,
                language = %derived.language,
                size,
                tokens,
                characters,
                "translated feed written"
            ),
            DeriveOutcome::Failed { reason } => {
                tracing::error!(sid, language = %derived.language, error = %reason, "translation failed")
            }
            DeriveOutcome::Unparsable => {
                tracing::warn!(sid, source = %derived.source_sid, "raw source feed is not a feed, skip")
            }
            DeriveOutcome::NoTranslation => {
                tracing::warn!(sid, language = %derived.language, "translation produced no result")
            }
            DeriveOutcome::UpToDate | DeriveOutcome::DanglingSource => {}
        }
        counter!("feed_derive_total", "outcome" => outcome.label()).increment(1);

        self.store
            .save_derived(&derived)
            .await
            .with_context(|| format!("saving derived feed {sid}"))?;
        Ok(Some(outcome))
    }

    async fn derive_into(
        &self,
        derived: &mut DerivedFeed,
        source: SourceFeed,
    ) -> Result<DeriveOutcome> {
        let source = self.ensure_raw(source).await?;
        if derived.is_current_with(&source) {
            return Ok(DeriveOutcome::UpToDate);
        }

        let raw = self
            .files
            .read(&source.sid)
            .await
            .context("reading raw source feed")?;
        let parsed = match parse_feed(&raw) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::debug!(sid = %source.sid, error = %format!("{e:#}"), "raw feed parse failed");
                return Ok(DeriveOutcome::Unparsable);
            }
        };

        let request = TranslateRequest {
            target_language: &derived.language,
            engine: &source.translator,
            translate_title: derived.translate_title,
            translate_content: derived.translate_content,
        };
        let Some(translation) = self.translator.translate(&parsed, &request).await? else {
            return Ok(DeriveOutcome::NoTranslation);
        };

        let xml = render_atom(&translation.feed)?;
        self.files
            .ensure_dir()
            .await
            .context("creating feed directory")?;
        let size = self
            .files
            .write(&derived.sid, &xml)
            .await
            .context("writing translated feed")?;

        derived.size = size;
        derived.modified = source.modified.clone();
        let (tokens, characters) = match translation.usage() {
            Usage::Tokens(n) => {
                derived.total_tokens = derived.total_tokens.saturating_add(n);
                counter!("translation_tokens_total").increment(n);
                (n, 0)
            }
            Usage::Characters(n) => {
                derived.total_characters = derived.total_characters.saturating_add(n);
                counter!("translation_characters_total").increment(n);
                (0, n)
            }
        };
        derived.status = true;

        Ok(DeriveOutcome::Derived {
            size,
            tokens,
            characters,
        })
    }

    /// Make sure the raw document is on disk, fetching it unconditionally if not.
    /// Returns the source record as stored after that fetch.
    async fn ensure_raw(&self, source: SourceFeed) -> Result<SourceFeed> {
        if self.files.exists(&source.sid).await {
            return Ok(source);
        }
        tracing::warn!(sid = %source.sid, "raw source feed missing, fetching again");

        match self
            .update_source(&source.sid, FetchMode::Unconditional, Rearm::Never)
            .await?
        {
            Some(FetchOutcome::Updated { .. }) => {}
            Some(FetchOutcome::Failed { reason }) => {
                bail!("re-fetch of source feed {} failed: {reason}", source.sid)
            }
            Some(FetchOutcome::Unchanged) | None => {
                bail!("source feed {} has no raw document", source.sid)
            }
        }
        self.store
            .source(&source.sid)
            .await?
            .ok_or_else(|| anyhow!("source feed {} disappeared", source.sid))
    }
}
