// src/translate/deepl.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{count_chars, EngineOutput, TranslationEngine};
use crate::config::DeepLConfig;

// DeepL accepts at most 50 texts per request.
const BATCH: usize = 50;

/// DeepL `/v2/translate` engine, billed by source characters.
pub struct DeepLEngine {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl DeepLEngine {
    pub fn new(cfg: &DeepLConfig) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            bail!("deepl api_key is empty");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("feed-translator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building deepl http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct Req<'a> {
    text: &'a [String],
    target_lang: String,
    tag_handling: &'a str,
}

#[derive(Deserialize)]
struct Resp {
    translations: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    text: String,
}

#[async_trait]
impl TranslationEngine for DeepLEngine {
    fn name(&self) -> &'static str {
        "deepl"
    }

    async fn translate_texts(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<EngineOutput> {
        let url = format!("{}/v2/translate", self.endpoint);
        let mut out = EngineOutput {
            characters: count_chars(texts),
            ..EngineOutput::default()
        };

        for chunk in texts.chunks(BATCH) {
            let req = Req {
                text: chunk,
                target_lang: target_language.to_ascii_uppercase(),
                tag_handling: "html",
            };
            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
                .json(&req)
                .send()
                .await
                .context("deepl request")?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("deepl HTTP {status}: {body}");
            }
            let body: Resp = resp.json().await.context("parsing deepl response")?;
            if body.translations.len() != chunk.len() {
                bail!(
                    "deepl returned {} translations for {} texts",
                    body.translations.len(),
                    chunk.len()
                );
            }
            out.texts.extend(body.translations.into_iter().map(|t| t.text));
        }

        tracing::debug!(
            texts = texts.len(),
            characters = out.characters,
            language = target_language,
            "deepl translation done"
        );
        Ok(out)
    }
}
