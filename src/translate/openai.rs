// src/translate/openai.rs
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EngineOutput, TranslationEngine};
use crate::config::OpenAiConfig;

/// Chat Completions engine, billed by tokens. One request per text.
pub struct OpenAiEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiEngine {
    pub fn new(cfg: &OpenAiConfig) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            bail!("openai api_key is empty");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("feed-translator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building openai http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
        })
    }

    async fn translate_one(&self, text: &str, target_language: &str) -> Result<(String, u64)> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<RespUsage>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }
        #[derive(Deserialize)]
        struct RespUsage {
            total_tokens: u64,
        }

        let system = format!(
            "Translate the user's text into {target_language}. Keep HTML tags, attributes and URLs unchanged. Output only the translation."
        );
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &system,
                },
                Msg {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("openai HTTP {status}: {body}");
        }
        let body: Resp = resp.json().await.context("parsing openai response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("openai response has no choices"))?;
        let tokens = body.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok((content, tokens))
    }
}

#[async_trait]
impl TranslationEngine for OpenAiEngine {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn translate_texts(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<EngineOutput> {
        let mut out = EngineOutput::default();
        for text in texts {
            let (translated, tokens) = self.translate_one(text, target_language).await?;
            out.texts.push(translated);
            out.tokens = out.tokens.saturating_add(tokens);
        }
        tracing::debug!(
            texts = texts.len(),
            tokens = out.tokens,
            language = target_language,
            "openai translation done"
        );
        Ok(out)
    }
}
