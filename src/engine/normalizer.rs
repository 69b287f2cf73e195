// Title normalization through an OpenAI-compatible completion endpoint.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::NORMALIZE_TEMPERATURE;

const SYSTEM_PROMPT: &str = "You are an expert in book metadata correction. \
     Given a possibly misspelled or incomplete title, \
     return ONLY the most likely correct full title of a real book. \
     Never invent new books or add commentary. \
     Output must be just the title, nothing else.";

const EXAMPLE_INPUT: &str = "harry poter and the goblt of fire";
const EXAMPLE_OUTPUT: &str = "Harry Potter and the Goblet of Fire";

pub struct TitleNormalizer {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl TitleNormalizer {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_url.trim().is_empty()
    }

    /// Best-effort title correction. Returns `title` untouched when the API is
    /// not configured or anything goes wrong.
    pub async fn normalize(&self, title: &str) -> String {
        if !self.is_configured() {
            debug!("completion API not configured, skipping title normalization");
            return title.to_string();
        }

        match self.request_correction(title).await {
            Ok(corrected) => {
                info!("normalized title {:?} -> {:?}", title, corrected);
                corrected
            }
            Err(e) => {
                warn!("error normalizing title {:?}: {:#}", title, e);
                title.to_string()
            }
        }
    }

    fn request_body(&self, title: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": EXAMPLE_INPUT },
                { "role": "assistant", "content": EXAMPLE_OUTPUT },
                { "role": "user", "content": title.trim() },
            ],
            "extra_body": { "reasoning": "false" },
            "temperature": NORMALIZE_TEMPERATURE,
        })
    }

    async fn request_correction(&self, title: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(title))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let corrected = body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| anyhow!("completion response has no message content"))?;

        if corrected.is_empty() {
            return Err(anyhow!("completion returned an empty title"));
        }
        Ok(corrected.to_string())
    }
}
