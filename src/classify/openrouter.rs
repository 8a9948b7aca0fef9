// src/classify/openrouter.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{parse_verdict, Classifier};
use crate::domain::{ClassificationResult, Message};

const ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Chat-completions classifier (OpenRouter). Requires an API key.
pub struct OpenRouterClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenRouterClassifier {
    pub fn new(api_key: impl Into<String>, model: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("tokenlaunch-radar/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building classifier http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: ENDPOINT.to_string(),
        })
    }

    /// Point at a different chat-completions URL (self-hosted gateway, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

pub fn build_prompt(msg: &Message) -> String {
    format!(
        r#"Analyze this tweet and classify it:

Tweet by @{username}:
"{content}"

Classify as one of:
- "launch": Announces a new crypto token launch
- "endorsement": Promotes or endorses an existing crypto token
- "none": Not related to crypto tokens

Respond in JSON format only:
{{
  "classification": "launch|endorsement|none",
  "token": "token symbol if mentioned, empty otherwise",
  "confidence": 0.0-1.0,
  "reason": "brief explanation"
}}"#,
        username = msg.username,
        content = msg.content
    )
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait::async_trait]
impl Classifier for OpenRouterClassifier {
    async fn classify(&self, msg: &Message) -> Result<ClassificationResult> {
        if self.api_key.is_empty() {
            bail!("classifier api key missing");
        }

        let prompt = build_prompt(msg);
        let req = ChatReq {
            model: &self.model,
            messages: vec![ChatMsg {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("classifier request")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("classifier API error: {}", status.as_u16());
        }

        let body: ChatResp = resp.json().await.context("classifier response body")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("no response from LLM"))?;

        parse_verdict(content)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}
