//! Classification backend: provider abstraction + verdict parsing.

pub mod openrouter;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::domain::{Classification, ClassificationResult, Message};

pub use openrouter::OpenRouterClassifier;

/// Given a message, return a verdict or fail. Failures are mapped to `none` by the caller.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, msg: &Message) -> Result<ClassificationResult>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Always answers `none`; used when no backend is configured.
pub struct DisabledClassifier;

#[async_trait::async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _msg: &Message) -> Result<ClassificationResult> {
        Ok(ClassificationResult::none())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    classification: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reason: String,
}

/// Parse the model's reply. Code fences around the JSON are tolerated; anything else
/// outside `{classification, token, confidence, reason}` is an error.
pub fn parse_verdict(content: &str) -> Result<ClassificationResult> {
    let body = strip_code_fences(content);
    let raw: RawVerdict =
        serde_json::from_str(body).context("classifier reply is not verdict JSON")?;
    let classification = Classification::from_label(&raw.classification)
        .ok_or_else(|| anyhow!("unknown classification label {:?}", raw.classification))?;
    if !raw.confidence.is_finite() {
        return Err(anyhow!("non-finite confidence"));
    }

    Ok(ClassificationResult {
        classification,
        token: raw.token.trim().trim_start_matches('$').to_string(),
        confidence: raw.confidence.clamp(0.0, 1.0),
        reason: sanitize_reason(&raw.reason),
    })
}

/// Drop a surrounding markdown fence; the `json` info string may be in any case.
fn strip_code_fences(s: &str) -> &str {
    let mut t = s.trim();
    if let Some(rest) = t.strip_prefix("```") {
        t = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    t = t.strip_suffix("```").unwrap_or(t);
    t.trim()
}

/// Single line, collapsed whitespace, <=160 chars.
pub fn sanitize_reason(input: &str) -> String {
    let mut out = String::with_capacity(160);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() { ' ' } else { ch };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.chars().count() >= 160 {
            break;
        }
    }
    out.trim().to_string()
}
