//! Narrative capability adapter.
//!
//! Builds prompts that embed the exact computed figures, calls the external
//! generateContent endpoint with a strict JSON output schema, and validates
//! the reply shape. The reply is untrusted I/O: any deviation from the
//! two-paragraph contract is an error here and a fallback upstream, never a
//! crash. Numeric results do not depend on this module succeeding.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core_logic::comparison::ComparisonResult;
use crate::core_logic::correlation::CorrelationResult;
use crate::core_logic::forecast::ForecastResult;
use crate::error::{Error, Result};

/// The output contract: a fixed-size ordered list of short paragraphs.
pub const NARRATIVE_PARAGRAPHS: usize = 2;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, prompt: &str) -> Result<Vec<String>>;
}

/// Fixed narrative substituted when the capability fails for any reason.
pub fn fallback_narrative() -> Vec<String> {
    vec![
        "Automated narrative generation was unavailable for this analysis.".to_string(),
        "The numeric results are complete; the chart and metric cards can be read directly."
            .to_string(),
    ]
}

pub struct GeminiClient {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL, env::var("GEMINI_API_KEY").ok())
    }
}

#[async_trait]
impl Narrator for GeminiClient {
    async fn narrate(&self, prompt: &str) -> Result<Vec<String>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Credential("GEMINI_API_KEY is not set".to_string()))?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        let response = self
            .http_client
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| Error::MalformedReply("reply carries no text part".to_string()))?;

        parse_paragraphs(text)
    }
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "interpretation": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of 2 short paragraphs."
            }
        },
        "required": ["interpretation"]
    })
}

#[derive(Deserialize)]
struct NarrativeReply {
    interpretation: Vec<String>,
}

/// Validate the structured reply against the contract.
pub fn parse_paragraphs(text: &str) -> Result<Vec<String>> {
    let reply: NarrativeReply = serde_json::from_str(text)?;

    if reply.interpretation.len() != NARRATIVE_PARAGRAPHS {
        return Err(Error::MalformedReply(format!(
            "expected {} paragraphs, got {}",
            NARRATIVE_PARAGRAPHS,
            reply.interpretation.len()
        )));
    }
    if reply.interpretation.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::MalformedReply("empty paragraph in reply".to_string()));
    }

    Ok(reply
        .interpretation
        .into_iter()
        .map(|p| p.trim().to_string())
        .collect())
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

pub fn forecast_prompt(metric: &str, result: &ForecastResult) -> String {
    let best = &result.best;
    format!(
        "Act as a performance analyst for an industrial monitoring dashboard. \
         The metric '{metric}' was forecast with the model '{model}' ({equation}).\n\
         - In-sample RMSE: {rmse:.2}\n\
         - Reliability: {reliability:.0}%\n\
         - Last observed values: {observed:?}\n\
         - Projected next {horizon} values: {projected:?}\n\
         \n\
         Write exactly 2 short paragraphs for 'interpretation':\n\
         1. Describe the expected trajectory of the metric.\n\
         2. State how much confidence the reliability warrants and recommend one action.",
        metric = metric,
        model = best.name,
        equation = best.equation,
        rmse = best.rmse,
        reliability = best.reliability,
        observed = tail(&result.history.values, 5),
        horizon = best.projections.len(),
        projected = best.projections,
    )
}

pub fn comparison_prompt(metric: &str, result: &ComparisonResult) -> String {
    format!(
        "Act as a performance analyst. Compare the metric '{metric}' against the \
         previous period of the same length.\n\
         - Current period: total={current_total:.0}, mean per bucket={current_mean:.1}\n\
         - Previous period: total={prior_total:.0}, mean per bucket={prior_mean:.1}\n\
         - Change: {delta}\n\
         \n\
         Write exactly 2 short paragraphs for 'interpretation':\n\
         1. Analyze the change in behavior between the periods.\n\
         2. Say whether the change is positive or negative and recommend an action.",
        metric = metric,
        current_total = result.current_total,
        current_mean = result.current_mean,
        prior_total = result.prior_total,
        prior_mean = result.prior_mean,
        delta = result.delta,
    )
}

pub fn correlation_prompt(metric_a: &str, metric_b: &str, result: &CorrelationResult) -> String {
    format!(
        "Act as a data scientist. Analyze the correlation between '{metric_a}' \
         (variable A) and '{metric_b}' (variable B).\n\
         - Pearson coefficient (r): {r:.2} ({strength})\n\
         - Linear regression: Y = {intercept:.2} + {slope:.2} * X\n\
         - Sample of A: {a_tail:?}\n\
         - Sample of B: {b_tail:?}\n\
         \n\
         Write exactly 2 short paragraphs for 'interpretation':\n\
         1. Explain the relationship found (positive, negative or neutral) and its strength.\n\
         2. Give a business reading: does one metric influence the other, or is it coincidence?",
        metric_a = metric_a,
        metric_b = metric_b,
        r = result.pearson_r,
        strength = result.strength,
        intercept = result.intercept,
        slope = result.slope,
        a_tail = tail(&result.a_values, 5),
        b_tail = tail(&result.b_values, 5),
    )
}
