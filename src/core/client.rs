use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::core::cost::pricing;
use crate::core::models::cost::{CostInfo, TokenUsage};
use crate::core::prompt::SYSTEM_PROMPT;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "o4-mini";

/// The only failure kind surfaced by an analysis client. Retrying is the
/// caller's business.
#[derive(Error, Debug)]
#[error("analysis call failed: {0:#}")]
pub struct AnalysisError(#[from] pub anyhow::Error);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid reasoning effort '{}' (must be low|medium|high)",
                other
            )),
        }
    }
}

/// Raw response text plus what the call cost.
#[derive(Debug, Clone)]
pub struct AnalysisResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub cost: CostInfo,
}

pub type AnalysisFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AnalysisResponse, AnalysisError>> + Send + 'a>>;

/// A remote model that turns a formatted test case into an analysis.
pub trait AnalysisClient: Send + Sync {
    fn model(&self) -> &str;

    fn analyze<'a>(&'a self, prompt: &'a str, effort: ReasoningEffort) -> AnalysisFuture<'a>;
}

/// Validate that a resolved endpoint URL uses HTTPS before any credential is
/// sent to it.
pub fn validate_endpoint(url: &str) -> anyhow::Result<()> {
    if !url.starts_with("https://") {
        anyhow::bail!("endpoint must use HTTPS, got: {}", url);
    }
    Ok(())
}

// ── OpenAI chat completions ──────────────────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct UsageRaw {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageRaw>,
}

fn parse_usage(raw: Option<UsageRaw>) -> TokenUsage {
    let Some(raw) = raw else {
        return TokenUsage::default();
    };
    TokenUsage {
        prompt_tokens: raw.prompt_tokens.unwrap_or(0),
        completion_tokens: raw.completion_tokens.unwrap_or(0),
        total_tokens: raw.total_tokens.unwrap_or(0),
        cached_tokens: raw
            .prompt_tokens_details
            .and_then(|d| d.cached_tokens)
            .unwrap_or(0),
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> anyhow::Result<Self> {
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        validate_endpoint(&endpoint)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint,
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a str, effort: ReasoningEffort) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat { kind: "text" },
            reasoning_effort: pricing::supports_reasoning_effort(&self.model).then_some(effort),
        }
    }

    async fn call(&self, prompt: &str, effort: ReasoningEffort) -> anyhow::Result<AnalysisResponse> {
        use anyhow::Context;

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&self.build_request(prompt, effort))
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Unauthorized - check your OpenAI API key");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} from chat completions endpoint: {}", status.as_u16(), body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Response contained no message content")?;
        let usage = parse_usage(parsed.usage);
        let cost = pricing::calculate_cost(pricing::lookup(&self.model), &usage);

        Ok(AnalysisResponse { text, usage, cost })
    }
}

impl AnalysisClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn analyze<'a>(&'a self, prompt: &'a str, effort: ReasoningEffort) -> AnalysisFuture<'a> {
        Box::pin(async move { self.call(prompt, effort).await.map_err(AnalysisError) })
    }
}
