//! The remote stage of the recommendation pipeline: a chat-completion call whose reply is parsed as
//! JSON, or mined for advice as free text when it is not JSON.

use crate::advice::context::AdviceContext;
use crate::advice::text::{extract_candidates, strip_fences};
use crate::advice::{AdviceStrategy, Proposal, Source};
use crate::config::RemoteSettings;
use crate::error::{typed_error, ErrorType, IntoResult};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

const SYSTEM_PROMPT: &str = "You are a careful personal-finance assistant. You give short, concrete \
    and actionable advice based only on the data you are given.";

/// The most recommendations the remote service is asked for.
const MAX_REQUESTED: usize = 5;

/// One message of a chat-completion conversation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sends a conversation to a text-generation service and returns the reply's message content.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Implements `ChatClient` with an HTTP POST to a chat-completion endpoint using a bearer token.
pub struct HttpChatClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpChatClient {
    /// Creates a client from `settings`, authenticating with `api_key`.
    ///
    /// # Errors
    /// - Returns an error if the endpoint is not a valid URL or the HTTP client cannot be built.
    pub fn new(settings: &RemoteSettings, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            endpoint: settings.endpoint_url()?,
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        trace!("POST {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send the recommendation request")
            .typed(ErrorType::Remote)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(typed_error(
                ErrorType::Remote,
                format!("The recommendation service answered with status {status}: {body}"),
            ));
        }

        let body = response
            .text()
            .await
            .context("Failed to read the recommendation response")
            .typed(ErrorType::Remote)?;
        content_from_response(&body)
    }
}

/// Extracts `choices[0].message.content` from a chat-completion response body.
pub fn content_from_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .context("Unexpected recommendation response shape")
        .typed(ErrorType::Remote)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| typed_error(ErrorType::Remote, "The recommendation response has no choices"))
}

#[derive(Debug, Deserialize)]
struct RemoteAdvice {
    recommendations: Vec<RemoteItem>,
}

#[derive(Debug, Deserialize)]
struct RemoteItem {
    message: String,
}

/// Parses content of the shape `{"recommendations": [{"message": "..."}]}`, optionally wrapped in a
/// fenced code block. Blank messages are dropped.
pub fn parse_recommendations(content: &str) -> Result<Vec<String>> {
    let advice: RemoteAdvice = serde_json::from_str(strip_fences(content))
        .context("The recommendation content is not the expected JSON")
        .typed(ErrorType::Parse)?;
    Ok(advice
        .recommendations
        .into_iter()
        .map(|r| r.message.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect())
}

/// Builds the conversation sent to the remote service.
pub fn build_prompt(context: &AdviceContext) -> Result<Vec<ChatMessage>> {
    let data = serde_json::to_string_pretty(context).context("Unable to serialize the advice context")?;
    let user = format!(
        "Here is my financial data as JSON. `monthly_spending` maps months to categories to amounts \
        spent, `budgets` are my monthly limits and `holidays` are coming up soon.\n\n{data}\n\n\
        Give me up to {MAX_REQUESTED} personalized recommendations. Answer with JSON only, in \
        exactly this shape: {{\"recommendations\": [{{\"message\": \"...\"}}]}}"
    );
    Ok(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
}

/// The remote stage. The reply is read as JSON first (`Source::Remote`) and, failing that, mined for
/// advice as free text (`Source::TextFallback`).
pub struct RemoteStrategy {
    client: Arc<dyn ChatClient>,
}

impl RemoteStrategy {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AdviceStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn propose(&self, context: &AdviceContext) -> Result<Proposal> {
        let messages = build_prompt(context)?;
        let content = self.client.complete(&messages).await?;
        match parse_recommendations(&content) {
            Ok(messages) if !messages.is_empty() => {
                return Ok(Proposal::new(Source::Remote, messages));
            }
            Ok(_) => debug!("The remote reply held no recommendations, trying text extraction"),
            Err(e) => debug!("{e:#}, trying text extraction"),
        }
        let candidates = extract_candidates(&content);
        if candidates.is_empty() {
            return Err(typed_error(
                ErrorType::Remote,
                "No usable recommendations in the remote reply",
            ));
        }
        Ok(Proposal::new(Source::TextFallback, candidates))
    }
}
