//! OpenAI chat completions client for video summaries.
//!
//! Sends the title, description and (truncated) transcript as text, plus the
//! thumbnail as an `image_url` part when the model accepts images.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tubeline_core::HttpConfig;
use tubeline_core::error::{AppError, ProviderErrorDetails, ProviderErrorKind};
use tubeline_core::traits::{SummaryProvider, SummaryRequest};

use crate::http::{build_client, error_from_response, map_send_error};

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You summarize YouTube videos for a search index. \
Write two to four plain sentences covering the topic, the main points and who \
the video is for. Do not use markdown or bullet points.";

/// Whether a chat model accepts image input.
pub fn model_supports_images(model: &str) -> bool {
    model.starts_with("gpt-4o") || model.starts_with("gpt-4.1") || model.starts_with("gpt-5")
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    vision: bool,
    max_tokens: u32,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Renders the user prompt text for one video.
fn render_prompt(request: &SummaryRequest<'_>) -> String {
    let mut prompt = format!("Title: {}\n", request.title);
    if let Some(description) = request.description {
        prompt.push_str("\nDescription:\n");
        prompt.push_str(description);
        prompt.push('\n');
    }
    if let Some(transcript) = request.transcript {
        prompt.push_str("\nTranscript:\n");
        prompt.push_str(transcript);
        prompt.push('\n');
    }
    prompt
}

impl ChatClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_config(api_key, DEFAULT_SUMMARY_MODEL, None, &HttpConfig::default())
    }

    pub fn with_config(
        api_key: &str,
        model: &str,
        endpoint: Option<&str>,
        http: &HttpConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(http)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.unwrap_or(DEFAULT_CHAT_ENDPOINT).to_string(),
            vision: model_supports_images(model),
            max_tokens: 300,
            timeout_secs: http.timeout.as_secs(),
        })
    }

    /// Overrides image support detected from the model name.
    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request<'a>(&'a self, request: &SummaryRequest<'a>) -> ChatRequest<'a> {
        let mut parts = vec![ContentPart::Text {
            text: render_prompt(request),
        }];
        if self.vision
            && let Some(url) = request.thumbnail_url
        {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url, detail: "low" },
            });
        }

        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.3,
        }
    }

    /// Requests a summary for one video.
    pub async fn complete(&self, request: &SummaryRequest<'_>) -> Result<String, AppError> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("openai", self.timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AppError::ClientError(format!("Failed to parse OpenAI response: {}", e))
        })?;
        let choice = chat.choices.into_iter().next().ok_or(AppError::EmptyResponse)?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(AppError::ProviderError(ProviderErrorDetails::new(
                "openai",
                ProviderErrorKind::ContentPolicy,
                format!("summary for {} blocked by content filter", request.video_id),
                200,
            )));
        }

        choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AppError::EmptyResponse)
    }
}

// =============================================================================
// Trait Implementation: SummaryProvider
// =============================================================================

impl SummaryProvider for ChatClient {
    fn name(&self) -> &'static str {
        "openai-chat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        self.vision
    }

    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String, AppError> {
        self.complete(&request).await
    }
}
