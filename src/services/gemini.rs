/// Gemini `generateContent` client
///
/// Two request shapes share one transport:
///
/// - style analysis: image + instruction, free-text answer
/// - pose variations: image + instruction + `responseSchema`, JSON-array answer
///
/// No retries, caching or timeouts. MIME types are validated before a
/// request ever reaches this module.
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, Instrument};

use crate::config::GeminiConfig;
use crate::error::{InferenceError, InferenceFailure};
use crate::state::data::{InlineImage, PosePrompt};

const STYLE_INSTRUCTION: &str = "Analyze this wedding photo. Describe the style, lighting, colors, composition, and mood in a format suitable for a high-quality image generation prompt (like Midjourney). Focus on keywords like 'cinematic', 'soft focus', 'golden hour', etc. Keep it under 100 words.";

const POSE_INSTRUCTION: &str = "Analyze the aesthetic of this wedding photo. Generate 8 different creative wedding photography pose prompts (e.g., Candid, Romantic, Artistic, Wide, Detail, etc.) that match this aesthetic. Return the result as a JSON array.";

/// Number of pose prompts the instruction asks for.
pub const EXPECTED_POSE_COUNT: usize = 8;

/// Remote multimodal model operations used by the tabs.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Free-text style description of the image.
    async fn analyze_style(&self, image: &InlineImage) -> Result<String, InferenceError>;

    /// Pose prompts in model order. The count is whatever the model returned.
    async fn generate_pose_variations(
        &self,
        image: &InlineImage,
    ) -> Result<Vec<PosePrompt>, InferenceError>;
}

/// Body for a single-turn `generateContent` call with an inline image.
pub fn build_request(
    image: &InlineImage,
    instruction: &str,
    response_schema: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "inlineData": { "mimeType": image.mime_type, "data": image.data } },
                { "text": instruction },
            ],
        }],
    });

    if let Some(schema) = response_schema {
        body["generationConfig"] = serde_json::json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }

    body
}

/// Array of `{title, prompt}` objects, both required strings.
pub fn pose_response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": {
                    "type": "STRING",
                    "description": "A short title for the pose (e.g., 'Candid: The Walk')",
                },
                "prompt": {
                    "type": "STRING",
                    "description": "The detailed image generation prompt.",
                },
            },
            "required": ["title", "prompt"],
        },
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Concatenated text parts of the first candidate, skipping thought parts.
pub fn response_text(body: &str) -> Result<String, InferenceFailure> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| InferenceFailure::Malformed(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    Ok(text)
}

/// Parse the JSON text of a pose response. Empty text is rejected before
/// any parse is attempted.
pub fn parse_pose_prompts(text: &str) -> Result<Vec<PosePrompt>, InferenceFailure> {
    if text.trim().is_empty() {
        return Err(InferenceFailure::EmptyResponse);
    }
    serde_json::from_str(text).map_err(|e| InferenceFailure::Malformed(e.to_string()))
}

/// Extract `error.message` from a Google API error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

/// `InferenceClient` backed by the Gemini REST API.
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Send one request and return the model's text (possibly empty).
    async fn generate(&self, body: &serde_json::Value) -> Result<String, InferenceFailure> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceFailure::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InferenceFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(InferenceFailure::Status {
                status: status.as_u16(),
                detail: extract_error_message(&text),
            });
        }

        response_text(&text)
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn analyze_style(&self, image: &InlineImage) -> Result<String, InferenceError> {
        let span = tracing::info_span!("gemini_request", op = "style", model = %self.config.model);
        async move {
            debug!(mime = %image.mime_type, bytes = image.data.len(), "sending style analysis");

            let body = build_request(image, STYLE_INSTRUCTION, None);
            let text = self
                .generate(&body)
                .await
                .and_then(|text| {
                    if text.trim().is_empty() {
                        Err(InferenceFailure::EmptyResponse)
                    } else {
                        Ok(text)
                    }
                })
                .map_err(|failure| {
                    error!(cause = %failure, "style analysis failed");
                    InferenceError::Analysis(failure)
                })?;

            info!(chars = text.len(), "✨ style analysis received");
            Ok(text)
        }
        .instrument(span)
        .await
    }

    async fn generate_pose_variations(
        &self,
        image: &InlineImage,
    ) -> Result<Vec<PosePrompt>, InferenceError> {
        let span = tracing::info_span!("gemini_request", op = "poses", model = %self.config.model);
        async move {
            debug!(mime = %image.mime_type, bytes = image.data.len(), "sending pose generation");

            let body = build_request(image, POSE_INSTRUCTION, Some(pose_response_schema()));
            let prompts = self
                .generate(&body)
                .await
                .and_then(|text| parse_pose_prompts(&text))
                .map_err(|failure| {
                    error!(cause = %failure, "pose generation failed");
                    InferenceError::PoseGeneration(failure)
                })?;

            info!(count = prompts.len(), "✨ pose prompts received");
            Ok(prompts)
        }
        .instrument(span)
        .await
    }
}
