//! OpenAI HTTP adapter for scene analysis, images, speech and transcription.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::cost::ANALYSIS_MAX_OUTPUT_TOKENS;
use crate::errors::{BookreelError, CapabilityError};
use crate::ports::{ImageGenerator, SceneAnalyzer, SpeechSynthesizer, Transcriber};
use crate::scene::{analysis_prompt, system_prompt};

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Maps an OpenAI error response to a [`CapabilityError`].
///
/// Quota errors (`insufficient_quota`) and rate limits (HTTP 429 or
/// `rate_limit_exceeded`) are capacity exhaustion; everything else is not.
#[must_use]
pub fn classify_api_error(status: u16, body: &str) -> CapabilityError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_string());
    let tagged = |tag: &str| {
        detail.code.as_deref() == Some(tag) || detail.kind.as_deref() == Some(tag)
    };

    if tagged("insufficient_quota") || message.to_lowercase().contains("exceeded your current quota") {
        CapabilityError::quota(message)
    } else if status == 429 || tagged("rate_limit_exceeded") {
        CapabilityError::rate_limited(message)
    } else {
        CapabilityError::other(format!("HTTP {status}: {message}"))
    }
}

fn request_error(err: &reqwest::Error) -> CapabilityError {
    CapabilityError::other(format!("request failed: {err}"))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_api_error(status.as_u16(), &body))
}

/// OpenAI REST client implementing every model-backed port.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
    api_key: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BookreelError::Config`] if no API key is configured.
    pub fn new(config: OpenAiConfig) -> Result<Self, BookreelError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                BookreelError::Config(
                    "OpenAI API key missing: set OPENAI_API_KEY or SECRET_KEY".to_string(),
                )
            })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BookreelError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, CapabilityError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        check_status(response).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, CapabilityError> {
        let response = self.http.get(url).send().await.map_err(|e| request_error(&e))?;
        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(&e))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl SceneAnalyzer for OpenAiClient {
    async fn analyze(&self, title: &str, text: &str) -> Result<String, CapabilityError> {
        let body = serde_json::json!({
            "model": self.config.analysis_model,
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": analysis_prompt(title, text)},
            ],
            "response_format": {"type": "json_object"},
            "max_tokens": ANALYSIS_MAX_OUTPUT_TOKENS,
        });

        let response: ChatResponse = self
            .post_json("chat/completions", &body)
            .await?
            .json()
            .await
            .map_err(|e| CapabilityError::other(format!("malformed chat response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CapabilityError::other("chat response has no content"))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, dest: &Path) -> Result<PathBuf, CapabilityError> {
        let body = serde_json::json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.config.image_size,
            "quality": self.config.image_quality,
        });

        let response: ImageResponse = self
            .post_json("images/generations", &body)
            .await?
            .json()
            .await
            .map_err(|e| CapabilityError::other(format!("malformed image response: {e}")))?;
        let url = response
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| CapabilityError::other("image response has no URL"))?;

        debug!(dest = %dest.display(), "Downloading generated image");
        self.download(&url, dest).await
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<PathBuf, CapabilityError> {
        let body = serde_json::json!({
            "model": self.config.tts_model,
            "voice": self.config.voice,
            "input": text,
        });

        let audio = self
            .post_json("audio/speech", &body)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(&e))?;
        tokio::fs::write(dest, &audio).await?;
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map_or_else(|| "audio.mp3".to_string(), |n| n.to_string_lossy().into_owned());
        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| request_error(&e))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "srt");

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| request_error(&e))
    }
}
