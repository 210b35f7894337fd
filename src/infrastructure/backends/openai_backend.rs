use super::speech_backend::{AudioChunkStream, SpeechBackend};
use crate::domain::tts::error::TtsError;
use crate::domain::tts::model::{AudioFormat, SpeechModel, ValidatedRequest, Voice};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel as ApiSpeechModel, SpeechResponseFormat, Voice as ApiVoice},
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::{Duration, Instant};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI implementation of the speech backend.
///
/// The buffered path goes through the OpenAI SDK; the SDK's speech endpoint
/// returns a complete body, so the chunked path posts to
/// `{api_base}/audio/speech` directly and forwards the response byte stream.
pub struct OpenAiSpeechBackend {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAiSpeechBackend {
    pub fn new(
        api_key: String,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TtsError> {
        let api_base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(api_base.clone());
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TtsError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Client::with_config(config),
            http,
            api_key,
            api_base,
            timeout,
        })
    }

    fn to_api_request(request: &ValidatedRequest) -> CreateSpeechRequest {
        CreateSpeechRequest {
            model: match request.model {
                SpeechModel::Tts1 => ApiSpeechModel::Tts1,
                SpeechModel::Tts1Hd => ApiSpeechModel::Tts1Hd,
            },
            input: request.text.clone(),
            voice: match request.voice {
                Voice::Alloy => ApiVoice::Alloy,
                Voice::Echo => ApiVoice::Echo,
                Voice::Fable => ApiVoice::Fable,
                Voice::Onyx => ApiVoice::Onyx,
                Voice::Nova => ApiVoice::Nova,
                Voice::Shimmer => ApiVoice::Shimmer,
            },
            response_format: Some(match request.format {
                AudioFormat::Mp3 => SpeechResponseFormat::Mp3,
                AudioFormat::Opus => SpeechResponseFormat::Opus,
                AudioFormat::Aac => SpeechResponseFormat::Aac,
                AudioFormat::Flac => SpeechResponseFormat::Flac,
            }),
            speed: Some(request.speed),
        }
    }
}

fn map_openai_error(err: OpenAIError) -> TtsError {
    match err {
        OpenAIError::ApiError(api) => TtsError::Backend {
            message: api.message,
            status: None,
        },
        other => TtsError::backend(other.to_string()),
    }
}

#[async_trait]
impl SpeechBackend for OpenAiSpeechBackend {
    async fn synthesize(&self, request: &ValidatedRequest) -> Result<Vec<u8>, TtsError> {
        let started = Instant::now();
        tracing::debug!(
            voice = %request.voice,
            model = %request.model,
            format = %request.format,
            text_length = request.text.chars().count(),
            "calling OpenAI TTS API"
        );

        let response = tokio::time::timeout(
            self.timeout,
            self.client.audio().speech(Self::to_api_request(request)),
        )
        .await
        .map_err(|_| {
            TtsError::backend(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(map_openai_error)?;

        let audio = response.bytes.to_vec();
        tracing::info!(
            voice = %request.voice,
            model = %request.model,
            audio_size = audio.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "OpenAI TTS audio received"
        );
        Ok(audio)
    }

    async fn open_stream(&self, request: &ValidatedRequest) -> Result<AudioChunkStream, TtsError> {
        let url = format!("{}/audio/speech", self.api_base.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": request.model.as_str(),
            "input": request.text,
            "voice": request.voice.as_str(),
            "response_format": request.format.as_str(),
            "speed": request.speed,
        });

        tracing::debug!(
            voice = %request.voice,
            model = %request.model,
            text_length = request.text.chars().count(),
            "opening OpenAI TTS stream"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Backend {
                message: format!("streaming request failed: {e}"),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.trim();
            return Err(TtsError::Backend {
                message: if detail.is_empty() {
                    format!("streaming request rejected with status {status}")
                } else {
                    format!("streaming request rejected: {detail}")
                },
                status: Some(status.as_u16()),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|item| match item {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(err) => Err(TtsError::backend(format!("stream interrupted: {err}"))),
            })
            .boxed())
    }
}
