use super::error::TtsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// OpenAI rejects inputs longer than 4096 characters. A different backend
/// target must re-derive this constant, it is not universal.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Voices offered by the OpenAI TTS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(TtsError::validation(
                "voice",
                format!("unknown voice '{other}', expected one of: alloy, echo, fable, onyx, nova, shimmer"),
            )),
        }
    }
}

/// TTS models offered by the OpenAI endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpeechModel {
    #[default]
    #[serde(rename = "tts-1")]
    Tts1,
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
}

impl SpeechModel {
    pub const ALL: [SpeechModel; 2] = [SpeechModel::Tts1, SpeechModel::Tts1Hd];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechModel::Tts1 => "tts-1",
            SpeechModel::Tts1Hd => "tts-1-hd",
        }
    }
}

impl fmt::Display for SpeechModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeechModel {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tts-1" => Ok(SpeechModel::Tts1),
            "tts-1-hd" => Ok(SpeechModel::Tts1Hd),
            other => Err(TtsError::validation(
                "model",
                format!("unknown model '{other}', expected one of: tts-1, tts-1-hd"),
            )),
        }
    }
}

/// Audio container formats the backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
        }
    }

    /// File extension for audio saved in this format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "opus" => Ok(AudioFormat::Opus),
            "aac" => Ok(AudioFormat::Aac),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(TtsError::validation(
                "format",
                format!("unknown format '{other}', expected one of: mp3, opus, aac, flac"),
            )),
        }
    }
}

/// One speech synthesis request as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub model: SpeechModel,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    1.0
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: Voice::default(),
            model: SpeechModel::default(),
            format: AudioFormat::default(),
            speed: default_speed(),
        }
    }

    /// Validate the request, producing the only request type the backend
    /// accepts. The trimmed text replaces the original.
    pub fn validate(mut self) -> Result<ValidatedRequest, TtsError> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return Err(TtsError::validation(
                "text",
                "text cannot be empty or only whitespace",
            ));
        }
        let char_count = trimmed.chars().count();
        if char_count > MAX_TEXT_LENGTH {
            return Err(TtsError::validation(
                "text",
                format!("text is {char_count} characters, maximum is {MAX_TEXT_LENGTH}"),
            ));
        }
        if !(0.25..=4.0).contains(&self.speed) {
            return Err(TtsError::validation(
                "speed",
                format!("speed {} is outside the supported range [0.25, 4.0]", self.speed),
            ));
        }
        if trimmed.len() != self.text.len() {
            self.text = trimmed.to_string();
        }
        Ok(ValidatedRequest(self))
    }
}

/// Proof that validation ran. Invalid requests never reach the backend.
#[derive(Debug, Clone)]
pub struct ValidatedRequest(SpeechRequest);

impl ValidatedRequest {
    pub fn metadata(&self) -> SynthesisMetadata {
        SynthesisMetadata {
            voice: self.voice,
            model: self.model,
            format: self.format,
            speed: self.speed,
            text_length: self.text.chars().count(),
        }
    }
}

impl Deref for ValidatedRequest {
    type Target = SpeechRequest;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Descriptive parameters recorded alongside every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SynthesisMetadata {
    pub voice: Voice,
    pub model: SpeechModel,
    pub format: AudioFormat,
    pub speed: f32,
    pub text_length: usize,
}

/// Terminal result of processing one request, after all retries.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    pub success: bool,
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
    pub saved_path: Option<PathBuf>,
    pub byte_size: Option<usize>,
    pub error: Option<String>,
    pub metadata: Option<SynthesisMetadata>,
}

impl SynthesisOutcome {
    pub fn success(audio: Vec<u8>, saved_path: Option<PathBuf>, metadata: SynthesisMetadata) -> Self {
        let byte_size = audio.len();
        Self {
            success: true,
            audio: Some(audio),
            saved_path,
            byte_size: Some(byte_size),
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn failure(error: impl Into<String>, metadata: Option<SynthesisMetadata>) -> Self {
        Self {
            success: false,
            audio: None,
            saved_path: None,
            byte_size: None,
            error: Some(error.into()),
            metadata,
        }
    }
}

/// Aggregate over one batch, index-aligned with the submitted requests.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<SynthesisOutcome>,
    pub processing_time_secs: f64,
    pub errors: Vec<String>,
}

impl BatchResult {
    /// Reduce per-request outcomes into the batch summary.
    ///
    /// The reconciliation invariants are programming-error conditions: a
    /// violation means the dispatch engine dropped or duplicated an outcome,
    /// so this panics rather than returning inconsistent state.
    pub fn aggregate(outcomes: Vec<SynthesisOutcome>, elapsed: Duration) -> Self {
        let total_requests = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.iter().filter(|o| !o.success).count();
        let errors = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| !outcome.success)
            .map(|(index, outcome)| {
                format!(
                    "Request {index}: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        assert_eq!(
            successful + failed,
            total_requests,
            "successful and failed counts must equal total requests"
        );

        Self {
            total_requests,
            successful,
            failed,
            outcomes,
            processing_time_secs: elapsed.as_secs_f64(),
            errors,
        }
    }
}
