use crate::domain::tts::error::TtsError;
use crate::domain::tts::model::{AudioFormat, SpeechModel, Voice};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_concurrent: usize,
    pub default_voice: Voice,
    pub default_model: SpeechModel,
    pub default_format: AudioFormat,
    pub default_speed: f32,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, TtsError> {
        dotenvy::dotenv().ok();

        let openai_api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| TtsError::validation("api_key", "OPENAI_API_KEY is not set"))?;
        if !openai_api_key.starts_with("sk-") {
            return Err(TtsError::validation(
                "api_key",
                "OpenAI API key must start with 'sk-'",
            ));
        }

        let default_speed = parse_env("TTS_DEFAULT_SPEED", 1.0f32)?;
        if !(0.25..=4.0).contains(&default_speed) {
            return Err(TtsError::validation(
                "speed",
                format!("TTS_DEFAULT_SPEED {default_speed} is outside the supported range [0.25, 4.0]"),
            ));
        }

        let config = Config {
            openai_api_key,
            openai_api_base: env::var("OPENAI_API_BASE").ok(),
            timeout: Duration::from_secs(parse_env("TTS_TIMEOUT_SECS", 30u64)?),
            max_retries: parse_env("TTS_MAX_RETRIES", 3u32)?,
            retry_base_delay: Duration::from_secs(parse_env("TTS_RETRY_DELAY_SECS", 1u64)?),
            max_concurrent: parse_env("TTS_MAX_CONCURRENT", 5usize)?.max(1),
            default_voice: parse_env("TTS_DEFAULT_VOICE", Voice::default())?,
            default_model: parse_env("TTS_DEFAULT_MODEL", SpeechModel::default())?,
            default_format: parse_env("TTS_DEFAULT_FORMAT", AudioFormat::default())?,
            default_speed,
            log_format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(config)
    }
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, TtsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|e| {
            TtsError::validation("config", format!("{name} has an invalid value {raw:?}: {e}"))
        }),
        Err(_) => Ok(default),
    }
}
