//! Client-side orchestration over the OpenAI text-to-speech API: single
//! request synthesis, concurrent batch dispatch with bounded retries, and
//! chunked streaming to disk.
//!
//! The backend is injected as an [`infrastructure::backends::SpeechBackend`]
//! trait object, so tests (and alternative providers) substitute their own
//! implementation without touching global state.

pub mod domain;
pub mod infrastructure;

pub use domain::tts::{
    AudioFormat, BatchProcessor, BatchResult, RetryPolicy, SpeechModel, SpeechRequest,
    StreamingSynthesizer, SynthesisMetadata, SynthesisOutcome, TtsError, TtsService,
    ValidatedRequest, Voice, MAX_BATCH_SIZE, MAX_TEXT_LENGTH,
};
pub use infrastructure::backends::{AudioChunkStream, OpenAiSpeechBackend, SpeechBackend};
pub use infrastructure::config::{Config, LogFormat};
