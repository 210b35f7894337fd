pub mod batch;
pub mod error;
pub mod model;
pub mod retry;
pub mod service;
pub mod streaming;

pub use batch::{BatchProcessor, MAX_BATCH_SIZE};
pub use error::TtsError;
pub use model::{
    AudioFormat, BatchResult, SpeechModel, SpeechRequest, SynthesisMetadata, SynthesisOutcome,
    ValidatedRequest, Voice, MAX_TEXT_LENGTH,
};
pub use retry::RetryPolicy;
pub use service::TtsService;
pub use streaming::{ChunkCallback, ProgressCallback, StreamingSynthesizer};
