use crate::domain::tts::error::TtsError;
use crate::domain::tts::model::ValidatedRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Chunked audio produced by a streaming synthesis call. Finite and not
/// restartable; consumers that need the bytes again must re-open the stream.
pub type AudioChunkStream = BoxStream<'static, Result<Vec<u8>, TtsError>>;

/// Capability boundary for the remote speech synthesis service.
/// Abstracts the underlying provider so the dispatch engine and the tests can
/// substitute a stub without touching global state.
///
/// Implementations are responsible for:
/// - Bounding each call with the configured timeout
/// - Mapping provider errors onto [`TtsError::Backend`]
/// - Accepting only validated requests
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Synthesize the request in one call, returning the complete audio.
    async fn synthesize(&self, request: &ValidatedRequest) -> Result<Vec<u8>, TtsError>;

    /// Open a streaming synthesis call, yielding audio chunks as the provider
    /// produces them.
    async fn open_stream(&self, request: &ValidatedRequest) -> Result<AudioChunkStream, TtsError>;
}
