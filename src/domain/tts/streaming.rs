use super::error::TtsError;
use super::model::SpeechRequest;
use super::retry::RetryPolicy;
use super::service::{ensure_parent_dir, resolve_output_path};
use crate::infrastructure::backends::{AudioChunkStream, SpeechBackend};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Invoked synchronously for each chunk. A failure is logged and swallowed;
/// it never aborts the stream.
pub type ChunkCallback = Box<dyn Fn(&[u8]) -> anyhow::Result<()> + Send + Sync>;

/// Invoked with `(bytes_received, estimated_total)` after each chunk. The
/// estimate is a coarse text-length heuristic for progress bars, not a size
/// guarantee. Failures are logged and swallowed.
pub type ProgressCallback = Box<dyn Fn(u64, u64) -> anyhow::Result<()> + Send + Sync>;

/// Bytes of audio the progress estimate assumes per character of input.
const ESTIMATED_BYTES_PER_CHAR: u64 = 100;

/// Streaming synthesis: audio reaches the consumer chunk by chunk instead of
/// as one blocking response, so file writes can begin before the backend
/// finishes.
pub struct StreamingSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    retry: RetryPolicy,
}

impl StreamingSynthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    // The retry policy covers opening the stream only. A stream that dies
    // mid-flight is surfaced to the consumer: replaying half-consumed audio
    // would duplicate bytes already handed out.
    async fn open_stream(
        &self,
        request: &super::model::ValidatedRequest,
    ) -> Result<AudioChunkStream, TtsError> {
        self.retry.run(|| self.backend.open_stream(request)).await
    }

    /// Stream synthesis chunks lazily, invoking `chunk_callback` (when given)
    /// for each chunk as it arrives.
    pub async fn stream(
        &self,
        request: SpeechRequest,
        chunk_callback: Option<ChunkCallback>,
    ) -> Result<AudioChunkStream, TtsError> {
        let validated = request.validate()?;
        tracing::info!(
            voice = %validated.voice,
            model = %validated.model,
            text_length = validated.text.chars().count(),
            "starting streaming synthesis"
        );

        let inner = self.open_stream(&validated).await?;
        match chunk_callback {
            None => Ok(inner),
            Some(callback) => Ok(inner
                .map(move |item| {
                    if let Ok(chunk) = &item {
                        if let Err(err) = callback(chunk) {
                            tracing::warn!(error = %err, "chunk callback failed");
                        }
                    }
                    item
                })
                .boxed()),
        }
    }

    /// Stream synthesis directly into a file, writing each chunk as it
    /// arrives. On a mid-stream failure the partially written file is left in
    /// place; callers needing atomicity should stream to a temporary path and
    /// rename on success.
    pub async fn stream_to_file(
        &self,
        request: SpeechRequest,
        output_path: &Path,
    ) -> Result<PathBuf, TtsError> {
        let validated = request.validate()?;
        let path = resolve_output_path(output_path, validated.format);
        ensure_parent_dir(&path).await?;

        let mut stream = self.open_stream(&validated).await?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| TtsError::File {
                path: path.clone(),
                message: format!("failed to create file: {e}"),
            })?;

        let mut total_bytes = 0u64;
        while let Some(item) = stream.next().await {
            let chunk = item?;
            file.write_all(&chunk).await.map_err(|e| TtsError::File {
                path: path.clone(),
                message: format!("failed to write chunk: {e}"),
            })?;
            total_bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| TtsError::File {
            path: path.clone(),
            message: format!("failed to flush file: {e}"),
        })?;

        tracing::info!(
            path = %path.display(),
            bytes = total_bytes,
            "streaming synthesis written to file"
        );
        Ok(path)
    }

    /// Stream synthesis while reporting progress, returning the complete
    /// audio once the stream ends.
    pub async fn stream_with_progress(
        &self,
        request: SpeechRequest,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<u8>, TtsError> {
        let validated = request.validate()?;
        let estimated_total =
            validated.text.chars().count() as u64 * ESTIMATED_BYTES_PER_CHAR;

        let mut stream = self.open_stream(&validated).await?;
        let mut audio = Vec::new();
        while let Some(item) = stream.next().await {
            let chunk = item?;
            audio.extend_from_slice(&chunk);
            if let Some(callback) = &progress_callback {
                if let Err(err) = callback(audio.len() as u64, estimated_total) {
                    tracing::warn!(error = %err, "progress callback failed");
                }
            }
        }

        tracing::info!(bytes = audio.len(), "streaming synthesis completed");
        Ok(audio)
    }
}
