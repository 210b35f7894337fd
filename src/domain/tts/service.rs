use super::error::TtsError;
use super::model::{AudioFormat, SpeechRequest, SynthesisOutcome, ValidatedRequest};
use super::retry::RetryPolicy;
use crate::infrastructure::backends::SpeechBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Single-request synthesis over an injected backend.
pub struct TtsService {
    backend: Arc<dyn SpeechBackend>,
    retry: RetryPolicy,
}

impl TtsService {
    pub fn new(backend: Arc<dyn SpeechBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Generate speech for one request, optionally saving the audio.
    ///
    /// Validation errors are returned synchronously; backend exhaustion and
    /// file failures are reported through the outcome, so a caller looping
    /// over items never has to tear down on a single failure.
    pub async fn generate_speech(
        &self,
        request: SpeechRequest,
        output_path: Option<&Path>,
    ) -> Result<SynthesisOutcome, TtsError> {
        let validated = request.validate()?;
        Ok(self.synthesize(&validated, output_path, &self.retry).await)
    }

    /// Synthesize a pre-validated request under an explicit retry policy.
    /// The batch engine calls this directly with its own attempt budget.
    pub async fn synthesize(
        &self,
        request: &ValidatedRequest,
        output_path: Option<&Path>,
        retry: &RetryPolicy,
    ) -> SynthesisOutcome {
        let metadata = request.metadata();
        tracing::info!(
            voice = %request.voice,
            model = %request.model,
            format = %request.format,
            text_length = metadata.text_length,
            "starting speech synthesis"
        );

        let audio = match retry.run(|| self.backend.synthesize(request)).await {
            Ok(audio) => audio,
            Err(err) => {
                tracing::error!(error = %err, "speech synthesis failed");
                return SynthesisOutcome::failure(err.to_string(), Some(metadata));
            }
        };

        let saved_path = match output_path {
            Some(path) => match write_audio_file(&audio, path, request.format).await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "audio saved");
                    Some(path)
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to save audio");
                    return SynthesisOutcome::failure(err.to_string(), Some(metadata));
                }
            },
            None => None,
        };

        tracing::info!(audio_size = audio.len(), "speech synthesis completed");
        SynthesisOutcome::success(audio, saved_path, metadata)
    }
}

/// Append the format's extension when the caller-specified path lacks one.
pub(crate) fn resolve_output_path(path: &Path, format: AudioFormat) -> PathBuf {
    if path.extension().is_none() {
        path.with_extension(format.extension())
    } else {
        path.to_path_buf()
    }
}

/// Create the parent directory of `path` recursively if it is absent.
pub(crate) async fn ensure_parent_dir(path: &Path) -> Result<(), TtsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TtsError::File {
                    path: path.to_path_buf(),
                    message: format!("failed to create directory: {e}"),
                })?;
        }
    }
    Ok(())
}

pub(crate) async fn write_audio_file(
    audio: &[u8],
    path: &Path,
    format: AudioFormat,
) -> Result<PathBuf, TtsError> {
    let path = resolve_output_path(path, format);
    ensure_parent_dir(&path).await?;
    tokio::fs::write(&path, audio)
        .await
        .map_err(|e| TtsError::File {
            path: path.clone(),
            message: format!("failed to write audio: {e}"),
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tts::model::Voice;
    use crate::infrastructure::backends::AudioChunkStream;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend stub that fails a configured number of times, then succeeds.
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
        audio: Vec<u8>,
    }

    impl FlakyBackend {
        fn new(failures: u32, audio: Vec<u8>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                audio,
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for FlakyBackend {
        async fn synthesize(&self, _request: &ValidatedRequest) -> Result<Vec<u8>, TtsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(TtsError::backend(format!("attempt {call} failed")))
            } else {
                Ok(self.audio.clone())
            }
        }

        async fn open_stream(
            &self,
            _request: &ValidatedRequest,
        ) -> Result<AudioChunkStream, TtsError> {
            Err(TtsError::backend("streaming not supported by this stub"))
        }
    }

    #[tokio::test]
    async fn it_should_return_audio_and_metadata_on_success() {
        let backend = Arc::new(FlakyBackend::new(0, b"audio-bytes".to_vec()));
        let service = TtsService::new(backend, RetryPolicy::new(0));

        let mut request = SpeechRequest::new("hello there");
        request.voice = Voice::Echo;
        let outcome = service.generate_speech(request, None).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.audio.as_deref(), Some(b"audio-bytes".as_slice()));
        assert_eq!(outcome.byte_size, Some(11));
        assert_eq!(outcome.saved_path, None);
        let metadata = outcome.metadata.unwrap();
        assert_eq!(metadata.voice, Voice::Echo);
        assert_eq!(metadata.text_length, 11);
    }

    #[tokio::test]
    async fn it_should_surface_validation_errors_synchronously() {
        let backend = Arc::new(FlakyBackend::new(0, vec![]));
        let service = TtsService::new(backend.clone(), RetryPolicy::new(0));

        let err = service
            .generate_speech(SpeechRequest::new("   "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Validation { field: "text", .. }));
        // The backend is never reached for invalid requests.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_retry_backend_failures_within_the_budget() {
        let backend = Arc::new(FlakyBackend::new(2, b"ok".to_vec()));
        let service = TtsService::new(backend.clone(), RetryPolicy::new(3));

        let outcome = service
            .generate_speech(SpeechRequest::new("retry me"), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_report_the_last_error_after_exhaustion() {
        let backend = Arc::new(FlakyBackend::new(10, vec![]));
        let service = TtsService::new(backend.clone(), RetryPolicy::new(1));

        let outcome = service
            .generate_speech(SpeechRequest::new("doomed"), None)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("backend error: attempt 2 failed")
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn it_should_save_audio_and_derive_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FlakyBackend::new(0, b"mp3-data".to_vec()));
        let service = TtsService::new(backend, RetryPolicy::new(0));

        let outcome = service
            .generate_speech(
                SpeechRequest::new("save me"),
                Some(&dir.path().join("nested/output")),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        let saved = outcome.saved_path.unwrap();
        assert_eq!(saved.extension().unwrap(), "mp3");
        assert_eq!(std::fs::read(&saved).unwrap(), b"mp3-data");
    }

    #[tokio::test]
    async fn it_should_keep_an_explicit_extension() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("speech.flac");
        let written = write_audio_file(b"flac-data", &target, AudioFormat::Mp3)
            .await
            .unwrap();
        // An explicit extension wins over the format-derived one.
        assert_eq!(written, target);
    }
}
