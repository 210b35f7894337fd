use super::error::TtsError;
use super::model::{AudioFormat, BatchResult, SpeechRequest, SynthesisOutcome};
use super::retry::RetryPolicy;
use super::service::TtsService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// OpenAI documents 100 requests as the batch ceiling; re-derive for a
/// different backend.
pub const MAX_BATCH_SIZE: usize = 100;

/// Concurrent dispatch of independent synthesis requests.
///
/// Items run under a counting-semaphore gate; each item validates, retries
/// backend failures, and resolves to a terminal outcome. One item's failure
/// never aborts its siblings.
pub struct BatchProcessor {
    service: Arc<TtsService>,
    max_concurrent: usize,
}

impl BatchProcessor {
    pub fn new(service: Arc<TtsService>, max_concurrent: usize) -> Self {
        Self {
            service,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Process a batch of requests, returning outcomes index-aligned with the
    /// input order regardless of completion order.
    ///
    /// Only batch-level precondition violations (empty or oversized input,
    /// unusable output directory) fail the call itself; per-item errors are
    /// reported through the result.
    pub async fn process_batch(
        &self,
        requests: Vec<SpeechRequest>,
        output_directory: Option<&Path>,
        retry_attempts: u32,
    ) -> Result<BatchResult, TtsError> {
        if requests.is_empty() {
            return Err(TtsError::validation(
                "requests",
                "at least one request is required",
            ));
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(TtsError::validation(
                "requests",
                format!(
                    "batch has {} requests, maximum is {MAX_BATCH_SIZE}",
                    requests.len()
                ),
            ));
        }

        let started = Instant::now();
        tracing::info!(
            total = requests.len(),
            max_concurrent = self.max_concurrent,
            retry_attempts,
            "starting batch processing"
        );

        let output_directory = match output_directory {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| TtsError::File {
                        path: dir.to_path_buf(),
                        message: format!("failed to create output directory: {e}"),
                    })?;
                Some(dir.to_path_buf())
            }
            None => None,
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let retry = RetryPolicy::new(retry_attempts);

        let mut handles = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let service = self.service.clone();
            let output_directory = output_directory.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return SynthesisOutcome::failure("concurrency gate closed", None),
                };
                process_item(&service, index, request, output_directory.as_deref(), &retry).await
            }));
        }

        // Joining in submission order keeps outcomes index-aligned.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(index, error = %err, "batch item task panicked");
                    SynthesisOutcome::failure(
                        TtsError::Internal(format!("item task failed: {err}")).to_string(),
                        None,
                    )
                }
            };
            outcomes.push(outcome);
        }

        let result = BatchResult::aggregate(outcomes, started.elapsed());
        tracing::info!(
            successful = result.successful,
            failed = result.failed,
            elapsed_secs = result.processing_time_secs,
            "batch processing completed"
        );
        Ok(result)
    }
}

async fn process_item(
    service: &TtsService,
    index: usize,
    request: SpeechRequest,
    output_directory: Option<&Path>,
    retry: &RetryPolicy,
) -> SynthesisOutcome {
    // Validation failures are terminal for the item; retries are only for
    // backend failures.
    let validated = match request.validate() {
        Ok(validated) => validated,
        Err(err) => {
            tracing::warn!(index, error = %err, "request rejected by validation");
            return SynthesisOutcome::failure(err.to_string(), None);
        }
    };

    let output_path: Option<PathBuf> =
        output_directory.map(|dir| dir.join(item_filename(index, &validated.text, validated.format)));

    service.synthesize(&validated, output_path.as_deref(), retry).await
}

/// Deterministic per-item filename: the index guarantees uniqueness within
/// the batch, the digest keeps it stable for the same content. The exact
/// string is not part of the caller contract.
fn item_filename(index: usize, text: &str, format: AudioFormat) -> String {
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    format!("tts_{index:03}_{}.{}", &digest[..8], format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tts::model::ValidatedRequest;
    use crate::infrastructure::backends::{AudioChunkStream, SpeechBackend};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend stub with per-text scripted behavior.
    #[derive(Default)]
    struct ScriptedBackend {
        /// text -> number of failures before success; missing texts succeed
        /// immediately, `u32::MAX` fails forever.
        failures: HashMap<String, u32>,
        calls: Mutex<HashMap<String, u32>>,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn failing_forever(texts: &[&str]) -> Self {
            Self {
                failures: texts.iter().map(|t| (t.to_string(), u32::MAX)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for ScriptedBackend {
        async fn synthesize(&self, request: &ValidatedRequest) -> Result<Vec<u8>, TtsError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(request.text.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            match self.failures.get(&request.text) {
                Some(&budget) if call <= budget => {
                    Err(TtsError::backend(format!("scripted failure {call}")))
                }
                _ => Ok(request.text.as_bytes().to_vec()),
            }
        }

        async fn open_stream(
            &self,
            _request: &ValidatedRequest,
        ) -> Result<AudioChunkStream, TtsError> {
            Err(TtsError::backend("streaming not scripted"))
        }
    }

    fn processor(backend: ScriptedBackend, max_concurrent: usize) -> BatchProcessor {
        let service = Arc::new(TtsService::new(Arc::new(backend), RetryPolicy::new(0)));
        BatchProcessor::new(service, max_concurrent)
    }

    fn requests(texts: &[&str]) -> Vec<SpeechRequest> {
        texts.iter().map(|text| SpeechRequest::new(*text)).collect()
    }

    #[tokio::test]
    async fn it_should_reject_an_empty_batch_before_dispatch() {
        let err = processor(ScriptedBackend::default(), 2)
            .process_batch(vec![], None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Validation { field: "requests", .. }));
    }

    #[tokio::test]
    async fn it_should_reject_an_oversized_batch_before_dispatch() {
        let oversized: Vec<SpeechRequest> = (0..=MAX_BATCH_SIZE)
            .map(|i| SpeechRequest::new(format!("text {i}")))
            .collect();
        assert_eq!(oversized.len(), 101);

        let err = processor(ScriptedBackend::default(), 2)
            .process_batch(oversized, None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Validation { field: "requests", .. }));
    }

    #[tokio::test]
    async fn it_should_reconcile_counts_for_a_mixed_batch() {
        let backend = ScriptedBackend::failing_forever(&["bad one", "bad two"]);
        let result = processor(backend, 3)
            .process_batch(requests(&["ok one", "bad one", "ok two", "bad two", "ok three"]), None, 0)
            .await
            .unwrap();

        assert_eq!(result.total_requests, 5);
        assert_eq!(result.successful, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.outcomes.len(), 5);
        assert_eq!(result.successful + result.failed, result.total_requests);
    }

    #[tokio::test]
    async fn it_should_fail_every_item_when_the_backend_always_fails() {
        let backend = ScriptedBackend::failing_forever(&["a", "b", "c", "d", "e"]);
        let result = processor(backend, 2)
            .process_batch(requests(&["a", "b", "c", "d", "e"]), None, 0)
            .await
            .unwrap();

        assert_eq!(result.failed, 5);
        assert_eq!(result.successful, 0);
        assert_eq!(result.errors.len(), 5);
        for (index, error) in result.errors.iter().enumerate() {
            assert!(
                error.starts_with(&format!("Request {index}: ")),
                "errors must be in index order, got {error:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_align_outcomes_with_input_order_despite_completion_order() {
        // Every item sleeps, so completion order is scrambled relative to
        // submission under a gate of 2; outcomes must still line up.
        let backend = ScriptedBackend {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let texts = ["zero", "one", "two", "three", "four", "five"];
        let result = processor(backend, 2)
            .process_batch(requests(&texts), None, 0)
            .await
            .unwrap();

        for (index, text) in texts.iter().enumerate() {
            assert_eq!(
                result.outcomes[index].audio.as_deref(),
                Some(text.as_bytes()),
                "outcome {index} must belong to request {index}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_cap_in_flight_requests_at_the_gate_limit() {
        let texts: Vec<String> = (0..10).map(|i| format!("item {i}")).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let service = Arc::new(TtsService::new(backend.clone(), RetryPolicy::new(0)));
        let result = BatchProcessor::new(service, 4)
            .process_batch(requests(&text_refs), None, 0)
            .await
            .unwrap();
        assert_eq!(result.successful, 10);
        assert!(
            backend.max_in_flight.load(Ordering::SeqCst) <= 4,
            "no more than 4 items may be in flight"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_recover_items_whose_failures_fit_the_retry_budget() {
        let backend = ScriptedBackend {
            failures: HashMap::from([("flaky".to_string(), 2), ("doomed".to_string(), u32::MAX)]),
            ..Default::default()
        };
        let result = processor(backend, 2)
            .process_batch(requests(&["flaky", "doomed", "fine"]), None, 2)
            .await
            .unwrap();

        assert!(result.outcomes[0].success, "2 failures fit a budget of 2");
        assert!(!result.outcomes[1].success);
        assert!(result.outcomes[2].success);
        assert_eq!(result.errors, vec![
            "Request 1: backend error: scripted failure 3".to_string(),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_not_let_one_failing_item_affect_the_other_nine() {
        let backend = ScriptedBackend {
            failures: HashMap::from([("item 3".to_string(), u32::MAX)]),
            delay: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let texts: Vec<String> = (0..10).map(|i| format!("item {i}")).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let result = processor(backend, 4)
            .process_batch(requests(&text_refs), None, 1)
            .await
            .unwrap();

        assert_eq!(result.successful, 9);
        assert_eq!(result.failed, 1);
        assert!(!result.outcomes[3].success);
    }

    /// Backend that panics for one configured text and succeeds otherwise.
    struct PanickingBackend {
        panic_text: &'static str,
    }

    #[async_trait]
    impl SpeechBackend for PanickingBackend {
        async fn synthesize(&self, request: &ValidatedRequest) -> Result<Vec<u8>, TtsError> {
            if request.text == self.panic_text {
                panic!("synthesis task blew up");
            }
            Ok(request.text.as_bytes().to_vec())
        }

        async fn open_stream(
            &self,
            _request: &ValidatedRequest,
        ) -> Result<AudioChunkStream, TtsError> {
            Err(TtsError::backend("streaming not scripted"))
        }
    }

    #[tokio::test]
    async fn it_should_contain_a_panicking_item_to_its_own_outcome() {
        let backend = PanickingBackend {
            panic_text: "second",
        };
        let service = Arc::new(TtsService::new(Arc::new(backend), RetryPolicy::new(0)));
        let result = BatchProcessor::new(service, 2)
            .process_batch(requests(&["first", "second", "third"]), None, 0)
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert!(result.outcomes[0].success);
        assert!(!result.outcomes[1].success);
        assert!(result.outcomes[2].success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Request 1: internal error"));
    }

    #[tokio::test]
    async fn it_should_record_item_validation_failures_without_dispatching() {
        let backend = ScriptedBackend::default();
        let mut batch = requests(&["fine"]);
        batch.push(SpeechRequest::new("   "));
        let result = processor(backend, 2).process_batch(batch, None, 3).await.unwrap();

        assert!(result.outcomes[0].success);
        assert!(!result.outcomes[1].success);
        assert!(result.errors[0].contains("invalid text"));
    }

    #[tokio::test]
    async fn it_should_write_one_file_per_successful_item() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();
        let result = processor(backend, 2)
            .process_batch(
                requests(&["first text", "second text"]),
                Some(dir.path()),
                0,
            )
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        let mut paths: Vec<PathBuf> = result
            .outcomes
            .iter()
            .map(|o| o.saved_path.clone().unwrap())
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 2, "filenames must be unique per item");
        for (outcome, text) in result.outcomes.iter().zip(["first text", "second text"]) {
            let saved = outcome.saved_path.as_ref().unwrap();
            assert_eq!(std::fs::read(saved).unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn it_should_derive_deterministic_filenames() {
        let a = item_filename(7, "same text", AudioFormat::Mp3);
        let b = item_filename(7, "same text", AudioFormat::Mp3);
        assert_eq!(a, b);
        assert!(a.starts_with("tts_007_"));
        assert!(a.ends_with(".mp3"));

        // Same content at a different position still gets a unique name.
        let c = item_filename(8, "same text", AudioFormat::Mp3);
        assert_ne!(a, c);
    }
}
