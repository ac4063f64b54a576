use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use newslabel::config::LabelingConfig;
use newslabel::data::{CleanedRecord, ResolutionReason, ResolutionResult, ResolutionSource};
use newslabel::labeling::Category;
use newslabel::llm::{CommandBackend, GenerateOptions, ModelBackend};
use newslabel::{BackendError, LabelingEngine, ResolvedRecord};

const VALID: &str = r#"Here you go: {"category": "earnings", "label_severity": "3", "label_direction": "Positive",
    "label_time_horizon_1_min": 5, "label_time_horizon_2_min": 60, "confidence": 0.8, "needs_review": false}"#;

/// Answers every prompt with `VALID`, except prompts whose headline contains
/// `fail_on`, which get `failure`. Tracks concurrency.
struct ScriptedBackend {
    fail_on: Option<(&'static str, BackendError)>,
    reply: &'static str,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn new(reply: &'static str) -> Self {
        Self {
            fail_on: None,
            reply,
            delay: Duration::from_millis(5),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing(headline: &'static str, error: BackendError) -> Self {
        Self {
            fail_on: Some((headline, error)),
            ..Self::new(VALID)
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((headline, error)) = &self.fail_on {
            if prompt.contains(headline) {
                return Err(error.clone());
            }
        }
        Ok(self.reply.to_string())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn resolved(id: &str, headline: &str) -> ResolvedRecord {
    ResolvedRecord {
        record: CleanedRecord {
            event_id: id.to_string(),
            timestamp: "2025-01-02T14:30:00Z".to_string(),
            source: "wire".to_string(),
            headline_clean: headline.to_string(),
            text_clean: "Body text".to_string(),
            url: String::new(),
        },
        resolution: ResolutionResult::accepted(
            id,
            "EX".to_string(),
            0.9,
            ResolutionSource::Explicit,
            ResolutionReason::Cashtag,
        ),
    }
}

fn batch(n: usize) -> Vec<ResolvedRecord> {
    (0..n)
        .map(|i| resolved(&format!("evt-{:02}", i), &format!("Headline number {}", i)))
        .collect()
}

fn engine(backend: Arc<ScriptedBackend>, max_in_flight: usize) -> LabelingEngine {
    let config = LabelingConfig {
        max_in_flight,
        ..LabelingConfig::default()
    };
    LabelingEngine::new(backend, config, GenerateOptions::default())
}

#[tokio::test]
async fn test_batch_respects_in_flight_limit() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new(VALID));
    let results = engine(backend.clone(), 2).label_batch(batch(10), &HashSet::new()).await?;

    assert_eq!(results.len(), 10);
    assert!(results.windows(2).all(|w| w[0].event_id < w[1].event_id));
    assert!(results.iter().all(|r| r.category == Category::Earnings && !r.label_needs_review));
    assert!(backend.max_in_flight.load(Ordering::SeqCst) <= 2);
    Ok(())
}

#[tokio::test]
async fn test_garbage_output_always_terminates() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new("no idea, sorry"));
    let results = engine(backend.clone(), 3).label_batch(batch(4), &HashSet::new()).await?;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_placeholder() && r.label_needs_review));
    // default budget: one attempt plus two retries per record
    assert_eq!(backend.calls.load(Ordering::SeqCst), 12);
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_aborts_and_keeps_completed() {
    let backend = Arc::new(ScriptedBackend::failing(
        "Headline number 3",
        BackendError::Unavailable("connection refused".to_string()),
    ));
    let err = engine(backend.clone(), 1)
        .label_batch(batch(8), &HashSet::new())
        .await
        .unwrap_err();

    assert_eq!(err.cause, BackendError::Unavailable("connection refused".to_string()));
    assert!(err.completed.len() < 8);
    assert!(err.completed.iter().all(|r| r.event_id != "evt-03"));
    assert!(err.completed.iter().all(|r| !r.is_placeholder()));
    assert!(backend.calls.load(Ordering::SeqCst) < 8);
}

#[tokio::test]
async fn test_timeout_aborts_run() {
    let backend = Arc::new(ScriptedBackend::failing(
        "Headline number 0",
        BackendError::Timeout { timeout_seconds: 30 },
    ));
    let err = engine(backend, 2)
        .label_batch(batch(3), &HashSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err.cause, BackendError::Timeout { .. }));
}

#[tokio::test]
async fn test_failing_model_command_aborts_instead_of_placeholders() {
    // `ls` exits non-zero on the model flags after printing usage to stderr.
    let backend = Arc::new(CommandBackend::new("ls", "/nonexistent/model.gguf", 5));
    let err = LabelingEngine::new(backend, LabelingConfig::default(), GenerateOptions::default())
        .label_batch(batch(3), &HashSet::new())
        .await
        .unwrap_err();

    assert!(matches!(err.cause, BackendError::Unavailable(_)));
    assert!(err.completed.is_empty());
}

#[tokio::test]
async fn test_resume_skips_labeled_ids() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new(VALID));
    let done: HashSet<String> = ["evt-00", "evt-02"].iter().map(|s| s.to_string()).collect();

    let results = engine(backend.clone(), 2).label_batch(batch(4), &done).await?;
    let ids: Vec<&str> = results.iter().map(|r| r.event_id.as_str()).collect();
    assert_eq!(ids, vec!["evt-01", "evt-03"]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_engines_share_backend() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new(VALID));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let engine = engine(backend.clone(), 1);
            let records = vec![resolved(&format!("shard-{}", i), "Shard headline")];
            tokio::spawn(async move { engine.label_batch(records, &HashSet::new()).await })
        })
        .collect();

    for joined in futures::future::join_all(handles).await {
        let results = joined?.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        assert_eq!(results.len(), 1);
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    Ok(())
}
