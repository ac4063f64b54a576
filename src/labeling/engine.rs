//! Bounded-concurrency labeling over a batch of resolved records

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::machine::{LabelMachine, RetryPolicy, Step};
use super::prompts::build_prompt;
use super::schema::LabelResult;
use crate::config::LabelingConfig;
use crate::data::ResolvedRecord;
use crate::errors::{BackendError, LabelingAborted};
use crate::llm::{GenerateOptions, ModelBackend};

enum TaskOutcome {
    Labeled(LabelResult),
    Skipped,
    Failed(BackendError),
}

#[derive(Clone)]
pub struct LabelingEngine {
    backend: Arc<dyn ModelBackend>,
    config: LabelingConfig,
    options: GenerateOptions,
}

impl LabelingEngine {
    pub fn new(backend: Arc<dyn ModelBackend>, config: LabelingConfig, options: GenerateOptions) -> Self {
        Self {
            backend,
            config,
            options,
        }
    }

    /// Label one record, retrying bad output up to the configured budget.
    /// Only backend failures escape; bad output degrades to a placeholder.
    pub async fn label_record(&self, resolved: &ResolvedRecord) -> Result<LabelResult, BackendError> {
        label_record(self.backend.as_ref(), resolved, &self.config, &self.options).await
    }

    /// Label every record not already in `already_labeled`. Results are
    /// sorted by `event_id`. The first backend failure stops the run; work
    /// finished before it is returned inside the error.
    pub async fn label_batch(
        &self,
        records: Vec<ResolvedRecord>,
        already_labeled: &HashSet<String>,
    ) -> Result<Vec<LabelResult>, LabelingAborted> {
        let (pending, skipped) = pending_records(records, already_labeled);

        info!(
            backend = self.backend.name(),
            pending = pending.len(),
            skipped,
            max_in_flight = self.config.max_in_flight,
            "Starting labeling batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for resolved in pending {
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let engine = self.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Skipped;
                };
                if abort.load(Ordering::SeqCst) {
                    return TaskOutcome::Skipped;
                }
                match engine.label_record(&resolved).await {
                    Ok(result) => TaskOutcome::Labeled(result),
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        TaskOutcome::Failed(e)
                    }
                }
            });
        }

        let mut completed = Vec::new();
        let mut failure: Option<BackendError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Labeled(result)) => completed.push(result),
                Ok(TaskOutcome::Skipped) => {}
                Ok(TaskOutcome::Failed(e)) => {
                    if failure.is_none() {
                        error!(error = %e, completed = completed.len(), "Model backend failed, aborting labeling");
                        abort.store(true, Ordering::SeqCst);
                        tasks.abort_all();
                        failure = Some(e);
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Labeling task panicked"),
            }
        }

        completed.sort_by(|a, b| a.event_id.cmp(&b.event_id));

        match failure {
            Some(cause) => Err(LabelingAborted { cause, completed }),
            None => {
                let needs_review = completed.iter().filter(|r| r.label_needs_review).count();
                info!(
                    labeled = completed.len(),
                    needs_review,
                    "Labeling batch complete"
                );
                Ok(completed)
            }
        }
    }
}

/// Drop records already labeled and repeated event ids, keeping first
/// occurrences. The count is the number of records dropped as labeled.
fn pending_records(
    records: Vec<ResolvedRecord>,
    already_labeled: &HashSet<String>,
) -> (Vec<ResolvedRecord>, usize) {
    let mut seen = HashSet::new();
    let mut skipped = 0;
    let mut pending = Vec::with_capacity(records.len());
    for record in records {
        if already_labeled.contains(&record.record.event_id) {
            skipped += 1;
        } else if seen.insert(record.record.event_id.clone()) {
            pending.push(record);
        }
    }
    (pending, skipped)
}

async fn label_record(
    backend: &dyn ModelBackend,
    resolved: &ResolvedRecord,
    config: &LabelingConfig,
    options: &GenerateOptions,
) -> Result<LabelResult, BackendError> {
    let prompt = build_prompt(resolved, config.excerpt_chars);
    let mut machine = LabelMachine::new(
        &resolved.record.event_id,
        prompt,
        RetryPolicy::new(config.max_retries),
        config.confidence_floor,
    );

    loop {
        let raw = backend.generate(machine.invoke(), options).await?;
        if let Step::Done(result) = machine.accept_output(&raw) {
            return Ok(result);
        }
    }
}
