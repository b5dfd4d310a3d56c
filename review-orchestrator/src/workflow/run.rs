//! End-to-end execution driver.
//!
//! One [`Orchestrator`] serves many executions; per-run state lives in a
//! [`WorkflowExecution`]. A run walks the stages in order:
//!
//! 1. Ingest the request (validate, resolve the diff).
//! 2. Split the diff into chunks.
//! 3. Analyze chunks in parallel under a concurrency bound.
//! 4. Aggregate chunk results into one review.
//! 5. Publish the review comment (idempotent per execution).
//! 6. Notify Slack, then mark the run `Succeeded`.
//!
//! Any error inside a stage ends the run: it is classified into an
//! [`ErrorRecord`], a failure notification goes out and the execution lands
//! in `Failed`. Cancellation is honored at stage boundaries only; work
//! already in flight runs to completion.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ai_llm_service::LlmService;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::aggregate::aggregate_results;
use crate::analyze::analyze_chunk;
use crate::config::{OrchestratorConfig, PublishConfig};
use crate::error_handler::ErrorRecord;
use crate::errors::{Error, PrResult};
use crate::git_providers::{PrId, ProviderClient};
use crate::model::{
    AggregatedReview, Chunk, ChunkFailure, ChunkFailureKind, ChunkOutcome, ChunkResult,
    ReviewRequest,
};
use crate::notify::SlackNotifier;
use crate::publish::{PublishedReview, publish_review};
use crate::split::split_diff;
use crate::workflow::{CancelFlag, Stage, WorkflowExecution};

/// Long-lived pipeline driver: shared LLM client, config and notifier.
pub struct Orchestrator {
    pub config: OrchestratorConfig,
    pub publish: PublishConfig,
    pub llm: Arc<LlmService>,
    pub notifier: SlackNotifier,
}

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct ReviewOutcome {
    pub execution: WorkflowExecution,
    /// Aggregated review; `Some` only for runs that reached `Succeeded`.
    pub review: Option<AggregatedReview>,
    /// Publishing receipt; `Some` only for runs that reached `Succeeded`.
    pub published: Option<PublishedReview>,
}

impl ReviewOutcome {
    pub fn succeeded(&self) -> bool {
        self.execution.stage == Stage::Succeeded
    }
}

impl Orchestrator {
    /// Builds the full driver from environment configuration.
    pub fn from_env() -> PrResult<Self> {
        let llm = LlmService::from_env().map_err(|e| Error::Other(format!("llm config: {e}")))?;
        Ok(Self {
            config: OrchestratorConfig::from_env(),
            publish: PublishConfig::default(),
            llm: Arc::new(llm),
            notifier: SlackNotifier::from_env(),
        })
    }

    /// Validates the request and opens a fresh execution for it.
    ///
    /// The only immediate failure is malformed input; everything past this
    /// point is reported through the execution's own terminal state.
    pub fn start(&self, request: ReviewRequest) -> PrResult<WorkflowExecution> {
        request.validate()?;
        Ok(WorkflowExecution::new(request))
    }

    /// Runs one review execution start to finish.
    ///
    /// Never returns an error: terminal failures are folded into the
    /// returned [`ReviewOutcome`] as a `Failed` execution with its
    /// [`ErrorRecord`] attached.
    pub async fn run(&self, request: ReviewRequest, cancel: CancelFlag) -> ReviewOutcome {
        self.run_execution(WorkflowExecution::new(request), cancel)
            .await
    }

    /// [`Orchestrator::run`] over a pre-built execution, for callers that
    /// hand out the execution id before the pipeline finishes.
    pub async fn run_execution(
        &self,
        mut execution: WorkflowExecution,
        cancel: CancelFlag,
    ) -> ReviewOutcome {
        let t0 = Instant::now();
        info!(
            "stage1: execution {} ingested for {} {}#{}",
            execution.execution_id,
            execution.request.provider,
            execution.request.repository,
            execution.request.pr_number
        );

        match self.drive(&mut execution, &cancel, t0).await {
            Ok((review, published)) => {
                info!(
                    "execution {} succeeded elapsed_ms={}",
                    execution.execution_id,
                    t0.elapsed().as_millis()
                );
                ReviewOutcome {
                    execution,
                    review: Some(review),
                    published: Some(published),
                }
            }
            Err(err) => {
                let record = ErrorRecord::from_error(
                    execution.execution_id,
                    &execution.request,
                    execution.stage,
                    &err,
                );
                error!(
                    "execution {} failed at stage {}: {} (category {}, retriable {})",
                    execution.execution_id, execution.stage, err, record.category, record.retriable
                );
                self.notifier.notify_failure(&record).await;
                execution.fail(record);
                ReviewOutcome {
                    execution,
                    review: None,
                    published: None,
                }
            }
        }
    }

    async fn drive(
        &self,
        execution: &mut WorkflowExecution,
        cancel: &CancelFlag,
        t0: Instant,
    ) -> PrResult<(AggregatedReview, PublishedReview)> {
        ensure_live(cancel)?;
        execution.request.validate()?;

        // The provider client is built on first contact: a run with an
        // inline diff that never writes a comment needs no token at all.
        let mut provider: Option<ProviderClient> = None;
        let id = PrId::new(execution.request.repository.clone(), execution.request.pr_number);

        let diff = match execution
            .request
            .diff
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            Some(inline) => inline.to_string(),
            None => {
                info!("stage1: fetching diff from provider");
                let client =
                    provider.insert(ProviderClient::from_env(execution.request.provider)?);
                client.fetch_diff(&id).await?
            }
        };

        ensure_live(cancel)?;
        execution.advance(Stage::Splitting)?;
        let split = split_diff(&diff, &self.config);
        let chunks = split.chunks;

        let results = if chunks.is_empty() {
            info!("stage3: no chunks, skipping analysis");
            Vec::new()
        } else {
            ensure_live(cancel)?;
            execution.advance(Stage::Analyzing)?;
            let llm = Arc::clone(&self.llm);
            let policy = self.config.retry.clone();
            let threshold = self.config.primary_weight_threshold;
            run_analysis_stage(
                &chunks,
                self.config.max_concurrent_analyses,
                self.config.stage_timeout,
                move |chunk| {
                    let llm = Arc::clone(&llm);
                    let policy = policy.clone();
                    async move { analyze_chunk(&llm, &chunk, &policy, threshold).await }
                },
            )
            .await
        };

        execution.record_chunk_tasks(&results);
        for result in &results {
            if let ChunkOutcome::Failed { failure } = &result.outcome {
                let record = ErrorRecord::from_chunk_failure(
                    execution.execution_id,
                    &execution.request,
                    result.seq,
                    failure,
                );
                warn!(
                    "stage3: chunk {} failed: {} (category {}, retriable {})",
                    result.seq, record.message, record.category, record.retriable
                );
            }
        }

        ensure_live(cancel)?;
        execution.advance(Stage::Aggregating)?;
        let review = aggregate_results(&execution.request, execution.execution_id, &chunks, results);

        ensure_live(cancel)?;
        execution.advance(Stage::Publishing)?;
        if self.publish.requires_provider() && provider.is_none() {
            provider = Some(ProviderClient::from_env(execution.request.provider)?);
        }
        let published = publish_review(provider.as_ref(), &id, &review, &self.publish).await?;

        // Past a successful publish the run always completes; the external
        // side effect exists, cancellation can no longer undo it.
        execution.advance(Stage::Notifying)?;
        self.notifier
            .notify_success(&execution.request, &review, t0.elapsed())
            .await;

        execution.advance(Stage::Succeeded)?;
        Ok((review, published))
    }
}

/// Analyzes every chunk in parallel and joins all results.
///
/// `max_concurrent` bounds in-flight analyses via a semaphore. The whole
/// stage races `stage_timeout`: on expiry, still-pending chunks are recorded
/// as failed with kind `Timeout` while their tasks are detached, not
/// aborted, so permits drain naturally and no attempt is cut mid-request.
/// Exactly one [`ChunkResult`] per input chunk comes back, in no particular
/// order.
pub async fn run_analysis_stage<F, Fut>(
    chunks: &[Chunk],
    max_concurrent: usize,
    stage_timeout: Duration,
    analyze: F,
) -> Vec<ChunkResult>
where
    F: Fn(Chunk) -> Fut,
    Fut: Future<Output = ChunkResult> + Send + 'static,
{
    let t0 = Instant::now();
    info!(
        "stage3: analyzing {} chunk(s), concurrency {}",
        chunks.len(),
        max_concurrent.max(1)
    );

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut join_set = JoinSet::new();
    for chunk in chunks.iter().cloned() {
        let fut = analyze(chunk);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            // The semaphore lives for the whole stage and is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            fut.await
        });
    }

    let mut results: Vec<ChunkResult> = Vec::with_capacity(chunks.len());
    let timed_out = timeout(stage_timeout, async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("stage3: analysis task failed to join: {e}"),
            }
        }
    })
    .await
    .is_err();

    if timed_out {
        warn!(
            "stage3: stage timeout after {} ms, {} chunk(s) still pending",
            stage_timeout.as_millis(),
            chunks.len() - results.len()
        );
        join_set.detach_all();
    }

    // Fill the gaps so the join barrier always yields one result per chunk.
    // Gaps exist after a stage timeout or when a task panicked.
    if results.len() < chunks.len() {
        let done: HashSet<u32> = results.iter().map(|r| r.seq).collect();
        for chunk in chunks {
            if !done.contains(&chunk.seq) {
                let failure = if timed_out {
                    ChunkFailure {
                        kind: ChunkFailureKind::Timeout,
                        message: format!(
                            "analysis stage timeout after {} ms",
                            stage_timeout.as_millis()
                        ),
                        attempts: 0,
                    }
                } else {
                    ChunkFailure {
                        kind: ChunkFailureKind::Invalid,
                        message: "analysis task aborted".to_string(),
                        attempts: 0,
                    }
                };
                results.push(ChunkResult::failed(chunk.seq, failure));
            }
        }
    }

    let ok = results.iter().filter(|r| r.is_ok()).count();
    info!(
        "stage3: analysis done ok={} failed={} elapsed_ms={}",
        ok,
        results.len() - ok,
        t0.elapsed().as_millis()
    );
    results
}

fn ensure_live(cancel: &CancelFlag) -> PrResult<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
