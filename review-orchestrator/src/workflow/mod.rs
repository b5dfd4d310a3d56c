//! Workflow state machine for one review execution.
//!
//! Stages run strictly forward:
//!
//! Ingested -> Splitting -> Analyzing -> Aggregating -> Publishing ->
//! Notifying -> Succeeded
//!
//! `Failed` is reachable from any non-terminal stage. The only skip allowed
//! is Splitting -> Aggregating, for diffs that produce zero chunks.
//! Cancellation is cooperative: the flag is checked at stage boundaries,
//! in-flight chunk analyses always run to completion.

pub mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error_handler::ErrorRecord;
use crate::errors::{Error, PrResult};
use crate::model::ReviewRequest;

/// Lifecycle stage of one review execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingested,
    Splitting,
    Analyzing,
    Aggregating,
    Publishing,
    Notifying,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(self, next: Stage) -> bool {
        use Stage::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Ingested, Splitting)
                | (Splitting, Analyzing)
                | (Splitting, Aggregating)
                | (Analyzing, Aggregating)
                | (Aggregating, Publishing)
                | (Publishing, Notifying)
                | (Notifying, Succeeded)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ingested => "ingested",
            Stage::Splitting => "splitting",
            Stage::Analyzing => "analyzing",
            Stage::Aggregating => "aggregating",
            Stage::Publishing => "publishing",
            Stage::Notifying => "notifying",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal state of one dispatched chunk analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTaskState {
    pub seq: u32,
    pub ok: bool,
}

/// Tracked state of one review execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub request: ReviewRequest,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Terminal outcome of every chunk task dispatched in the Analyzing
    /// stage, in seq order. Empty until the join barrier closes.
    #[serde(default)]
    pub chunk_tasks: Vec<ChunkTaskState>,
    /// Set exactly when `stage` is `Failed`.
    #[serde(default)]
    pub error: Option<ErrorRecord>,
}

impl WorkflowExecution {
    pub fn new(request: ReviewRequest) -> Self {
        let now = Utc::now();
        Self {
            execution_id: request.execution_id(),
            request,
            stage: Stage::Ingested,
            started_at: now,
            updated_at: now,
            chunk_tasks: Vec::new(),
            error: None,
        }
    }

    /// Records the terminal state of every dispatched chunk task.
    pub fn record_chunk_tasks(&mut self, results: &[crate::model::ChunkResult]) {
        let mut tasks: Vec<ChunkTaskState> = results
            .iter()
            .map(|r| ChunkTaskState {
                seq: r.seq,
                ok: r.is_ok(),
            })
            .collect();
        tasks.sort_by_key(|t| t.seq);
        self.chunk_tasks = tasks;
        self.updated_at = Utc::now();
    }

    /// Moves to `next`, refusing illegal transitions.
    pub fn advance(&mut self, next: Stage) -> PrResult<()> {
        if !self.stage.can_transition(next) {
            return Err(Error::Validation(format!(
                "illegal stage transition {} -> {}",
                self.stage, next
            )));
        }
        self.stage = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal failure; legal from any non-terminal stage.
    pub fn fail(&mut self, record: ErrorRecord) {
        if !self.stage.is_terminal() {
            self.stage = Stage::Failed;
        }
        self.error = Some(record);
        self.updated_at = Utc::now();
    }
}

/// Cooperative cancellation flag, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderKind;

    fn request() -> ReviewRequest {
        ReviewRequest {
            provider: ProviderKind::GitHub,
            repository: "acme/widgets".into(),
            pr_number: 3,
            title: "Fix lints".into(),
            author: "dev".into(),
            source_branch: "fix/lints".into(),
            target_branch: "main".into(),
            head_sha: Some("abc".into()),
            pr_url: None,
            diff: None,
        }
    }

    #[test]
    fn happy_path_walks_all_stages() {
        let mut exec = WorkflowExecution::new(request());
        for next in [
            Stage::Splitting,
            Stage::Analyzing,
            Stage::Aggregating,
            Stage::Publishing,
            Stage::Notifying,
            Stage::Succeeded,
        ] {
            exec.advance(next).unwrap();
        }
        assert_eq!(exec.stage, Stage::Succeeded);
    }

    #[test]
    fn zero_chunk_runs_may_skip_analyzing() {
        let mut exec = WorkflowExecution::new(request());
        exec.advance(Stage::Splitting).unwrap();
        exec.advance(Stage::Aggregating).unwrap();
        assert_eq!(exec.stage, Stage::Aggregating);
    }

    #[test]
    fn backward_and_jump_transitions_are_refused() {
        let mut exec = WorkflowExecution::new(request());
        exec.advance(Stage::Splitting).unwrap();
        assert!(exec.advance(Stage::Ingested).is_err());
        assert!(exec.advance(Stage::Publishing).is_err());
        assert_eq!(exec.stage, Stage::Splitting);
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_stage() {
        for stage in [
            Stage::Ingested,
            Stage::Splitting,
            Stage::Analyzing,
            Stage::Aggregating,
            Stage::Publishing,
            Stage::Notifying,
        ] {
            assert!(stage.can_transition(Stage::Failed), "{stage}");
        }
        assert!(!Stage::Succeeded.can_transition(Stage::Failed));
        assert!(!Stage::Failed.can_transition(Stage::Failed));
    }

    #[test]
    fn terminal_stages_advance_nowhere() {
        for stage in [Stage::Succeeded, Stage::Failed] {
            for next in [Stage::Ingested, Stage::Splitting, Stage::Succeeded] {
                assert!(!stage.can_transition(next));
            }
        }
    }

    #[test]
    fn chunk_task_states_are_recorded_in_seq_order() {
        use crate::model::{ChunkFailure, ChunkFailureKind, ChunkResult};

        let mut exec = WorkflowExecution::new(request());
        exec.record_chunk_tasks(&[
            ChunkResult::failed(
                2,
                ChunkFailure {
                    kind: ChunkFailureKind::Timeout,
                    message: "stage timeout".into(),
                    attempts: 0,
                },
            ),
            ChunkResult::ok(0, Vec::new()),
            ChunkResult::ok(1, Vec::new()),
        ]);

        assert_eq!(
            exec.chunk_tasks,
            vec![
                ChunkTaskState { seq: 0, ok: true },
                ChunkTaskState { seq: 1, ok: true },
                ChunkTaskState { seq: 2, ok: false },
            ]
        );
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
