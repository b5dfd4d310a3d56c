//! Automated code review pipeline for pull/merge requests.
//!
//! One [`Orchestrator::run`] call takes a normalized [`ReviewRequest`]
//! through the whole pipeline:
//!
//! 1) **Ingestion**
//!    - Validate the request identity
//!    - Resolve the unified diff (inline from the webhook, else fetched)
//!
//! 2) **Splitting**
//!    - Parse the diff into per-file patches and weigh them
//!    - Build the file reference graph, take connected components
//!    - Bin-pack components into chunks under a size cap
//!
//! 3) **Analysis**
//!    - Fan chunks out to the LLM under a concurrency bound
//!    - Per-attempt timeout, exponential backoff on transient failures
//!    - A chunk failure never crosses chunk boundaries
//!
//! 4) **Aggregation**
//!    - Deterministic merge: chunk seq order, exact-duplicate dedup
//!    - Completeness tracking and the rendered review body
//!
//! 5) **Publishing**
//!    - Create or update the single review comment per execution,
//!      keyed by a hidden marker (idempotent across redeliveries)
//!
//! 6) **Notification**
//!    - Fire-and-forget Slack summary, then the run lands in `Succeeded`
//!
//! A failure in any stage ends the run with one [`ErrorRecord`] and a
//! failure notification; chunk-level analysis failures are data and only
//! degrade review completeness.
//!
//! The pipeline uses `tracing` for stage logging and avoids `async-trait`
//! and heap trait objects (no `Box<dyn ...>`). Provider and LLM dispatch
//! are enum-based.

pub mod aggregate;
pub mod analyze;
pub mod config;
pub mod error_handler;
pub mod errors;
pub mod git_providers;
pub mod model;
pub mod notify;
pub mod parser; // unified diff parsing used by the splitter
pub mod publish;
pub mod split;
pub mod workflow;

pub use config::{NotifyConfig, OrchestratorConfig, PublishConfig, RetryPolicy};
pub use error_handler::{ErrorCategory, ErrorRecord};
pub use errors::{Error, PrResult};
pub use model::{
    AggregatedReview, Chunk, ChunkResult, Finding, ProviderKind, ReviewRequest, Severity,
};
pub use workflow::run::{Orchestrator, ReviewOutcome};
pub use workflow::{CancelFlag, ChunkTaskState, Stage, WorkflowExecution};
