use serde::Serialize;
use uuid::Uuid;

/// Response body returned after a review was queued (or an event ignored).
#[derive(Debug, Serialize)]
pub struct ReviewQueuedResponse {
    /// Execution id to correlate logs and the published comment marker.
    /// Absent when the event was acknowledged but ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    /// Human-readable message describing what happened.
    pub message: String,
}
