use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::value_objects::NewOrderRequest;
use crate::domain::order::ConflictSummary;

// ============================================================================
// Submission Events - What happened during one submit cycle
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SubmissionEvent {
    Started(SubmissionStarted),
    Registered(AttemptSucceeded),
    ConflictDetected(ConflictDetected),
    SubmissionFailed(AttemptFailed),
    ReplacementStarted(ReplacementStarted),
    Replaced(AttemptSucceeded),
    ReplacementFailed(AttemptFailed),
    ConflictDismissed,
}

impl SubmissionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SubmissionEvent::Started(_) => "SubmissionStarted",
            SubmissionEvent::Registered(_) => "OrdersRegistered",
            SubmissionEvent::ConflictDetected(_) => "ConflictDetected",
            SubmissionEvent::SubmissionFailed(_) => "SubmissionFailed",
            SubmissionEvent::ReplacementStarted(_) => "ReplacementStarted",
            SubmissionEvent::Replaced(_) => "OrdersReplaced",
            SubmissionEvent::ReplacementFailed(_) => "ReplacementFailed",
            SubmissionEvent::ConflictDismissed => "ConflictDismissed",
        }
    }
}

/// Validation passed and the request payload is frozen
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionStarted {
    pub correlation_id: Uuid,
    pub request: NewOrderRequest,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSucceeded {
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptFailed {
    pub correlation_id: Uuid,
    pub reason: String,
}

/// Existing orders overlap the requested range
#[derive(Debug, Clone, Serialize)]
pub struct ConflictDetected {
    pub correlation_id: Uuid,
    pub conflicts: Vec<ConflictSummary>,
}

/// User confirmed; the pending request is being resent as a replacement
#[derive(Debug, Clone, Serialize)]
pub struct ReplacementStarted {
    pub correlation_id: Uuid,
}
