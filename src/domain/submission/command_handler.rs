use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::aggregate::SubmissionFlow;
use super::commands::SubmissionCommand;
use super::errors::{SubmissionError, ValidationError};
use super::events::*;
use super::value_objects::{ConflictCheck, ConflictPrompt, NewOrderRequest, OrderForm, SubmissionState};
use crate::backend::{BackendError, OrderBackend, RegistrationOutcome};
use crate::domain::order::{detect_conflicts, summarize, summarize_reported, ConflictSummary, Employee, Order};
use crate::metrics::Metrics;

// ============================================================================
// Submission Command Handler
// ============================================================================
//
// Orchestrates: Command → SubmissionFlow → Events → Backend → Outcome event
//
// The flow lock is never held across a backend call. Outcomes are applied
// with the correlation id of the attempt that produced them, so a late
// answer cannot overwrite a newer attempt.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Registered,
    /// Existing orders overlap; waiting for the user to confirm or cancel
    Conflict(ConflictPrompt),
    /// A form rule failed; nothing was sent
    Rejected(ValidationError),
    Failed(String),
    /// Another request is outstanding or a conflict is awaiting an answer
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    Failed(String),
    Ignored,
}

pub struct SubmissionHandler<B: OrderBackend + ?Sized> {
    backend: Arc<B>,
    flow: Mutex<SubmissionFlow>,
    conflict_check: ConflictCheck,
    metrics: Option<Arc<Metrics>>,
}

impl<B: OrderBackend + ?Sized> SubmissionHandler<B> {
    pub fn new(backend: Arc<B>, conflict_check: ConflictCheck) -> Self {
        Self {
            backend,
            flow: Mutex::new(SubmissionFlow::new()),
            conflict_check,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn flow(&self) -> MutexGuard<'_, SubmissionFlow> {
        self.flow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SubmissionState {
        self.flow().state()
    }

    pub fn conflict_prompt(&self) -> Option<ConflictPrompt> {
        self.flow().conflict_prompt()
    }

    pub fn last_error(&self) -> Option<String> {
        self.flow().last_error().map(str::to_string)
    }

    /// Validate the form and try to register it.
    ///
    /// `history` is the owner's loaded order history, used to correlate
    /// backend-reported conflicts with known orders.
    pub async fn submit(
        &self,
        owner: &Employee,
        form: &OrderForm,
        today: NaiveDate,
        history: &[Order],
    ) -> SubmitOutcome {
        let command = SubmissionCommand::Submit {
            owner: owner.clone(),
            form: form.clone(),
            today,
        };

        let started = match self.flow().execute(&command) {
            Ok(events) => events.into_iter().find_map(|event| match event {
                SubmissionEvent::Started(started) => Some(started),
                _ => None,
            }),
            Err(SubmissionError::Validation(e)) => {
                tracing::info!(worker_id = owner.worker_id, rule = e.rule(), "Order form rejected");
                if let Some(metrics) = &self.metrics {
                    metrics.record_validation_failure(e.rule());
                    metrics.record_submission("rejected");
                }
                return SubmitOutcome::Rejected(e);
            }
            Err(e @ (SubmissionError::Busy | SubmissionError::InvalidTransition { .. })) => {
                tracing::debug!(worker_id = owner.worker_id, reason = %e, "Submit ignored");
                return SubmitOutcome::Ignored;
            }
            Err(e) => {
                tracing::error!(worker_id = owner.worker_id, error = %e, "Submit could not start");
                return SubmitOutcome::Failed(e.to_string());
            }
        };
        let Some(started) = started else {
            return SubmitOutcome::Ignored;
        };

        let correlation_id = started.correlation_id;
        tracing::info!(
            %correlation_id,
            worker_id = owner.worker_id,
            start = %started.request.range.start(),
            end = %started.request.range.end(),
            days = started.dates.len(),
            "Submitting order"
        );

        let (event, outcome) = match self.attempt(&started, history).await {
            Ok(None) => (
                SubmissionEvent::Registered(AttemptSucceeded { correlation_id }),
                SubmitOutcome::Registered,
            ),
            Ok(Some(conflicts)) => {
                let prompt = ConflictPrompt {
                    conflicts: conflicts.clone(),
                    requested_dates: started.dates.clone(),
                };
                (
                    SubmissionEvent::ConflictDetected(ConflictDetected { correlation_id, conflicts }),
                    SubmitOutcome::Conflict(prompt),
                )
            }
            Err(e) => {
                let reason = e.to_string();
                (
                    SubmissionEvent::SubmissionFailed(AttemptFailed {
                        correlation_id,
                        reason: reason.clone(),
                    }),
                    SubmitOutcome::Failed(reason),
                )
            }
        };

        if !self.record(correlation_id, &event) {
            return SubmitOutcome::Ignored;
        }

        let label = match &outcome {
            SubmitOutcome::Registered => "registered",
            SubmitOutcome::Conflict(prompt) => {
                tracing::info!(%correlation_id, conflicts = prompt.conflicts.len(), "Conflict awaiting confirmation");
                if let Some(metrics) = &self.metrics {
                    metrics.record_conflict();
                }
                "conflict"
            }
            _ => "failed",
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_submission(label);
        }
        outcome
    }

    /// Backend round trip for one attempt: `None` when registered
    async fn attempt(
        &self,
        started: &SubmissionStarted,
        history: &[Order],
    ) -> Result<Option<Vec<ConflictSummary>>, BackendError> {
        let request = &started.request;
        let dni = &request.owner.dni;

        let fetched;
        let known: &[Order] = match self.conflict_check {
            ConflictCheck::Server => history,
            ConflictCheck::Local => {
                fetched = self.backend.list_orders(&request.owner).await?;
                let dates: BTreeSet<NaiveDate> = started.dates.iter().copied().collect();
                let local = detect_conflicts(&dates, dni, &fetched);
                if !local.is_empty() {
                    return Ok(Some(local.into_iter().map(summarize).collect()));
                }
                &fetched
            }
        };

        match self.backend.register(request).await? {
            RegistrationOutcome::Registered => Ok(None),
            RegistrationOutcome::Conflict(reported) => Ok(Some(
                reported
                    .iter()
                    .map(|conflict| summarize_reported(conflict, dni, known))
                    .collect(),
            )),
        }
    }

    /// Apply an outcome event; false when it belongs to a stale attempt
    fn record(&self, correlation_id: Uuid, event: &SubmissionEvent) -> bool {
        match self.flow().apply_event(event) {
            Ok(()) => {
                tracing::debug!(%correlation_id, event = event.event_type(), "Submission event applied");
                true
            }
            Err(e) => {
                tracing::warn!(%correlation_id, event = event.event_type(), error = %e, "Dropping stale outcome");
                false
            }
        }
    }

    /// Resend the exact request the user was shown as a replacement
    pub async fn confirm_replacement(&self) -> ReplaceOutcome {
        let (correlation_id, request) = {
            let mut flow = self.flow();
            let correlation_id = match flow.execute(&SubmissionCommand::ConfirmReplacement) {
                Ok(events) => events.into_iter().find_map(|event| match event {
                    SubmissionEvent::ReplacementStarted(e) => Some(e.correlation_id),
                    _ => None,
                }),
                Err(e) => {
                    tracing::debug!(reason = %e, "Replacement ignored");
                    return ReplaceOutcome::Ignored;
                }
            };
            let request: Option<NewOrderRequest> = flow.pending_request().cloned();
            match (correlation_id, request) {
                (Some(id), Some(request)) => (id, request),
                _ => return ReplaceOutcome::Ignored,
            }
        };

        tracing::info!(%correlation_id, worker_id = request.owner.worker_id, "Replacing conflicting orders");

        let (event, outcome) = match self.backend.replace(request.owner.worker_id, &request).await {
            Ok(()) => (
                SubmissionEvent::Replaced(AttemptSucceeded { correlation_id }),
                ReplaceOutcome::Replaced,
            ),
            Err(e) => {
                let reason = e.to_string();
                (
                    SubmissionEvent::ReplacementFailed(AttemptFailed {
                        correlation_id,
                        reason: reason.clone(),
                    }),
                    ReplaceOutcome::Failed(reason),
                )
            }
        };

        if !self.record(correlation_id, &event) {
            return ReplaceOutcome::Ignored;
        }
        if let Some(metrics) = &self.metrics {
            let label = if outcome == ReplaceOutcome::Replaced { "replaced" } else { "failed" };
            metrics.record_replacement(label);
        }
        outcome
    }

    /// Close the conflict prompt without touching the backend
    pub fn cancel_conflict(&self) -> bool {
        match self.flow().execute(&SubmissionCommand::CancelConflict) {
            Ok(_) => {
                tracing::info!("Conflict dismissed, nothing was replaced");
                true
            }
            Err(e) => {
                tracing::debug!(reason = %e, "Nothing to cancel");
                false
            }
        }
    }
}
