use chrono::NaiveDate;
use uuid::Uuid;

use super::commands::SubmissionCommand;
use super::errors::{SubmissionError, ValidationError};
use super::events::*;
use super::value_objects::{
    ConflictPrompt, MealChoice, NewOrderRequest, OrderForm, SlotChoices, SubmissionState,
};
use crate::domain::order::{ConflictSummary, DateRange, MealSlot};

// ============================================================================
// Submission Flow - State machine for one employee's submit cycle
// ============================================================================
//
// Idle → Submitting → {Succeeded | ConflictPending | Failed}
// ConflictPending → Replacing → {Succeeded | Failed}
// ConflictPending → Idle (cancelled)
//
// Commands are validated against the current state and turned into events;
// backend outcomes are recorded as events tagged with the attempt's
// correlation id, so an outcome can only land on the attempt that produced it.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubmissionFlow {
    state: SubmissionState,
    in_flight: Option<Uuid>,
    pending: Option<NewOrderRequest>,
    requested_dates: Vec<NaiveDate>,
    conflicts: Vec<ConflictSummary>,
    last_error: Option<String>,
}

impl Default for SubmissionFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionFlow {
    pub fn new() -> Self {
        Self {
            state: SubmissionState::Idle,
            in_flight: None,
            pending: None,
            requested_dates: Vec::new(),
            conflicts: Vec::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn in_flight(&self) -> Option<Uuid> {
        self.in_flight
    }

    /// The request shown to the user; resent unchanged on confirmation
    pub fn pending_request(&self) -> Option<&NewOrderRequest> {
        self.pending.as_ref()
    }

    pub fn requested_dates(&self) -> &[NaiveDate] {
        &self.requested_dates
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn conflict_prompt(&self) -> Option<ConflictPrompt> {
        (self.state == SubmissionState::ConflictPending).then(|| ConflictPrompt {
            conflicts: self.conflicts.clone(),
            requested_dates: self.requested_dates.clone(),
        })
    }

    /// Form rules, checked in order; the first failure wins
    pub fn validate_form(
        form: &OrderForm,
        today: NaiveDate,
    ) -> Result<(DateRange, SlotChoices), ValidationError> {
        let (start, end) = match (form.start, form.end) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(ValidationError::MissingDates),
        };
        if start > end {
            return Err(ValidationError::EndBeforeStart);
        }
        if start < today {
            return Err(ValidationError::StartInPast);
        }

        if MealSlot::ALL
            .iter()
            .all(|slot| form.field(*slot).meal_type.is_none())
        {
            return Err(ValidationError::NoMealSelected);
        }

        let mut choices = SlotChoices::default();
        for slot in MealSlot::ALL {
            let field = form.field(slot);
            // A location without a meal is dropped
            let Some(meal_type_id) = field.meal_type else {
                continue;
            };
            let location_id = field.location.ok_or(ValidationError::MissingLocation(slot))?;
            choices.set(slot, Some(MealChoice { meal_type_id, location_id }));
        }

        let range = DateRange::new(start, end).map_err(|_| ValidationError::EndBeforeStart)?;
        Ok((range, choices))
    }

    pub fn handle_command(
        &self,
        command: &SubmissionCommand,
    ) -> Result<Vec<SubmissionEvent>, SubmissionError> {
        match command {
            SubmissionCommand::Submit { owner, form, today } => {
                if self.state.is_busy() {
                    return Err(SubmissionError::Busy);
                }
                if self.state == SubmissionState::ConflictPending {
                    return Err(SubmissionError::InvalidTransition {
                        action: "submit",
                        state: self.state,
                    });
                }

                let (range, meals) = Self::validate_form(form, *today)?;
                let dates = crate::domain::order::expand(range.start(), range.end())?;

                Ok(vec![SubmissionEvent::Started(SubmissionStarted {
                    correlation_id: Uuid::new_v4(),
                    request: NewOrderRequest {
                        owner: owner.clone(),
                        range,
                        meals,
                    },
                    dates,
                })])
            }

            SubmissionCommand::ConfirmReplacement => match self.state {
                SubmissionState::ConflictPending if self.pending.is_some() => {
                    Ok(vec![SubmissionEvent::ReplacementStarted(ReplacementStarted {
                        correlation_id: Uuid::new_v4(),
                    })])
                }
                state if state.is_busy() => Err(SubmissionError::Busy),
                _ => Err(SubmissionError::NoPendingConflict),
            },

            SubmissionCommand::CancelConflict => match self.state {
                SubmissionState::ConflictPending => Ok(vec![SubmissionEvent::ConflictDismissed]),
                _ => Err(SubmissionError::NoPendingConflict),
            },
        }
    }

    /// Reject outcomes that do not belong to the attempt in flight
    fn expect_attempt(&self, state: SubmissionState, id: Uuid) -> Result<(), SubmissionError> {
        if self.state != state || self.in_flight != Some(id) {
            return Err(SubmissionError::StaleOutcome {
                expected: self.in_flight,
                got: id,
            });
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.in_flight = None;
        self.pending = None;
        self.requested_dates.clear();
        self.conflicts.clear();
    }

    pub fn apply_event(&mut self, event: &SubmissionEvent) -> Result<(), SubmissionError> {
        match event {
            SubmissionEvent::Started(e) => {
                if self.state.is_busy() {
                    return Err(SubmissionError::Busy);
                }
                self.clear();
                self.state = SubmissionState::Submitting;
                self.in_flight = Some(e.correlation_id);
                self.pending = Some(e.request.clone());
                self.requested_dates = e.dates.clone();
                self.last_error = None;
            }
            SubmissionEvent::Registered(e) => {
                self.expect_attempt(SubmissionState::Submitting, e.correlation_id)?;
                self.clear();
                self.state = SubmissionState::Succeeded;
            }
            SubmissionEvent::ConflictDetected(e) => {
                self.expect_attempt(SubmissionState::Submitting, e.correlation_id)?;
                self.in_flight = None;
                self.conflicts = e.conflicts.clone();
                self.state = SubmissionState::ConflictPending;
            }
            SubmissionEvent::SubmissionFailed(e) => {
                self.expect_attempt(SubmissionState::Submitting, e.correlation_id)?;
                self.clear();
                self.last_error = Some(e.reason.clone());
                self.state = SubmissionState::Failed;
            }
            SubmissionEvent::ReplacementStarted(e) => {
                if self.state != SubmissionState::ConflictPending || self.pending.is_none() {
                    return Err(SubmissionError::NoPendingConflict);
                }
                self.in_flight = Some(e.correlation_id);
                self.state = SubmissionState::Replacing;
            }
            SubmissionEvent::Replaced(e) => {
                self.expect_attempt(SubmissionState::Replacing, e.correlation_id)?;
                self.clear();
                self.state = SubmissionState::Succeeded;
            }
            SubmissionEvent::ReplacementFailed(e) => {
                self.expect_attempt(SubmissionState::Replacing, e.correlation_id)?;
                self.clear();
                self.last_error = Some(e.reason.clone());
                self.state = SubmissionState::Failed;
            }
            SubmissionEvent::ConflictDismissed => {
                if self.state != SubmissionState::ConflictPending {
                    return Err(SubmissionError::NoPendingConflict);
                }
                self.clear();
                self.state = SubmissionState::Idle;
            }
        }
        Ok(())
    }

    /// Handle a command and apply the resulting events
    pub fn execute(
        &mut self,
        command: &SubmissionCommand,
    ) -> Result<Vec<SubmissionEvent>, SubmissionError> {
        let events = self.handle_command(command)?;
        for event in &events {
            self.apply_event(event)?;
        }
        Ok(events)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
