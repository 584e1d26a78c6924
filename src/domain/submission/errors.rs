use uuid::Uuid;

use super::value_objects::SubmissionState;
use crate::domain::order::{MealSlot, ScheduleError};

// ============================================================================
// Submission Errors
// ============================================================================

/// Local, pre-submit form rules. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Ingrese fechas válidas.")]
    MissingDates,

    #[error("La fecha de salida no puede ser anterior a la de ingreso.")]
    EndBeforeStart,

    #[error("La fecha de ingreso debe ser desde hoy en adelante.")]
    StartInPast,

    #[error("Debe seleccionar al menos una comida.")]
    NoMealSelected,

    #[error("Seleccione lugar de entrega para {}.", .0.noun())]
    MissingLocation(MealSlot),
}

impl ValidationError {
    /// Stable rule name for metrics and logs
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::MissingDates => "missing_dates",
            ValidationError::EndBeforeStart => "end_before_start",
            ValidationError::StartInPast => "start_in_past",
            ValidationError::NoMealSelected => "no_meal_selected",
            ValidationError::MissingLocation(_) => "missing_location",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("A submission is already in progress")]
    Busy,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No conflict is awaiting confirmation")]
    NoPendingConflict,

    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SubmissionState,
    },

    #[error("Outcome for attempt {got} does not match the attempt in flight ({expected:?})")]
    StaleOutcome { expected: Option<Uuid>, got: Uuid },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
