use chrono::NaiveDate;

use super::value_objects::OrderForm;
use crate::domain::order::Employee;

// ============================================================================
// Submission Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum SubmissionCommand {
    Submit {
        owner: Employee,
        form: OrderForm,
        today: NaiveDate,
    },
    ConfirmReplacement,
    CancelConflict,
}
