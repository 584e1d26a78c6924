// ============================================================================
// Submission Domain - Register or replace a range of daily orders
// ============================================================================
//
// - Value objects (OrderForm, NewOrderRequest, SubmissionState, ...)
// - Commands and events of one submit cycle
// - Errors (ValidationError, SubmissionError)
// - SubmissionFlow state machine
// - SubmissionHandler driving the order backend
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod events;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use commands::*;
pub use events::*;
pub use errors::*;
pub use aggregate::SubmissionFlow;
pub use command_handler::{ReplaceOutcome, SubmissionHandler, SubmitOutcome};
