// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order: daily orders, date ranges, conflict detection and summaries
// - catalog: meal types and delivery locations
// - submission: the register / confirm-replacement cycle
//
// Nothing here performs IO except the submission handler, which talks to
// the backend through the traits in `crate::backend`.
//
// ============================================================================

pub mod order;
pub mod catalog;
pub mod submission;
