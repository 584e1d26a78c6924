// ============================================================================
// Order Domain - Daily Meal Orders
// ============================================================================
//
// - Value objects (Order, MealSelection, OrderStatus, Dni, ...)
// - Errors (OrderError, DniError, ScheduleError)
// - Service-day expansion (schedule)
// - Conflict detection and summaries (conflicts)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod schedule;
pub mod conflicts;

pub use value_objects::*;
pub use errors::*;
pub use schedule::{expand, format_display, format_iso, parse_iso, DateRange};
pub use conflicts::*;
