use chrono::NaiveDate;

use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order {0} has been removed and cannot be modified")]
    Removed(OrderId),

    #[error("Cannot move order from {from:?} to {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order not found: {0}")]
    NotFound(OrderId),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DniError {
    #[error("DNI must contain exactly 8 digits, got {0:?}")]
    InvalidFormat(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScheduleError {
    #[error("Invalid date range: {end} is before {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}
