//! Meal-order registration for worksite employees: DNI validation, the
//! order form, conflict detection against existing orders and the
//! confirm-to-replace flow, talking to the delivery backend over HTTP.

pub mod backend;
pub mod clock;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod notice;
pub mod observability;
pub mod session;
pub mod utils;
