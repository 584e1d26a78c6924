use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::value_objects::{Dni, MealSlot, Order, OrderId, OrderStatus};

// ============================================================================
// Order Conflicts - Detection and Summaries
// ============================================================================
//
// A conflict is an existing Active order of the same owner whose service date
// falls inside a newly requested range. Detection is a pure filter over the
// history already loaded in memory; summaries are the read-only projection
// shown in the confirmation prompt.
//
// ============================================================================

/// Shown instead of an empty meal description
pub const NO_MEALS_PLACEHOLDER: &str = "Sin comidas";

/// Existing orders of `owner` that are Active and fall on one of `candidate_dates`.
///
/// Input order is preserved; sorting is a presentation concern.
pub fn detect_conflicts<'a>(
    candidate_dates: &BTreeSet<NaiveDate>,
    owner: &Dni,
    existing: &'a [Order],
) -> Vec<&'a Order> {
    existing
        .iter()
        .filter(|order| {
            order.owner_dni == *owner
                && order.is_active()
                && candidate_dates.contains(&order.service_date())
        })
        .collect()
}

/// How a summary correlates back to the record it describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictRef {
    /// Matches a known order
    Order(OrderId),
    /// Minted locally; replacement acts by date range instead
    Local(Uuid),
}

impl fmt::Display for ConflictRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictRef::Order(id) => write!(f, "{}", id),
            ConflictRef::Local(id) => write!(f, "local-{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub id: ConflictRef,
    pub service_date: NaiveDate,
    pub meals: String,
    pub status: OrderStatus,
}

/// A meal the backend reported as already booked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedMeal {
    pub product_id: Option<u32>,
    pub name: String,
}

/// One conflicting day as reported by the registration backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedConflict {
    pub date: NaiveDate,
    pub meals: BTreeMap<MealSlot, ReportedMeal>,
}

fn describe<'a>(meals: impl Iterator<Item = (MealSlot, &'a str)>) -> String {
    let parts: Vec<String> = meals
        .map(|(slot, name)| format!("{}: {}", slot.label(), name))
        .collect();
    if parts.is_empty() {
        NO_MEALS_PLACEHOLDER.to_string()
    } else {
        parts.join(", ")
    }
}

/// Summary of a known conflicting order
pub fn summarize(order: &Order) -> ConflictSummary {
    ConflictSummary {
        id: ConflictRef::Order(order.id.clone()),
        service_date: order.service_date(),
        meals: describe(
            order
                .meals
                .iter()
                .map(|(slot, meal)| (slot, meal.meal_type_name.as_str())),
        ),
        status: order.status,
    }
}

/// Summary of a backend-reported conflict.
///
/// Correlates with the owner's Active order on the same date when the loaded
/// history has one; otherwise mints a local id. The meal text always comes
/// from the backend's report.
pub fn summarize_reported(
    reported: &ReportedConflict,
    owner: &Dni,
    history: &[Order],
) -> ConflictSummary {
    let known = history.iter().find(|order| {
        order.owner_dni == *owner && order.is_active() && order.service_date() == reported.date
    });

    let (id, status) = match known {
        Some(order) => (ConflictRef::Order(order.id.clone()), order.status),
        None => (ConflictRef::Local(Uuid::new_v4()), OrderStatus::Pending),
    };

    // BTreeMap keys iterate in slot order
    ConflictSummary {
        id,
        service_date: reported.date,
        meals: describe(
            reported
                .meals
                .iter()
                .map(|(slot, meal)| (*slot, meal.name.as_str())),
        ),
        status,
    }
}
