use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::order::{ConflictSummary, DateRange, Employee, MealSlot};

// ============================================================================
// Submission Value Objects
// ============================================================================

/// One meal row of the form: both selectors are optional until validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealField {
    pub meal_type: Option<u32>,
    pub location: Option<u32>,
}

impl MealField {
    pub fn new(meal_type: Option<u32>, location: Option<u32>) -> Self {
        Self { meal_type, location }
    }
}

/// Raw form state as edited by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderForm {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub breakfast: MealField,
    pub lunch: MealField,
    pub dinner: MealField,
}

impl OrderForm {
    pub fn field(&self, slot: MealSlot) -> &MealField {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
        }
    }

    pub fn field_mut(&mut self, slot: MealSlot) -> &mut MealField {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
        }
    }
}

/// A selected meal with its delivery location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealChoice {
    pub meal_type_id: u32,
    pub location_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChoices {
    pub breakfast: Option<MealChoice>,
    pub lunch: Option<MealChoice>,
    pub dinner: Option<MealChoice>,
}

impl SlotChoices {
    pub fn get(&self, slot: MealSlot) -> Option<MealChoice> {
        match slot {
            MealSlot::Breakfast => self.breakfast,
            MealSlot::Lunch => self.lunch,
            MealSlot::Dinner => self.dinner,
        }
    }

    pub fn set(&mut self, slot: MealSlot, choice: Option<MealChoice>) {
        match slot {
            MealSlot::Breakfast => self.breakfast = choice,
            MealSlot::Lunch => self.lunch = choice,
            MealSlot::Dinner => self.dinner = choice,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MealSlot, MealChoice)> + '_ {
        MealSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|choice| (slot, choice)))
    }
}

/// The candidate submission, frozen at submit time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrderRequest {
    pub owner: Employee,
    pub range: DateRange,
    pub meals: SlotChoices,
}

/// Where overlapping orders are detected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictCheck {
    /// The registration backend answers with a conflict report
    #[default]
    Server,
    /// History is fetched and checked here before registering
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Idle,
    Submitting,
    ConflictPending,
    Replacing,
    Succeeded,
    Failed,
}

impl SubmissionState {
    /// A mutating request is outstanding
    pub fn is_busy(self) -> bool {
        matches!(self, SubmissionState::Submitting | SubmissionState::Replacing)
    }
}

/// What the confirmation dialog shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictPrompt {
    pub conflicts: Vec<ConflictSummary>,
    pub requested_dates: Vec<NaiveDate>,
}

impl ConflictPrompt {
    /// First and last requested day
    pub fn requested_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.requested_dates.first()?, *self.requested_dates.last()?))
    }

    /// Conflicts sorted by service date for display
    pub fn sorted_conflicts(&self) -> Vec<&ConflictSummary> {
        let mut conflicts: Vec<&ConflictSummary> = self.conflicts.iter().collect();
        conflicts.sort_by_key(|c| c.service_date);
        conflicts
    }
}
