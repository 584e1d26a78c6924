use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{DniError, OrderError};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Employee national identity number: exactly 8 ASCII digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dni(String);

impl Dni {
    pub fn parse(raw: &str) -> Result<Self, DniError> {
        let raw = raw.trim();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DniError::InvalidFormat(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Dni {
    type Error = DniError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Dni> for String {
    fn from(dni: Dni) -> Self {
        dni.0
    }
}

impl fmt::Display for Dni {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated employee, as returned by the employee directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub dni: Dni,
    pub display_name: String,
    pub worker_id: i64,
    pub client_id: i64,
}

/// Opaque order identifier assigned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three meal slots of a service day, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];

    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Desayuno",
            MealSlot::Lunch => "Almuerzo",
            MealSlot::Dinner => "Cena",
        }
    }

    /// Noun with article, for user messages ("para la cena")
    pub fn noun(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "el desayuno",
            MealSlot::Lunch => "el almuerzo",
            MealSlot::Dinner => "la cena",
        }
    }

    /// Match a backend payload key, Spanish or English, ignoring case
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "desayuno" | "breakfast" => Some(MealSlot::Breakfast),
            "almuerzo" | "lunch" => Some(MealSlot::Lunch),
            "cena" | "dinner" => Some(MealSlot::Dinner),
            _ => None,
        }
    }
}

/// One served meal: what and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealSelection {
    pub meal_type_id: u32,
    pub meal_type_name: String,
    pub location_id: u32,
    pub location_name: String,
}

/// Up to three meal selections for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayMeals {
    pub breakfast: Option<MealSelection>,
    pub lunch: Option<MealSelection>,
    pub dinner: Option<MealSelection>,
}

impl DayMeals {
    pub fn get(&self, slot: MealSlot) -> Option<&MealSelection> {
        match slot {
            MealSlot::Breakfast => self.breakfast.as_ref(),
            MealSlot::Lunch => self.lunch.as_ref(),
            MealSlot::Dinner => self.dinner.as_ref(),
        }
    }

    pub fn set(&mut self, slot: MealSlot, selection: Option<MealSelection>) {
        match slot {
            MealSlot::Breakfast => self.breakfast = selection,
            MealSlot::Lunch => self.lunch = selection,
            MealSlot::Dinner => self.dinner = selection,
        }
    }

    /// Present meals in breakfast → lunch → dinner order
    pub fn iter(&self) -> impl Iterator<Item = (MealSlot, &MealSelection)> {
        MealSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|meal| (slot, meal)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Fulfillment lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Translate the backend's numeric status. Unknown codes are treated as pending.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => OrderStatus::Pending,
            2 => OrderStatus::Cancelled,
            3 => OrderStatus::Delivered,
            other => {
                tracing::warn!(code = other, "Unknown order status code, assuming pending");
                OrderStatus::Pending
            }
        }
    }

    pub fn code(self) -> i32 {
        match self {
            OrderStatus::Pending => 1,
            OrderStatus::Cancelled => 2,
            OrderStatus::Delivered => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pendiente",
            OrderStatus::Delivered => "Entregado",
            OrderStatus::Cancelled => "Anulado",
        }
    }
}

/// Whether an order record still counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Active,
    Removed,
}

impl RegistrationStatus {
    pub fn from_indicator(indicator: &str) -> Self {
        if indicator.trim() == "A" {
            RegistrationStatus::Active
        } else {
            RegistrationStatus::Removed
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            RegistrationStatus::Active => "A",
            RegistrationStatus::Removed => "I",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Active => "Activo",
            RegistrationStatus::Removed => "Eliminado",
        }
    }
}

/// One day's meal delivery record for one employee.
///
/// The service date is fixed at construction; re-dating goes through the
/// replacement flow (cancel + recreate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_dni: Dni,
    pub owner_name: String,
    service_date: NaiveDate,
    pub meals: DayMeals,
    pub status: OrderStatus,
    pub registration: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        owner_dni: Dni,
        owner_name: impl Into<String>,
        service_date: NaiveDate,
        meals: DayMeals,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_dni,
            owner_name: owner_name.into(),
            service_date,
            meals,
            status: OrderStatus::Pending,
            registration: RegistrationStatus::Active,
            registered_at,
        }
    }

    pub fn with_status(mut self, status: OrderStatus, registration: RegistrationStatus) -> Self {
        self.status = status;
        self.registration = registration;
        self
    }

    pub fn service_date(&self) -> NaiveDate {
        self.service_date
    }

    pub fn is_active(&self) -> bool {
        self.registration == RegistrationStatus::Active
    }

    /// Pending and active orders are the only ones a user may act on
    pub fn is_actionable(&self) -> bool {
        self.is_active() && self.status == OrderStatus::Pending
    }

    /// Check that a status change to `target` is allowed
    pub fn ensure_transition(&self, target: OrderStatus) -> Result<(), OrderError> {
        if !self.is_active() {
            return Err(OrderError::Removed(self.id.clone()));
        }
        match (self.status, target) {
            (OrderStatus::Pending, OrderStatus::Delivered | OrderStatus::Cancelled) => Ok(()),
            (from, to) => Err(OrderError::InvalidStatusTransition { from, to }),
        }
    }

    /// Apply a status change, enforcing the transition rules
    pub fn transition(&mut self, target: OrderStatus) -> Result<(), OrderError> {
        self.ensure_transition(target)?;
        self.status = target;
        Ok(())
    }

    /// Supersede this order during a replacement
    pub fn supersede(&mut self) {
        self.status = OrderStatus::Cancelled;
        self.registration = RegistrationStatus::Removed;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            OrderId::new("17"),
            Dni::parse("12345678").unwrap(),
            "Ana Torres",
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            DayMeals::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_dni_requires_eight_digits() {
        assert!(Dni::parse("12345678").is_ok());
        assert!(Dni::parse(" 12345678 ").is_ok());
        assert!(Dni::parse("1234567").is_err());
        assert!(Dni::parse("123456789").is_err());
        assert!(Dni::parse("1234567a").is_err());
        assert!(Dni::parse("").is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OrderStatus::from_code(1), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_code(2), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_code(3), OrderStatus::Delivered);
        assert_eq!(OrderStatus::from_code(99), OrderStatus::Pending);
        for status in [OrderStatus::Pending, OrderStatus::Cancelled, OrderStatus::Delivered] {
            assert_eq!(OrderStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn test_registration_indicator() {
        assert_eq!(RegistrationStatus::from_indicator("A"), RegistrationStatus::Active);
        assert_eq!(RegistrationStatus::from_indicator("I"), RegistrationStatus::Removed);
        assert_eq!(RegistrationStatus::from_indicator(""), RegistrationStatus::Removed);
    }

    #[test]
    fn test_meal_slot_keys() {
        assert_eq!(MealSlot::from_key("Desayuno"), Some(MealSlot::Breakfast));
        assert_eq!(MealSlot::from_key("ALMUERZO"), Some(MealSlot::Lunch));
        assert_eq!(MealSlot::from_key("dinner"), Some(MealSlot::Dinner));
        assert_eq!(MealSlot::from_key("merienda"), None);
    }

    #[test]
    fn test_day_meals_iterates_in_slot_order() {
        let meal = |name: &str| MealSelection {
            meal_type_id: 1,
            meal_type_name: name.to_string(),
            location_id: 1,
            location_name: "Mina".to_string(),
        };
        let mut meals = DayMeals::default();
        meals.set(MealSlot::Dinner, Some(meal("Frio")));
        meals.set(MealSlot::Breakfast, Some(meal("Normal")));

        let slots: Vec<MealSlot> = meals.iter().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![MealSlot::Breakfast, MealSlot::Dinner]);
        assert!(DayMeals::default().is_empty());
    }

    #[test]
    fn test_pending_order_can_be_cancelled_or_delivered() {
        let mut order = sample_order();
        assert!(order.ensure_transition(OrderStatus::Cancelled).is_ok());
        order.transition(OrderStatus::Delivered).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_delivered_order_cannot_be_cancelled() {
        let mut order = sample_order();
        order.transition(OrderStatus::Delivered).unwrap();
        assert!(matches!(
            order.transition(OrderStatus::Cancelled),
            Err(OrderError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn test_removed_order_rejects_every_transition() {
        let mut order = sample_order();
        order.supersede();
        assert!(!order.is_active());
        assert!(matches!(order.transition(OrderStatus::Delivered), Err(OrderError::Removed(_))));
        assert!(matches!(order.transition(OrderStatus::Cancelled), Err(OrderError::Removed(_))));
    }

    #[test]
    fn test_order_serialization_keeps_service_date() {
        let order = sample_order();
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.service_date(), order.service_date());
        assert_eq!(deserialized.owner_dni.as_str(), "12345678");
    }
}
