use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::backend::{Backend, BackendError};
use crate::clock::Clock;
use crate::config::Config;
use crate::domain::catalog::Catalog;
use crate::domain::order::{
    format_display, format_iso, Dni, Employee, MealSlot, Order, OrderError, OrderId, OrderStatus,
};
use crate::domain::submission::{
    ConflictCheck, ConflictPrompt, OrderForm, ReplaceOutcome, SubmissionHandler, SubmissionState,
    SubmitOutcome,
};
use crate::metrics::Metrics;
use crate::notice::{Notice, UiSignal};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Order Session - One employee at the order form
// ============================================================================
//
// Owns the form, the validated employee, the loaded history and the
// submission handler. Every user action ends in notices broadcast to the
// presentation layer; no error escapes a session operation.
//
// ============================================================================

pub const MSG_DNI_FORMAT: &str = "El DNI debe contener 8 dígitos numéricos.";
pub const MSG_DNI_OK: &str = "DNI validado con éxito. Puede continuar con el pedido.";
pub const MSG_DNI_NOT_FOUND: &str = "DNI no encontrado o inválido.";
pub const MSG_DNI_REQUIRED: &str = "Valide el DNI antes de registrar el pedido.";
pub const MSG_REGISTERED: &str = "Pedido registrado con éxito.";
pub const MSG_REPLACED: &str = "Pedidos reemplazados con éxito.";
pub const MSG_REPLACE_FAILED: &str = "Error al reemplazar pedidos.";
pub const MSG_HISTORY_FAILED: &str = "Error al cargar el historial de pedidos.";
pub const MSG_CANCELLED: &str = "Pedido anulado.";
pub const MSG_DELIVERED: &str = "Pedido marcado como entregado.";

const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub conflict_check: ConflictCheck,
    /// Applied to reference-data loading only
    pub retry: RetryConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            conflict_check: ConflictCheck::Server,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            conflict_check: config.backend.conflict_check,
            retry: RetryConfig::from(&config.retry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMeal {
    pub meal_type: String,
    pub location: String,
}

/// One row of the order history as displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: OrderId,
    pub service_date: String,
    pub breakfast: HistoryMeal,
    pub lunch: HistoryMeal,
    pub dinner: HistoryMeal,
    pub status: &'static str,
    pub registration: &'static str,
    pub actionable: bool,
}

impl HistoryEntry {
    pub fn meal(&self, slot: MealSlot) -> &HistoryMeal {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
        }
    }
}

pub struct OrderSession {
    backend: Arc<dyn Backend>,
    catalog: Catalog,
    employee: Mutex<Option<Employee>>,
    form: Mutex<OrderForm>,
    history: Mutex<Vec<Order>>,
    submissions: SubmissionHandler<dyn Backend>,
    signals: broadcast::Sender<UiSignal>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OrderSession {
    /// Load reference data and open a session
    pub async fn start(
        backend: Arc<dyn Backend>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, BackendError> {
        let catalog = {
            let source = backend.as_ref();
            let meal_types = retry_on_transient(&settings.retry, |_| source.list_meal_types())
                .await
                .into_result()?;
            let locations = retry_on_transient(&settings.retry, |_| source.list_delivery_locations())
                .await
                .into_result()?;
            Catalog::new(meal_types, locations)
        };
        tracing::info!(
            meal_types = catalog.meal_types.len(),
            locations = catalog.locations.len(),
            "Reference data loaded"
        );

        let mut submissions = SubmissionHandler::new(backend.clone(), settings.conflict_check);
        if let Some(metrics) = &metrics {
            submissions = submissions.with_metrics(metrics.clone());
        }
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

        Ok(Self {
            backend,
            catalog,
            employee: Mutex::new(None),
            form: Mutex::new(OrderForm::default()),
            history: Mutex::new(Vec::new()),
            submissions,
            signals,
            clock,
            metrics,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiSignal> {
        self.signals.subscribe()
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!(message = %notice.message, variant = ?notice.variant, "Notice");
        // No subscribers is fine
        let _ = self.signals.send(UiSignal::Notice(notice));
    }

    fn dismiss(&self) {
        let _ = self.signals.send(UiSignal::Dismiss);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn employee(&self) -> Option<Employee> {
        lock(&self.employee).clone()
    }

    /// The form is usable only after a successful DNI validation
    pub fn form_enabled(&self) -> bool {
        lock(&self.employee).is_some()
    }

    pub fn form(&self) -> OrderForm {
        lock(&self.form).clone()
    }

    pub fn update_form(&self, edit: impl FnOnce(&mut OrderForm)) {
        edit(&mut lock(&self.form));
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.submissions.state()
    }

    pub fn conflict_prompt(&self) -> Option<ConflictPrompt> {
        self.submissions.conflict_prompt()
    }

    fn forget_employee(&self) {
        *lock(&self.employee) = None;
        lock(&self.history).clear();
    }

    // ========================================================================
    // Employee validation
    // ========================================================================

    pub async fn validate_dni(&self, raw: &str) -> Option<Employee> {
        self.dismiss();

        let dni = match Dni::parse(raw) {
            Ok(dni) => dni,
            Err(e) => {
                tracing::info!(error = %e, "DNI rejected before lookup");
                self.forget_employee();
                self.notify(Notice::danger(MSG_DNI_FORMAT));
                return None;
            }
        };

        match self.backend.validate(&dni).await {
            Ok(Some(employee)) => {
                tracing::info!(worker_id = employee.worker_id, "Employee validated");
                *lock(&self.employee) = Some(employee.clone());
                self.notify(Notice::success(MSG_DNI_OK));
                self.refresh_history().await;
                Some(employee)
            }
            Ok(None) => {
                tracing::info!(dni = %dni, "Employee not found");
                self.forget_employee();
                self.notify(Notice::danger(MSG_DNI_NOT_FOUND));
                None
            }
            Err(e) => {
                tracing::warn!(dni = %dni, error = %e, "Employee lookup failed");
                self.forget_employee();
                self.notify(Notice::danger(e.to_string()));
                None
            }
        }
    }

    // ========================================================================
    // Submit / confirm / cancel
    // ========================================================================

    pub async fn submit(&self) -> SubmitOutcome {
        self.dismiss();

        let Some(employee) = self.employee() else {
            self.notify(Notice::danger(MSG_DNI_REQUIRED));
            return SubmitOutcome::Failed(MSG_DNI_REQUIRED.to_string());
        };
        let form = self.form();
        let history = lock(&self.history).clone();

        let outcome = self
            .submissions
            .submit(&employee, &form, self.clock.today(), &history)
            .await;

        match &outcome {
            SubmitOutcome::Registered => {
                self.notify(Notice::success(MSG_REGISTERED));
                *lock(&self.form) = OrderForm::default();
                self.refresh_history().await;
            }
            SubmitOutcome::Rejected(e) => self.notify(Notice::danger(e.to_string())),
            SubmitOutcome::Failed(reason) => self.notify(Notice::danger(reason.clone())),
            // The prompt is the presentation; nothing to announce
            SubmitOutcome::Conflict(_) | SubmitOutcome::Ignored => {}
        }
        outcome
    }

    pub async fn confirm_replacement(&self) -> ReplaceOutcome {
        self.dismiss();

        let outcome = self.submissions.confirm_replacement().await;
        match &outcome {
            ReplaceOutcome::Replaced => {
                self.notify(Notice::success(MSG_REPLACED));
                *lock(&self.form) = OrderForm::default();
                self.refresh_history().await;
            }
            ReplaceOutcome::Failed(reason) => {
                self.notify(Notice::danger(format!("{} {}", MSG_REPLACE_FAILED, reason)));
            }
            ReplaceOutcome::Ignored => {}
        }
        outcome
    }

    /// Close the conflict prompt; the form is left exactly as it was
    pub fn cancel_conflict(&self) -> bool {
        self.submissions.cancel_conflict()
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Reload the employee's orders; false when nothing could be loaded
    pub async fn refresh_history(&self) -> bool {
        let Some(employee) = self.employee() else {
            return false;
        };

        match self.backend.list_orders(&employee).await {
            Ok(orders) => {
                tracing::debug!(worker_id = employee.worker_id, orders = orders.len(), "History loaded");
                *lock(&self.history) = orders;
                true
            }
            Err(e) => {
                tracing::warn!(worker_id = employee.worker_id, error = %e, "History refresh failed");
                self.notify(Notice::danger(MSG_HISTORY_FAILED));
                false
            }
        }
    }

    /// Active orders, newest service date first
    pub fn history_view(&self) -> Vec<HistoryEntry> {
        let history = lock(&self.history);
        let mut active: Vec<&Order> = history.iter().filter(|o| o.is_active()).collect();
        active.sort_by(|a, b| b.service_date().cmp(&a.service_date()));

        active
            .into_iter()
            .map(|order| {
                let meal = |slot: MealSlot| {
                    let selection = order.meals.get(slot);
                    HistoryMeal {
                        meal_type: self.catalog.meal_type_name(selection.map(|m| m.meal_type_id)).to_string(),
                        location: self.catalog.location_name(selection.map(|m| m.location_id)).to_string(),
                    }
                };
                HistoryEntry {
                    id: order.id.clone(),
                    service_date: format_display(&format_iso(order.service_date())),
                    breakfast: meal(MealSlot::Breakfast),
                    lunch: meal(MealSlot::Lunch),
                    dinner: meal(MealSlot::Dinner),
                    status: order.status.label(),
                    registration: order.registration.label(),
                    actionable: order.is_actionable(),
                }
            })
            .collect()
    }

    // ========================================================================
    // Status actions
    // ========================================================================

    pub async fn cancel_order(&self, id: &OrderId) -> bool {
        self.set_order_status(id, OrderStatus::Cancelled, MSG_CANCELLED).await
    }

    pub async fn mark_delivered(&self, id: &OrderId) -> bool {
        self.set_order_status(id, OrderStatus::Delivered, MSG_DELIVERED).await
    }

    async fn set_order_status(&self, id: &OrderId, target: OrderStatus, success: &str) -> bool {
        self.dismiss();

        let checked = lock(&self.history)
            .iter()
            .find(|o| o.id == *id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))
            .and_then(|order| order.ensure_transition(target));

        if let Err(e) = checked {
            // Unreachable through the form's own actions
            tracing::error!(order_id = %id, target = ?target, error = %e, "Invariant violation on status update");
            let err = BackendError::InvariantViolation(e.to_string());
            self.record_status_update(target, false);
            self.notify(Notice::danger(err.to_string()));
            return false;
        }

        match self.backend.set_status(id, target).await {
            Ok(()) => {
                tracing::info!(order_id = %id, status = target.label(), "Order status updated");
                self.record_status_update(target, true);
                self.notify(Notice::success(success));
                self.refresh_history().await;
                true
            }
            Err(e) => {
                if matches!(e, BackendError::InvariantViolation(_)) {
                    tracing::error!(order_id = %id, error = %e, "Backend reported invariant violation");
                } else {
                    tracing::warn!(order_id = %id, error = %e, "Status update failed");
                }
                self.record_status_update(target, false);
                self.notify(Notice::danger(e.to_string()));
                false
            }
        }
    }

    fn record_status_update(&self, target: OrderStatus, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_status_update(target.label(), success);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::FixedClock;
    use crate::domain::order::{DayMeals, RegistrationStatus};
    use crate::domain::submission::MealField;
    use chrono::{NaiveDate, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn ana() -> Employee {
        Employee {
            dni: Dni::parse("12345678").unwrap(),
            display_name: "Ana Torres".to_string(),
            worker_id: 7,
            client_id: 3,
        }
    }

    fn order(id: &str, date: NaiveDate) -> Order {
        Order::new(OrderId::new(id), ana().dni, "Ana Torres", date, DayMeals::default(), Utc::now())
    }

    async fn session(backend: InMemoryBackend) -> (OrderSession, Arc<InMemoryBackend>) {
        let backend = Arc::new(backend.with_employee(ana()));
        let session = OrderSession::start(
            backend.clone(),
            SessionSettings::default(),
            Arc::new(FixedClock::new(day(1))),
            None,
        )
        .await
        .unwrap();
        (session, backend)
    }

    fn drain(rx: &mut broadcast::Receiver<UiSignal>) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            if let UiSignal::Notice(notice) = signal {
                notices.push(notice);
            }
        }
        notices
    }

    #[tokio::test]
    async fn test_malformed_dni_skips_lookup() {
        let (session, backend) = session(InMemoryBackend::new()).await;
        let mut rx = session.subscribe();

        assert!(session.validate_dni("1234").await.is_none());

        assert_eq!(backend.calls().validate, 0);
        assert_eq!(drain(&mut rx), vec![Notice::danger(MSG_DNI_FORMAT)]);
        assert!(!session.form_enabled());
    }

    #[tokio::test]
    async fn test_unknown_dni_disables_form() {
        let (session, _backend) = session(InMemoryBackend::new()).await;
        session.validate_dni("12345678").await.unwrap();
        let mut rx = session.subscribe();

        assert!(session.validate_dni("87654321").await.is_none());

        assert!(!session.form_enabled());
        assert_eq!(drain(&mut rx), vec![Notice::danger(MSG_DNI_NOT_FOUND)]);
    }

    #[tokio::test]
    async fn test_submit_requires_employee() {
        let (session, backend) = session(InMemoryBackend::new()).await;

        let outcome = session.submit().await;

        assert_eq!(outcome, SubmitOutcome::Failed(MSG_DNI_REQUIRED.to_string()));
        assert_eq!(backend.calls().register, 0);
    }

    #[tokio::test]
    async fn test_history_view_hides_removed_and_sorts_descending() {
        let removed = order("r", day(3)).with_status(OrderStatus::Cancelled, RegistrationStatus::Removed);
        let delivered = order("d", day(1)).with_status(OrderStatus::Delivered, RegistrationStatus::Active);
        let backend = InMemoryBackend::new()
            .with_order(7, delivered)
            .with_order(7, order("p", day(2)))
            .with_order(7, removed);
        let (session, _backend) = session(backend).await;
        session.validate_dni("12345678").await.unwrap();

        let view = session.history_view();

        let ids: Vec<&str> = view.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "d"]);
        assert_eq!(view[0].service_date, "02/07/2025");
        assert!(view[0].actionable);
        assert!(!view[1].actionable);
        assert_eq!(view[1].status, "Entregado");
        assert_eq!(view[0].meal(MealSlot::Lunch).meal_type, "Ninguno");
    }

    #[tokio::test]
    async fn test_cancel_order_updates_backend() {
        let (session, backend) = session(InMemoryBackend::new().with_order(7, order("p", day(2)))).await;
        session.validate_dni("12345678").await.unwrap();
        let mut rx = session.subscribe();

        assert!(session.cancel_order(&OrderId::new("p")).await);

        assert_eq!(backend.calls().set_status, 1);
        assert_eq!(backend.orders_of(7).await[0].status, OrderStatus::Cancelled);
        assert_eq!(drain(&mut rx), vec![Notice::success(MSG_CANCELLED)]);
        assert!(!session.history_view()[0].actionable);
    }

    #[tokio::test]
    async fn test_status_action_on_delivered_order_makes_no_call() {
        let delivered = order("d", day(2)).with_status(OrderStatus::Delivered, RegistrationStatus::Active);
        let (session, backend) = session(InMemoryBackend::new().with_order(7, delivered)).await;
        session.validate_dni("12345678").await.unwrap();
        let mut rx = session.subscribe();

        assert!(!session.mark_delivered(&OrderId::new("d")).await);

        assert_eq!(backend.calls().set_status, 0);
        let notices = drain(&mut rx);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_failure());
    }

    #[tokio::test]
    async fn test_validation_message_reaches_user() {
        let (session, _backend) = session(InMemoryBackend::new()).await;
        session.validate_dni("12345678").await.unwrap();
        session.update_form(|form| {
            form.start = Some(day(1));
            form.end = Some(day(1));
            form.lunch = MealField::new(Some(2), None);
        });
        let mut rx = session.subscribe();

        session.submit().await;

        assert_eq!(
            drain(&mut rx),
            vec![Notice::danger("Seleccione lugar de entrega para el almuerzo.")]
        );
    }
}
