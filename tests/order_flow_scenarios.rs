use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use meal_orders::backend::{
    BackendError, EmployeeDirectory, InMemoryBackend, OrderBackend, ReferenceCatalog,
    RegistrationOutcome,
};
use meal_orders::clock::FixedClock;
use meal_orders::domain::catalog::{DeliveryLocation, MealType};
use meal_orders::domain::order::{
    ConflictRef, DayMeals, Dni, Employee, Order, OrderId, OrderStatus, RegistrationStatus,
};
use meal_orders::domain::submission::{
    ConflictCheck, MealField, NewOrderRequest, OrderForm, ReplaceOutcome, SubmissionHandler,
    SubmissionState, SubmitOutcome, ValidationError,
};
use meal_orders::notice::{Notice, UiSignal};
use meal_orders::session::{OrderSession, SessionSettings, MSG_REGISTERED, MSG_REPLACED};

// ============================================================================
// Fixtures
// ============================================================================

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

fn pending_order(id: &str, date: NaiveDate) -> Order {
    Order::new(OrderId::new(id), ana().dni, "Ana Torres", date, DayMeals::default(), Utc::now())
}

/// Breakfast Normal at Mina, 2025-07-01 to 2025-07-02
fn breakfast_form() -> OrderForm {
    OrderForm {
        start: Some(day(1)),
        end: Some(day(2)),
        breakfast: MealField::new(Some(1), Some(1)),
        ..OrderForm::default()
    }
}

async fn open_session(backend: Arc<InMemoryBackend>, conflict_check: ConflictCheck) -> OrderSession {
    let settings = SessionSettings {
        conflict_check,
        ..SessionSettings::default()
    };
    OrderSession::start(backend, settings, Arc::new(FixedClock::new(day(1))), None)
        .await
        .unwrap()
}

fn notices(rx: &mut tokio::sync::broadcast::Receiver<UiSignal>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        if let UiSignal::Notice(notice) = signal {
            out.push(notice);
        }
    }
    out
}

/// Wraps the in-memory backend: registration can be held at a gate,
/// replacement can be made to fail.
struct ScriptedBackend {
    inner: InMemoryBackend,
    gate_register: bool,
    entered: Notify,
    release: Notify,
    fail_replace: AtomicBool,
}

impl ScriptedBackend {
    fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            gate_register: false,
            entered: Notify::new(),
            release: Notify::new(),
            fail_replace: AtomicBool::new(false),
        }
    }

    fn gated(mut self) -> Self {
        self.gate_register = true;
        self
    }
}

#[async_trait]
impl EmployeeDirectory for ScriptedBackend {
    async fn validate(&self, dni: &Dni) -> Result<Option<Employee>, BackendError> {
        self.inner.validate(dni).await
    }
}

#[async_trait]
impl ReferenceCatalog for ScriptedBackend {
    async fn list_meal_types(&self) -> Result<Vec<MealType>, BackendError> {
        self.inner.list_meal_types().await
    }

    async fn list_delivery_locations(&self) -> Result<Vec<DeliveryLocation>, BackendError> {
        self.inner.list_delivery_locations().await
    }
}

#[async_trait]
impl OrderBackend for ScriptedBackend {
    async fn register(&self, request: &NewOrderRequest) -> Result<RegistrationOutcome, BackendError> {
        if self.gate_register {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.register(request).await
    }

    async fn replace(&self, worker_id: i64, request: &NewOrderRequest) -> Result<(), BackendError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(BackendError::Server {
                status: 503,
                message: "Servicio en mantenimiento".to_string(),
            });
        }
        self.inner.replace(worker_id, request).await
    }

    async fn list_orders(&self, owner: &Employee) -> Result<Vec<Order>, BackendError> {
        self.inner.list_orders(owner).await
    }

    async fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), BackendError> {
        self.inner.set_status(order_id, status).await
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn scenario_a_registers_one_order_per_day() {
    let backend = Arc::new(InMemoryBackend::new().with_employee(ana()));
    let session = open_session(backend.clone(), ConflictCheck::Server).await;

    let employee = session.validate_dni("12345678").await.unwrap();
    assert_eq!(employee.display_name, "Ana Torres");

    session.update_form(|form| *form = breakfast_form());
    let mut rx = session.subscribe();

    assert_eq!(session.submit().await, SubmitOutcome::Registered);
    assert_eq!(notices(&mut rx), vec![Notice::success(MSG_REGISTERED)]);

    let history = session.history_view();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].service_date, "02/07/2025");
    assert_eq!(history[1].service_date, "01/07/2025");
    for entry in &history {
        assert_eq!(entry.status, "Pendiente");
        assert_eq!(entry.registration, "Activo");
        assert_eq!(entry.breakfast.meal_type, "Normal");
        assert_eq!(entry.breakfast.location, "Mina");
        assert_eq!(entry.dinner.meal_type, "Ninguno");
    }

    // Form is cleared after success
    assert_eq!(session.form(), OrderForm::default());
}

#[tokio::test]
async fn scenario_b_conflict_then_replacement() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_employee(ana())
            .with_order(7, pending_order("500", day(1))),
    );
    let session = open_session(backend.clone(), ConflictCheck::Server).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| *form = breakfast_form());

    let SubmitOutcome::Conflict(prompt) = session.submit().await else {
        panic!("expected a conflict");
    };
    assert_eq!(prompt.conflicts.len(), 1);
    assert_eq!(prompt.conflicts[0].service_date, day(1));
    assert_eq!(prompt.conflicts[0].id, ConflictRef::Order(OrderId::new("500")));
    assert_eq!(prompt.requested_dates, vec![day(1), day(2)]);
    assert_eq!(session.submission_state(), SubmissionState::ConflictPending);

    let mut rx = session.subscribe();
    assert_eq!(session.confirm_replacement().await, ReplaceOutcome::Replaced);
    assert_eq!(notices(&mut rx), vec![Notice::success(MSG_REPLACED)]);

    let orders = backend.orders_of(7).await;
    let old = orders.iter().find(|o| o.id.as_str() == "500").unwrap();
    assert_eq!(old.status.label(), "Anulado");
    assert_eq!(old.registration.label(), "Eliminado");

    let mut active: Vec<&Order> = orders.iter().filter(|o| o.is_active()).collect();
    active.sort_by_key(|o| o.service_date());
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].service_date(), day(1));
    assert_eq!(active[1].service_date(), day(2));
    assert!(active.iter().all(|o| o.status == OrderStatus::Pending));
}

#[tokio::test]
async fn scenario_c_end_before_start_makes_no_call() {
    let backend = Arc::new(InMemoryBackend::new().with_employee(ana()));
    let session = open_session(backend.clone(), ConflictCheck::Server).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| {
        *form = breakfast_form();
        form.start = Some(day(3));
    });
    let mut rx = session.subscribe();

    let outcome = session.submit().await;

    assert_eq!(outcome, SubmitOutcome::Rejected(ValidationError::EndBeforeStart));
    assert_eq!(backend.calls().register, 0);
    assert_eq!(
        notices(&mut rx),
        vec![Notice::danger("La fecha de salida no puede ser anterior a la de ingreso.")]
    );
}

#[tokio::test]
async fn scenario_d_no_meals_makes_no_call() {
    let backend = Arc::new(InMemoryBackend::new().with_employee(ana()));
    let session = open_session(backend.clone(), ConflictCheck::Server).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| {
        form.start = Some(day(1));
        form.end = Some(day(2));
        // a location alone is not a meal
        form.lunch.location = Some(2);
    });
    let mut rx = session.subscribe();

    let outcome = session.submit().await;

    assert_eq!(outcome, SubmitOutcome::Rejected(ValidationError::NoMealSelected));
    assert_eq!(backend.calls().register, 0);
    assert_eq!(notices(&mut rx), vec![Notice::danger("Debe seleccionar al menos una comida.")]);
}

// ============================================================================
// Properties of the flow
// ============================================================================

#[tokio::test]
async fn cancelling_conflict_keeps_form_and_backend_untouched() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_employee(ana())
            .with_order(7, pending_order("500", day(2))),
    );
    let session = open_session(backend.clone(), ConflictCheck::Server).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| {
        *form = breakfast_form();
        // orphan location stays in the form even though it is not sent
        form.dinner.location = Some(3);
    });
    let before = session.form();

    assert!(matches!(session.submit().await, SubmitOutcome::Conflict(_)));
    assert!(session.cancel_conflict());

    assert_eq!(session.form(), before);
    assert_eq!(session.submission_state(), SubmissionState::Idle);
    assert_eq!(backend.calls().replace, 0);
    assert_eq!(backend.orders_of(7).await.len(), 1);
}

#[tokio::test]
async fn identical_submissions_classify_identically() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_employee(ana())
            .with_order(7, pending_order("500", day(1))),
    );
    let session = open_session(backend.clone(), ConflictCheck::Server).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| *form = breakfast_form());

    let first = session.submit().await;
    assert!(session.cancel_conflict());
    let second = session.submit().await;

    assert!(matches!(first, SubmitOutcome::Conflict(_)));
    assert_eq!(first, second);
    assert_eq!(backend.calls().register, 2);
}

#[tokio::test]
async fn local_mode_finds_conflicts_without_server_checks() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_employee(ana())
            .with_server_side_conflicts(false)
            .with_order(7, pending_order("500", day(2))),
    );
    let session = open_session(backend.clone(), ConflictCheck::Local).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| *form = breakfast_form());

    let SubmitOutcome::Conflict(prompt) = session.submit().await else {
        panic!("expected a conflict");
    };

    assert_eq!(prompt.conflicts[0].id, ConflictRef::Order(OrderId::new("500")));
    assert_eq!(prompt.conflicts[0].meals, "Sin comidas");
    assert_eq!(backend.calls().register, 0);
}

#[tokio::test]
async fn removed_orders_never_conflict() {
    let removed = pending_order("500", day(1)).with_status(OrderStatus::Cancelled, RegistrationStatus::Removed);
    let backend = Arc::new(InMemoryBackend::new().with_employee(ana()).with_order(7, removed));
    let session = open_session(backend.clone(), ConflictCheck::Local).await;
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| *form = breakfast_form());

    assert_eq!(session.submit().await, SubmitOutcome::Registered);
    assert_eq!(session.history_view().len(), 2);
}

#[tokio::test]
async fn second_submit_while_in_flight_is_ignored() {
    let backend = Arc::new(ScriptedBackend::new(InMemoryBackend::new()).gated());
    let handler = Arc::new(SubmissionHandler::new(backend.clone(), ConflictCheck::Server));

    let first = tokio::spawn({
        let handler = handler.clone();
        async move { handler.submit(&ana(), &breakfast_form(), day(1), &[]).await }
    });
    backend.entered.notified().await;

    assert_eq!(handler.state(), SubmissionState::Submitting);
    let second = handler.submit(&ana(), &breakfast_form(), day(1), &[]).await;
    assert_eq!(second, SubmitOutcome::Ignored);

    backend.release.notify_one();
    assert_eq!(first.await.unwrap(), SubmitOutcome::Registered);
    assert_eq!(backend.inner.orders_of(7).await.len(), 2);
}

#[tokio::test]
async fn failed_replacement_preserves_form_for_retry() {
    let scripted = ScriptedBackend::new(
        InMemoryBackend::new()
            .with_employee(ana())
            .with_order(7, pending_order("500", day(1))),
    );
    scripted.fail_replace.store(true, Ordering::SeqCst);
    let backend = Arc::new(scripted);
    let session = OrderSession::start(
        backend.clone(),
        SessionSettings::default(),
        Arc::new(FixedClock::new(day(1))),
        None,
    )
    .await
    .unwrap();
    session.validate_dni("12345678").await.unwrap();
    session.update_form(|form| *form = breakfast_form());

    assert!(matches!(session.submit().await, SubmitOutcome::Conflict(_)));
    let mut rx = session.subscribe();

    let outcome = session.confirm_replacement().await;

    assert!(matches!(outcome, ReplaceOutcome::Failed(_)));
    assert_eq!(session.submission_state(), SubmissionState::Failed);
    assert!(session.conflict_prompt().is_none());
    assert_eq!(session.form(), breakfast_form());
    let shown = notices(&mut rx);
    assert_eq!(shown.len(), 1);
    assert!(shown[0].message.contains("Servicio en mantenimiento"));

    // retry goes through once the backend recovers
    backend.fail_replace.store(false, Ordering::SeqCst);
    assert!(matches!(session.submit().await, SubmitOutcome::Conflict(_)));
    assert_eq!(session.confirm_replacement().await, ReplaceOutcome::Replaced);
}
