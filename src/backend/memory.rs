use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use super::{BackendError, EmployeeDirectory, OrderBackend, ReferenceCatalog, RegistrationOutcome};
use crate::domain::catalog::{Catalog, DeliveryLocation, MealType};
use crate::domain::order::{
    DayMeals, Dni, Employee, MealSelection, Order, OrderId, OrderStatus, ReportedConflict,
    ReportedMeal,
};
use crate::domain::submission::NewOrderRequest;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Behaves like the delivery service: registration reports overlapping
// active orders instead of writing (when server-side checks are on),
// replacement supersedes every active order of the worker in the range,
// status updates refuse removed orders.
//
// ============================================================================

/// Snapshot of how often each collaborator call was made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub validate: u32,
    pub register: u32,
    pub replace: u32,
    pub list_orders: u32,
    pub set_status: u32,
}

#[derive(Default)]
struct Counters {
    validate: AtomicU32,
    register: AtomicU32,
    replace: AtomicU32,
    list_orders: AtomicU32,
    set_status: AtomicU32,
}

struct Store {
    /// Orders keyed by worker id
    orders: BTreeMap<i64, Vec<Order>>,
    next_id: u64,
}

pub struct InMemoryBackend {
    employees: HashMap<Dni, Employee>,
    catalog: Catalog,
    server_side_conflicts: bool,
    store: Mutex<Store>,
    counters: Counters,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            employees: HashMap::new(),
            catalog: Catalog::worksite_default(),
            server_side_conflicts: true,
            store: Mutex::new(Store {
                orders: BTreeMap::new(),
                next_id: 1,
            }),
            counters: Counters::default(),
        }
    }

    pub fn with_employee(mut self, employee: Employee) -> Self {
        self.employees.insert(employee.dni.clone(), employee);
        self
    }

    /// Seed an existing order for the given worker
    pub fn with_order(mut self, worker_id: i64, order: Order) -> Self {
        self.store.get_mut().orders.entry(worker_id).or_default().push(order);
        self
    }

    /// When off, registration writes without checking for overlaps
    pub fn with_server_side_conflicts(mut self, enabled: bool) -> Self {
        self.server_side_conflicts = enabled;
        self
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            validate: self.counters.validate.load(Ordering::SeqCst),
            register: self.counters.register.load(Ordering::SeqCst),
            replace: self.counters.replace.load(Ordering::SeqCst),
            list_orders: self.counters.list_orders.load(Ordering::SeqCst),
            set_status: self.counters.set_status.load(Ordering::SeqCst),
        }
    }

    /// Every order stored for the worker, removed ones included
    pub async fn orders_of(&self, worker_id: i64) -> Vec<Order> {
        self.store
            .lock()
            .await
            .orders
            .get(&worker_id)
            .cloned()
            .unwrap_or_default()
    }

    fn day_meals(&self, request: &NewOrderRequest) -> DayMeals {
        let mut meals = DayMeals::default();
        for (slot, choice) in request.meals.iter() {
            meals.set(
                slot,
                Some(MealSelection {
                    meal_type_id: choice.meal_type_id,
                    meal_type_name: self.catalog.meal_type_name(Some(choice.meal_type_id)).to_string(),
                    location_id: choice.location_id,
                    location_name: self.catalog.location_name(Some(choice.location_id)).to_string(),
                }),
            );
        }
        meals
    }

    fn create_orders(&self, store: &mut Store, request: &NewOrderRequest) {
        let meals = self.day_meals(request);
        let now = Utc::now();
        let owner = &request.owner;

        for date in request.range.days() {
            let id = OrderId::new(store.next_id.to_string());
            store.next_id += 1;
            let order = Order::new(id, owner.dni.clone(), owner.display_name.clone(), date, meals.clone(), now);
            store.orders.entry(owner.worker_id).or_default().push(order);
        }
    }
}

fn report(order: &Order) -> ReportedConflict {
    ReportedConflict {
        date: order.service_date(),
        meals: order
            .meals
            .iter()
            .map(|(slot, meal)| {
                (
                    slot,
                    ReportedMeal {
                        product_id: Some(meal.meal_type_id),
                        name: meal.meal_type_name.clone(),
                    },
                )
            })
            .collect(),
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryBackend {
    async fn validate(&self, dni: &Dni) -> Result<Option<Employee>, BackendError> {
        self.counters.validate.fetch_add(1, Ordering::SeqCst);
        Ok(self.employees.get(dni).cloned())
    }
}

#[async_trait]
impl ReferenceCatalog for InMemoryBackend {
    async fn list_meal_types(&self) -> Result<Vec<MealType>, BackendError> {
        Ok(self.catalog.meal_types.clone())
    }

    async fn list_delivery_locations(&self) -> Result<Vec<DeliveryLocation>, BackendError> {
        Ok(self.catalog.locations.clone())
    }
}

#[async_trait]
impl OrderBackend for InMemoryBackend {
    async fn register(&self, request: &NewOrderRequest) -> Result<RegistrationOutcome, BackendError> {
        self.counters.register.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().await;

        if self.server_side_conflicts {
            let conflicts: Vec<ReportedConflict> = store
                .orders
                .get(&request.owner.worker_id)
                .map(|orders| {
                    orders
                        .iter()
                        .filter(|o| o.is_active() && request.range.contains(o.service_date()))
                        .map(report)
                        .collect()
                })
                .unwrap_or_default();
            if !conflicts.is_empty() {
                return Ok(RegistrationOutcome::Conflict(conflicts));
            }
        }

        self.create_orders(&mut store, request);
        Ok(RegistrationOutcome::Registered)
    }

    async fn replace(&self, worker_id: i64, request: &NewOrderRequest) -> Result<(), BackendError> {
        self.counters.replace.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().await;

        if let Some(orders) = store.orders.get_mut(&worker_id) {
            orders
                .iter_mut()
                .filter(|o| o.is_active() && request.range.contains(o.service_date()))
                .for_each(Order::supersede);
        }
        self.create_orders(&mut store, request);
        Ok(())
    }

    async fn list_orders(&self, owner: &Employee) -> Result<Vec<Order>, BackendError> {
        self.counters.list_orders.fetch_add(1, Ordering::SeqCst);
        Ok(self.orders_of(owner.worker_id).await)
    }

    async fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), BackendError> {
        self.counters.set_status.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().await;

        let order = store
            .orders
            .values_mut()
            .flatten()
            .find(|o| o.id == *order_id)
            .ok_or_else(|| BackendError::Rejected(format!("Pedido {} no encontrado", order_id)))?;

        order
            .transition(status)
            .map_err(|e| BackendError::InvariantViolation(e.to_string()))
    }
}
