// ============================================================================
// Backend Collaborators
// ============================================================================
//
// Contracts for the services the order form talks to. The HTTP client is the
// production implementation; the in-memory one backs tests and demos and
// behaves like the real backend (server-side conflict checks, replacement
// supersedes by date range).
//
// ============================================================================

mod http;
mod memory;
pub mod wire;

pub use http::HttpBackend;
pub use memory::{CallCounts, InMemoryBackend};

use async_trait::async_trait;

use crate::domain::catalog::{DeliveryLocation, MealType};
use crate::domain::order::{Dni, Employee, Order, OrderId, OrderStatus, ReportedConflict};
use crate::domain::submission::NewOrderRequest;
use crate::utils::IsTransient;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Error de red: {0}")]
    Network(String),

    #[error("El servidor no respondió a tiempo")]
    Timeout,

    #[error("Servicio no disponible, intente más tarde")]
    Unavailable,

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Rejected(String),

    #[error("Respuesta inválida del servidor: {0}")]
    MalformedResponse(String),

    #[error("Operación no permitida: {0}")]
    InvariantViolation(String),
}

impl IsTransient for BackendError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Network(_)
                | BackendError::Timeout
                | BackendError::Unavailable
                | BackendError::Server { .. }
        )
    }
}

/// Result of a registration attempt that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered,
    Conflict(Vec<ReportedConflict>),
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// `Ok(None)` when no employee has this DNI
    async fn validate(&self, dni: &Dni) -> Result<Option<Employee>, BackendError>;
}

#[async_trait]
pub trait ReferenceCatalog: Send + Sync {
    async fn list_meal_types(&self) -> Result<Vec<MealType>, BackendError>;
    async fn list_delivery_locations(&self) -> Result<Vec<DeliveryLocation>, BackendError>;
}

#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn register(&self, request: &NewOrderRequest) -> Result<RegistrationOutcome, BackendError>;

    /// Supersede every active order of the worker inside the request's range
    async fn replace(&self, worker_id: i64, request: &NewOrderRequest) -> Result<(), BackendError>;

    async fn list_orders(&self, owner: &Employee) -> Result<Vec<Order>, BackendError>;

    async fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), BackendError>;
}

/// Everything one employee session needs
pub trait Backend: EmployeeDirectory + ReferenceCatalog + OrderBackend {}

impl<T: EmployeeDirectory + ReferenceCatalog + OrderBackend> Backend for T {}
