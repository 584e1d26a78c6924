use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

use super::wire::{ConflictBody, EmployeeBody, ErrorBody, OrderBody, RegisterOrderBody, StatusBody};
use super::{BackendError, EmployeeDirectory, OrderBackend, ReferenceCatalog, RegistrationOutcome};
use crate::config::BackendConfig;
use crate::domain::catalog::{Catalog, DeliveryLocation, MealType};
use crate::domain::order::{Dni, Employee, Order, OrderId, OrderStatus};
use crate::domain::submission::NewOrderRequest;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// HTTP Backend - reqwest client for the delivery service
// ============================================================================
//
//   GET   {base}/validardni?dni=D          employee lookup (404 = not found)
//   POST  {base}                           register (409 = conflict report)
//   PATCH {base}/cliente-pedidos/{worker}  replace
//   GET   {base}/cliente-pedidos/{worker}  history
//   PATCH {base}/actualizar-estado/{id}    status update
//
// The delivery service has no reference-data endpoints; meal types and
// locations come from the catalog the backend is built with.
//
// ============================================================================

pub struct HttpBackend {
    client: Client,
    base_url: String,
    catalog: Catalog,
    breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, breaker: CircuitBreakerConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            catalog: Catalog::worksite_default(),
            breaker: CircuitBreaker::new(breaker),
            metrics: None,
        })
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send through the circuit breaker. 5xx answers count as failures;
    /// every other status is handed back for the caller to interpret.
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, BackendError> {
        let started = Instant::now();

        let result = self
            .breaker
            .call(async {
                let response = request.send().await.map_err(map_reqwest_error)?;
                if response.status().is_server_error() {
                    let status = response.status().as_u16();
                    return Err(BackendError::Server { status, message: error_message(response).await });
                }
                Ok(response)
            })
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.observe_backend_call(operation, started.elapsed().as_secs_f64());
            metrics.update_circuit_breaker_state(self.breaker.state().await.as_gauge());
        }

        match result {
            Ok(response) => {
                tracing::debug!(operation, status = response.status().as_u16(), "Backend responded");
                Ok(response)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(operation, "Circuit open, backend call skipped");
                Err(BackendError::Unavailable)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::warn!(operation, error = %e, "Backend call failed");
                Err(e)
            }
        }
    }

    async fn expect_success(response: Response) -> Result<Response, BackendError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(BackendError::Rejected(error_message(response).await))
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_decode() {
        BackendError::MalformedResponse(err.to_string())
    } else {
        BackendError::Network(err.to_string())
    }
}

/// The body's `message` when there is one, else the raw text, else the reason phrase
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Error desconocido").to_string())
}

#[async_trait]
impl EmployeeDirectory for HttpBackend {
    async fn validate(&self, dni: &Dni) -> Result<Option<Employee>, BackendError> {
        let request = self.client.get(self.url("validardni")).query(&[("dni", dni.as_str())]);
        let response = self.send("validate_dni", request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: EmployeeBody = Self::read_json(Self::expect_success(response).await?).await?;

        Ok(Some(Employee {
            dni: dni.clone(),
            display_name: body.nombres,
            worker_id: body.id_trabajador,
            client_id: body.id_cliente,
        }))
    }
}

#[async_trait]
impl ReferenceCatalog for HttpBackend {
    async fn list_meal_types(&self) -> Result<Vec<MealType>, BackendError> {
        Ok(self.catalog.meal_types.clone())
    }

    async fn list_delivery_locations(&self) -> Result<Vec<DeliveryLocation>, BackendError> {
        Ok(self.catalog.locations.clone())
    }
}

#[async_trait]
impl OrderBackend for HttpBackend {
    async fn register(&self, request: &NewOrderRequest) -> Result<RegistrationOutcome, BackendError> {
        let body = RegisterOrderBody::from(request);
        let response = self.send("register", self.client.post(self.url("")).json(&body)).await?;

        if response.status() == StatusCode::CONFLICT {
            let conflicts: ConflictBody = Self::read_json(response).await?;
            return Ok(RegistrationOutcome::Conflict(conflicts.into_reported()?));
        }
        Self::expect_success(response).await?;
        Ok(RegistrationOutcome::Registered)
    }

    async fn replace(&self, worker_id: i64, request: &NewOrderRequest) -> Result<(), BackendError> {
        let body = RegisterOrderBody::from(request);
        let url = self.url(&format!("cliente-pedidos/{}", worker_id));
        let response = self.send("replace", self.client.patch(url).json(&body)).await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn list_orders(&self, owner: &Employee) -> Result<Vec<Order>, BackendError> {
        let url = self.url(&format!("cliente-pedidos/{}", owner.worker_id));
        let response = self.send("list_orders", self.client.get(url)).await?;

        let bodies: Vec<OrderBody> = Self::read_json(Self::expect_success(response).await?).await?;
        bodies.into_iter().map(|body| body.into_order(owner)).collect()
    }

    async fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<(), BackendError> {
        let url = self.url(&format!("actualizar-estado/{}", order_id));
        let body = StatusBody { estado_pedido: status.code() };
        let response = self.send("set_status", self.client.patch(url).json(&body)).await?;

        Self::expect_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::DateRange;
    use crate::domain::submission::{ConflictCheck, MealChoice, SlotChoices};
    use chrono::NaiveDate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned response and hand back the raw request
    async fn canned(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (format!("http://{}/delivery", addr), handle)
    }

    fn backend(base_url: String) -> HttpBackend {
        let config = BackendConfig {
            base_url,
            timeout_secs: 5,
            conflict_check: ConflictCheck::Server,
        };
        HttpBackend::new(&config, CircuitBreakerConfig::default()).unwrap()
    }

    fn owner() -> Employee {
        Employee {
            dni: Dni::parse("12345678").unwrap(),
            display_name: "Ana Torres".to_string(),
            worker_id: 7,
            client_id: 3,
        }
    }

    fn request() -> NewOrderRequest {
        let day = |d| NaiveDate::from_ymd_opt(2025, 7, d).unwrap();
        NewOrderRequest {
            owner: owner(),
            range: DateRange::new(day(1), day(2)).unwrap(),
            meals: SlotChoices {
                breakfast: Some(MealChoice { meal_type_id: 1, location_id: 1 }),
                ..SlotChoices::default()
            },
        }
    }

    #[tokio::test]
    async fn test_validate_found() {
        let (url, server) = canned("200 OK", r#"{"nombres":"Ana Torres","idTrabajador":7,"idCliente":3}"#).await;
        let dni = Dni::parse("12345678").unwrap();

        let employee = backend(url).validate(&dni).await.unwrap().unwrap();

        assert_eq!(employee.display_name, "Ana Torres");
        assert_eq!(employee.worker_id, 7);
        assert!(server.await.unwrap().starts_with("GET /delivery/validardni?dni=12345678 "));
    }

    #[tokio::test]
    async fn test_validate_not_found() {
        let (url, _server) = canned("404 Not Found", "{}").await;
        let dni = Dni::parse("87654321").unwrap();

        assert_eq!(backend(url).validate(&dni).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_register_conflict_is_an_outcome() {
        let body = r#"{"conflictos":[{"fecha":"2025-07-01","productos":{"desayuno":{"idProducto":1,"nombre":"Normal"}}}]}"#;
        let (url, server) = canned("409 Conflict", body).await;

        let outcome = backend(url).register(&request()).await.unwrap();

        match outcome {
            RegistrationOutcome::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].date, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /delivery "));
        assert!(raw.contains(r#""FechaIngreso":"2025-07-01""#));
    }

    #[tokio::test]
    async fn test_rejection_carries_backend_message() {
        let (url, _server) = canned("400 Bad Request", r#"{"message":"Producto inválido"}"#).await;

        let err = backend(url).register(&request()).await.unwrap_err();
        assert_eq!(err, BackendError::Rejected("Producto inválido".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (url, _server) = canned("500 Internal Server Error", r#"{"message":"Error interno"}"#).await;

        let err = backend(url).replace(7, &request()).await.unwrap_err();
        assert_eq!(err, BackendError::Server { status: 500, message: "Error interno".to_string() });
    }

    #[tokio::test]
    async fn test_set_status_sends_code() {
        let (url, server) = canned("200 OK", "{}").await;

        backend(url)
            .set_status(&OrderId::new("101"), OrderStatus::Delivered)
            .await
            .unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("PATCH /delivery/actualizar-estado/101 "));
        assert!(raw.contains(r#"{"estadoPedido":3}"#));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let err = backend("http://127.0.0.1:9/delivery".to_string())
            .list_orders(&owner())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Network(_) | BackendError::Timeout));
    }

    #[tokio::test]
    async fn test_catalog_served_locally() {
        let backend = backend("http://unused".to_string());
        assert_eq!(backend.list_meal_types().await.unwrap().len(), 3);
        assert_eq!(backend.list_delivery_locations().await.unwrap()[0].name, "Mina");
    }
}
