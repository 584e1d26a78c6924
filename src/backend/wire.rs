use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::BackendError;
use crate::domain::order::{
    format_iso, parse_iso, DayMeals, Employee, MealSelection, MealSlot, Order, OrderId,
    OrderStatus, RegistrationStatus, ReportedConflict, ReportedMeal,
};
use crate::domain::submission::NewOrderRequest;

// ============================================================================
// Wire Format - JSON bodies exchanged with the delivery backend
// ============================================================================
//
// Dates travel as YYYY-MM-DD. Numeric status codes and the "A" registration
// indicator are translated here and nowhere else.
//
// ============================================================================

/// Body of both `POST /` (register) and `PATCH /cliente-pedidos/{id}` (replace)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterOrderBody {
    pub id_trabajador: i64,
    pub id_cliente: i64,
    pub fecha_ingreso: String,
    pub fecha_salida: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_producto_desayuno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_producto_almuerzo: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_producto_cena: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_lugar_entrega_desayuno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_lugar_entrega_almuerzo: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_lugar_entrega_cena: Option<u32>,
}

impl From<&NewOrderRequest> for RegisterOrderBody {
    fn from(request: &NewOrderRequest) -> Self {
        let meals = &request.meals;
        Self {
            id_trabajador: request.owner.worker_id,
            id_cliente: request.owner.client_id,
            fecha_ingreso: format_iso(request.range.start()),
            fecha_salida: format_iso(request.range.end()),
            id_producto_desayuno: meals.breakfast.map(|m| m.meal_type_id),
            id_producto_almuerzo: meals.lunch.map(|m| m.meal_type_id),
            id_producto_cena: meals.dinner.map(|m| m.meal_type_id),
            id_lugar_entrega_desayuno: meals.breakfast.map(|m| m.location_id),
            id_lugar_entrega_almuerzo: meals.lunch.map(|m| m.location_id),
            id_lugar_entrega_cena: meals.dinner.map(|m| m.location_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeBody {
    pub nombres: String,
    pub id_trabajador: i64,
    pub id_cliente: i64,
}

/// 409 body returned by registration
#[derive(Debug, Clone, Deserialize)]
pub struct ConflictBody {
    #[serde(default)]
    pub conflictos: Vec<ConflictDayBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictDayBody {
    pub fecha: String,
    #[serde(default)]
    pub productos: BTreeMap<String, ConflictProductBody>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictProductBody {
    #[serde(default)]
    pub id_producto: Option<u32>,
    pub nombre: String,
}

impl ConflictBody {
    pub fn into_reported(self) -> Result<Vec<ReportedConflict>, BackendError> {
        self.conflictos
            .into_iter()
            .map(|day| {
                let date = service_day(&day.fecha)?;
                let mut meals = BTreeMap::new();
                for (key, product) in day.productos {
                    match MealSlot::from_key(&key) {
                        Some(slot) => {
                            meals.insert(
                                slot,
                                ReportedMeal { product_id: product.id_producto, name: product.nombre },
                            );
                        }
                        None => tracing::warn!(key = %key, "Ignoring unknown meal slot in conflict report"),
                    }
                }
                Ok(ReportedConflict { date, meals })
            })
            .collect()
    }
}

/// Order ids arrive as numbers from the real backend and as strings elsewhere
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl From<WireId> for OrderId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => OrderId::new(n.to_string()),
            WireId::Text(s) => OrderId::new(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBody {
    pub id_producto: u32,
    pub nombre_producto: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBody {
    pub id_lugar_destino: u32,
    pub nombre: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerClientBody {
    pub fecha_registro: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    pub id_pedido: WireId,
    pub fecha_pedido: String,
    #[serde(default)]
    pub producto_desayuno: Option<ProductBody>,
    #[serde(default)]
    pub producto_almuerzo: Option<ProductBody>,
    #[serde(default)]
    pub producto_cena: Option<ProductBody>,
    #[serde(default)]
    pub lugar_entrega_desayuno: Option<LocationBody>,
    #[serde(default)]
    pub lugar_entrega_almuerzo: Option<LocationBody>,
    #[serde(default)]
    pub lugar_entrega_cena: Option<LocationBody>,
    pub estado_pedido: i32,
    pub indicador_estado: String,
    pub trabajador_cliente: WorkerClientBody,
}

/// A meal only exists when both product and location are present
fn meal(product: Option<ProductBody>, location: Option<LocationBody>) -> Option<MealSelection> {
    match (product, location) {
        (Some(product), Some(location)) => Some(MealSelection {
            meal_type_id: product.id_producto,
            meal_type_name: product.nombre_producto,
            location_id: location.id_lugar_destino,
            location_name: location.nombre,
        }),
        _ => None,
    }
}

/// Service days may come with a midnight time attached; only the day counts
fn service_day(raw: &str) -> Result<NaiveDate, BackendError> {
    let day = raw.trim().split(['T', ' ']).next().unwrap_or_default();
    parse_iso(day).map_err(|e| BackendError::MalformedResponse(e.to_string()))
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, BackendError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| BackendError::MalformedResponse(format!("invalid timestamp {:?}", raw)))
}

impl OrderBody {
    pub fn into_order(self, owner: &Employee) -> Result<Order, BackendError> {
        let service_date = service_day(&self.fecha_pedido)?;
        let registered_at = parse_timestamp(&self.trabajador_cliente.fecha_registro)?;
        let meals = DayMeals {
            breakfast: meal(self.producto_desayuno, self.lugar_entrega_desayuno),
            lunch: meal(self.producto_almuerzo, self.lugar_entrega_almuerzo),
            dinner: meal(self.producto_cena, self.lugar_entrega_cena),
        };

        Ok(Order::new(
            self.id_pedido.into(),
            owner.dni.clone(),
            owner.display_name.clone(),
            service_date,
            meals,
            registered_at,
        )
        .with_status(
            OrderStatus::from_code(self.estado_pedido),
            RegistrationStatus::from_indicator(&self.indicador_estado),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub estado_pedido: i32,
}

/// Error bodies carry an optional human-readable message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
