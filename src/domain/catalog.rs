use serde::{Deserialize, Serialize};

// ============================================================================
// Reference Data - Meal Types and Delivery Locations
// ============================================================================

pub const UNKNOWN_NAME: &str = "Desconocido";
pub const NONE_NAME: &str = "Ninguno";

/// An (id, display name) pair from the external catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
}

impl CatalogEntry {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

pub type MealType = CatalogEntry;
pub type DeliveryLocation = CatalogEntry;

/// Resolve an id to its display name. Never fails.
pub fn lookup(id: Option<u32>, entries: &[CatalogEntry]) -> &str {
    match id {
        None => NONE_NAME,
        Some(id) => entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
            .unwrap_or(UNKNOWN_NAME),
    }
}

/// Reference data loaded once per session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub meal_types: Vec<MealType>,
    pub locations: Vec<DeliveryLocation>,
}

impl Catalog {
    pub fn new(meal_types: Vec<MealType>, locations: Vec<DeliveryLocation>) -> Self {
        Self { meal_types, locations }
    }

    /// The worksite's standard catalog
    pub fn worksite_default() -> Self {
        Self {
            meal_types: vec![
                CatalogEntry::new(1, "Normal"),
                CatalogEntry::new(2, "Dieta"),
                CatalogEntry::new(3, "Frio"),
            ],
            locations: vec![
                CatalogEntry::new(1, "Mina"),
                CatalogEntry::new(2, "Almacen"),
                CatalogEntry::new(3, "Hotel"),
            ],
        }
    }

    pub fn meal_type_name(&self, id: Option<u32>) -> &str {
        lookup(id, &self.meal_types)
    }

    pub fn location_name(&self, id: Option<u32>) -> &str {
        lookup(id, &self.locations)
    }
}
