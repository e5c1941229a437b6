//! Stock-keeping items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::query::{PlannerConfig, SortKey};

/// An item held in shop inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    /// Lower-cased name, maintained on write for prefix search.
    #[serde(default)]
    pub name_lower: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Units on hand.
    pub quantity: i64,
    /// Restock when `quantity` drops to this level.
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl InventoryItem {
    pub const NAME: &'static str = "name";
    pub const NAME_LOWER: &'static str = "name_lower";
    pub const SKU: &'static str = "sku";
    pub const CATEGORY: &'static str = "category";
    pub const QUANTITY: &'static str = "quantity";
    pub const REORDER_LEVEL: &'static str = "reorder_level";
    pub const CREATED_AT: &'static str = "created_at";

    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        quantity: i64,
        reorder_level: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            name_lower: name.to_lowercase(),
            name,
            sku: None,
            category: None,
            quantity,
            reorder_level,
            unit_price: 0.0,
            created_at,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Whether stock is at or below the reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

impl Entity for InventoryItem {
    const COLLECTION: &'static str = "inventory";

    fn id(&self) -> &str {
        &self.id
    }

    fn planner_config() -> PlannerConfig {
        PlannerConfig {
            name_search_field: Self::NAME_LOWER.to_string(),
            phone_field: None,
            creation_field: Self::CREATED_AT.to_string(),
            default_sort: vec![SortKey::desc(Self::CREATED_AT)],
            stable_tie_break: SortKey::asc(Self::NAME),
            ..PlannerConfig::default()
        }
    }

    fn text_fields() -> &'static [&'static str] {
        &[Self::NAME, Self::SKU, Self::CATEGORY]
    }
}
