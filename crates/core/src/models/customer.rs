//! Shop customers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::query::{PlannerConfig, SortKey};

/// Pricing tier of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerType {
    Retailer,
    Wholesaler,
}

/// A customer of the shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lower-cased name, maintained on write for prefix search.
    #[serde(default)]
    pub name_lower: String,
    /// Phone number, digits only.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub customer_type: CustomerType,
    /// Outstanding balance in the shop currency.
    #[serde(default)]
    pub balance: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub const NAME: &'static str = "name";
    pub const NAME_LOWER: &'static str = "name_lower";
    pub const PHONE: &'static str = "phone";
    pub const EMAIL: &'static str = "email";
    pub const TYPE: &'static str = "type";
    pub const CREATED_AT: &'static str = "created_at";

    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        customer_type: CustomerType,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            name_lower: name.to_lowercase(),
            name,
            phone: None,
            email: None,
            customer_type,
            balance: 0.0,
            created_at,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl Entity for Customer {
    const COLLECTION: &'static str = "customers";

    fn id(&self) -> &str {
        &self.id
    }

    fn planner_config() -> PlannerConfig {
        PlannerConfig {
            name_search_field: Self::NAME_LOWER.to_string(),
            phone_field: Some(Self::PHONE.to_string()),
            creation_field: Self::CREATED_AT.to_string(),
            default_sort: vec![SortKey::desc(Self::CREATED_AT)],
            stable_tie_break: SortKey::asc(Self::NAME),
            ..PlannerConfig::default()
        }
    }

    fn text_fields() -> &'static [&'static str] {
        &[Self::NAME, Self::PHONE, Self::EMAIL]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn customer_document_roundtrip_keeps_wire_names() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let customer = Customer::new("c-1", "Meera Stores", CustomerType::Wholesaler, created)
            .with_phone("9876543210");

        let doc = customer.to_document().unwrap();
        assert_eq!(doc.id, "c-1");
        assert_eq!(doc.fields["type"], json!("Wholesaler"));
        assert_eq!(doc.fields["name_lower"], json!("meera stores"));
        assert_eq!(doc.fields["created_at"], json!(1_700_000_000_000i64));

        assert_eq!(Customer::from_document(&doc).unwrap(), customer);
    }

    #[test]
    fn decoding_error_reports_collection() {
        let doc = Document::from_value("c-9", json!({"name": "No Type"})).unwrap();
        let err = Customer::from_document(&doc).unwrap_err();
        assert!(err.to_string().contains("customers/c-9"));
    }
}
