use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefPrice {
    pub ingredient_id: Uuid,
    pub price_per_unit: Decimal,
    pub vat_rate: Decimal,
    pub supplier_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RefPriceInput {
    pub price_per_unit: Option<Decimal>,
    // Alternative to the net price: VAT-inclusive price
    pub price_with_vat: Option<Decimal>,
    #[serde(default)]
    pub vat_rate: Decimal,
    pub supplier_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SupplierInput {
    pub name: String,
}
