use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    // Cached total of the item's batch quantities
    pub stock: Decimal,
    pub vat_rate: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryCategory {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryBatch {
    pub id: Uuid,
    pub item_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub batch_number: Option<String>,
    pub quantity: Decimal,
    pub initial_quantity: Decimal,
    pub expiration_date: Option<NaiveDate>,
    pub purchase_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of stock moved in or out of a batch, or of a count
/// correcting it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub transaction_type: String,
    pub batch_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub reason: String,
    pub operator_name: String,
    pub created_at: DateTime<Utc>,
}

pub const TRANSACTION_IN: &str = "IN";
pub const TRANSACTION_OUT: &str = "OUT";
// Signed correction from a physical stock count
pub const TRANSACTION_ADJUST: &str = "ADJUST";

#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub vat_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveBatch {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub supplier_id: Option<Uuid>,
    pub batch_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub purchase_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCount {
    pub batch_id: Uuid,
    pub counted: Decimal,
}

/// Quantities found on the shelves during a physical count.
#[derive(Debug, Deserialize)]
pub struct StockCount {
    pub counts: Vec<BatchCount>,
}
