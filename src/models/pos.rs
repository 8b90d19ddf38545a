use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PosTable {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub table_id: Uuid,
    pub status: String,
    pub opened_by: String,
    pub payment_method: Option<String>,
    pub total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

pub const TICKET_OPEN: &str = "open";
pub const TICKET_CLOSED: &str = "closed";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketLine {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    // Highest quantity already deducted from stock by a kitchen send
    pub sent_quantity: Decimal,
}

impl TicketLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub table_name: String,
    pub lines: Vec<TicketLine>,
    pub running_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub table_name: String,
    pub items: sqlx::types::Json<serde_json::Value>,
    pub total: Decimal,
    pub payment_method: String,
    pub fiscal_print_status: String,
    pub receipt_file: Option<String>,
    pub operator_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    /// Payment type code understood by the fiscal printer.
    pub fn fiscal_code(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "0",
            PaymentMethod::Card => "1",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TableInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddLine {
    pub product_id: Uuid,
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
}
