//! FIFO stock allocation across inventory batches.
//!
//! Planning is pure: given the batches of one item and a required quantity it
//! decides how much to take from each. Applying a plan happens on the
//! caller's transaction with the batch rows locked, so the read and the
//! decrement cannot interleave with another allocation of the same item.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{inventory::TRANSACTION_OUT, InventoryBatch, InventoryTransaction};

/// Decimal places of the `NUMERIC(14, 4)` batch and transaction columns.
pub const STOCK_SCALE: u32 = 4;

/// Rounds a quantity the way Postgres stores it in a stock column, so a
/// plan and the rows it writes agree to the last digit.
pub fn to_stock_scale(quantity: Decimal) -> Decimal {
    quantity.round_dp_with_strategy(STOCK_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Remaining need at or below this is treated as satisfied.
pub fn tolerance() -> Decimal {
    Decimal::new(1, 4)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchStock {
    pub id: Uuid,
    pub quantity: Decimal,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<&InventoryBatch> for BatchStock {
    fn from(batch: &InventoryBatch) -> Self {
        Self {
            id: batch.id,
            quantity: batch.quantity,
            expiration_date: batch.expiration_date,
            created_at: batch.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draw {
    pub batch_id: Uuid,
    pub taken: Decimal,
    pub remaining_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub draws: Vec<Draw>,
    pub shortfall: Decimal,
}

impl AllocationPlan {
    pub fn allocated(&self) -> Decimal {
        self.draws.iter().map(|d| d.taken).sum()
    }
}

/// Soonest expiry first, undated stock last, then oldest receipt first.
pub fn fifo_order(a: &BatchStock, b: &BatchStock) -> Ordering {
    let by_expiry = match (a.expiration_date, b.expiration_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

pub fn plan_fifo(batches: &[BatchStock], needed: Decimal) -> AllocationPlan {
    let mut candidates: Vec<&BatchStock> = batches
        .iter()
        .filter(|b| b.quantity > Decimal::ZERO)
        .collect();
    candidates.sort_by(|a, b| fifo_order(a, b));

    let mut still_needed = to_stock_scale(needed.max(Decimal::ZERO));
    let mut draws = Vec::new();

    for batch in candidates {
        if still_needed <= tolerance() {
            break;
        }
        let taken = batch.quantity.min(still_needed);
        still_needed -= taken;
        draws.push(Draw {
            batch_id: batch.id,
            taken,
            remaining_after: batch.quantity - taken,
        });
    }

    let shortfall = if still_needed > tolerance() {
        still_needed
    } else {
        Decimal::ZERO
    };

    AllocationPlan { draws, shortfall }
}

/// Outcome of one applied allocation: the audit records written, in
/// consumption order, and whatever could not be covered.
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub item_id: Uuid,
    pub requested: Decimal,
    pub records: Vec<InventoryTransaction>,
    pub shortfall: Decimal,
}

/// Locks the item's non-empty batches in FIFO order for the rest of the
/// transaction and returns them.
pub async fn lock_batches(
    conn: &mut PgConnection,
    item_id: Uuid,
) -> Result<Vec<InventoryBatch>, sqlx::Error> {
    sqlx::query_as::<_, InventoryBatch>(
        r#"
        SELECT * FROM inventory_batches
        WHERE item_id = $1 AND quantity > 0
        ORDER BY expiration_date ASC NULLS LAST, created_at ASC, id ASC
        FOR UPDATE
        "#,
    )
    .bind(item_id)
    .fetch_all(conn)
    .await
}

/// Recomputes the cached stock figure on the item from its batches.
pub async fn refresh_item_stock(conn: &mut PgConnection, item_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE inventory_items
        SET stock = (SELECT COALESCE(SUM(quantity), 0) FROM inventory_batches WHERE item_id = $1)
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Consumes `quantity` of an item FIFO. Shortfall is reported, never
/// consumed; callers that must not under-allocate check sufficiency first
/// on the same transaction.
pub async fn allocate(
    conn: &mut PgConnection,
    item_id: Uuid,
    quantity: Decimal,
    reason: &str,
    operator_name: &str,
) -> Result<Allocation, sqlx::Error> {
    let quantity = to_stock_scale(quantity);
    let batches = lock_batches(&mut *conn, item_id).await?;
    let stock: Vec<BatchStock> = batches.iter().map(BatchStock::from).collect();
    let plan = plan_fifo(&stock, quantity);

    let mut records = Vec::with_capacity(plan.draws.len());
    for draw in &plan.draws {
        sqlx::query("UPDATE inventory_batches SET quantity = quantity - $1 WHERE id = $2")
            .bind(draw.taken)
            .bind(draw.batch_id)
            .execute(&mut *conn)
            .await?;

        let record = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            INSERT INTO inventory_transactions
                (transaction_type, batch_id, item_id, quantity, reason, operator_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(TRANSACTION_OUT)
        .bind(draw.batch_id)
        .bind(item_id)
        .bind(draw.taken)
        .bind(reason)
        .bind(operator_name)
        .fetch_one(&mut *conn)
        .await?;

        records.push(record);
    }

    if !records.is_empty() {
        refresh_item_stock(&mut *conn, item_id).await?;
    }

    log::debug!(
        "Item {}: {} allocated from {} batch(es) for {}",
        item_id,
        plan.allocated(),
        plan.draws.len(),
        reason
    );

    if plan.shortfall > Decimal::ZERO {
        log::warn!(
            "Allocation of {} for item {} left {} uncovered",
            quantity,
            item_id,
            plan.shortfall
        );
    }

    Ok(Allocation {
        item_id,
        requested: quantity,
        records,
        shortfall: plan.shortfall,
    })
}
