//! Physical stock count. Each counted batch is set to what was found and
//! the signed difference is written as an `ADJUST` transaction.

use std::collections::{BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{inventory::TRANSACTION_ADJUST, BatchCount, InventoryBatch, InventoryTransaction},
    services::allocator::{refresh_item_stock, to_stock_scale},
};

pub const COUNT_REASON: &str = "Inventar Fizic";

/// Differences at or below this are counting noise and left alone.
pub fn count_threshold() -> Decimal {
    Decimal::new(1, 3)
}

#[derive(Debug, Clone, FromRow)]
pub struct CountedBatch {
    #[sqlx(flatten)]
    pub batch: InventoryBatch,
    pub item_name: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    pub batch_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub previous: Decimal,
    pub counted: Decimal,
    pub difference: Decimal,
}

impl Adjustment {
    /// Activity log line, e.g. `Stock correction for Faina: +1.5 kg`.
    pub fn describe(&self) -> String {
        let sign = if self.difference > Decimal::ZERO { "+" } else { "" };
        format!(
            "Stock correction for {}: {}{} {}. Reason: {}",
            self.item_name,
            sign,
            self.difference.normalize(),
            self.unit,
            COUNT_REASON
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountReport {
    pub adjustments: Vec<Adjustment>,
    pub records: Vec<InventoryTransaction>,
}

pub fn validate_counts(counts: &[BatchCount]) -> AppResult<()> {
    if counts.is_empty() {
        return Err(AppError::Validation("no counted batches".to_string()));
    }
    let mut seen = HashSet::new();
    for count in counts {
        if count.counted < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "counted quantity for batch {} cannot be negative",
                count.batch_id
            )));
        }
        if !seen.insert(count.batch_id) {
            return Err(AppError::Validation(format!("batch {} counted twice", count.batch_id)));
        }
    }
    Ok(())
}

/// Batches whose counted quantity differs from the book quantity by more
/// than the threshold, in the order the batches were given.
pub fn adjustments(batches: &[CountedBatch], counts: &HashMap<Uuid, Decimal>) -> Vec<Adjustment> {
    batches
        .iter()
        .filter_map(|b| {
            let counted = to_stock_scale(*counts.get(&b.batch.id)?);
            let difference = counted - b.batch.quantity;
            (difference.abs() > count_threshold()).then(|| Adjustment {
                batch_id: b.batch.id,
                item_id: b.batch.item_id,
                item_name: b.item_name.clone(),
                unit: b.unit.clone(),
                previous: b.batch.quantity,
                counted,
                difference,
            })
        })
        .collect()
}

async fn lock_counted(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<CountedBatch>, sqlx::Error> {
    sqlx::query_as::<_, CountedBatch>(
        r#"
        SELECT b.*, i.name AS item_name, i.unit
        FROM inventory_batches b
        JOIN inventory_items i ON i.id = b.item_id
        WHERE b.id = ANY($1)
        ORDER BY b.item_id, b.id
        FOR UPDATE OF b
        "#,
    )
    .bind(ids)
    .fetch_all(conn)
    .await
}

/// Applies a count on the caller's transaction.
pub async fn apply(
    conn: &mut PgConnection,
    counts: &[BatchCount],
    operator_name: &str,
) -> AppResult<CountReport> {
    validate_counts(counts)?;

    let ids: Vec<Uuid> = counts.iter().map(|c| c.batch_id).collect();
    let batches = lock_counted(&mut *conn, &ids).await?;
    if batches.len() != ids.len() {
        return Err(AppError::NotFound("batch"));
    }

    let by_batch: HashMap<Uuid, Decimal> = counts.iter().map(|c| (c.batch_id, c.counted)).collect();
    let adjustments = adjustments(&batches, &by_batch);

    let mut records = Vec::with_capacity(adjustments.len());
    let mut touched = BTreeSet::new();
    for adjustment in &adjustments {
        sqlx::query("UPDATE inventory_batches SET quantity = $1 WHERE id = $2")
            .bind(adjustment.counted)
            .bind(adjustment.batch_id)
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
        .bind(TRANSACTION_ADJUST)
        .bind(adjustment.batch_id)
        .bind(adjustment.item_id)
        .bind(adjustment.difference)
        .bind(COUNT_REASON)
        .bind(operator_name)
        .fetch_one(&mut *conn)
        .await?;

        records.push(record);
        touched.insert(adjustment.item_id);
    }

    for item_id in touched {
        refresh_item_stock(&mut *conn, item_id).await?;
    }

    Ok(CountReport { adjustments, records })
}
