use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::{is_foreign_key_violation, is_unique_violation, AppState},
    error::{AppError, AppResult},
    middleware::require_user,
    models::{
        inventory::TRANSACTION_IN, rbac, InventoryBatch, InventoryCategory, InventoryItem,
        InventoryTransaction, ItemInput, ReceiveBatch, StockCount,
    },
    services::{
        activity,
        allocator::refresh_item_stock,
        forecast::{self, ForecastLine, PlannedSale},
        stock_count::{self, CountReport},
    },
};

/// Shown until the first category is stored.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["Materii Prime", "Ambalaje", "Bauturi", "Obiecte Inventar"];

fn validate_item(input: &ItemInput) -> AppResult<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("item name is required".to_string()));
    }
    if input.unit.trim().is_empty() {
        return Err(AppError::Validation("unit is required".to_string()));
    }
    if input.vat_rate.is_some_and(|v| v < Decimal::ZERO) {
        return Err(AppError::Validation("VAT rate cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn list_items(cookies: Cookies, State(state): State<AppState>) -> AppResult<Json<Vec<InventoryItem>>> {
    require_user(&cookies, &state, rbac::INVENTORY_READ).await?;

    let items = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(items))
}

pub async fn create_item(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<ItemInput>,
) -> AppResult<(StatusCode, Json<InventoryItem>)> {
    let user = require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;
    validate_item(&input)?;

    let item = sqlx::query_as::<_, InventoryItem>(
        r#"
        INSERT INTO inventory_items (name, category, unit, vat_rate)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(input.name.trim())
    .bind(&input.category)
    .bind(input.unit.trim())
    .bind(input.vat_rate)
    .fetch_one(&state.db)
    .await?;

    activity::record(&state.db, &user, "INVENTORY", &format!("Created item {}", item.name)).await;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ItemInput>,
) -> AppResult<Json<InventoryItem>> {
    require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;
    validate_item(&input)?;

    let item = sqlx::query_as::<_, InventoryItem>(
        r#"
        UPDATE inventory_items
        SET name = $1, category = $2, unit = $3, vat_rate = $4
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(input.name.trim())
    .bind(&input.category)
    .bind(input.unit.trim())
    .bind(input.vat_rate)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("inventory item"))?;

    Ok(Json(item))
}

pub async fn delete_item(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;

    let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict("item is still used by recipes or stock records".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("inventory item"));
    }

    activity::record(&state.db, &user, "INVENTORY", &format!("Deleted item {}", id)).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_categories(
    cookies: Cookies,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<String>>> {
    require_user(&cookies, &state, rbac::INVENTORY_READ).await?;

    let stored = sqlx::query_as::<_, InventoryCategory>("SELECT * FROM inventory_categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(category_names(stored)))
}

fn category_names(stored: Vec<InventoryCategory>) -> Vec<String> {
    if stored.is_empty() {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        stored.into_iter().map(|c| c.name).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryName {
    pub name: String,
}

pub async fn create_category(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<CategoryName>,
) -> AppResult<(StatusCode, Json<InventoryCategory>)> {
    require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("category name is required".to_string()));
    }

    let category = sqlx::query_as::<_, InventoryCategory>(
        "INSERT INTO inventory_categories (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("category {} already exists", name))
        } else {
            AppError::Database(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;

    let result = sqlx::query("DELETE FROM inventory_categories WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("inventory category"));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn validate_receipt(input: &ReceiveBatch) -> AppResult<()> {
    if input.quantity <= Decimal::ZERO {
        return Err(AppError::Validation("received quantity must be greater than zero".to_string()));
    }
    if input.purchase_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(AppError::Validation("purchase price cannot be negative".to_string()));
    }
    Ok(())
}

/// Goods reception: a new batch plus its `IN` record.
pub async fn receive_batch(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<ReceiveBatch>,
) -> AppResult<(StatusCode, Json<InventoryBatch>)> {
    let user = require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;
    validate_receipt(&input)?;

    let mut tx = state.db.begin().await?;

    let batch = sqlx::query_as::<_, InventoryBatch>(
        r#"
        INSERT INTO inventory_batches
            (item_id, supplier_id, batch_number, quantity, initial_quantity, expiration_date, purchase_price)
        VALUES ($1, $2, $3, $4, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(input.item_id)
    .bind(input.supplier_id)
    .bind(&input.batch_number)
    .bind(input.quantity)
    .bind(input.expiration_date)
    .bind(input.purchase_price)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::Validation("unknown item or supplier".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    let reason = match &input.batch_number {
        Some(number) => format!("Reception batch {}", number),
        None => "Reception".to_string(),
    };

    sqlx::query(
        r#"
        INSERT INTO inventory_transactions
            (transaction_type, batch_id, item_id, quantity, reason, operator_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(TRANSACTION_IN)
    .bind(batch.id)
    .bind(batch.item_id)
    .bind(batch.quantity)
    .bind(&reason)
    .bind(&user.name)
    .execute(&mut *tx)
    .await?;

    refresh_item_stock(&mut tx, batch.item_id).await?;
    tx.commit().await?;

    activity::record(
        &state.db,
        &user,
        "INVENTORY",
        &format!("Received {} of item {}", batch.quantity, batch.item_id),
    )
    .await;
    log::info!("{} received batch {} for item {}", user.name, batch.id, batch.item_id);

    Ok((StatusCode::CREATED, Json(batch)))
}

/// Physical count: sets each counted batch to what is on the shelf.
pub async fn adjust_stock(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<StockCount>,
) -> AppResult<Json<CountReport>> {
    let user = require_user(&cookies, &state, rbac::INVENTORY_WRITE).await?;

    let mut tx = state.db.begin().await?;
    let report = stock_count::apply(&mut tx, &input.counts, &user.name).await?;
    tx.commit().await?;

    for adjustment in &report.adjustments {
        activity::record(&state.db, &user, "INVENTORY", &adjustment.describe()).await;
    }
    log::info!(
        "{} counted {} batch(es), {} adjusted",
        user.name,
        input.counts.len(),
        report.adjustments.len()
    );

    Ok(Json(report))
}

pub async fn list_batches(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryBatch>>> {
    require_user(&cookies, &state, rbac::INVENTORY_READ).await?;

    let batches = sqlx::query_as::<_, InventoryBatch>(
        r#"
        SELECT * FROM inventory_batches
        WHERE item_id = $1
        ORDER BY expiration_date ASC NULLS LAST, created_at ASC
        "#,
    )
    .bind(item_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(batches))
}

#[derive(Debug, Deserialize)]
pub struct TransactionFilter {
    pub item_id: Option<Uuid>,
    pub limit: Option<i64>,
}

pub async fn list_transactions(
    cookies: Cookies,
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    require_user(&cookies, &state, rbac::INVENTORY_READ).await?;

    let limit = filter.limit.unwrap_or(200).clamp(1, 1000);
    let transactions = sqlx::query_as::<_, InventoryTransaction>(
        r#"
        SELECT * FROM inventory_transactions
        WHERE ($1::uuid IS NULL OR item_id = $1)
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(filter.item_id)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(transactions))
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub items: Vec<PlannedSale>,
}

pub async fn consumption_forecast(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(request): Json<ForecastRequest>,
) -> AppResult<Json<Vec<ForecastLine>>> {
    require_user(&cookies, &state, rbac::INVENTORY_READ).await?;
    Ok(Json(forecast::forecast(&state.db, &request.items).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_category_table_yields_defaults() {
        assert_eq!(category_names(Vec::new()).len(), DEFAULT_CATEGORIES.len());

        let stored = vec![InventoryCategory {
            id: Uuid::new_v4(),
            name: "Lactate".to_string(),
        }];
        assert_eq!(category_names(stored), vec!["Lactate".to_string()]);
    }

    #[test]
    fn receipts_need_positive_quantity() {
        let input = |qty: i64| ReceiveBatch {
            item_id: Uuid::new_v4(),
            quantity: Decimal::new(qty, 0),
            supplier_id: None,
            batch_number: None,
            expiration_date: None,
            purchase_price: None,
        };
        assert!(validate_receipt(&input(0)).is_err());
        assert!(validate_receipt(&input(-3)).is_err());
        assert!(validate_receipt(&input(3)).is_ok());
    }

    #[test]
    fn items_need_name_and_unit() {
        let item = ItemInput {
            name: "  ".to_string(),
            category: None,
            unit: "kg".to_string(),
            vat_rate: None,
        };
        assert!(validate_item(&item).is_err());
        assert!(validate_item(&ItemInput { name: "Zahar".to_string(), ..item }).is_ok());
    }
}
