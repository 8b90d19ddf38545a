//! Point of sale: tables, open tickets, kitchen sends and checkout.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use sqlx::{types::Json as SqlJson, PgConnection};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::{is_foreign_key_violation, is_unique_violation, AppState},
    error::{AppError, AppResult},
    middleware::{require_user, CurrentUser},
    models::{
        pos::{TICKET_CLOSED, TICKET_OPEN},
        rbac, AddLine, CheckoutRequest, Order, PosTable, Product, SetQuantity, TableInput, Ticket,
        TicketLine, TicketView,
    },
    services::{
        activity,
        kitchen::{self, KitchenReport},
        receipt::{self, ReceiptLine},
    },
};

pub const FISCAL_PENDING: &str = "pending";
pub const FISCAL_PRINTED: &str = "printed";

pub fn ticket_total(lines: &[TicketLine]) -> Decimal {
    lines.iter().map(TicketLine::line_total).sum()
}

/// Line quantities are whole portions of at least one.
pub fn validate_quantity(quantity: Decimal) -> AppResult<()> {
    if quantity < Decimal::ONE || !quantity.fract().is_zero() {
        return Err(AppError::Validation("quantity must be a whole number of at least 1".to_string()));
    }
    Ok(())
}

/// Snapshot of the sold lines stored on the order.
pub fn order_items(lines: &[TicketLine]) -> serde_json::Value {
    serde_json::Value::Array(
        lines
            .iter()
            .map(|l| {
                json!({
                    "product_id": l.product_id,
                    "name": l.product_name,
                    "price": l.unit_price,
                    "quantity": l.quantity,
                })
            })
            .collect(),
    )
}

pub async fn list_tables(cookies: Cookies, State(state): State<AppState>) -> AppResult<Json<Vec<PosTable>>> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let tables = sqlx::query_as::<_, PosTable>("SELECT * FROM pos_tables WHERE is_active ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(tables))
}

pub async fn create_table(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<TableInput>,
) -> AppResult<(StatusCode, Json<PosTable>)> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("table name is required".to_string()));
    }

    // A deactivated table with the same name comes back instead of clashing
    let table = sqlx::query_as::<_, PosTable>(
        r#"
        INSERT INTO pos_tables (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET is_active = true
        WHERE pos_tables.is_active = false
        RETURNING *
        "#,
    )
    .bind(name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("table {} already exists", name)))?;

    Ok((StatusCode::CREATED, Json(table)))
}

pub async fn delete_table(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let open = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tickets WHERE table_id = $1 AND status = $2",
    )
    .bind(id)
    .bind(TICKET_OPEN)
    .fetch_one(&state.db)
    .await?;
    if open > 0 {
        return Err(AppError::Conflict("table has an open ticket".to_string()));
    }

    let deleted = sqlx::query("DELETE FROM pos_tables WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await;

    let affected = match deleted {
        Ok(result) => result.rows_affected(),
        // Past tickets still reference it; hide it instead
        Err(e) if is_foreign_key_violation(&e) => sqlx::query("UPDATE pos_tables SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(&state.db)
            .await?
            .rows_affected(),
        Err(e) => return Err(e.into()),
    };

    if affected == 0 {
        return Err(AppError::NotFound("table"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_view(conn: &mut PgConnection, ticket: Ticket) -> AppResult<TicketView> {
    let table_name = sqlx::query_scalar::<_, String>("SELECT name FROM pos_tables WHERE id = $1")
        .bind(ticket.table_id)
        .fetch_one(&mut *conn)
        .await?;

    let lines = sqlx::query_as::<_, TicketLine>(
        "SELECT * FROM ticket_lines WHERE ticket_id = $1 ORDER BY product_name, id",
    )
    .bind(ticket.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TicketView {
        running_total: ticket_total(&lines),
        ticket,
        table_name,
        lines,
    })
}

/// Locks an open ticket for the rest of the transaction.
async fn lock_open_ticket(conn: &mut PgConnection, ticket_id: Uuid) -> AppResult<Ticket> {
    let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 FOR UPDATE")
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("ticket"))?;

    if ticket.status != TICKET_OPEN {
        return Err(AppError::Conflict("ticket is already closed".to_string()));
    }
    Ok(ticket)
}

/// The table's open ticket, opened now if there is none.
pub async fn open_ticket(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(table_id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    let user = require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let mut tx = state.db.begin().await?;

    sqlx::query_scalar::<_, Uuid>("SELECT id FROM pos_tables WHERE id = $1 AND is_active FOR UPDATE")
        .bind(table_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("table"))?;

    let existing = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE table_id = $1 AND status = $2")
        .bind(table_id)
        .bind(TICKET_OPEN)
        .fetch_optional(&mut *tx)
        .await?;

    let ticket = match existing {
        Some(ticket) => ticket,
        None => {
            sqlx::query_as::<_, Ticket>(
                "INSERT INTO tickets (table_id, status, opened_by) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(table_id)
            .bind(TICKET_OPEN)
            .bind(&user.name)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let view = load_view(&mut tx, ticket).await?;
    tx.commit().await?;

    Ok(Json(view))
}

pub async fn get_ticket(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let mut conn = state.db.acquire().await?;
    let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("ticket"))?;

    Ok(Json(load_view(&mut conn, ticket).await?))
}

/// Adds portions of a product; a product already on the ticket gets its
/// line raised instead of a second line.
pub async fn add_line(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(input): Json<AddLine>,
) -> AppResult<Json<TicketView>> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;
    let quantity = input.quantity.unwrap_or(Decimal::ONE);
    validate_quantity(quantity)?;

    let mut tx = state.db.begin().await?;
    let ticket = lock_open_ticket(&mut tx, ticket_id).await?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND is_active")
        .bind(input.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("active product"))?;

    let raised = sqlx::query(
        "UPDATE ticket_lines SET quantity = quantity + $1 WHERE ticket_id = $2 AND product_id = $3",
    )
    .bind(quantity)
    .bind(ticket.id)
    .bind(product.id)
    .execute(&mut *tx)
    .await?;

    if raised.rows_affected() == 0 {
        sqlx::query(
            r#"
            INSERT INTO ticket_lines (ticket_id, product_id, product_name, unit_price, quantity)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket.id)
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
    }

    let view = load_view(&mut tx, ticket).await?;
    tx.commit().await?;
    Ok(Json(view))
}

pub async fn set_quantity(
    cookies: Cookies,
    State(state): State<AppState>,
    Path((ticket_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<SetQuantity>,
) -> AppResult<Json<TicketView>> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;
    validate_quantity(input.quantity)?;

    let mut tx = state.db.begin().await?;
    let ticket = lock_open_ticket(&mut tx, ticket_id).await?;

    let updated = sqlx::query("UPDATE ticket_lines SET quantity = $1 WHERE id = $2 AND ticket_id = $3")
        .bind(input.quantity)
        .bind(line_id)
        .bind(ticket.id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("ticket line"));
    }

    let view = load_view(&mut tx, ticket).await?;
    tx.commit().await?;
    Ok(Json(view))
}

/// Only lines the kitchen has not seen can be removed.
pub async fn remove_line(
    cookies: Cookies,
    State(state): State<AppState>,
    Path((ticket_id, line_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<TicketView>> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let mut tx = state.db.begin().await?;
    let ticket = lock_open_ticket(&mut tx, ticket_id).await?;

    let sent = sqlx::query_scalar::<_, Decimal>(
        "SELECT sent_quantity FROM ticket_lines WHERE id = $1 AND ticket_id = $2",
    )
    .bind(line_id)
    .bind(ticket.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("ticket line"))?;

    if sent > Decimal::ZERO {
        return Err(AppError::Conflict("line was already sent to the kitchen".to_string()));
    }

    sqlx::query("DELETE FROM ticket_lines WHERE id = $1")
        .bind(line_id)
        .execute(&mut *tx)
        .await?;

    let view = load_view(&mut tx, ticket).await?;
    tx.commit().await?;
    Ok(Json(view))
}

async fn table_name(conn: &mut PgConnection, table_id: Uuid) -> AppResult<String> {
    Ok(sqlx::query_scalar::<_, String>("SELECT name FROM pos_tables WHERE id = $1")
        .bind(table_id)
        .fetch_one(conn)
        .await?)
}

async fn record_send(state: &AppState, user: &CurrentUser, table: &str, report: &KitchenReport) {
    if report.is_empty() {
        return;
    }
    activity::record(
        &state.db,
        user,
        "POS",
        &format!(
            "Sent {} line(s) from {} to the kitchen, {} shortfall(s)",
            report.sent.len(),
            table,
            report.shortfalls.len()
        ),
    )
    .await;
}

pub async fn send_to_kitchen(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Json<KitchenReport>> {
    let user = require_user(&cookies, &state, rbac::POS_OPERATE).await?;

    let mut tx = state.db.begin().await?;
    let ticket = lock_open_ticket(&mut tx, ticket_id).await?;
    let table = table_name(&mut tx, ticket.table_id).await?;

    let report = kitchen::send_ticket(&mut tx, ticket.id, &table, &user).await?;
    tx.commit().await?;

    record_send(&state, &user, &table, &report).await;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub kitchen: KitchenReport,
}

/// Sends whatever the kitchen has not seen, closes the ticket, records the
/// order and hands a receipt file to the fiscal printer.
pub async fn checkout(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    let user = require_user(&cookies, &state, rbac::POS_OPERATE).await?;
    let payment = request.payment_method;

    let mut tx = state.db.begin().await?;
    let ticket = lock_open_ticket(&mut tx, ticket_id).await?;
    let table = table_name(&mut tx, ticket.table_id).await?;

    let kitchen_report = kitchen::send_ticket(&mut tx, ticket.id, &table, &user).await?;

    let lines = sqlx::query_as::<_, TicketLine>(
        "SELECT * FROM ticket_lines WHERE ticket_id = $1 ORDER BY product_name, id",
    )
    .bind(ticket.id)
    .fetch_all(&mut *tx)
    .await?;
    if lines.is_empty() {
        return Err(AppError::Validation("cannot check out an empty ticket".to_string()));
    }

    let receipt_lines: Vec<ReceiptLine> = lines.iter().map(ReceiptLine::from).collect();
    let total = receipt::total(&receipt_lines);

    sqlx::query(
        r#"
        UPDATE tickets
        SET status = $1, payment_method = $2, total = $3, closed_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(TICKET_CLOSED)
    .bind(payment.as_str())
    .bind(total)
    .bind(ticket.id)
    .execute(&mut *tx)
    .await?;

    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders
            (ticket_id, table_name, items, total, payment_method, fiscal_print_status, operator_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(ticket.id)
    .bind(&table)
    .bind(SqlJson(order_items(&lines)))
    .bind(total)
    .bind(payment.as_str())
    .bind(FISCAL_PENDING)
    .bind(&user.name)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("ticket was already checked out".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    tx.commit().await?;
    record_send(&state, &user, &table, &kitchen_report).await;

    // The sale stands even if the printer file cannot be written; the order
    // stays pending for a reprint.
    let contents = receipt::render(&receipt_lines, payment, &state.config.receipt);
    let order = match receipt::write_receipt(&state.config.receipt_dir, order.id, &contents).await {
        Ok(file) => {
            sqlx::query_as::<_, Order>(
                "UPDATE orders SET fiscal_print_status = $1, receipt_file = $2 WHERE id = $3 RETURNING *",
            )
            .bind(FISCAL_PRINTED)
            .bind(&file)
            .bind(order.id)
            .fetch_one(&state.db)
            .await?
        }
        Err(e) => {
            log::error!("Receipt for order {} could not be written: {}", order.id, e);
            order
        }
    };

    activity::record(
        &state.db,
        &user,
        "POS",
        &format!("Closed {} for {} paid by {}", table, order.total, payment.as_str()),
    )
    .await;
    log::info!("{} checked out ticket {} for {}", user.name, ticket.id, order.total);

    Ok(Json(CheckoutResponse {
        order,
        kitchen: kitchen_report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, price: i64, qty: i64) -> TicketLine {
        TicketLine {
            id: Uuid::new_v4(),
            ticket_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            product_name: name.to_string(),
            unit_price: Decimal::new(price, 2),
            quantity: Decimal::new(qty, 0),
            sent_quantity: Decimal::ZERO,
        }
    }

    #[test]
    fn total_sums_line_totals() {
        let lines = vec![line("Ciorba", 1850, 2), line("Paine", 300, 3)];
        assert_eq!(ticket_total(&lines), Decimal::new(4600, 2));
    }

    #[test]
    fn quantity_is_whole_and_at_least_one() {
        assert!(validate_quantity(Decimal::ONE).is_ok());
        assert!(validate_quantity(Decimal::new(4, 0)).is_ok());
        assert!(validate_quantity(Decimal::ZERO).is_err());
        assert!(validate_quantity(Decimal::new(15, 1)).is_err());
    }

    #[test]
    fn order_items_snapshot_name_price_and_quantity() {
        let items = order_items(&[line("Papanasi", 2500, 1)]);
        let first = &items.as_array().unwrap()[0];
        assert_eq!(first["name"], "Papanasi");
        assert_eq!(first["quantity"], json!(Decimal::ONE));
    }
}
