use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use askama::Template;
use chrono::Utc;
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::{is_unique_violation, AppState},
    error::{AppError, AppResult},
    middleware::require_user,
    models::{rbac, RefPrice, RefPriceInput, Supplier, SupplierInput},
    services::{
        activity,
        costing::{self, CostReport, PriceListRow},
        recipes,
    },
    utils::text::strip_diacritics,
};

#[derive(Template)]
#[template(path = "pricing/price_list.html")]
struct PriceListTemplate {
    generated: String,
    scope: String,
    rows: Vec<PriceListRow>,
}

pub async fn list_ref_prices(cookies: Cookies, State(state): State<AppState>) -> AppResult<Json<Vec<RefPrice>>> {
    require_user(&cookies, &state, rbac::PRICING_READ).await?;

    let prices = sqlx::query_as::<_, RefPrice>("SELECT * FROM recipe_ref_prices ORDER BY updated_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(prices))
}

pub async fn upsert_ref_price(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
    Json(input): Json<RefPriceInput>,
) -> AppResult<Json<RefPrice>> {
    let user = require_user(&cookies, &state, rbac::PRICING_WRITE).await?;

    let price = costing::upsert_ref_price(&state.db, ingredient_id, &input).await?;

    activity::record(
        &state.db,
        &user,
        "PRICING",
        &format!(
            "Reference price for {} set to {} + {}% VAT",
            ingredient_id, price.price_per_unit, price.vat_rate
        ),
    )
    .await;
    Ok(Json(price))
}

pub async fn list_suppliers(cookies: Cookies, State(state): State<AppState>) -> AppResult<Json<Vec<Supplier>>> {
    require_user(&cookies, &state, rbac::PRICING_READ).await?;

    let suppliers = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(suppliers))
}

pub async fn create_supplier(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<SupplierInput>,
) -> AppResult<(StatusCode, Json<Supplier>)> {
    require_user(&cookies, &state, rbac::PRICING_WRITE).await?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("supplier name is required".to_string()));
    }

    let supplier = sqlx::query_as::<_, Supplier>("INSERT INTO suppliers (name) VALUES ($1) RETURNING *")
        .bind(name)
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("supplier {} already exists", name))
            } else {
                AppError::Database(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(supplier)))
}

#[derive(Debug, Deserialize)]
pub struct CostRequest {
    pub recipe_ids: Vec<Uuid>,
}

/// Per-portion cost of the selected recipes at reference prices.
pub async fn recipe_cost(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(request): Json<CostRequest>,
) -> AppResult<Json<CostReport>> {
    require_user(&cookies, &state, rbac::PRICING_READ).await?;

    let selected: HashSet<Uuid> = request.recipe_ids.into_iter().collect();
    let recipes: Vec<_> = recipes::list_recipes(&state.db)
        .await?
        .into_iter()
        .filter(|r| selected.contains(&r.recipe.id))
        .collect();
    let prices = costing::load_ref_prices(&state.db).await?;

    Ok(Json(costing::cost_report(&recipes, &prices)))
}

#[derive(Debug, Deserialize)]
pub struct PriceListQuery {
    /// Comma separated recipe ids; the whole list when absent.
    pub recipes: Option<String>,
}

pub fn parse_recipe_ids(raw: Option<&str>) -> AppResult<Option<HashSet<Uuid>>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|id| {
            Uuid::parse_str(id.trim()).map_err(|_| AppError::Validation(format!("invalid recipe id {}", id.trim())))
        })
        .collect::<AppResult<HashSet<Uuid>>>()
        .map(Some)
}

pub fn attachment_name(date: &str) -> String {
    format!(
        "inline; filename=\"lista-preturi-{date}.html\"; filename*=UTF-8''{}",
        urlencoding::encode(&format!("lista-preturi-{date}.html"))
    )
}

/// Printable price list, limited to the ingredients of the chosen recipes
/// when `?recipes=` is given.
pub async fn price_list(
    cookies: Cookies,
    State(state): State<AppState>,
    Query(query): Query<PriceListQuery>,
) -> AppResult<Response> {
    require_user(&cookies, &state, rbac::PRICING_READ).await?;

    let selected = parse_recipe_ids(query.recipes.as_deref())?;
    let (only, scope) = match &selected {
        Some(ids) => {
            let chosen: Vec<_> = recipes::list_recipes(&state.db)
                .await?
                .into_iter()
                .filter(|r| ids.contains(&r.recipe.id))
                .collect();
            let names: Vec<String> = chosen
                .iter()
                .map(|r| strip_diacritics(&r.recipe.name))
                .collect();
            (Some(costing::ingredients_of(&chosen)), names.join(", "))
        }
        None => (None, "All ingredients".to_string()),
    };

    let entries = costing::price_list_entries(&state.db).await?;
    let rows = costing::price_list_rows(&entries, only.as_ref());

    let now = Utc::now();
    let html = PriceListTemplate {
        generated: now.format("%d.%m.%Y %H:%M").to_string(),
        scope,
        rows,
    }
    .render()?;

    Ok((
        [(header::CONTENT_DISPOSITION, attachment_name(&now.format("%Y-%m-%d").to_string()))],
        Html(html),
    )
        .into_response())
}
