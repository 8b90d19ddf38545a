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
    database::{is_unique_violation, AppState},
    error::{AppError, AppResult},
    middleware::require_user,
    models::{rbac, CategoryInput, MenuCategory, Product, ProductUpdate},
    services::activity,
};

const DEFAULT_CATEGORY_KIND: &str = "food";

#[derive(Debug, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_products(
    cookies: Cookies,
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<Product>>> {
    require_user(&cookies, &state, rbac::RECIPES_READ).await?;

    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE ($1 = false OR is_active) ORDER BY category, name",
    )
    .bind(filter.active_only)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(products))
}

pub async fn update_product(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ProductUpdate>,
) -> AppResult<Json<Product>> {
    let user = require_user(&cookies, &state, rbac::PRICING_WRITE).await?;

    if update.price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(AppError::Validation("price cannot be negative".to_string()));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET price = COALESCE($1, price), is_active = COALESCE($2, is_active)
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(update.price)
    .bind(update.is_active)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("product"))?;

    activity::record(
        &state.db,
        &user,
        "PRODUCTS",
        &format!("Updated {}: price {}, active {}", product.name, product.price, product.is_active),
    )
    .await;
    Ok(Json(product))
}

fn category_name(input: &CategoryInput) -> AppResult<String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("category name is required".to_string()));
    }
    Ok(name.to_string())
}

fn map_category_error(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("a menu category with this name already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

pub async fn list_categories(
    cookies: Cookies,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MenuCategory>>> {
    require_user(&cookies, &state, rbac::RECIPES_READ).await?;

    let categories = sqlx::query_as::<_, MenuCategory>("SELECT * FROM menu_categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(categories))
}

pub async fn create_category(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> AppResult<(StatusCode, Json<MenuCategory>)> {
    require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;
    let name = category_name(&input)?;

    let category = sqlx::query_as::<_, MenuCategory>(
        "INSERT INTO menu_categories (name, kind) VALUES ($1, $2) RETURNING *",
    )
    .bind(&name)
    .bind(input.kind.as_deref().unwrap_or(DEFAULT_CATEGORY_KIND))
    .fetch_one(&state.db)
    .await
    .map_err(map_category_error)?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CategoryInput>,
) -> AppResult<Json<MenuCategory>> {
    require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;
    let name = category_name(&input)?;

    let category = sqlx::query_as::<_, MenuCategory>(
        r#"
        UPDATE menu_categories
        SET name = $1, kind = COALESCE($2, kind)
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&input.kind)
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(map_category_error)?
    .ok_or(AppError::NotFound("menu category"))?;

    Ok(Json(category))
}

pub async fn delete_category(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;

    let result = sqlx::query("DELETE FROM menu_categories WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("menu category"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_are_trimmed_and_required() {
        let input = |name: &str| CategoryInput {
            name: name.to_string(),
            kind: None,
        };
        assert_eq!(category_name(&input("  Deserturi ")).unwrap(), "Deserturi");
        assert!(category_name(&input("   ")).is_err());
    }
}
