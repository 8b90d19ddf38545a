pub mod auth;
pub mod inventory;
pub mod pos;
pub mod pricing;
pub mod products;
pub mod recipes;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use askama::Template;
use rust_decimal::Decimal;
use tower_cookies::Cookies;

use crate::{
    database::AppState,
    error::AppResult,
    filters,
    middleware::get_current_user,
    models::rbac,
};

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    user_name: String,
    role: String,
    item_count: i64,
    recipe_count: i64,
    open_tickets: i64,
    sales_today: Decimal,
    can_inventory: bool,
    can_recipes: bool,
    can_pos: bool,
    can_pricing: bool,
}

pub async fn dashboard(cookies: Cookies, State(state): State<AppState>) -> AppResult<Response> {
    let Some(user) = get_current_user(&cookies, &state).await else {
        return Ok(Redirect::to("/login").into_response());
    };

    let item_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inventory_items")
        .fetch_one(&state.db)
        .await?;

    let recipe_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes")
        .fetch_one(&state.db)
        .await?;

    let open_tickets = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tickets WHERE status = 'open'")
        .fetch_one(&state.db)
        .await?;

    let sales_today = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(total), 0) FROM orders WHERE created_at >= date_trunc('day', NOW())",
    )
    .fetch_one(&state.db)
    .await?;

    let template = DashboardTemplate {
        can_inventory: user.can(rbac::INVENTORY_READ),
        can_recipes: user.can(rbac::RECIPES_READ),
        can_pos: user.can(rbac::POS_OPERATE),
        can_pricing: user.can(rbac::PRICING_READ),
        user_name: user.name,
        role: user.role,
        item_count,
        recipe_count,
        open_tickets,
        sales_today,
    };

    Ok(Html(template.render()?).into_response())
}
