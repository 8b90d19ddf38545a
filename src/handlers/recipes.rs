use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::AppState,
    error::{AppError, AppResult},
    middleware::require_user,
    models::{rbac, Recipe, RecipeInput, RecipeWithIngredients},
    services::{
        activity,
        approval::{self, ApprovalOutcome},
        production::{self, ProductionReport},
        recipes,
        sufficiency::IngredientRequirement,
    },
};

#[derive(Debug, Deserialize)]
pub struct PortionsRequest {
    pub portions: Decimal,
}

pub async fn list(cookies: Cookies, State(state): State<AppState>) -> AppResult<Json<Vec<RecipeWithIngredients>>> {
    require_user(&cookies, &state, rbac::RECIPES_READ).await?;
    Ok(Json(recipes::list_recipes(&state.db).await?))
}

pub async fn get(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecipeWithIngredients>> {
    require_user(&cookies, &state, rbac::RECIPES_READ).await?;
    Ok(Json(recipes::find_recipe(&state.db, id).await?))
}

pub async fn create(
    cookies: Cookies,
    State(state): State<AppState>,
    Json(input): Json<RecipeInput>,
) -> AppResult<(StatusCode, Json<Recipe>)> {
    let user = require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;
    let input = input.normalized().map_err(AppError::Validation)?;

    let recipe = recipes::create_recipe(&state.db, input).await?;

    activity::record(&state.db, &user, "RECIPES", &format!("Created recipe {}", recipe.name)).await;
    Ok((StatusCode::CREATED, Json(recipe)))
}

pub async fn update(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RecipeInput>,
) -> AppResult<Json<Recipe>> {
    let user = require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;
    let input = input.normalized().map_err(AppError::Validation)?;

    let recipe = recipes::update_recipe(&state.db, id, input).await?;

    activity::record(&state.db, &user, "RECIPES", &format!("Updated recipe {}", recipe.name)).await;
    Ok(Json(recipe))
}

pub async fn delete(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;

    recipes::delete_recipe(&state.db, id).await?;

    activity::record(&state.db, &user, "RECIPES", &format!("Deleted recipe {}", id)).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn duplicate(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Recipe>)> {
    let user = require_user(&cookies, &state, rbac::RECIPES_WRITE).await?;

    let source = recipes::find_recipe(&state.db, id).await?;
    let copy = recipes::create_recipe(&state.db, recipes::duplicate_input(&source)).await?;

    activity::record(
        &state.db,
        &user,
        "RECIPES",
        &format!("Duplicated recipe {} as {}", source.recipe.name, copy.name),
    )
    .await;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn approve(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovalOutcome>> {
    let user = require_user(&cookies, &state, rbac::RECIPES_APPROVE).await?;
    Ok(Json(approval::approve(&state.db, id, &user).await?))
}

/// Requirements for a number of portions; stock is not touched.
pub async fn plan(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PortionsRequest>,
) -> AppResult<Json<Vec<IngredientRequirement>>> {
    require_user(&cookies, &state, rbac::RECIPES_READ).await?;

    let recipe = recipes::find_recipe(&state.db, id).await?;
    Ok(Json(production::plan(&state.db, &recipe, request.portions).await?))
}

pub async fn produce(
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PortionsRequest>,
) -> AppResult<Json<ProductionReport>> {
    let user = require_user(&cookies, &state, rbac::PRODUCTION_EXECUTE).await?;

    let recipe = recipes::find_recipe(&state.db, id).await?;
    Ok(Json(production::produce(&state.db, &recipe, request.portions, &user).await?))
}
