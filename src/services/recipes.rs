//! Recipe storage: headers in `recipes`, ingredient rows in
//! `recipe_ingredients`. Edits replace the ingredient rows wholesale.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    database::{is_foreign_key_violation, is_undefined_column, is_unique_violation, violated_constraint, Database},
    error::{AppError, AppResult},
    models::{recipe::IngredientInput, Recipe, RecipeIngredient, RecipeInput, RecipeWithIngredients},
};

const RECIPE_COLUMNS: &str = "r.id, r.name, r.category, r.linked_product_id, r.preparation_method";
// Used when the deployed schema predates recipe categories
const RECIPE_COLUMNS_NO_CATEGORY: &str =
    "r.id, r.name, NULL::text AS category, r.linked_product_id, r.preparation_method";

#[derive(sqlx::FromRow)]
struct RecipeRow {
    #[sqlx(flatten)]
    recipe: Recipe,
    linked_product_name: Option<String>,
}

async fn fetch_headers(
    conn: &mut PgConnection,
    columns: &str,
    id: Option<Uuid>,
) -> Result<Vec<RecipeRow>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {columns}, p.name AS linked_product_name
        FROM recipes r
        LEFT JOIN products p ON p.id = r.linked_product_id
        WHERE ($1::uuid IS NULL OR r.id = $1)
        ORDER BY r.name
        "#
    );
    sqlx::query_as::<_, RecipeRow>(&sql)
        .bind(id)
        .fetch_all(conn)
        .await
}

async fn fetch_headers_with_fallback(
    conn: &mut PgConnection,
    id: Option<Uuid>,
) -> Result<Vec<RecipeRow>, sqlx::Error> {
    match fetch_headers(&mut *conn, RECIPE_COLUMNS, id).await {
        Err(e) if is_undefined_column(&e) => {
            log::warn!("Recipe query with category failed, retrying without: {}", e);
            fetch_headers(conn, RECIPE_COLUMNS_NO_CATEGORY, id).await
        }
        other => other,
    }
}

pub async fn ingredients_for(
    conn: &mut PgConnection,
    recipe_ids: &[Uuid],
) -> Result<Vec<RecipeIngredient>, sqlx::Error> {
    sqlx::query_as::<_, RecipeIngredient>(
        r#"
        SELECT ri.id, ri.recipe_id, ri.ingredient_id, ri.quantity_required,
               i.name AS item_name, i.unit
        FROM recipe_ingredients ri
        JOIN inventory_items i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(conn)
    .await
}

fn assemble(rows: Vec<RecipeRow>, ingredients: Vec<RecipeIngredient>) -> Vec<RecipeWithIngredients> {
    let mut by_recipe: HashMap<Uuid, Vec<RecipeIngredient>> = HashMap::new();
    for ingredient in ingredients {
        by_recipe.entry(ingredient.recipe_id).or_default().push(ingredient);
    }

    rows.into_iter()
        .map(|row| RecipeWithIngredients {
            ingredients: by_recipe.remove(&row.recipe.id).unwrap_or_default(),
            linked_product_name: row.linked_product_name,
            recipe: row.recipe,
        })
        .collect()
}

pub async fn list_recipes(db: &Database) -> AppResult<Vec<RecipeWithIngredients>> {
    let mut conn = db.acquire().await?;
    let rows = fetch_headers_with_fallback(&mut conn, None).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.recipe.id).collect();
    let ingredients = ingredients_for(&mut conn, &ids).await?;
    Ok(assemble(rows, ingredients))
}

pub async fn get_recipe(conn: &mut PgConnection, id: Uuid) -> AppResult<RecipeWithIngredients> {
    let rows = fetch_headers_with_fallback(&mut *conn, Some(id)).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound("recipe"));
    }
    let ingredients = ingredients_for(conn, &[id]).await?;
    assemble(rows, ingredients)
        .into_iter()
        .next()
        .ok_or(AppError::NotFound("recipe"))
}

pub async fn find_recipe(db: &Database, id: Uuid) -> AppResult<RecipeWithIngredients> {
    let mut conn = db.acquire().await?;
    get_recipe(&mut conn, id).await
}

const NAME_CONSTRAINT: &str = "recipes_name_key";
const LINKED_PRODUCT_INDEX: &str = "idx_recipes_linked_product";

/// Operator-facing error for a unique violation on `recipes`. Constraints
/// without a dedicated message keep the raw database error.
fn unique_conflict(constraint: Option<&str>) -> Option<AppError> {
    match constraint {
        Some(NAME_CONSTRAINT) => Some(AppError::DuplicateRecipeName),
        Some(LINKED_PRODUCT_INDEX) => Some(AppError::Conflict(
            "product is already linked to another recipe".to_string(),
        )),
        _ => None,
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        unique_conflict(violated_constraint(&e)).unwrap_or(AppError::Database(e))
    } else if is_foreign_key_violation(&e) {
        AppError::Validation("recipe references an unknown ingredient or product".to_string())
    } else {
        AppError::Database(e)
    }
}

async fn insert_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    input: &RecipeInput,
) -> AppResult<()> {
    for ingredient in &input.ingredients {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity_required) VALUES ($1, $2, $3)",
        )
        .bind(recipe_id)
        .bind(ingredient.ingredient_id)
        .bind(ingredient.qty)
        .execute(&mut **tx)
        .await
        .map_err(map_write_error)?;
    }
    Ok(())
}

pub async fn create_recipe(db: &Database, input: RecipeInput) -> AppResult<Recipe> {
    let mut tx = db.begin().await?;

    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        INSERT INTO recipes (name, category, linked_product_id, preparation_method)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, category, linked_product_id, preparation_method
        "#,
    )
    .bind(&input.name)
    .bind(&input.category)
    .bind(input.linked_product_id)
    .bind(&input.preparation_method)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_write_error)?;

    insert_ingredients(&mut tx, recipe.id, &input).await?;
    tx.commit().await?;

    Ok(recipe)
}

pub async fn update_recipe(db: &Database, id: Uuid, input: RecipeInput) -> AppResult<Recipe> {
    let mut tx = db.begin().await?;

    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        UPDATE recipes
        SET name = $1, category = $2, linked_product_id = $3, preparation_method = $4, updated_at = NOW()
        WHERE id = $5
        RETURNING id, name, category, linked_product_id, preparation_method
        "#,
    )
    .bind(&input.name)
    .bind(&input.category)
    .bind(input.linked_product_id)
    .bind(&input.preparation_method)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(map_write_error)?
    .ok_or(AppError::NotFound("recipe"))?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_ingredients(&mut tx, id, &input).await?;
    tx.commit().await?;

    Ok(recipe)
}

pub async fn delete_recipe(db: &Database, id: Uuid) -> AppResult<()> {
    // Ingredient rows cascade
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("recipe"));
    }
    Ok(())
}

/// Copy of a recipe, unlinked from any product, for further editing.
pub fn duplicate_input(source: &RecipeWithIngredients) -> RecipeInput {
    RecipeInput {
        name: format!("{} (copy)", source.recipe.name),
        category: source.recipe.category.clone(),
        linked_product_id: None,
        preparation_method: source.recipe.preparation_method.clone(),
        ingredients: source
            .ingredients
            .iter()
            .map(|i| IngredientInput {
                ingredient_id: i.ingredient_id,
                qty: i.quantity_required,
            })
            .collect(),
    }
}
