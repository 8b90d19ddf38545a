//! Producing portions of a recipe: requirement planning and the FIFO
//! deduction of every ingredient.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::RecipeWithIngredients,
    services::{
        activity,
        allocator::{self, Allocation},
        sufficiency::{self, IngredientRequirement},
    },
};

#[derive(Debug, Serialize)]
pub struct ProductionReport {
    pub recipe_id: Uuid,
    pub recipe_name: String,
    pub portions: Decimal,
    pub allocations: Vec<Allocation>,
}

pub fn validate_portions(portions: Decimal) -> AppResult<()> {
    if portions <= Decimal::ZERO {
        return Err(AppError::Validation("portions must be greater than zero".to_string()));
    }
    Ok(())
}

pub fn production_reason(recipe_name: &str, portions: Decimal) -> String {
    format!("Recipe production: {} x {}", portions.normalize(), recipe_name)
}

/// Unique ingredient ids in ascending order. Locks are always taken in
/// this order so concurrent productions cannot deadlock.
fn lock_order(recipe: &RecipeWithIngredients) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = recipe.ingredients.iter().map(|i| i.ingredient_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Requirement list for `portions` without touching stock.
pub async fn plan(
    db: &Database,
    recipe: &RecipeWithIngredients,
    portions: Decimal,
) -> AppResult<Vec<IngredientRequirement>> {
    validate_portions(portions)?;
    let mut conn = db.acquire().await?;
    let available = sufficiency::load_available(&mut conn, &lock_order(recipe)).await?;
    Ok(sufficiency::check(&recipe.ingredients, portions, &available))
}

pub async fn produce(
    db: &Database,
    recipe: &RecipeWithIngredients,
    portions: Decimal,
    operator: &CurrentUser,
) -> AppResult<ProductionReport> {
    validate_portions(portions)?;

    let mut tx = db.begin().await?;

    // Lock every ingredient's batches before checking, so the check holds
    // until commit
    let mut available = HashMap::new();
    for item_id in lock_order(recipe) {
        let batches = allocator::lock_batches(&mut tx, item_id).await?;
        available.insert(item_id, batches.iter().map(|b| b.quantity).sum::<Decimal>());
    }

    let requirements = sufficiency::check(&recipe.ingredients, portions, &available);
    if !sufficiency::is_producible(&requirements) {
        return Err(AppError::InsufficientStock(requirements));
    }

    let reason = production_reason(&recipe.recipe.name, portions);
    let mut by_item: Vec<&IngredientRequirement> = requirements.iter().collect();
    by_item.sort_by_key(|r| r.item_id);

    let mut allocations = Vec::with_capacity(by_item.len());
    for requirement in by_item {
        let allocation = allocator::allocate(
            &mut tx,
            requirement.item_id,
            requirement.required,
            &reason,
            &operator.name,
        )
        .await?;
        allocations.push(allocation);
    }

    tx.commit().await?;

    activity::record(
        db,
        operator,
        "PRODUCTION",
        &format!(
            "Produced {} portion(s) of {}; stock deducted FIFO",
            portions.normalize(),
            recipe.recipe.name
        ),
    )
    .await;
    log::info!("{} produced {} x {}", operator.name, portions, recipe.recipe.name);

    Ok(ProductionReport {
        recipe_id: recipe.recipe.id,
        recipe_name: recipe.recipe.name.clone(),
        portions,
        allocations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Recipe, RecipeIngredient};

    #[test]
    fn zero_or_negative_portions_are_rejected() {
        assert!(validate_portions(Decimal::ZERO).is_err());
        assert!(validate_portions(Decimal::NEGATIVE_ONE).is_err());
        assert!(validate_portions(Decimal::new(5, 1)).is_ok());
    }

    #[test]
    fn reason_names_portions_and_recipe() {
        assert_eq!(
            production_reason("Tiramisu", Decimal::new(1200, 2)),
            "Recipe production: 12 x Tiramisu"
        );
    }

    #[test]
    fn lock_order_is_sorted_and_unique() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let row = |item: Uuid| RecipeIngredient {
            id: Uuid::new_v4(),
            recipe_id: Uuid::nil(),
            ingredient_id: item,
            quantity_required: Decimal::ONE,
            item_name: String::new(),
            unit: String::new(),
        };
        let recipe = RecipeWithIngredients {
            recipe: Recipe {
                id: Uuid::nil(),
                name: "Crepes".to_string(),
                category: None,
                linked_product_id: None,
                preparation_method: String::new(),
            },
            linked_product_name: None,
            ingredients: vec![row(a), row(b), row(a)],
        };

        assert_eq!(lock_order(&recipe), vec![b, a]);
    }
}
