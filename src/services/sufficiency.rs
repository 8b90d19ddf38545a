use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{models::RecipeIngredient, services::allocator::to_stock_scale};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientRequirement {
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
    pub is_sufficient: bool,
}

/// Scales each ingredient by `portions` and compares it with what the
/// batches hold. Rows naming the same item twice are summed.
pub fn check(
    ingredients: &[RecipeIngredient],
    portions: Decimal,
    available: &HashMap<Uuid, Decimal>,
) -> Vec<IngredientRequirement> {
    let mut requirements: Vec<IngredientRequirement> = Vec::new();

    for ingredient in ingredients {
        let required = ingredient.quantity_required * portions;
        match requirements.iter_mut().find(|r| r.item_id == ingredient.ingredient_id) {
            Some(existing) => existing.required += required,
            None => requirements.push(IngredientRequirement {
                item_id: ingredient.ingredient_id,
                item_name: ingredient.item_name.clone(),
                unit: ingredient.unit.clone(),
                required,
                available: available
                    .get(&ingredient.ingredient_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
                is_sufficient: false,
            }),
        }
    }

    for requirement in &mut requirements {
        requirement.required = to_stock_scale(requirement.required);
        requirement.is_sufficient = requirement.available >= requirement.required;
    }

    requirements
}

pub fn is_producible(requirements: &[IngredientRequirement]) -> bool {
    requirements.iter().all(|r| r.is_sufficient)
}

/// Sum of remaining batch quantity per item.
pub async fn load_available(
    conn: &mut PgConnection,
    item_ids: &[Uuid],
) -> Result<HashMap<Uuid, Decimal>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Decimal)>(
        r#"
        SELECT item_id, COALESCE(SUM(quantity), 0)
        FROM inventory_batches
        WHERE item_id = ANY($1) AND quantity > 0
        GROUP BY item_id
        "#,
    )
    .bind(item_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ingredient(item_id: Uuid, name: &str, qty: &str) -> RecipeIngredient {
        RecipeIngredient {
            id: Uuid::new_v4(),
            recipe_id: Uuid::nil(),
            ingredient_id: item_id,
            quantity_required: dec(qty),
            item_name: name.to_string(),
            unit: "kg".to_string(),
        }
    }

    #[test]
    fn requirements_are_rounded_to_stock_precision() {
        let salt = Uuid::new_v4();
        let ingredients = vec![ingredient(salt, "Salt", "0.00333")];
        let available = HashMap::from([(salt, dec("0.01"))]);

        let result = check(&ingredients, dec("3"), &available);

        assert_eq!(result[0].required, dec("0.0100"));
        assert!(result[0].is_sufficient);
    }

    #[test]
    fn scales_by_portions_and_compares() {
        let flour = Uuid::new_v4();
        let eggs = Uuid::new_v4();
        let ingredients = vec![ingredient(flour, "Flour", "0.25"), ingredient(eggs, "Eggs", "2")];
        let available = HashMap::from([(flour, dec("1")), (eggs, dec("7"))]);

        let result = check(&ingredients, dec("4"), &available);

        assert_eq!(result[0].required, dec("1"));
        assert!(result[0].is_sufficient);
        assert_eq!(result[1].required, dec("8"));
        assert!(!result[1].is_sufficient);
        assert!(!is_producible(&result));
    }

    #[test]
    fn producible_when_every_ingredient_is_covered() {
        let flour = Uuid::new_v4();
        let ingredients = vec![ingredient(flour, "Flour", "0.5")];
        let available = HashMap::from([(flour, dec("1.5"))]);

        assert!(is_producible(&check(&ingredients, dec("3"), &available)));
        assert!(!is_producible(&check(&ingredients, dec("3.1"), &available)));
    }

    #[test]
    fn missing_stock_counts_as_zero() {
        let salt = Uuid::new_v4();
        let result = check(&[ingredient(salt, "Salt", "0.01")], dec("1"), &HashMap::new());
        assert_eq!(result[0].available, Decimal::ZERO);
        assert!(!result[0].is_sufficient);
    }

    #[test]
    fn duplicate_rows_are_summed() {
        let oil = Uuid::new_v4();
        let ingredients = vec![ingredient(oil, "Oil", "0.1"), ingredient(oil, "Oil", "0.2")];
        let available = HashMap::from([(oil, dec("0.5"))]);

        let result = check(&ingredients, dec("2"), &available);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].required, dec("0.6"));
        assert!(!result[0].is_sufficient);
    }

    #[test]
    fn recipe_without_ingredients_is_producible() {
        assert!(is_producible(&check(&[], dec("10"), &HashMap::new())));
    }
}
