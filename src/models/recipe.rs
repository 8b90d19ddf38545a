use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub linked_product_id: Option<Uuid>,
    pub preparation_method: String,
}

/// Ingredient row joined with the inventory item it points at.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeIngredient {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    pub quantity_required: Decimal,
    pub item_name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeWithIngredients {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub linked_product_name: Option<String>,
    pub ingredients: Vec<RecipeIngredient>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientInput {
    pub ingredient_id: Uuid,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeInput {
    pub name: String,
    pub category: Option<String>,
    pub linked_product_id: Option<Uuid>,
    #[serde(default)]
    pub preparation_method: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientInput>,
}

impl RecipeInput {
    /// Trims the name, drops blank categories and zero-quantity rows.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err("recipe name is required".to_string());
        }
        self.category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if self.ingredients.iter().any(|i| i.qty < Decimal::ZERO) {
            return Err("ingredient quantities cannot be negative".to_string());
        }
        self.ingredients.retain(|i| i.qty > Decimal::ZERO);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, qtys: &[i64]) -> RecipeInput {
        RecipeInput {
            name: name.to_string(),
            category: Some("  ".to_string()),
            linked_product_id: None,
            preparation_method: String::new(),
            ingredients: qtys
                .iter()
                .map(|q| IngredientInput { ingredient_id: Uuid::new_v4(), qty: Decimal::new(*q, 0) })
                .collect(),
        }
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(input("   ", &[1]).normalized().is_err());
    }

    #[test]
    fn empty_rows_and_blank_category_are_dropped() {
        let recipe = input(" Soup ", &[1, 0, 2]).normalized().unwrap();
        assert_eq!(recipe.name, "Soup");
        assert_eq!(recipe.category, None);
        assert_eq!(recipe.ingredients.len(), 2);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        assert!(input("Soup", &[1, -1]).normalized().is_err());
    }
}
