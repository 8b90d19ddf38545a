//! Promoting a recipe to a sellable product.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::{Product, Recipe},
    services::activity,
};

pub const DEFAULT_PRODUCT_CATEGORY: &str = "Menu";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStep {
    /// No product or a dangling link: insert a product and point the recipe at it.
    CreateAndLink,
    /// The linked product exists: refresh it from the recipe and reactivate it.
    Reactivate(Uuid),
}

pub fn decide(recipe: &Recipe, existing: Option<&Product>) -> ApprovalStep {
    match (recipe.linked_product_id, existing) {
        (Some(linked), Some(product)) if product.id == linked => ApprovalStep::Reactivate(linked),
        _ => ApprovalStep::CreateAndLink,
    }
}

/// Name, category and description a product takes from its recipe.
pub fn product_fields(recipe: &Recipe) -> (String, String, String) {
    (
        recipe.name.clone(),
        recipe
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_PRODUCT_CATEGORY.to_string()),
        recipe.preparation_method.clone(),
    )
}

#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub product: Product,
    pub created: bool,
}

pub async fn approve(db: &Database, recipe_id: Uuid, operator: &CurrentUser) -> AppResult<ApprovalOutcome> {
    let mut tx = db.begin().await?;

    // Row lock serialises concurrent approvals of the same recipe
    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, name, category, linked_product_id, preparation_method
        FROM recipes WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(recipe_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("recipe"))?;

    let existing = match recipe.linked_product_id {
        Some(product_id) => sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?,
        None => None,
    };

    let (name, category, description) = product_fields(&recipe);

    let outcome = match decide(&recipe, existing.as_ref()) {
        ApprovalStep::Reactivate(product_id) => {
            let product = sqlx::query_as::<_, Product>(
                r#"
                UPDATE products
                SET name = $1, category = $2, description = $3, is_active = true
                WHERE id = $4
                RETURNING *
                "#,
            )
            .bind(&name)
            .bind(&category)
            .bind(&description)
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;

            ApprovalOutcome { product, created: false }
        }
        ApprovalStep::CreateAndLink => {
            if recipe.linked_product_id.is_some() {
                log::warn!("Recipe {} pointed at a deleted product, relinking", recipe.id);
            }

            let product = sqlx::query_as::<_, Product>(
                r#"
                INSERT INTO products (name, category, price, description, is_active)
                VALUES ($1, $2, 0, $3, true)
                RETURNING *
                "#,
            )
            .bind(&name)
            .bind(&category)
            .bind(&description)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("UPDATE recipes SET linked_product_id = $1, updated_at = NOW() WHERE id = $2")
                .bind(product.id)
                .bind(recipe.id)
                .execute(&mut *tx)
                .await?;

            ApprovalOutcome { product, created: true }
        }
    };

    tx.commit().await?;

    activity::record(
        db,
        operator,
        "RECIPES",
        &format!("Approved recipe \"{}\" as product {}", recipe.name, outcome.product.id),
    )
    .await;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn recipe(linked: Option<Uuid>) -> Recipe {
        Recipe {
            id: Uuid::new_v4(),
            name: "Papanasi".to_string(),
            category: None,
            linked_product_id: linked,
            preparation_method: "Fry, then top with jam".to_string(),
        }
    }

    fn product(id: Uuid, active: bool) -> Product {
        Product {
            id,
            name: "Old name".to_string(),
            category: "Desserts".to_string(),
            price: Decimal::new(2500, 2),
            description: String::new(),
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unlinked_recipe_creates_a_product() {
        assert_eq!(decide(&recipe(None), None), ApprovalStep::CreateAndLink);
    }

    #[test]
    fn broken_link_creates_a_fresh_product() {
        assert_eq!(decide(&recipe(Some(Uuid::new_v4())), None), ApprovalStep::CreateAndLink);
    }

    #[test]
    fn existing_product_is_reactivated() {
        let id = Uuid::new_v4();
        assert_eq!(
            decide(&recipe(Some(id)), Some(&product(id, false))),
            ApprovalStep::Reactivate(id)
        );
    }

    #[test]
    fn category_falls_back_to_menu() {
        let (_, category, description) = product_fields(&recipe(None));
        assert_eq!(category, DEFAULT_PRODUCT_CATEGORY);
        assert_eq!(description, "Fry, then top with jam");
    }

    /// Applies the same steps `approve` runs against an in-memory catalogue.
    fn apply(recipe: &mut Recipe, catalogue: &mut Vec<Product>) {
        let existing = recipe
            .linked_product_id
            .and_then(|id| catalogue.iter().find(|p| p.id == id));
        match decide(recipe, existing) {
            ApprovalStep::Reactivate(id) => {
                let product = catalogue.iter_mut().find(|p| p.id == id).unwrap();
                product.is_active = true;
                product.name = recipe.name.clone();
            }
            ApprovalStep::CreateAndLink => {
                let created = product(Uuid::new_v4(), true);
                recipe.linked_product_id = Some(created.id);
                catalogue.push(created);
            }
        }
    }

    fn active_linked(recipe: &Recipe, catalogue: &[Product]) -> usize {
        catalogue
            .iter()
            .filter(|p| p.is_active && Some(p.id) == recipe.linked_product_id)
            .count()
    }

    #[test]
    fn repeated_approval_converges_on_one_active_product() {
        let mut r = recipe(None);
        let mut catalogue = Vec::new();

        apply(&mut r, &mut catalogue);
        apply(&mut r, &mut catalogue);

        assert_eq!(catalogue.len(), 1);
        assert_eq!(active_linked(&r, &catalogue), 1);
    }

    #[test]
    fn approval_after_deactivation_reuses_the_product() {
        let mut r = recipe(None);
        let mut catalogue = Vec::new();

        apply(&mut r, &mut catalogue);
        catalogue[0].is_active = false;
        apply(&mut r, &mut catalogue);

        assert_eq!(catalogue.len(), 1);
        assert_eq!(active_linked(&r, &catalogue), 1);
    }

    #[test]
    fn approval_after_product_deletion_relinks() {
        let mut r = recipe(None);
        let mut catalogue = Vec::new();

        apply(&mut r, &mut catalogue);
        let first = r.linked_product_id;
        catalogue.clear();
        apply(&mut r, &mut catalogue);
        apply(&mut r, &mut catalogue);

        assert_ne!(r.linked_product_id, first);
        assert_eq!(catalogue.len(), 1);
        assert_eq!(active_linked(&r, &catalogue), 1);
    }
}
