//! Ingredient purchasing forecast from planned sales.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    services::kitchen::{recipe_usage, RecipeUsage},
};

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedSale {
    pub product_id: Uuid,
    pub portions: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemStock {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastLine {
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub required: Decimal,
    pub in_stock: Decimal,
    pub to_buy: Decimal,
    pub estimated_cost: Decimal,
}

/// Total quantity of each ingredient the plan consumes, by item id.
pub fn aggregate_needs(plan: &[PlannedSale], usage: &[RecipeUsage]) -> BTreeMap<Uuid, Decimal> {
    let mut needs = BTreeMap::new();
    for sale in plan {
        for row in usage.iter().filter(|u| u.product_id == sale.product_id) {
            *needs.entry(row.ingredient_id).or_insert(Decimal::ZERO) += row.quantity_required * sale.portions;
        }
    }
    needs
}

pub fn compare_with_stock(needs: &BTreeMap<Uuid, Decimal>, stock: &HashMap<Uuid, ItemStock>) -> Vec<ForecastLine> {
    needs
        .iter()
        .map(|(item_id, required)| {
            let item = stock.get(item_id);
            let in_stock = item.map(|i| i.stock).unwrap_or(Decimal::ZERO);
            let to_buy = (*required - in_stock).max(Decimal::ZERO);
            let price = item.and_then(|i| i.last_price).unwrap_or(Decimal::ZERO);
            ForecastLine {
                item_id: *item_id,
                item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
                unit: item.map(|i| i.unit.clone()).unwrap_or_default(),
                required: *required,
                in_stock,
                to_buy,
                estimated_cost: (to_buy * price).round_dp(2),
            }
        })
        .collect()
}

pub async fn forecast(db: &Database, plan: &[PlannedSale]) -> AppResult<Vec<ForecastLine>> {
    if plan.iter().any(|s| s.portions < Decimal::ZERO) {
        return Err(AppError::Validation("planned portions cannot be negative".to_string()));
    }

    let mut conn = db.acquire().await?;
    let product_ids: Vec<Uuid> = plan.iter().map(|s| s.product_id).collect();
    let usage = recipe_usage(&mut conn, &product_ids).await?;
    let needs = aggregate_needs(plan, &usage);

    let item_ids: Vec<Uuid> = needs.keys().copied().collect();
    let stock = sqlx::query_as::<_, ItemStock>(
        r#"
        SELECT i.id, i.name, i.unit, i.stock,
               (SELECT b.purchase_price FROM inventory_batches b
                WHERE b.item_id = i.id AND b.purchase_price IS NOT NULL
                ORDER BY b.created_at DESC LIMIT 1) AS last_price
        FROM inventory_items i
        WHERE i.id = ANY($1)
        "#,
    )
    .bind(&item_ids)
    .fetch_all(&mut *conn)
    .await?;

    let stock: HashMap<Uuid, ItemStock> = stock.into_iter().map(|s| (s.id, s)).collect();
    Ok(compare_with_stock(&needs, &stock))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn needs_add_up_across_products() {
        let burger = Uuid::new_v4();
        let fries = Uuid::new_v4();
        let potato = Uuid::new_v4();
        let usage = vec![
            RecipeUsage { product_id: burger, ingredient_id: potato, quantity_required: dec("0.1") },
            RecipeUsage { product_id: fries, ingredient_id: potato, quantity_required: dec("0.3") },
        ];
        let plan = vec![
            PlannedSale { product_id: burger, portions: dec("10") },
            PlannedSale { product_id: fries, portions: dec("5") },
        ];

        assert_eq!(aggregate_needs(&plan, &usage)[&potato], dec("2.5"));
    }

    #[test]
    fn only_the_gap_is_bought() {
        let potato = Uuid::new_v4();
        let salt = Uuid::new_v4();
        let needs = BTreeMap::from([(potato, dec("2.5")), (salt, dec("0.1"))]);
        let stock = HashMap::from([
            (
                potato,
                ItemStock {
                    id: potato,
                    name: "Cartofi".to_string(),
                    unit: "kg".to_string(),
                    stock: dec("1"),
                    last_price: Some(dec("3")),
                },
            ),
            (
                salt,
                ItemStock {
                    id: salt,
                    name: "Sare".to_string(),
                    unit: "kg".to_string(),
                    stock: dec("2"),
                    last_price: None,
                },
            ),
        ]);

        let lines = compare_with_stock(&needs, &stock);
        let potato_line = lines.iter().find(|l| l.item_id == potato).unwrap();
        let salt_line = lines.iter().find(|l| l.item_id == salt).unwrap();

        assert_eq!(potato_line.to_buy, dec("1.5"));
        assert_eq!(potato_line.estimated_cost, dec("4.5"));
        assert_eq!(salt_line.to_buy, Decimal::ZERO);
        assert_eq!(salt_line.estimated_cost, Decimal::ZERO);
    }

    #[test]
    fn products_without_recipe_need_nothing() {
        let plan = vec![PlannedSale { product_id: Uuid::new_v4(), portions: dec("3") }];
        assert!(aggregate_needs(&plan, &[]).is_empty());
    }
}
