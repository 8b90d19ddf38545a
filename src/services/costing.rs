//! Reference prices per ingredient and what a recipe costs at those prices.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    database::{is_foreign_key_violation, Database},
    error::{AppError, AppResult},
    models::{RecipeWithIngredients, RefPrice, RefPriceInput},
    utils::text::strip_diacritics,
};

fn vat_factor(vat_rate: Decimal) -> Decimal {
    Decimal::ONE + vat_rate / Decimal::ONE_HUNDRED
}

pub fn gross(net: Decimal, vat_rate: Decimal) -> Decimal {
    net * vat_factor(vat_rate)
}

pub fn net_from_gross(gross: Decimal, vat_rate: Decimal) -> Decimal {
    (gross / vat_factor(vat_rate)).round_dp(4)
}

/// Net price and VAT rate from a form that may carry either price.
pub fn resolve_price(input: &RefPriceInput) -> AppResult<(Decimal, Decimal)> {
    if input.vat_rate < Decimal::ZERO {
        return Err(AppError::Validation("VAT rate cannot be negative".to_string()));
    }
    let net = match (input.price_per_unit, input.price_with_vat) {
        (Some(net), _) => net,
        (None, Some(gross)) => net_from_gross(gross, input.vat_rate),
        (None, None) => return Err(AppError::Validation("a price is required".to_string())),
    };
    if net < Decimal::ZERO {
        return Err(AppError::Validation("price cannot be negative".to_string()));
    }
    Ok((net, input.vat_rate))
}

#[derive(Debug, Clone, Serialize)]
pub struct CostLine {
    pub ingredient_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub net_cost: Decimal,
    pub gross_cost: Decimal,
    pub has_price: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeCost {
    pub recipe_id: Uuid,
    pub recipe_name: String,
    pub lines: Vec<CostLine>,
    pub total_net: Decimal,
    pub total_gross: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub recipes: Vec<RecipeCost>,
    pub total_net: Decimal,
    pub total_gross: Decimal,
}

/// Cost of one portion. Ingredients without a reference price cost 0 and
/// are flagged.
pub fn recipe_cost(recipe: &RecipeWithIngredients, prices: &HashMap<Uuid, RefPrice>) -> RecipeCost {
    let lines: Vec<CostLine> = recipe
        .ingredients
        .iter()
        .map(|i| {
            let price = prices.get(&i.ingredient_id);
            let (net_cost, gross_cost) = match price {
                Some(p) => (
                    i.quantity_required * p.price_per_unit,
                    i.quantity_required * gross(p.price_per_unit, p.vat_rate),
                ),
                None => (Decimal::ZERO, Decimal::ZERO),
            };
            CostLine {
                ingredient_id: i.ingredient_id,
                item_name: i.item_name.clone(),
                unit: i.unit.clone(),
                quantity: i.quantity_required,
                net_cost,
                gross_cost,
                has_price: price.is_some(),
            }
        })
        .collect();

    RecipeCost {
        recipe_id: recipe.recipe.id,
        recipe_name: recipe.recipe.name.clone(),
        total_net: lines.iter().map(|l| l.net_cost).sum::<Decimal>().round_dp(2),
        total_gross: lines.iter().map(|l| l.gross_cost).sum::<Decimal>().round_dp(2),
        lines,
    }
}

pub fn cost_report(recipes: &[RecipeWithIngredients], prices: &HashMap<Uuid, RefPrice>) -> CostReport {
    let recipes: Vec<RecipeCost> = recipes.iter().map(|r| recipe_cost(r, prices)).collect();
    CostReport {
        total_net: recipes.iter().map(|r| r.total_net).sum(),
        total_gross: recipes.iter().map(|r| r.total_gross).sum(),
        recipes,
    }
}

pub async fn load_ref_prices(db: &Database) -> AppResult<HashMap<Uuid, RefPrice>> {
    let rows = sqlx::query_as::<_, RefPrice>("SELECT * FROM recipe_ref_prices")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|p| (p.ingredient_id, p)).collect())
}

pub async fn upsert_ref_price(db: &Database, ingredient_id: Uuid, input: &RefPriceInput) -> AppResult<RefPrice> {
    let (net, vat_rate) = resolve_price(input)?;

    sqlx::query_as::<_, RefPrice>(
        r#"
        INSERT INTO recipe_ref_prices (ingredient_id, price_per_unit, vat_rate, supplier_id, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (ingredient_id) DO UPDATE
        SET price_per_unit = EXCLUDED.price_per_unit,
            vat_rate = EXCLUDED.vat_rate,
            supplier_id = EXCLUDED.supplier_id,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(ingredient_id)
    .bind(net)
    .bind(vat_rate)
    .bind(input.supplier_id)
    .fetch_one(db)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::Validation("unknown ingredient or supplier".to_string())
        } else {
            AppError::Database(e)
        }
    })
}

#[derive(Debug, Clone, FromRow)]
pub struct PriceListEntry {
    pub ingredient_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub price_per_unit: Decimal,
    pub vat_rate: Decimal,
    pub updated_at: DateTime<Utc>,
    pub supplier_name: Option<String>,
}

/// One printable row; every text column is free of diacritics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceListRow {
    pub name: String,
    pub unit: String,
    pub net: String,
    pub vat: String,
    pub gross: String,
    pub updated: String,
    pub supplier: String,
}

pub async fn price_list_entries(db: &Database) -> AppResult<Vec<PriceListEntry>> {
    let entries = sqlx::query_as::<_, PriceListEntry>(
        r#"
        SELECT p.ingredient_id, i.name AS item_name, i.unit, p.price_per_unit, p.vat_rate,
               p.updated_at, s.name AS supplier_name
        FROM recipe_ref_prices p
        JOIN inventory_items i ON i.id = p.ingredient_id
        LEFT JOIN suppliers s ON s.id = p.supplier_id
        ORDER BY i.name
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(entries)
}

/// Rows for the printable list, limited to `only` when given.
pub fn price_list_rows(entries: &[PriceListEntry], only: Option<&HashSet<Uuid>>) -> Vec<PriceListRow> {
    entries
        .iter()
        .filter(|e| only.map_or(true, |ids| ids.contains(&e.ingredient_id)))
        .map(|e| PriceListRow {
            name: strip_diacritics(&e.item_name),
            unit: strip_diacritics(&e.unit),
            net: format!("{:.2}", e.price_per_unit.round_dp(2)),
            vat: format!("{}%", e.vat_rate.normalize()),
            gross: format!("{:.2}", gross(e.price_per_unit, e.vat_rate).round_dp(2)),
            updated: e.updated_at.format("%d.%m.%Y").to_string(),
            supplier: e
                .supplier_name
                .as_deref()
                .map(strip_diacritics)
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

/// Ingredient ids used by any of the given recipes.
pub fn ingredients_of(recipes: &[RecipeWithIngredients]) -> HashSet<Uuid> {
    recipes
        .iter()
        .flat_map(|r| r.ingredients.iter().map(|i| i.ingredient_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::models::{Recipe, RecipeIngredient};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn price(ingredient_id: Uuid, net: &str, vat: &str) -> RefPrice {
        RefPrice {
            ingredient_id,
            price_per_unit: dec(net),
            vat_rate: dec(vat),
            supplier_id: None,
            updated_at: Utc::now(),
        }
    }

    fn recipe(name: &str, rows: &[(Uuid, &str)]) -> RecipeWithIngredients {
        let id = Uuid::new_v4();
        RecipeWithIngredients {
            recipe: Recipe {
                id,
                name: name.to_string(),
                category: None,
                linked_product_id: None,
                preparation_method: String::new(),
            },
            linked_product_name: None,
            ingredients: rows
                .iter()
                .map(|(item, qty)| RecipeIngredient {
                    id: Uuid::new_v4(),
                    recipe_id: id,
                    ingredient_id: *item,
                    quantity_required: dec(qty),
                    item_name: "x".to_string(),
                    unit: "kg".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn gross_adds_vat() {
        assert_eq!(gross(dec("10"), dec("19")), dec("11.9"));
        assert_eq!(gross(dec("10"), Decimal::ZERO), dec("10"));
    }

    #[test]
    fn net_from_gross_inverts_gross() {
        assert_eq!(net_from_gross(dec("11.9"), dec("19")), dec("10"));
        assert_eq!(net_from_gross(dec("10.9"), dec("9")), dec("10"));
    }

    #[test]
    fn resolve_prefers_net_and_falls_back_to_gross() {
        let both = RefPriceInput {
            price_per_unit: Some(dec("5")),
            price_with_vat: Some(dec("100")),
            vat_rate: dec("9"),
            supplier_id: None,
        };
        assert_eq!(resolve_price(&both).unwrap(), (dec("5"), dec("9")));

        let gross_only = RefPriceInput { price_per_unit: None, ..both };
        assert_eq!(resolve_price(&gross_only).unwrap().0, net_from_gross(dec("100"), dec("9")));
    }

    #[test]
    fn resolve_rejects_missing_or_negative_prices() {
        let empty = RefPriceInput {
            price_per_unit: None,
            price_with_vat: None,
            vat_rate: dec("19"),
            supplier_id: None,
        };
        assert!(resolve_price(&empty).is_err());

        let negative = RefPriceInput { price_per_unit: Some(dec("-1")), ..empty };
        assert!(resolve_price(&negative).is_err());
    }

    #[test]
    fn recipe_cost_sums_priced_ingredients() {
        let flour = Uuid::new_v4();
        let saffron = Uuid::new_v4();
        let r = recipe("Risotto", &[(flour, "0.2"), (saffron, "0.001")]);
        let prices = HashMap::from([(flour, price(flour, "5", "9"))]);

        let cost = recipe_cost(&r, &prices);

        assert_eq!(cost.total_net, dec("1"));
        assert_eq!(cost.total_gross, dec("1.09"));
        assert!(cost.lines[0].has_price);
        assert!(!cost.lines[1].has_price);
        assert_eq!(cost.lines[1].net_cost, Decimal::ZERO);
    }

    #[test]
    fn report_totals_span_recipes() {
        let milk = Uuid::new_v4();
        let prices = HashMap::from([(milk, price(milk, "4", "19"))]);
        let recipes = vec![recipe("Latte", &[(milk, "0.25")]), recipe("Cappuccino", &[(milk, "0.5")])];

        let report = cost_report(&recipes, &prices);

        assert_eq!(report.total_net, dec("3"));
        assert_eq!(report.total_gross, dec("3.57"));
    }

    #[test]
    fn price_list_is_filtered_and_ascii() {
        let kept = Uuid::new_v4();
        let entry = |id: Uuid, name: &str| PriceListEntry {
            ingredient_id: id,
            item_name: name.to_string(),
            unit: "kg".to_string(),
            price_per_unit: dec("12.4"),
            vat_rate: dec("9"),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
            supplier_name: Some("Brânzeturi Ţara".to_string()),
        };
        let entries = vec![entry(kept, "Brânză telemea"), entry(Uuid::new_v4(), "Smântână")];
        let only = HashSet::from([kept]);

        let rows = price_list_rows(&entries, Some(&only));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Branza telemea");
        assert_eq!(rows[0].supplier, "Branzeturi Tara");
        assert_eq!(rows[0].net, "12.40");
        assert_eq!(rows[0].gross, "13.52");
        assert_eq!(rows[0].vat, "9%");
        assert_eq!(rows[0].updated, "05.03.2024");
        assert_eq!(price_list_rows(&entries, None).len(), 2);
    }

    #[test]
    fn ingredients_of_collects_across_recipes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = ingredients_of(&[recipe("One", &[(a, "1")]), recipe("Two", &[(a, "1"), (b, "2")])]);
        assert_eq!(ids.len(), 2);
    }
}
