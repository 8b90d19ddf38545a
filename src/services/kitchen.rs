//! Sending ticket lines to the kitchen deducts the ingredients of each newly
//! ordered portion. Every line remembers how much of it has already been
//! sent, so a re-send only deducts what was added since.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    middleware::CurrentUser,
    models::TicketLine,
    services::allocator::{self, Allocation},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineDelta {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub delta: Decimal,
}

/// Portions per line not yet sent. Lines whose quantity dropped below what
/// was sent yield nothing; stock is never returned.
pub fn pending_deltas(lines: &[TicketLine]) -> Vec<LineDelta> {
    lines
        .iter()
        .filter(|l| l.quantity > l.sent_quantity)
        .map(|l| LineDelta {
            line_id: l.id,
            product_id: l.product_id,
            product_name: l.product_name.clone(),
            delta: l.quantity - l.sent_quantity,
        })
        .collect()
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeUsage {
    pub product_id: Uuid,
    pub ingredient_id: Uuid,
    pub quantity_required: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Need {
    pub quantity: Decimal,
    pub reason: String,
}

pub fn pos_reason(table_name: &str, delta: Decimal, product_name: &str) -> String {
    format!("POS {}: {} x {}", table_name, delta.normalize(), product_name)
}

/// Ingredient needs keyed by item id. Iterating the map visits items in
/// ascending id order, the same order production takes its locks in.
pub fn ingredient_needs(
    deltas: &[LineDelta],
    usage: &[RecipeUsage],
    table_name: &str,
) -> BTreeMap<Uuid, Vec<Need>> {
    let mut needs: BTreeMap<Uuid, Vec<Need>> = BTreeMap::new();

    for delta in deltas {
        let reason = pos_reason(table_name, delta.delta, &delta.product_name);
        for row in usage.iter().filter(|u| u.product_id == delta.product_id) {
            needs.entry(row.ingredient_id).or_default().push(Need {
                quantity: allocator::to_stock_scale(row.quantity_required * delta.delta),
                reason: reason.clone(),
            });
        }
    }

    needs
}

#[derive(Debug, Clone, Serialize)]
pub struct Shortfall {
    pub item_id: Uuid,
    pub missing: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KitchenReport {
    pub ticket_id: Uuid,
    pub sent: Vec<LineDelta>,
    pub allocations: Vec<Allocation>,
    pub shortfalls: Vec<Shortfall>,
}

impl KitchenReport {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

pub async fn recipe_usage(conn: &mut PgConnection, product_ids: &[Uuid]) -> Result<Vec<RecipeUsage>, sqlx::Error> {
    sqlx::query_as::<_, RecipeUsage>(
        r#"
        SELECT r.linked_product_id AS product_id, ri.ingredient_id, ri.quantity_required
        FROM recipes r
        JOIN recipe_ingredients ri ON ri.recipe_id = r.id
        WHERE r.linked_product_id = ANY($1)
        "#,
    )
    .bind(product_ids)
    .fetch_all(conn)
    .await
}

/// Runs on the caller's transaction. Shortfalls are reported but do not
/// stop the send: the dish has already been sold.
pub async fn send_ticket(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    table_name: &str,
    operator: &CurrentUser,
) -> Result<KitchenReport, sqlx::Error> {
    let lines = sqlx::query_as::<_, TicketLine>(
        "SELECT * FROM ticket_lines WHERE ticket_id = $1 ORDER BY id FOR UPDATE",
    )
    .bind(ticket_id)
    .fetch_all(&mut *conn)
    .await?;

    let deltas = pending_deltas(&lines);
    if deltas.is_empty() {
        return Ok(KitchenReport {
            ticket_id,
            sent: deltas,
            allocations: Vec::new(),
            shortfalls: Vec::new(),
        });
    }

    let mut product_ids: Vec<Uuid> = deltas.iter().map(|d| d.product_id).collect();
    product_ids.sort();
    product_ids.dedup();
    let usage = recipe_usage(&mut *conn, &product_ids).await?;

    let mut allocations = Vec::new();
    let mut shortfalls = Vec::new();
    for (item_id, item_needs) in ingredient_needs(&deltas, &usage, table_name) {
        for need in item_needs {
            let allocation =
                allocator::allocate(&mut *conn, item_id, need.quantity, &need.reason, &operator.name).await?;
            if allocation.shortfall > Decimal::ZERO {
                shortfalls.push(Shortfall {
                    item_id,
                    missing: allocation.shortfall,
                    reason: need.reason,
                });
            }
            allocations.push(allocation);
        }
    }

    sqlx::query("UPDATE ticket_lines SET sent_quantity = quantity WHERE ticket_id = $1 AND quantity > sent_quantity")
        .bind(ticket_id)
        .execute(&mut *conn)
        .await?;

    log::info!(
        "{} sent {} line(s) of ticket {} to the kitchen",
        operator.name,
        deltas.len(),
        ticket_id
    );

    Ok(KitchenReport {
        ticket_id,
        sent: deltas,
        allocations,
        shortfalls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(product_id: Uuid, qty: &str, sent: &str) -> TicketLine {
        TicketLine {
            id: Uuid::new_v4(),
            ticket_id: Uuid::nil(),
            product_id,
            product_name: "Mici".to_string(),
            unit_price: dec("6"),
            quantity: dec(qty),
            sent_quantity: dec(sent),
        }
    }

    /// What `send_ticket` does to a line once its delta is deducted.
    fn mark_sent(lines: &mut [TicketLine]) {
        for l in lines.iter_mut() {
            if l.quantity > l.sent_quantity {
                l.sent_quantity = l.quantity;
            }
        }
    }

    #[test]
    fn only_unsent_quantity_is_pending() {
        let p = Uuid::new_v4();
        let deltas = pending_deltas(&[line(p, "3", "1"), line(p, "2", "2")]);

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta, dec("2"));
    }

    #[test]
    fn lowered_quantity_yields_nothing() {
        assert!(pending_deltas(&[line(Uuid::new_v4(), "1", "4")]).is_empty());
    }

    #[test]
    fn repeated_sends_never_double_deduct() {
        let p = Uuid::new_v4();
        let mut lines = vec![line(p, "2", "0")];
        let mut deducted = Decimal::ZERO;

        for (bump, expected_total) in [(None, "2"), (None, "2"), (Some("5"), "5"), (None, "5")] {
            if let Some(q) = bump {
                lines[0].quantity = dec(q);
            }
            deducted += pending_deltas(&lines).iter().map(|d| d.delta).sum::<Decimal>();
            mark_sent(&mut lines);
            assert_eq!(deducted, dec(expected_total));
        }

        // Reducing after a send returns nothing and deducts nothing
        lines[0].quantity = dec("3");
        assert!(pending_deltas(&lines).is_empty());
        mark_sent(&mut lines);
        lines[0].quantity = dec("5");
        assert!(pending_deltas(&lines).is_empty());
    }

    #[test]
    fn needs_scale_by_delta_and_skip_products_without_recipe() {
        let soup = Uuid::new_v4();
        let water = Uuid::new_v4();
        let beans = Uuid::from_u128(9);
        let onion = Uuid::from_u128(3);

        let deltas = vec![
            LineDelta {
                line_id: Uuid::new_v4(),
                product_id: soup,
                product_name: "Fasole".to_string(),
                delta: dec("2"),
            },
            LineDelta {
                line_id: Uuid::new_v4(),
                product_id: water,
                product_name: "Apa".to_string(),
                delta: dec("4"),
            },
        ];
        let usage = vec![
            RecipeUsage {
                product_id: soup,
                ingredient_id: beans,
                quantity_required: dec("0.15"),
            },
            RecipeUsage {
                product_id: soup,
                ingredient_id: onion,
                quantity_required: dec("0.05"),
            },
        ];

        let needs = ingredient_needs(&deltas, &usage, "Masa 4");

        let items: Vec<Uuid> = needs.keys().copied().collect();
        assert_eq!(items, vec![onion, beans]);
        assert_eq!(needs[&beans][0].quantity, dec("0.30"));
        assert_eq!(needs[&onion][0].quantity, dec("0.10"));
        assert_eq!(needs[&beans][0].reason, "POS Masa 4: 2 x Fasole");
    }

    #[test]
    fn same_ingredient_from_two_products_keeps_separate_reasons() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let flour = Uuid::new_v4();
        let delta = |product_id, name: &str| LineDelta {
            line_id: Uuid::new_v4(),
            product_id,
            product_name: name.to_string(),
            delta: Decimal::ONE,
        };
        let usage = vec![
            RecipeUsage { product_id: a, ingredient_id: flour, quantity_required: dec("0.2") },
            RecipeUsage { product_id: b, ingredient_id: flour, quantity_required: dec("0.1") },
        ];

        let needs = ingredient_needs(&[delta(a, "Pizza"), delta(b, "Focaccia")], &usage, "T1");
        assert_eq!(needs[&flour].len(), 2);
        assert_eq!(needs[&flour][1].reason, "POS T1: 1 x Focaccia");
    }

    #[test]
    fn needs_are_kept_at_stock_precision() {
        let tea = Uuid::new_v4();
        let sugar = Uuid::new_v4();
        let deltas = vec![LineDelta {
            line_id: Uuid::new_v4(),
            product_id: tea,
            product_name: "Ceai".to_string(),
            delta: dec("3"),
        }];
        let usage = vec![RecipeUsage {
            product_id: tea,
            ingredient_id: sugar,
            quantity_required: dec("0.012345"),
        }];

        let needs = ingredient_needs(&deltas, &usage, "Bar");
        assert_eq!(needs[&sugar][0].quantity, dec("0.0370"));
    }
}
