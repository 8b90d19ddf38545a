use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: sqlx::types::Json<Vec<String>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const INVENTORY_READ: &str = "inventory:read";
pub const INVENTORY_WRITE: &str = "inventory:write";
pub const RECIPES_READ: &str = "recipes:read";
pub const RECIPES_WRITE: &str = "recipes:write";
pub const RECIPES_APPROVE: &str = "recipes:approve";
pub const PRODUCTION_EXECUTE: &str = "production:execute";
pub const POS_OPERATE: &str = "pos:operate";
pub const PRICING_READ: &str = "pricing:read";
pub const PRICING_WRITE: &str = "pricing:write";

#[derive(Debug, Serialize)]
pub struct Permission {
    pub key: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

pub fn get_all_permissions() -> Vec<Permission> {
    vec![
        // Inventory
        Permission { key: INVENTORY_READ, name: "View Inventory", category: "Inventory" },
        Permission { key: INVENTORY_WRITE, name: "Manage Inventory", category: "Inventory" },

        // Recipes & production
        Permission { key: RECIPES_READ, name: "View Recipes", category: "Recipes" },
        Permission { key: RECIPES_WRITE, name: "Manage Recipes", category: "Recipes" },
        Permission { key: RECIPES_APPROVE, name: "Approve Recipes as Products", category: "Recipes" },
        Permission { key: PRODUCTION_EXECUTE, name: "Run Production", category: "Recipes" },

        // Point of sale
        Permission { key: POS_OPERATE, name: "Operate POS", category: "Point of Sale" },

        // Pricing
        Permission { key: PRICING_READ, name: "View Reference Prices", category: "Pricing" },
        Permission { key: PRICING_WRITE, name: "Manage Reference Prices", category: "Pricing" },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn permission_keys_are_unique() {
        let all = get_all_permissions();
        let keys: HashSet<_> = all.iter().map(|p| p.key).collect();
        assert_eq!(keys.len(), all.len());
    }
}
