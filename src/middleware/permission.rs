use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::{AppState, Database},
    error::AppError,
    models::{rbac, User},
    utils::verify_token,
};

pub const AUTH_COOKIE: &str = "auth_token";

/// The operator acting on a request. Replaces any client-side notion of
/// "who is logged in" and is passed explicitly into services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn from_user(user: User, role: String, permissions: Vec<String>) -> Self {
        Self {
            id: user.id,
            name: user.display_name(),
            email: user.email,
            role,
            permissions,
        }
    }

    pub fn can(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn require(&self, permission: &'static str) -> Result<(), AppError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AppError::Forbidden(permission))
        }
    }
}

pub async fn get_current_user(cookies: &Cookies, state: &AppState) -> Option<CurrentUser> {
    let token = cookies.get(AUTH_COOKIE)?.value().to_string();

    let claims = verify_token(&state.config.jwt_secret, &token).ok()?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;

    get_user_by_id(&state.db, user_id).await
}

/// Resolves the operator and checks one permission in a single step.
pub async fn require_user(
    cookies: &Cookies,
    state: &AppState,
    permission: &'static str,
) -> Result<CurrentUser, AppError> {
    let user = get_current_user(cookies, state).await.ok_or(AppError::Unauthorized)?;
    user.require(permission)?;
    Ok(user)
}

/// Route layer for the generated receipt files: only POS operators may
/// fetch them.
pub async fn require_pos_operator(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_user(&cookies, &state, rbac::POS_OPERATE).await?;
    Ok(next.run(request).await)
}

async fn get_user_by_id(db: &Database, user_id: Uuid) -> Option<CurrentUser> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE id = $1 AND is_active = true AND is_locked = false",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(|e| log::error!("Failed to load operator {}: {}", user_id, e))
    .ok()??;

    let role = get_primary_role(db, user.id).await;
    let permissions = get_user_permissions(db, user.id).await;

    Some(CurrentUser::from_user(user, role, permissions))
}

async fn get_primary_role(db: &Database, user_id: Uuid) -> String {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT r.name
        FROM roles r
        JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = $1 AND r.is_active = true
        ORDER BY ur.assigned_at
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .ok()
    .flatten()
    .unwrap_or_else(|| "unknown".to_string())
}

pub async fn get_user_permissions(db: &Database, user_id: Uuid) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT jsonb_array_elements_text(r.permissions) AS permission
        FROM roles r
        JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = $1 AND r.is_active = true
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator(permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            name: "Ana Pop".to_string(),
            role: "kitchen".to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn require_checks_exact_permission() {
        let user = operator(&["recipes:read"]);
        assert!(user.require("recipes:read").is_ok());
        assert!(matches!(user.require("recipes:write"), Err(AppError::Forbidden("recipes:write"))));
    }
}
