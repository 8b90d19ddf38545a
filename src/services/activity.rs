use crate::{database::Database, middleware::CurrentUser};

/// Appends an entry to the activity log. A failure here is logged and
/// swallowed so it never undoes the action being recorded.
pub async fn record(db: &Database, operator: &CurrentUser, action: &str, details: &str) {
    let result = sqlx::query(
        r#"
        INSERT INTO activity_log (operator_id, operator_name, operator_role, action, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(operator.id)
    .bind(&operator.name)
    .bind(&operator.role)
    .bind(action)
    .bind(details)
    .execute(db)
    .await;

    if let Err(e) = result {
        log::warn!("Failed to record {} activity for {}: {}", action, operator.name, e);
    }
}
