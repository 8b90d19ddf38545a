use std::sync::Arc;

use sqlx::{PgPool, Pool, Postgres};

use crate::{
    config::Config,
    models::{rbac::get_all_permissions, Role},
};

pub const ADMIN_ROLE: &str = "admin";

pub type Database = Pool<Postgres>;

/// Shared handler state: the connection pool plus the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
}

pub async fn create_database_pool(database_url: &str) -> Result<Database, sqlx::Error> {
    let pool = PgPool::connect(database_url).await?;

    // Test the connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await?;

    log::info!("Connected to database successfully");
    Ok(pool)
}

pub async fn run_migrations(db: &Database) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db).await
}

/// Creates the `admin` role, or widens it, so it carries every known
/// permission. Runs at startup.
pub async fn ensure_admin_role(db: &Database) -> Result<Role, sqlx::Error> {
    let permissions: Vec<&str> = get_all_permissions().iter().map(|p| p.key).collect();

    let role = sqlx::query_as::<_, Role>(
        r#"
        INSERT INTO roles (name, description, permissions)
        VALUES ($1, 'Full access', $2)
        ON CONFLICT (name) DO UPDATE SET permissions = EXCLUDED.permissions, is_active = true
        RETURNING *
        "#,
    )
    .bind(ADMIN_ROLE)
    .bind(sqlx::types::Json(&permissions))
    .fetch_one(db)
    .await?;

    log::info!("Role {} carries {} permissions", role.name, role.permissions.len());
    Ok(role)
}

fn pg_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// `23505`: a unique constraint rejected the write.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    pg_code(err).as_deref() == Some("23505")
}

/// `23503`: the write referenced a row that does not exist.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    pg_code(err).as_deref() == Some("23503")
}

/// Name of the constraint or index a failed write ran into, if any.
pub fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    err.as_database_error().and_then(|db_err| db_err.constraint())
}

/// `42703`: the query named a column the schema does not have.
pub fn is_undefined_column(err: &sqlx::Error) -> bool {
    pg_code(err).as_deref() == Some("42703")
}
