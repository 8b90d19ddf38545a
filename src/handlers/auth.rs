use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use askama::Template;
use serde::Deserialize;
use tower_cookies::{Cookie, Cookies};

use crate::{
    database::{is_unique_violation, AppState, Database, ADMIN_ROLE},
    error::AppResult,
    middleware::AUTH_COOKIE,
    models::User,
    utils::{auth::TOKEN_HOURS, create_token, hash_password, verify_password},
};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: String,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    error: String,
    open: bool,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
}

fn login_response(error: &str, status: StatusCode) -> AppResult<Response> {
    let html = LoginTemplate { error: error.to_string() }.render()?;
    Ok((status, Html(html)).into_response())
}

fn register_response(error: &str, open: bool, status: StatusCode) -> AppResult<Response> {
    let html = RegisterTemplate { error: error.to_string(), open }.render()?;
    Ok((status, Html(html)).into_response())
}

pub async fn login_page() -> AppResult<Response> {
    login_response("", StatusCode::OK)
}

pub async fn register_page(State(state): State<AppState>) -> AppResult<Response> {
    let open = operator_count(&state.db).await? == 0;
    register_response("", open, StatusCode::OK)
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let Some(user) = authenticate_user(&state.db, form.email.trim(), &form.password).await? else {
        log::warn!("Failed login for {}", form.email.trim());
        return login_response("Invalid email or password", StatusCode::UNAUTHORIZED);
    };

    let token = match create_token(&state.config.jwt_secret, user.id, user.email.clone()) {
        Ok(token) => token,
        Err(e) => {
            log::error!("Token creation failed for {}: {}", user.email, e);
            return login_response("Authentication failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let cookie = Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(TOKEN_HOURS))
        .build();
    cookies.add(cookie);

    log::info!("{} logged in", user.email);
    Ok(Redirect::to("/dashboard").into_response())
}

pub async fn logout(cookies: Cookies) -> impl IntoResponse {
    cookies.remove(Cookie::build((AUTH_COOKIE, "")).path("/").build());
    Redirect::to("/login")
}

/// Creates the first operator. Closed as soon as any operator exists.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || form.password.len() < 8 {
        return register_response(
            "An email and a password of at least 8 characters are required",
            true,
            StatusCode::BAD_REQUEST,
        );
    }

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("Password hashing failed: {}", e);
            return register_response("Failed to process password", true, StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut tx = state.db.begin().await?;

    // Serialises concurrent bootstrap attempts
    sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        return register_response("Registration is closed", false, StatusCode::FORBIDDEN);
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(form.first_name.trim())
    .bind(form.last_name.trim())
    .fetch_one(&mut *tx)
    .await;

    let user = match user {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            return register_response("Email already exists", false, StatusCode::CONFLICT);
        }
        Err(e) => return Err(e.into()),
    };

    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE name = $2
        "#,
    )
    .bind(user.id)
    .bind(ADMIN_ROLE)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!("Bootstrap operator {} registered", user.email);
    Ok(Redirect::to("/login").into_response())
}

async fn operator_count(db: &Database) -> AppResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?)
}

async fn authenticate_user(db: &Database, email: &str, password: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE lower(email) = lower($1) AND is_active = true AND is_locked = false",
    )
    .bind(email)
    .fetch_optional(db)
    .await?;

    Ok(user.filter(|u| verify_password(password, &u.password_hash).unwrap_or(false)))
}
