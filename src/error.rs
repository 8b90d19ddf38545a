use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::sufficiency::IngredientRequirement;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not authenticated")]
    Unauthorized,
    #[error("missing permission {0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("a recipe with this name already exists, please choose another name")]
    DuplicateRecipeName,
    #[error("insufficient stock for {} ingredient(s)", .0.iter().filter(|r| !r.is_sufficient).count())]
    InsufficientStock(Vec<IngredientRequirement>),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::DuplicateRecipeName | AppError::InsufficientStock(_) => {
                StatusCode::CONFLICT
            }
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let body = match &self {
            AppError::InsufficientStock(requirements) => json!({
                "error": self.to_string(),
                "details": requirements,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn insufficient_stock_counts_only_short_ingredients() {
        let short = IngredientRequirement {
            item_id: Uuid::new_v4(),
            item_name: "Flour".to_string(),
            unit: "kg".to_string(),
            required: Decimal::new(5, 0),
            available: Decimal::new(2, 0),
            is_sufficient: false,
        };
        let fine = IngredientRequirement {
            is_sufficient: true,
            ..short.clone()
        };

        let err = AppError::InsufficientStock(vec![short, fine]);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "insufficient stock for 1 ingredient(s)");
    }

    #[test]
    fn database_errors_keep_the_raw_text() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("database error: "));
    }
}
