pub mod auth;
pub mod text;

pub use auth::{create_token, verify_token, hash_password, verify_password};
