pub mod permission;

pub use permission::{get_current_user, require_pos_operator, require_user, CurrentUser, AUTH_COOKIE};
