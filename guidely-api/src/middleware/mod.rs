pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, decode_token, issue_token, AuthUser, Claims};
pub use rate_limit::rate_limit_middleware;
