pub mod auth;
pub mod rate_limit;
pub mod request_logger;

pub use auth::{auth_middleware, AuthenticatedUser};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use request_logger::request_logger_middleware;
