// Middleware modules
pub mod auth;
pub mod jwt_auth;
pub mod logging;

// Export JWT auth middleware components
pub use jwt_auth::{jwt_auth_middleware, require_admin, UserIdentity};

// Export shared-secret auth for internal callers
pub use auth::internal_auth_middleware;

// Export logging middleware
pub use logging::logging_middleware;
