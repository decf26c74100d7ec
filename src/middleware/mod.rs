pub mod auth;
pub mod response;

pub use auth::{bearer_auth_middleware, AuthGate};
pub use response::{ApiResponse, ApiResult};
