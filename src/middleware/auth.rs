use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::AppState;

/// Static shared-secret check for kiosk clients.
///
/// Only the SHA-256 digest of the secret is kept; presented tokens are hashed
/// the same way and compared in constant time.
#[derive(Clone)]
pub struct AuthGate {
    secret_digest: Option<[u8; 32]>,
}

impl AuthGate {
    /// `None` (or an empty secret) puts the gate in open mode: any non-empty
    /// bearer token passes.
    pub fn new(secret: Option<&str>) -> Self {
        let secret_digest = secret.filter(|s| !s.is_empty()).map(digest);
        Self { secret_digest }
    }

    pub fn is_open(&self) -> bool {
        self.secret_digest.is_none()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = extract_bearer_token(headers).map_err(ApiError::unauthorized)?;

        match &self.secret_digest {
            None => Ok(()),
            Some(expected) => {
                if bool::from(digest(token)[..].ct_eq(&expected[..])) {
                    Ok(())
                } else {
                    Err(ApiError::forbidden("Invalid API token"))
                }
            }
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate").field("open", &self.is_open()).finish()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Bearer token authentication middleware for data and sync routes
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = state.auth.check(request.headers()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            code = err.error_code(),
            "Rejected request: {}",
            err
        );
        return Err(err);
    }

    Ok(next.run(request).await)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_str = headers
        .get(AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use Bearer token format")?
        .trim();

    if token.is_empty() {
        return Err("Empty bearer token");
    }
    Ok(token)
}
