use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::debug;

use crate::domain::auth::{AuthContext, AuthRequirement};
use crate::domain::MockError;

/// Format-only bearer check. Tokens are never verified.
pub struct BearerGate;

impl BearerGate {
    pub fn authenticate(
        headers: &HeaderMap,
        requirement: AuthRequirement,
    ) -> Result<AuthContext, MockError> {
        match (Self::bearer_token(headers), requirement) {
            (Some(token), _) => Ok(AuthContext {
                authenticated: true,
                token: Some(token),
            }),
            (None, AuthRequirement::Optional) => Ok(AuthContext::default()),
            (None, AuthRequirement::Required) => {
                debug!("Rejecting request without a usable bearer token");
                Err(MockError::Unauthorized)
            }
        }
    }

    /// Returns the token of a syntactically valid `Authorization: Bearer <token>`.
    pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
        let header = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
        let (scheme, token) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let token = token.trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return None;
        }
        Some(token.to_string())
    }
}
