//! Authentication extractor.
//!
//! Clients send `Authorization: Bearer <token>`. When `AUTH_SECRET` is set
//! the token must match it; without a secret every request is accepted and
//! requests without a header are treated as anonymous (development mode).

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The bearer token, or `anonymous` in development mode
    pub token: String,
}

impl AuthUser {
    pub fn is_anonymous(&self) -> bool {
        self.token == ANONYMOUS
    }
}

const ANONYMOUS: &str = "anonymous";

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(auth_header, state.config.auth_secret.as_deref())
    }
}

/// Check an `Authorization` header value against the configured secret.
pub fn authorize(
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<AuthUser, (StatusCode, &'static str)> {
    match header {
        Some(header) if header.starts_with("Bearer ") => {
            let token = header.trim_start_matches("Bearer ").trim();
            if token.is_empty() {
                return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
            }
            if let Some(secret) = secret {
                if token != secret {
                    return Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"));
                }
            }
            Ok(AuthUser {
                token: token.to_string(),
            })
        }
        Some(_) => Err((
            StatusCode::UNAUTHORIZED,
            "Invalid authorization header format",
        )),
        None => match secret {
            None => Ok(AuthUser {
                token: ANONYMOUS.to_string(),
            }),
            Some(_) => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        },
    }
}
