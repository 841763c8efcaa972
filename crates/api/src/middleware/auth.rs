//! Bearer-token authentication extractor.
//!
//! Protected handlers take [`RequireAuth`]; the access token is read from
//! `Authorization: Bearer <token>` and resolved to the stored user.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::error::set_sentry_user;
use crate::models::User;
use crate::services::auth::{AuthError, TokenError};
use crate::state::AppState;

/// Extractor that requires a valid access token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub User);

/// Error returned when a request is not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    MissingToken,
    UserNotFound,
    Expired,
    InvalidToken,
    /// Storage failed while resolving the user.
    ServerError,
}

impl AuthRejection {
    const fn message(self) -> &'static str {
        match self {
            Self::MissingHeader => "Authorization header missing",
            Self::MissingToken => "Token missing",
            Self::UserNotFound => "User not found",
            Self::Expired => "Access token expired",
            Self::InvalidToken => "Invalid token",
            Self::ServerError => "Server error",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = match self {
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(serde_json::json!({ "message": self.message() }))).into_response()
    }
}

/// Token part of an `Authorization` header value: the second
/// space-separated word, as in `Bearer <token>`.
fn bearer_token(value: &str) -> Option<&str> {
    value.split(' ').nth(1).filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthRejection::MissingHeader)?;
        let token = header
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or(AuthRejection::MissingToken)?;

        let user = state
            .auth()
            .authenticate(token)
            .await
            .map_err(|e| match e {
                AuthError::Token(TokenError::Expired) => AuthRejection::Expired,
                AuthError::Token(_) => AuthRejection::InvalidToken,
                AuthError::UserNotFound => AuthRejection::UserNotFound,
                other => {
                    tracing::error!(error = %other, "Auth middleware error");
                    AuthRejection::ServerError
                }
            })?;

        set_sentry_user(&user.id, Some(user.email.as_str()));
        tracing::Span::current().record("user_id", user.id.as_i32());

        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(
            AuthRejection::Expired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::ServerError.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
