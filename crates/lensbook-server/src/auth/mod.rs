//! Request authentication.
//!
//! A request carries a signed session token in one of three places, checked in
//! order: an `Authorization: Bearer` header, a `session` cookie, or an
//! `access_token` query parameter. The last form exists because browser
//! `EventSource` clients cannot set headers.

pub mod jwt;

pub use jwt::{JwtAuthenticator, JwtClaims, JwtConfig};

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use serde::Deserialize;
use thiserror::Error;

use lensbook_core::User;

use crate::error::AppError;
use crate::state::AppState;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),

    #[error("authentication not configured: {0}")]
    NotConfigured(String),
}

/// The `access_token` query parameter.
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Find the session token on a request.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookie_token(headers))
        .or_else(|| query_token(uri))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn query_token(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(uri).ok()?;
    query.access_token.filter(|token| !token.is_empty())
}

/// The authenticated caller, resolved against the user directory.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, &parts.uri)
            .ok_or(AuthError::MissingCredentials)?;
        let user_id = state.auth.authenticate(&token)?;

        match state.users.get(user_id).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::debug!(user_id = %user_id, "token for unknown user");
                Err(AppError::UnknownUser)
            }
        }
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(query: &str) -> Uri {
        format!("/api/notifications/stream?{query}").parse().unwrap()
    }

    fn bare() -> Uri {
        Uri::from_static("/api/notifications/stream")
    }

    #[test]
    fn test_bearer_wins_over_cookie_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(COOKIE, HeaderValue::from_static("session=cookie-token"));
        assert_eq!(
            extract_token(&headers, &uri("access_token=query-token")).as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn test_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session=cookie-token; lang=en"),
        );
        assert_eq!(extract_token(&headers, &bare()).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn test_query_parameter() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, &uri("foo=1&access_token=query-token")).as_deref(),
            Some("query-token")
        );
        assert_eq!(extract_token(&headers, &uri("access_token=")), None);
        assert_eq!(extract_token(&headers, &uri("foo=1")), None);
    }

    #[test]
    fn test_query_parameter_is_percent_decoded() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, &uri("access_token=abc%2Edef%3D%3D")).as_deref(),
            Some("abc.def==")
        );
    }

    #[test]
    fn test_no_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_token(&headers, &bare()), None);
    }
}
