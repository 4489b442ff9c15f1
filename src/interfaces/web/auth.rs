use axum::{
    body::Body,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::core::error::DocpackError;

const SESSION_COOKIE: &str = "github_token";

/// Rejects requests that carry neither a bearer token nor the session cookie.
/// Only presence is checked; the token itself is validated by whoever issued it.
pub async fn require_auth(req: Request<Body>, next: Next) -> Response {
    if credential(req.headers()).is_none() {
        return DocpackError::Unauthorized.into_response();
    }
    next.run(req).await
}

pub(crate) fn credential(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| session_cookie(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}
