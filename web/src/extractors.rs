//! Request extractors.
//!
//! Authentication itself is an external collaborator: the edge proxy
//! terminates it and forwards the verified identity in `X-User-ID`.
//! Handlers requiring a user take [`AuthedUser`]; the rate limiter keys
//! on [`client_key`].

use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use rushgate_core::UserId;
use uuid::Uuid;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified user identity forwarded by the auth edge.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::new(
                    StatusCode::UNAUTHORIZED,
                    "VALIDATION",
                    "missing authenticated user identity",
                )
            })?;
        let id = Uuid::parse_str(raw).map_err(|_| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "VALIDATION",
                "malformed user identity",
            )
        })?;
        Ok(Self(UserId(id)))
    }
}

/// Rate-limit key for a request: the authenticated user when present,
/// otherwise the nearest client address.
#[must_use]
pub fn client_key(parts: &axum::http::HeaderMap) -> String {
    if let Some(user) = parts.get(USER_ID_HEADER).and_then(|v| v.to_str().ok()) {
        return format!("user:{user}");
    }
    let ip = parts
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown");
    format!("ip:{ip}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn user_header_takes_priority_over_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        assert_eq!(client_key(&headers), "ip:1.2.3.4");

        headers.insert(USER_ID_HEADER, "abc".parse().unwrap());
        assert_eq!(client_key(&headers), "user:abc");
    }

    #[test]
    fn forwarded_list_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers), "ip:9.9.9.9");
    }

    #[test]
    fn missing_identity_falls_back_to_unknown() {
        assert_eq!(client_key(&HeaderMap::new()), "ip:unknown");
    }
}
