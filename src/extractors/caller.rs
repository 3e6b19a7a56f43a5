use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Caller identity carried on every protected request via the
/// `x-user-id` header. A request with the header missing or blank
/// never reaches a handler — rejected with 401 here instead.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing x-user-id header".to_string()))?
            .to_string();

        Ok(Caller { user_id })
    }
}

/// Guards the owner-assignment endpoints, which additionally require
/// a non-empty `authentication` header beyond the caller id.
pub fn require_authentication_header(parts: &Parts) -> Result<(), AppError> {
    let present = parts
        .headers
        .get("authentication")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .is_some_and(|v| !v.is_empty());

    if present {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "missing authentication header".to_string(),
        ))
    }
}

/// `Caller`, plus the extra `authentication` header required on the
/// first-claim owner-assignment endpoints (their catalog entry is
/// `check_scope: none`, so this is the only gate they get).
#[derive(Debug, Clone)]
pub struct OwnerClaimCaller {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for OwnerClaimCaller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require_authentication_header(parts)?;
        let Caller { user_id } = Caller::from_request_parts(parts, state).await?;
        Ok(OwnerClaimCaller { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn rejects_missing_header() {
        let req = Request::builder().body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        let result = Caller::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_blank_header() {
        let req = Request::builder().header("x-user-id", "   ").body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        let result = Caller::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_trimmed_header() {
        let req = Request::builder().header("x-user-id", " u1 ").body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        let caller = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.user_id, "u1");
    }
}
