use axum::{
    async_trait,
    extract::{FromRequestParts, MatchedPath},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::api::handlers::AppState;
use crate::error::ApiError;
use crate::logic::{read_only, RequestContext};
use crate::model::OwnerContext;
use crate::store::Instance;

pub const PEERNAME_HEADER: &str = "x-peername";
pub const PROFILE_ID_HEADER: &str = "x-profile-id";

/// Axum extractor for the caller's identity.
///
/// Reads `X-Peername` and the optional `X-Profile-Id`. A request without
/// them is anonymous, which only matters when it uses the `me` alias.
#[async_trait]
impl<S> FromRequestParts<S> for OwnerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        Ok(OwnerContext::with_details(
            extract_header_value(headers, PEERNAME_HEADER),
            extract_header_value(headers, PROFILE_ID_HEADER),
        ))
    }
}

/// Cancellation scope of the request, tied to server shutdown and bounded by
/// the configured request timeout.
#[async_trait]
impl<I: Instance> FromRequestParts<AppState<I>> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState<I>,
    ) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::new(
            state.shutdown.child_token(),
            state.settings.request_timeout,
        ))
    }
}

/// Proof that the matched route may run on this node. Mutating handlers take
/// it as their first argument so a read-only server rejects them before any
/// parameter is bound.
#[derive(Debug, Clone, Copy)]
pub struct WriteAccess;

#[async_trait]
impl<I: Instance> FromRequestParts<AppState<I>> for WriteAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<I>,
    ) -> Result<Self, Self::Rejection> {
        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        read_only::check(state.settings.read_only, &route)?;
        Ok(WriteAccess)
    }
}

/// Extract non-empty header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Request};

    #[test]
    fn test_header_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(PEERNAME_HEADER),
            HeaderValue::from_static("peer"),
        );
        headers.insert(
            HeaderName::from_static(PROFILE_ID_HEADER),
            HeaderValue::from_static("  "),
        );

        assert_eq!(
            extract_header_value(&headers, PEERNAME_HEADER),
            Some("peer".to_string())
        );
        assert_eq!(extract_header_value(&headers, PROFILE_ID_HEADER), None);
    }

    #[tokio::test]
    async fn test_owner_context_extraction() {
        let (mut parts, _) = Request::builder()
            .uri("/get/me/ds")
            .header(PEERNAME_HEADER, "peer")
            .body(())
            .unwrap()
            .into_parts();
        let owner = OwnerContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(owner, OwnerContext::new("peer".to_string()));

        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let owner = OwnerContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(owner.is_anonymous());
    }
}
