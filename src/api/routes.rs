use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer};

use crate::api::handlers::{self, AppState};
use crate::store::Instance;

pub const API_VERSION_HEADER: &str = "x-api-version";

pub fn create_router<I: Instance>() -> Router<AppState<I>> {
    Router::new()
        // Health check
        .route(
            "/health",
            get(handlers::health_check::<I>).fallback(handlers::method_not_found),
        )
        // Version history with remote fallback
        .route(
            "/history/*reference",
            get(handlers::history::<I>).fallback(handlers::method_not_found),
        )
        // Queries
        .route(
            "/sql",
            get(handlers::sql::<I>)
                .post(handlers::sql::<I>)
                .fallback(handlers::method_not_found),
        )
        // Dataset reads
        .route(
            "/get/*reference",
            get(handlers::get_dataset::<I>).fallback(handlers::method_not_found),
        )
        .route(
            "/list",
            get(handlers::list_datasets::<I>).fallback(handlers::method_not_found),
        )
        // Mutations, closed in read-only mode
        .route(
            "/publish/*reference",
            post(handlers::publish::<I>)
                .delete(handlers::unpublish::<I>)
                .fallback(handlers::method_not_found),
        )
        .route(
            "/save/*reference",
            post(handlers::save::<I>).fallback(handlers::method_not_found),
        )
        // Profile images
        .route(
            "/profile/photo",
            get(handlers::profile_photo::<I>).fallback(handlers::method_not_found),
        )
        .route(
            "/profile/poster",
            get(handlers::profile_poster::<I>).fallback(handlers::method_not_found),
        )
        .fallback(handlers::not_found)
}

/// Router with state and the server-wide layers applied
pub fn build_app<I: Instance>(state: AppState<I>) -> Router {
    let version = HeaderValue::from_str(&state.settings.api_version)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    let body_limit = state.settings.max_upload_bytes;

    create_router::<I>()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(API_VERSION_HEADER),
            version,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerSettings;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(read_only: bool) -> Router {
        let settings = ServerSettings {
            read_only,
            ..Default::default()
        };
        build_app(AppState::new(MemoryStore::seeded(), settings))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_sets_version_header() {
        let response = app(false).oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(API_VERSION_HEADER).unwrap(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[tokio::test]
    async fn test_unknown_path_and_method_are_404() {
        let (status, body) = send(app(false), get_request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);

        let request = Request::builder()
            .method("PUT")
            .uri("/list")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(false), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_only_blocks_publish_before_binding() {
        // The reference is malformed; a 403 proves the gate runs first
        let request = Request::builder()
            .method("POST")
            .uri("/publish/peer/my+ds")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(true), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "/publish is not available in read-only mode");
    }

    #[tokio::test]
    async fn test_read_only_keeps_reads_open() {
        let (status, _) = send(app(true), get_request("/get/peer/movies")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app(true), get_request("/sql?query=SELECT%20*%20FROM%20peer/movies")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_reference_is_400() {
        let (status, body) = send(app(false), get_request("/history/peer/my+ds")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unexpected character at position 7: '+'");
    }

    #[tokio::test]
    async fn test_history_falls_back_to_registry() {
        let (status, body) = send(app(false), get_request("/history/registry_peer/census")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 25);
        assert_eq!(body["pagination"]["limit"], 25);
        assert_eq!(
            body["pagination"]["next_url"],
            "/history/registry_peer/census?limit=25&offset=25"
        );
    }

    #[tokio::test]
    async fn test_history_without_versions_is_422() {
        let (status, _) =
            send(app(false), get_request("/history/peer/empty?remote=registry")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_local_with_remote_is_400() {
        let (status, _) =
            send(app(false), get_request("/history/peer/movies?local=true&remote=foo")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_body_as_csv_via_accept() {
        let request = Request::builder()
            .uri("/get/peer/movies")
            .header("accept", "text/csv")
            .body(Body::empty())
            .unwrap();
        let response = app(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/csv; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_format_conflict_is_400() {
        let request = Request::builder()
            .uri("/get/peer/movies/body?format=json")
            .header("accept", "text/csv")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(false), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "format \"json\" conflicts with header \"Accept: text/csv\""
        );
    }

    #[tokio::test]
    async fn test_sql_json_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/sql")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "SELECT * FROM peer/movies LIMIT 2"}"#))
            .unwrap();
        let (status, body) = send(app(false), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_owner_alias_resolves_from_header() {
        let request = Request::builder()
            .uri("/get/me/movies/meta")
            .header("x-peername", "peer")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(false), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["title"].is_string());

        let (status, _) = send(app(false), get_request("/get/me/movies")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
