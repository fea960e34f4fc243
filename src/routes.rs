use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json as ResponseJson},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::database::Database;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
}

pub fn router(database: Database) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([axum::http::header::ACCEPT]);

    Router::new()
        .route("/index", get(index))
        .layer(cors)
        .with_state(AppState { database })
}

/// Liveness check that also makes sure the store answers.
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    match state.database.ping().await {
        Ok(()) => (
            StatusCode::OK,
            ResponseJson(serde_json::json!({ "status": "working" })),
        ),
        Err(e) => {
            error!("Database check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ResponseJson(serde_json::json!({
                    "status": "error",
                    "error": "database unavailable"
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn index_reports_working() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let (status, body) = get_json(router(database), "/index").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "working" }));
    }

    #[tokio::test]
    async fn index_reports_a_closed_pool() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        database.pool().close().await;
        let (status, body) = get_json(router(database), "/index").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn cors_preflight_allows_only_reads() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let response = router(database)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/index")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let methods = response
            .headers()
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("GET"));
        assert!(!methods.contains("POST"));
        assert!(!methods.contains("DELETE"));
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap()
                .to_str()
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let response = router(database)
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
