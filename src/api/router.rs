//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`. Every response carries
//! `Cache-Control: no-store` since bodies hold medical data.

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::structuring::ExtractionPipeline;

/// Build the API router around an extraction pipeline.
pub fn api_router(pipeline: ExtractionPipeline) -> Router {
    api_router_with_context(ApiContext::new(pipeline))
}

/// Build the API router around a prepared context.
pub fn api_router_with_context(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/schemas", get(endpoints::schemas::list))
        .route("/extract/:document_type", post(endpoints::extract::extract))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .fallback(|| async { ApiError::NotFound("no such route".into()) })
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use std::sync::Arc;

    use crate::pipeline::structuring::{MockLlmClient, MockPdfPageRenderer};

    const SCAN: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn app(mock: MockLlmClient) -> Router {
        api_router(ExtractionPipeline::new(Box::new(mock), "medgemma:4b"))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_response_shape() {
        let response = app(MockLlmClient::new("{}"))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], "medgemma:4b");
        assert!(!json["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schemas_lists_every_document_type() {
        let response = app(MockLlmClient::new("{}"))
            .oneshot(Request::get("/api/schemas").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = response_json(response).await;
        let types: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["documentType"].as_str())
            .collect();
        assert_eq!(
            types,
            vec!["medical_report", "prescription", "disease_lookup", "medicine_search", "chat"]
        );
        assert_eq!(json[1]["payload"], "data_uri");
        assert_eq!(json[1]["shape"]["type"], "object");
    }

    #[tokio::test]
    async fn extract_prescription_succeeds() {
        let mock = MockLlmClient::new(r#"{"medications": [{"name": "Amoxicillin", "dosage": "500mg"}]}"#);
        let req = post_json(
            "/api/extract/prescription",
            serde_json::json!({ "payload": { "kind": "data_uri", "value": SCAN } }),
        );
        let response = app(mock).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["medications"][0]["name"], "Amoxicillin");
        assert_eq!(json["data"]["medications"][0]["dosage"], "500mg");
        assert!(json["disclaimer"].is_string());
    }

    #[tokio::test]
    async fn unknown_document_type_returns_404() {
        let req = post_json(
            "/api/extract/xray",
            serde_json::json!({ "payload": { "kind": "text", "value": "x" } }),
        );
        let response = app(MockLlmClient::new("{}")).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = response_json(response).await;
        assert_eq!(json["failure"]["kind"], "unknown_document_type");
    }

    #[tokio::test]
    async fn missing_payload_returns_400() {
        let req = post_json("/api/extract/prescription", serde_json::json!({}));
        let response = app(MockLlmClient::new("{}")).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["status"], "failure");
    }

    #[tokio::test]
    async fn invalid_json_returns_400() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/extract/chat")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(MockLlmClient::new("{}")).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn overloaded_backend_returns_503_with_retry_after() {
        let req = post_json(
            "/api/extract/medicine_search",
            serde_json::json!({ "payload": { "kind": "text", "value": "ibuprofen" } }),
        );
        let response = app(MockLlmClient::unavailable("busy"))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "30");
        let json = response_json(response).await;
        assert_eq!(json["failure"]["retryable"], true);
    }

    #[tokio::test]
    async fn backend_error_returns_502() {
        let req = post_json(
            "/api/extract/medicine_search",
            serde_json::json!({ "payload": { "kind": "text", "value": "ibuprofen" } }),
        );
        let response = app(MockLlmClient::failing(500, "boom"))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn chat_accepts_history() {
        let req = post_json(
            "/api/extract/chat",
            serde_json::json!({
                "payload": { "kind": "text", "value": "Thanks!" },
                "history": [
                    { "speaker": "user", "text": "Hi" },
                    { "speaker": "model", "text": "Hello, how can I help?" }
                ]
            }),
        );
        let response = app(MockLlmClient::new(r#"{"response": "You're welcome."}"#))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["data"]["response"], "You're welcome.");
    }

    #[tokio::test]
    async fn pdf_upload_is_rendered_before_extraction() {
        let mock = MockLlmClient::new(r#"{"medications": [{"name": "Metformin"}]}"#);
        let ctx = ApiContext::new(ExtractionPipeline::new(Box::new(mock), "medgemma:4b"))
            .with_pdf_renderer(Arc::new(MockPdfPageRenderer::new(2)));
        let req = post_json(
            "/api/extract/prescription",
            serde_json::json!({
                "payload": { "kind": "data_uri", "value": "data:application/pdf;base64,JVBERi0xLjQ=" }
            }),
        );
        let response = api_router_with_context(ctx).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["data"]["medications"][0]["name"], "Metformin");
    }

    #[tokio::test]
    async fn unreadable_pdf_upload_returns_400() {
        let ctx = ApiContext::new(ExtractionPipeline::new(
            Box::new(MockLlmClient::new("{}")),
            "medgemma:4b",
        ))
        .with_pdf_renderer(Arc::new(MockPdfPageRenderer::new(0)));
        let req = post_json(
            "/api/extract/medical_report",
            serde_json::json!({
                "payload": { "kind": "data_uri", "value": "data:application/pdf;base64,JVBERi0xLjQ=" }
            }),
        );
        let response = api_router_with_context(ctx).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let response = app(MockLlmClient::new("{}"))
            .oneshot(Request::get("/api/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
