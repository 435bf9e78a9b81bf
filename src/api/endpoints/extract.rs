use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::error::{with_retry_after, ApiError, RETRY_AFTER_SECS};
use crate::api::types::ApiContext;
use crate::pipeline::structuring::{
    render_pdf_payload, ExtractionRequest, Response as ExtractionResponse, StructuringError,
};

/// `POST /api/extract/:document_type` runs one extraction.
///
/// The body is an `ExtractionRequest`. A PDF data URI is rendered to page
/// images first. Rendering and the pipeline's blocking backend call run on
/// the blocking thread pool. Failures are still returned as an
/// extraction response, with the HTTP status derived from the failure kind.
pub async fn extract(
    State(ctx): State<ApiContext>,
    Path(document_type): Path<String>,
    body: Result<Json<ExtractionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut request) = body?;
    let pipeline = ctx.pipeline.clone();
    let renderer = ctx.pdf_renderer.clone();

    let response = tokio::task::spawn_blocking(move || -> Result<_, StructuringError> {
        if let Some(payload) = request.payload.take() {
            request.payload = Some(render_pdf_payload(payload, renderer.as_ref())?);
        }
        Ok(pipeline.run(&document_type, &request))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("extraction task failed: {e}")))?
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let status = http_status(&response);
    let http = (status, Json(response)).into_response();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Ok(with_retry_after(http, RETRY_AFTER_SECS));
    }
    Ok(http)
}

fn http_status(response: &ExtractionResponse) -> StatusCode {
    match response.failure.as_ref().map(|f| f.kind) {
        None => StatusCode::OK,
        Some("unknown_document_type") => StatusCode::NOT_FOUND,
        Some("composition") => StatusCode::BAD_REQUEST,
        Some("backend_unavailable") => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::BAD_GATEWAY,
    }
}
