use std::collections::BTreeMap;
use std::time::Instant;

use uuid::Uuid;

use super::assemble::{assemble_failure, assemble_validated, DisclaimerProvider, Response, StaticDisclaimers};
use super::invoker::GenerationInvoker;
use super::normalize::normalize_with_report;
use super::payload::DocumentPayload;
use super::prompt::compose_audited;
use super::registry::SchemaRegistry;
use super::types::{ExtractionRequest, LlmClient};
use super::validation::validate_result;
use super::StructuringError;

/// Runs the full extraction pipeline for one request:
/// registry → compose → invoke → normalize → validate → assemble.
///
/// Holds no per-request state; one instance serves any number of concurrent
/// requests.
pub struct ExtractionPipeline {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
    registry: &'static SchemaRegistry,
    disclaimers: Box<dyn DisclaimerProvider + Send + Sync>,
}

impl ExtractionPipeline {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
            registry: SchemaRegistry::global(),
            disclaimers: Box::new(StaticDisclaimers),
        }
    }

    pub fn with_registry(mut self, registry: &'static SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_disclaimers(mut self, disclaimers: Box<dyn DisclaimerProvider + Send + Sync>) -> Self {
        self.disclaimers = disclaimers;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn registry(&self) -> &'static SchemaRegistry {
        self.registry
    }

    /// Inbound entry point: document type, payload and context in, response out.
    pub fn run_extraction(
        &self,
        document_type: &str,
        payload: DocumentPayload,
        context: BTreeMap<String, String>,
    ) -> Response {
        let request = ExtractionRequest {
            payload: Some(payload),
            context,
            ..ExtractionRequest::default()
        };
        self.run(document_type, &request)
    }

    /// Run one request. Every error is reported as a `Failure` response.
    pub fn run(&self, document_type: &str, request: &ExtractionRequest) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let _span = tracing::info_span!(
            "run_extraction",
            request_id = %request_id,
            document_type = %document_type
        )
        .entered();
        let start = Instant::now();

        let response = match self.extract(document_type, request, &request_id) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(kind = e.kind(), retryable = e.is_retryable(), error = %e, "Extraction failed");
                assemble_failure(&e, document_type, &request_id)
            }
        };

        tracing::info!(
            status = ?response.status,
            degraded = response.degraded,
            warnings = response.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction finished"
        );
        response
    }

    /// Run one request, returning unrecoverable errors to the caller.
    ///
    /// An empty backend reply is not an error: it is normalized from nothing
    /// and ends up as `SuccessEmpty`.
    pub fn extract(
        &self,
        document_type: &str,
        request: &ExtractionRequest,
        request_id: &str,
    ) -> Result<Response, StructuringError> {
        let schema = self.registry.get(document_type)?;
        let prompt = compose_audited(schema, request, Some(request_id))?;

        let invoker = GenerationInvoker::new(self.llm.as_ref(), &self.model_name);
        let candidate = match invoker.invoke(&prompt, schema) {
            Ok(candidate) => Some(candidate),
            Err(StructuringError::EmptyResponse) => {
                tracing::info!("Backend returned no data");
                None
            }
            Err(e) => return Err(e),
        };

        let (normalized, repairs) = normalize_with_report(candidate.as_ref(), schema);
        if !repairs.is_empty() {
            tracing::debug!(
                defaulted = repairs.defaulted().count(),
                coerced = repairs.coerced_count(),
                dropped_records = repairs.dropped_records(),
                dropped_keys = repairs.dropped_keys(),
                "Candidate repaired"
            );
        }

        let validated = validate_result(normalized, schema, Some(request_id));
        Ok(assemble_validated(
            validated,
            schema,
            self.disclaimers.as_ref(),
            request_id,
        ))
    }
}
