pub mod types;
pub mod payload;
pub mod pdf;
pub mod schema;
pub mod registry;
pub mod sanitize;
pub mod prompt;
pub mod ollama;
pub mod parser;
pub mod invoker;
pub mod normalize;
pub mod validation;
pub mod assemble;
pub mod orchestrator;


pub use types::*;
pub use payload::*;
pub use pdf::*;
pub use schema::*;
pub use registry::*;
pub use prompt::*;
pub use ollama::*;
pub use invoker::*;
pub use normalize::*;
pub use assemble::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("Invalid extraction request: {0}")]
    Composition(String),

    #[error("Generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Generation backend returned error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("No compatible model available")]
    NoModelAvailable,

    #[error("Generation backend returned an empty response")]
    EmptyResponse,

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl StructuringError {
    /// Whether the caller may retry the same request later.
    /// The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StructuringError::BackendUnavailable(_))
    }

    /// Stable snake_case name used in responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownDocumentType(_) => "unknown_document_type",
            Self::Composition(_) => "composition",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Backend { .. } => "backend",
            Self::HttpClient(_) => "http_client",
            Self::NoModelAvailable => "no_model_available",
            Self::EmptyResponse => "empty_response",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}
