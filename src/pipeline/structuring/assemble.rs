//! Response assembly: normalized result → caller-facing response.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::schema::{DocumentSchema, OutcomeRule};
use super::types::{ExtractionOutput, NormalizedResult};
use super::validation::ValidationResult;
use super::StructuringError;
use crate::models::DocumentType;

/// Shown when the backend is unavailable or overloaded.
pub const OVERLOADED_MESSAGE: &str =
    "The AI model is currently overloaded. Please try again in a few moments.";

/// Educational-use disclaimer for medicine suggestions.
pub const SUGGESTIONS_DISCLAIMER: &str = "Disclaimer: The information provided is for educational purposes only and is not a substitute for professional medical advice. Always consult a healthcare provider for any health concerns or before starting any new treatment.";

/// Supplies the fixed compliance text for each document type.
pub trait DisclaimerProvider {
    fn disclaimer(&self, document_type: DocumentType) -> &str;
}

/// Built-in disclaimers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDisclaimers;

impl DisclaimerProvider for StaticDisclaimers {
    fn disclaimer(&self, document_type: DocumentType) -> &str {
        match document_type {
            DocumentType::MedicalReport => "This analysis is generated by an AI model for informational purposes only and is not a diagnosis. Discuss your results with a qualified healthcare professional.",
            DocumentType::Prescription => "This interpretation is generated by an AI model and may contain errors. Always follow the instructions of your doctor or pharmacist.",
            DocumentType::DiseaseLookup => SUGGESTIONS_DISCLAIMER,
            DocumentType::MedicineSearch => "This information is for educational purposes only and is not a substitute for professional medical advice.",
            DocumentType::Chat => "I am an AI assistant, not a medical professional. Please consult a doctor for medical advice.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Valid run that produced nothing meaningful.
    SuccessEmpty,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub kind: &'static str,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: String,
    pub document_type: String,
    pub status: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub warnings: Vec<String>,
    /// Success whose domain-knowledge fields were partly left undetermined.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    pub generated_at: DateTime<Utc>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status == Outcome::Success
    }
}

/// Success vs. SuccessEmpty, per the schema's outcome rule.
pub fn outcome_of(result: &NormalizedResult, schema: &DocumentSchema) -> Outcome {
    let meaningful = match schema.outcome {
        OutcomeRule::AnyRecord(name) => !result.records(name).is_empty(),
        OutcomeRule::AnyField(names) => names.iter().any(|name| {
            match (schema.field(name), result.get(name)) {
                (Some(field), Some(value)) => !field.is_default(value, &result.fields),
                _ => false,
            }
        }),
    };
    if meaningful {
        Outcome::Success
    } else {
        Outcome::SuccessEmpty
    }
}

/// Assemble a response from a normalized result.
pub fn assemble(
    result: NormalizedResult,
    schema: &DocumentSchema,
    disclaimers: &dyn DisclaimerProvider,
) -> Response {
    assemble_validated(
        ValidationResult {
            result,
            warnings: Vec::new(),
            undetermined: Vec::new(),
        },
        schema,
        disclaimers,
        &uuid::Uuid::new_v4().to_string(),
    )
}

/// Assemble a response from a validated result, keeping its warnings.
pub fn assemble_validated(
    validated: ValidationResult,
    schema: &DocumentSchema,
    disclaimers: &dyn DisclaimerProvider,
    request_id: &str,
) -> Response {
    let ValidationResult {
        result,
        mut warnings,
        undetermined,
    } = validated;

    let data = match ExtractionOutput::from_normalized(&result) {
        Ok(data) => data,
        Err(e) => return assemble_failure(&e, schema.document_type.as_str(), request_id),
    };

    let status = outcome_of(&result, schema);
    let degraded = status == Outcome::Success && !undetermined.is_empty();
    if degraded {
        warnings.push(format!(
            "{} detail(s) could not be determined by the model",
            undetermined.len()
        ));
    }

    let message = match status {
        Outcome::Success => schema.success_message,
        _ => schema.empty_message,
    };

    Response {
        request_id: request_id.to_string(),
        document_type: schema.document_type.to_string(),
        status,
        message: message.to_string(),
        data: Some(data),
        disclaimer: Some(disclaimers.disclaimer(schema.document_type).to_string()),
        warnings,
        degraded,
        failure: None,
        generated_at: Utc::now(),
    }
}

/// Assemble a failure response. Overload and server errors get distinct messages.
pub fn assemble_failure(error: &StructuringError, document_type: &str, request_id: &str) -> Response {
    let message = match error {
        StructuringError::BackendUnavailable(_) => OVERLOADED_MESSAGE.to_string(),
        StructuringError::UnknownDocumentType(_) | StructuringError::Composition(_) => {
            error.to_string()
        }
        other => format!("Server error: {other}"),
    };

    Response {
        request_id: request_id.to_string(),
        document_type: document_type.to_string(),
        status: Outcome::Failure,
        message,
        data: None,
        disclaimer: None,
        warnings: Vec::new(),
        degraded: false,
        failure: Some(FailureInfo {
            kind: error.kind(),
            retryable: error.is_retryable(),
        }),
        generated_at: Utc::now(),
    }
}
