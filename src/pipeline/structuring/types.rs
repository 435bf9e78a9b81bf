use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::DocumentPayload;
use super::StructuringError;
use crate::chat::ChatHistory;
use crate::models::{DocumentType, RiskCategory, TestStatus};

/// One extraction call: what to extract, from what, with which context.
/// Created per call and consumed once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub payload: Option<DocumentPayload>,
    /// Optional key/value context (patient age, gender, notes, ...).
    /// Ordered so that prompt composition is deterministic.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Read-only conversation log, only used by conversational flows.
    #[serde(default)]
    pub history: ChatHistory,
}

impl ExtractionRequest {
    pub fn new(payload: DocumentPayload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, key: &str, value: &str) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_history(mut self, history: ChatHistory) -> Self {
        self.history = history;
        self
    }
}

/// Untrusted structured output of the generative backend.
/// Only guaranteed to be a JSON object; everything inside may be missing or mis-shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate(Map<String, Value>);

impl Candidate {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<NormalizedResult> for Candidate {
    fn from(result: NormalizedResult) -> Self {
        Self(result.fields)
    }
}

/// A candidate after repair: every declared field is present with a valid value,
/// lists are real arrays, and nested records all carry their identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub document_type: DocumentType,
    pub fields: Map<String, Value>,
}

impl NormalizedResult {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Records of an array-of-record field (empty when absent).
    pub fn records(&self, name: &str) -> &[Value] {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

// ═══════════════════════════════════════════
// Typed outputs
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultItem {
    pub test_name: String,
    pub patient_value: String,
    pub normal_range_or_expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReportAnalysis {
    pub overall_risk_assessment: String,
    pub risk_category: RiskCategory,
    pub key_findings_summary: String,
    pub detailed_test_results: Vec<TestResultItem>,
    pub concise_summary: String,
    pub personalized_recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDetails {
    pub name: String,
    pub purpose: String,
    pub dosage: String,
    pub timing: String,
    pub how_to_take: String,
    pub common_side_effects: String,
    pub precautions: String,
    pub storage: String,
    pub missed_dose: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionInterpretation {
    pub medications: Vec<MedicationDetails>,
    pub expected_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMedication {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineSuggestions {
    pub suggestions: Vec<SuggestedMedication>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineInformation {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub dosage_forms: Vec<String>,
    pub common_side_effects: Vec<String>,
    pub image_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Typed view of a normalized result, one variant per document type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutput {
    MedicalReport(MedicalReportAnalysis),
    Prescription(PrescriptionInterpretation),
    DiseaseLookup(MedicineSuggestions),
    MedicineSearch(MedicineInformation),
    Chat(ChatReply),
}

impl ExtractionOutput {
    /// Deserialize a normalized result into its typed form.
    pub fn from_normalized(result: &NormalizedResult) -> Result<Self, StructuringError> {
        let value = result.to_value();
        let typed = match result.document_type {
            DocumentType::MedicalReport => serde_json::from_value(value).map(Self::MedicalReport),
            DocumentType::Prescription => serde_json::from_value(value).map(Self::Prescription),
            DocumentType::DiseaseLookup => serde_json::from_value(value).map(Self::DiseaseLookup),
            DocumentType::MedicineSearch => {
                serde_json::from_value(value).map(Self::MedicineSearch)
            }
            DocumentType::Chat => serde_json::from_value(value).map(Self::Chat),
        };
        typed.map_err(|e| {
            StructuringError::MalformedResponse(format!(
                "normalized {} result does not match its typed form: {e}",
                result.document_type
            ))
        })
    }
}

// ═══════════════════════════════════════════
// Generation backend abstraction
// ═══════════════════════════════════════════

/// A single request to the generative backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    /// Base64 image data (no data-URI prefix).
    pub images: Vec<String>,
    /// JSON-Schema the output should conform to.
    pub format: Value,
}

/// LLM client abstraction (allows mocking).
pub trait LlmClient {
    /// Run one generation and return the raw response text.
    fn generate(&self, request: &GenerationRequest) -> Result<String, StructuringError>;

    fn list_models(&self) -> Result<Vec<String>, StructuringError>;

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}
