//! Built-in document schemas and the process-wide registry.
//!
//! Schemas are `static` data, the registry is built once on first use and is
//! read-only afterwards.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use super::schema::{
    ContextField, DefaultPolicy, DocumentSchema, EvidenceSource, FieldSpec, OutcomeRule,
    PayloadKind, RecordSchema,
};
use super::StructuringError;
use crate::models::DocumentType;

use EvidenceSource::{Assessment, DomainKnowledge, Document};

/// Generic storage advice given to a named medication when the document is silent.
pub const GENERIC_STORAGE_ADVICE: &str = "Store at room temperature, away from moisture, heat and direct light, unless the label says otherwise.";

/// Fallback chat reply.
pub const CHAT_NO_RESPONSE: &str =
    "I'm sorry, I couldn't generate a response. Please try again.";

const TEST_STATUSES: &[&str] = &["normal", "low", "high", "watch", "danger", "info"];
const RISK_CATEGORIES: &[&str] = &["Normal", "Watch", "Danger", "Undetermined"];

// ═══════════════════════════════════════════
// Medical report analysis
// ═══════════════════════════════════════════

static TEST_RESULT: RecordSchema = RecordSchema {
    name: "test_result",
    fields: &[
        FieldSpec::text(
            "testName",
            Document,
            "Name of the test or observation, e.g. \"Hemoglobin\" or \"Chest X-Ray Finding\".",
        )
        .identity(),
        FieldSpec::text(
            "patientValue",
            Document,
            "The patient's value or observed finding, including units.",
        ),
        FieldSpec::text(
            "normalRangeOrExpected",
            DomainKnowledge,
            "Normal reference range, or the expected finding for qualitative observations.",
        ),
        FieldSpec::text("unit", Document, "Measurement unit, e.g. mg/dL.").optional(),
        FieldSpec::enumeration(
            "status",
            TEST_STATUSES,
            "info",
            Assessment,
            "normal | low | high | watch (borderline) | danger (critical) | info (descriptive).",
        ),
        FieldSpec::text(
            "interpretation",
            Assessment,
            "One or two short sentences, only when status is not normal or info.",
        )
        .optional(),
    ],
};

pub static MEDICAL_REPORT: DocumentSchema = DocumentSchema {
    document_type: DocumentType::MedicalReport,
    role: "You are an expert medical AI assistant that analyzes medical test reports.",
    task: "Analyze the attached medical test report (lab results, X-ray, MRI, ...). \
           Extract the significant quantitative tests and qualitative findings, then \
           summarize them concisely. Be selective and prioritize accuracy of values and ranges.",
    payload: PayloadKind::Media,
    input_label: "Medical report",
    context_fields: &[
        ContextField {
            key: "patientInformation",
            label: "General",
        },
        ContextField {
            key: "age",
            label: "Age",
        },
        ContextField {
            key: "gender",
            label: "Gender",
        },
    ],
    uses_history: false,
    root: RecordSchema {
        name: "medical_report",
        fields: &[
            FieldSpec::text(
                "overallRiskAssessment",
                Assessment,
                "Overall risk (Normal, Watch or Danger) with a 1-2 sentence reason.",
            ),
            FieldSpec::enumeration(
                "riskCategory",
                RISK_CATEGORIES,
                "Undetermined",
                Assessment,
                "The risk category alone: Normal, Watch or Danger.",
            ),
            FieldSpec::text(
                "keyFindingsSummary",
                Assessment,
                "2-3 sentences on the most critical abnormal findings, or that all are normal.",
            ),
            FieldSpec::records(
                "detailedTestResults",
                &TEST_RESULT,
                "One entry per significant test or finding.",
            ),
            FieldSpec::text(
                "conciseSummary",
                Assessment,
                "1-2 sentences on what kind of report this is.",
            ),
            FieldSpec::text(
                "personalizedRecommendations",
                Assessment,
                "2-3 short actionable next steps or questions for a doctor.",
            ),
        ],
    },
    outcome: OutcomeRule::AnyField(&[
        "detailedTestResults",
        "overallRiskAssessment",
        "keyFindingsSummary",
        "conciseSummary",
    ]),
    success_message: "Report analyzed successfully.",
    empty_message: "No test results or findings could be extracted from the report. Please ensure the document is clear and readable.",
};

// ═══════════════════════════════════════════
// Prescription interpretation
// ═══════════════════════════════════════════

static MEDICATION: RecordSchema = RecordSchema {
    name: "medication",
    fields: &[
        FieldSpec::text("name", Document, "The medication name as written.").identity(),
        FieldSpec::text(
            "purpose",
            DomainKnowledge,
            "What the medication is primarily used for. Be specific.",
        ),
        FieldSpec::text("dosage", Document, "Prescribed dosage, e.g. \"1 tablet\", \"10mg\"."),
        FieldSpec::text("timing", Document, "When to take it, e.g. \"Twice daily\"."),
        FieldSpec::text(
            "howToTake",
            Document,
            "How to take it, e.g. with food, with water, do not crush.",
        ),
        FieldSpec::text(
            "commonSideEffects",
            DomainKnowledge,
            "Summary of the key common side effects.",
        ),
        FieldSpec::text(
            "precautions",
            Document,
            "Warnings or patient groups to be careful with, as written.",
        ),
        FieldSpec::text("storage", Document, "Storage conditions.").default_to(
            DefaultPolicy::WhenSiblingPresent {
                sibling: "name",
                text: GENERIC_STORAGE_ADVICE,
            },
        ),
        FieldSpec::text(
            "missedDose",
            DomainKnowledge,
            "What to do if a dose is missed.",
        ),
    ],
};

pub static PRESCRIPTION: DocumentSchema = DocumentSchema {
    document_type: DocumentType::Prescription,
    role: "You are a medical expert specializing in interpreting prescriptions.",
    task: "Analyze the attached prescription. List every medication it contains. \
           Name, purpose and common side effects are crucial for each medication.",
    payload: PayloadKind::Media,
    input_label: "Prescription",
    context_fields: &[],
    uses_history: false,
    root: RecordSchema {
        name: "prescription",
        fields: &[
            FieldSpec::records("medications", &MEDICATION, "One entry per medication."),
            FieldSpec::text_list(
                "expectedConditions",
                DomainKnowledge,
                "Conditions the prescription most likely treats.",
            )
            .optional(),
        ],
    },
    outcome: OutcomeRule::AnyRecord("medications"),
    success_message: "Prescription interpreted successfully.",
    empty_message: "No conditions or medications could be identified from the prescription. Please ensure the document is clear.",
};

// ═══════════════════════════════════════════
// Medicine suggestions by disease
// ═══════════════════════════════════════════

static SUGGESTED_MEDICATION: RecordSchema = RecordSchema {
    name: "suggested_medication",
    fields: &[
        FieldSpec::text("name", DomainKnowledge, "Name of the suggested medication.").identity(),
        FieldSpec::text(
            "reason",
            DomainKnowledge,
            "Brief reason it is used for the given disease(s).",
        ),
    ],
};

pub static DISEASE_LOOKUP: DocumentSchema = DocumentSchema {
    document_type: DocumentType::DiseaseLookup,
    role: "You are a medical information assistant.",
    task: "Suggest potential medications commonly used for the listed disease(s).",
    payload: PayloadKind::TextList,
    input_label: "Disease(s)",
    context_fields: &[],
    uses_history: false,
    root: RecordSchema {
        name: "disease_lookup",
        fields: &[FieldSpec::records(
            "suggestions",
            &SUGGESTED_MEDICATION,
            "Suggested medications.",
        )],
    },
    outcome: OutcomeRule::AnyRecord("suggestions"),
    success_message: "Medicine suggestions retrieved successfully.",
    empty_message: "No medicine suggestions could be found for the given disease(s).",
};

// ═══════════════════════════════════════════
// Medicine search
// ═══════════════════════════════════════════

pub static MEDICINE_SEARCH: DocumentSchema = DocumentSchema {
    document_type: DocumentType::MedicineSearch,
    role: "You are a helpful medical information assistant.",
    task: "Describe the medicine the user is searching for. If you have no reliable \
           information about it, leave name empty.",
    payload: PayloadKind::Text,
    input_label: "Medicine searched for",
    context_fields: &[],
    uses_history: false,
    root: RecordSchema {
        name: "medicine_search",
        fields: &[
            FieldSpec::text("name", DomainKnowledge, "Common name of the medicine."),
            FieldSpec::text("description", DomainKnowledge, "What the medicine is."),
            FieldSpec::text(
                "usage",
                DomainKnowledge,
                "What it is typically used for and its main indications.",
            ),
            FieldSpec::text_list(
                "dosageForms",
                DomainKnowledge,
                "Common dosage forms, e.g. tablet, capsule, syrup.",
            ),
            FieldSpec::text_list(
                "commonSideEffects",
                DomainKnowledge,
                "Common side effects.",
            ),
            FieldSpec::text(
                "imageHint",
                DomainKnowledge,
                "1-2 word image hint, e.g. \"pills capsules\". Never a URL.",
            )
            .default_to(DefaultPolicy::Literal("medicine")),
        ],
    },
    outcome: OutcomeRule::AnyField(&["name"]),
    success_message: "Medicine information retrieved successfully.",
    empty_message: "No information found for this medicine. Please check the spelling and try again.",
};

// ═══════════════════════════════════════════
// Chat assistant
// ═══════════════════════════════════════════

pub static CHAT: DocumentSchema = DocumentSchema {
    document_type: DocumentType::Chat,
    role: "You are a friendly and helpful AI assistant for the MediMind application. \
           You help users with questions about the app's features (medical report analysis, \
           prescription interpretation, medicine search, medicine by disease, appointment \
           booking) or general health topics. Keep answers concise. When asked about \
           medical topics, always state that you are an AI assistant, not a medical \
           professional, and that the user should consult a doctor.",
    task: "Reply to the user's latest message, taking the conversation so far into account.",
    payload: PayloadKind::Text,
    input_label: "User's latest message",
    context_fields: &[],
    uses_history: true,
    root: RecordSchema {
        name: "chat",
        fields: &[FieldSpec::text("response", Assessment, "Your reply to the user.")
            .default_to(DefaultPolicy::Literal(CHAT_NO_RESPONSE))],
    },
    outcome: OutcomeRule::AnyField(&["response"]),
    success_message: "Reply generated.",
    empty_message: CHAT_NO_RESPONSE,
};

// ═══════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════

static GLOBAL: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::builtin);

/// Immutable lookup from document type to schema.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<DocumentType, &'static DocumentSchema>,
}

impl SchemaRegistry {
    /// Registry over an explicit set of schemas. The first schema registered
    /// for a document type wins.
    pub fn new(schemas: &[&'static DocumentSchema]) -> Self {
        let mut map = HashMap::with_capacity(schemas.len());
        for schema in schemas {
            if map.contains_key(&schema.document_type) {
                tracing::warn!(
                    document_type = %schema.document_type,
                    "Duplicate schema registration ignored"
                );
                continue;
            }
            map.insert(schema.document_type, *schema);
        }
        Self { schemas: map }
    }

    /// All built-in document types.
    pub fn builtin() -> Self {
        Self::new(&[
            &MEDICAL_REPORT,
            &PRESCRIPTION,
            &DISEASE_LOOKUP,
            &MEDICINE_SEARCH,
            &CHAT,
        ])
    }

    /// Process-wide registry, built on first use.
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL
    }

    /// Look up a schema by its wire name, e.g. `"prescription"`.
    pub fn get(&self, document_type: &str) -> Result<&'static DocumentSchema, StructuringError> {
        let parsed = DocumentType::from_str(document_type.trim())
            .map_err(|_| StructuringError::UnknownDocumentType(document_type.to_string()))?;
        self.schema_for(parsed)
    }

    pub fn schema_for(
        &self,
        document_type: DocumentType,
    ) -> Result<&'static DocumentSchema, StructuringError> {
        self.schemas
            .get(&document_type)
            .copied()
            .ok_or_else(|| StructuringError::UnknownDocumentType(document_type.to_string()))
    }

    /// Registered schemas in a stable order.
    pub fn schemas(&self) -> Vec<&'static DocumentSchema> {
        DocumentType::ALL
            .iter()
            .filter_map(|t| self.schemas.get(t).copied())
            .collect()
    }
}
