//! Output contracts for each document type.
//!
//! A `DocumentSchema` is pure data: an ordered list of `FieldSpec`s plus the
//! payload requirement and outcome rule of its flow. The normalizer, the
//! prompt composer and the assembler are all driven by these values, so a new
//! document type is a new schema, never new pipeline code.

use serde_json::{json, Map, Value};

use crate::models::DocumentType;

/// Default for a domain-knowledge field the model could not determine.
pub const NOT_DETERMINED: &str = "Not determined";

/// Default for a document-sourced field absent from the source document.
pub const NOT_ON_DOCUMENT: &str = "Not specified on document";

/// Default for a top-level aggregate assessment.
pub const ASSESSMENT_NOT_DETERMINED: &str = "Assessment not determined.";

/// Where the correct value of a field is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    /// Only what is written on the submitted document.
    Document,
    /// The model's general trained medical knowledge, even if the document is silent.
    DomainKnowledge,
    /// The model's own synthesis over the whole input.
    Assessment,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::DomainKnowledge => "domain_knowledge",
            Self::Assessment => "assessment",
        }
    }

    /// Wording used when a field of this source is missing.
    pub fn default_text(&self) -> &'static str {
        match self {
            Self::Document => NOT_ON_DOCUMENT,
            Self::DomainKnowledge => NOT_DETERMINED,
            Self::Assessment => ASSESSMENT_NOT_DETERMINED,
        }
    }
}

/// Value domain of a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    /// Closed set of canonical spellings; `fallback` is used for anything else.
    Enum {
        values: &'static [&'static str],
        fallback: &'static str,
    },
    TextList,
    Records(&'static RecordSchema),
}

/// What to do when a field has no usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    /// Wording follows the field's evidence source.
    BySource,
    Literal(&'static str),
    /// `text` when `sibling` holds a value, the evidence-source wording otherwise.
    WhenSiblingPresent {
        sibling: &'static str,
        text: &'static str,
    },
    /// Identity field: the whole record is dropped.
    DropRecord,
    /// Optional field: left out of the result.
    Omit,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub source: EvidenceSource,
    pub default: DefaultPolicy,
}

impl FieldSpec {
    pub const fn text(
        name: &'static str,
        source: EvidenceSource,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            kind: FieldKind::Text,
            required: true,
            source,
            default: DefaultPolicy::BySource,
        }
    }

    pub const fn enumeration(
        name: &'static str,
        values: &'static [&'static str],
        fallback: &'static str,
        source: EvidenceSource,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            kind: FieldKind::Enum { values, fallback },
            required: true,
            source,
            default: DefaultPolicy::Literal(fallback),
        }
    }

    pub const fn text_list(
        name: &'static str,
        source: EvidenceSource,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            kind: FieldKind::TextList,
            required: true,
            source,
            default: DefaultPolicy::BySource,
        }
    }

    pub const fn records(
        name: &'static str,
        schema: &'static RecordSchema,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            kind: FieldKind::Records(schema),
            required: true,
            source: EvidenceSource::Document,
            default: DefaultPolicy::BySource,
        }
    }

    /// Mark as not required. Scalars with no value are omitted; lists stay empty.
    pub const fn optional(self) -> Self {
        Self {
            required: false,
            default: DefaultPolicy::Omit,
            ..self
        }
    }

    /// Mark as the identity field of its record.
    pub const fn identity(self) -> Self {
        Self {
            default: DefaultPolicy::DropRecord,
            ..self
        }
    }

    pub const fn default_to(self, default: DefaultPolicy) -> Self {
        Self { default, ..self }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, FieldKind::TextList | FieldKind::Records(_))
    }

    /// The value a missing field receives, given the other (already normalized)
    /// fields of its record. `None` means the field stays absent.
    pub fn default_value(&self, record: &Map<String, Value>) -> Option<Value> {
        if self.is_list() {
            return Some(Value::Array(Vec::new()));
        }
        let text = match self.default {
            DefaultPolicy::BySource => self.source.default_text(),
            DefaultPolicy::Literal(text) => text,
            DefaultPolicy::WhenSiblingPresent { sibling, text } => {
                let has_sibling = record
                    .get(sibling)
                    .and_then(Value::as_str)
                    .is_some_and(|s| !s.trim().is_empty());
                if has_sibling {
                    text
                } else {
                    self.source.default_text()
                }
            }
            DefaultPolicy::DropRecord | DefaultPolicy::Omit => return None,
        };
        Some(Value::String(text.to_string()))
    }

    /// Whether `value` is exactly what defaulting would have produced.
    pub fn is_default(&self, value: &Value, record: &Map<String, Value>) -> bool {
        match value {
            Value::Array(items) => items.is_empty(),
            other => self.default_value(record).as_ref() == Some(other),
        }
    }

    /// Human-readable description of the field's evidence rule for the prompt.
    pub fn evidence_rule(&self) -> &'static str {
        match self.source {
            EvidenceSource::Document => "copy ONLY from the document; never infer",
            EvidenceSource::DomainKnowledge => {
                "use your general medical knowledge, even if the document is silent"
            }
            EvidenceSource::Assessment => "your own concise assessment of the whole input",
        }
    }

    /// JSON-Schema fragment for this field.
    pub fn shape(&self) -> Value {
        match self.kind {
            FieldKind::Text => json!({ "type": "string", "description": self.description }),
            FieldKind::Enum { values, .. } => json!({
                "type": "string",
                "enum": values,
                "description": self.description,
            }),
            FieldKind::TextList => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": self.description,
            }),
            FieldKind::Records(schema) => json!({
                "type": "array",
                "items": schema.shape(),
                "description": self.description,
            }),
        }
    }
}

/// An ordered set of fields, either a document's root or a nested record type.
#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field whose absence drops the record, if any.
    pub fn identity(&self) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.default == DefaultPolicy::DropRecord)
    }

    /// JSON-Schema object descriptor.
    pub fn shape(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in self.fields {
            properties.insert(field.name.to_string(), field.shape());
            if field.required {
                required.push(Value::String(field.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// What the request payload must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// An encoded document as image data URIs (PDFs arrive as one image per page).
    Media,
    /// Free text typed by the user.
    Text,
    /// One or more entries typed by the user, separated by commas or newlines.
    TextList,
}

/// Optional request context rendered into the prompt.
#[derive(Debug, Clone, Copy)]
pub struct ContextField {
    pub key: &'static str,
    pub label: &'static str,
}

/// Decides between `Success` and `SuccessEmpty`.
#[derive(Debug, Clone, Copy)]
pub enum OutcomeRule {
    /// Success when the named record list is non-empty.
    AnyRecord(&'static str),
    /// Success when any of the named fields differs from its default.
    AnyField(&'static [&'static str]),
}

#[derive(Debug)]
pub struct DocumentSchema {
    pub document_type: DocumentType,
    /// Persona the backend is asked to adopt.
    pub role: &'static str,
    /// Task statement placed before the field guide.
    pub task: &'static str,
    pub payload: PayloadKind,
    /// How the payload is introduced in the prompt.
    pub input_label: &'static str,
    pub context_fields: &'static [ContextField],
    /// Whether the chat history is rendered into the prompt.
    pub uses_history: bool,
    pub root: RecordSchema,
    pub outcome: OutcomeRule,
    pub success_message: &'static str,
    /// Shown when nothing meaningful could be extracted.
    pub empty_message: &'static str,
}

impl DocumentSchema {
    /// Machine-checkable shape descriptor handed to the backend.
    pub fn shape_descriptor(&self) -> Value {
        self.root.shape()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.root.field(name)
    }
}
