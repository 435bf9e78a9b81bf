// Plausibility checks on a normalized result.
// Runs after normalization and never fails. Records that look like
// hallucinations or injection artifacts are removed; record counts are capped.
// Removing whole records keeps every normalization invariant intact.

use serde_json::Value;

use super::schema::{DocumentSchema, EvidenceSource, FieldKind, FieldSpec, NOT_DETERMINED};
use super::types::NormalizedResult;

/// Maximum plausible records in one array field from a single document.
pub const MAX_RECORDS: usize = 40;

/// Longest plausible identity value (a medication or test name).
const MAX_IDENTITY_LEN: usize = 200;

/// Result after validation: possibly filtered, plus warnings.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub result: NormalizedResult,
    pub warnings: Vec<String>,
    /// Paths of domain-knowledge fields left at "not determined".
    pub undetermined: Vec<String>,
}

/// Validate a normalized result for plausibility.
pub fn validate_result(
    mut result: NormalizedResult,
    schema: &DocumentSchema,
    request_id: Option<&str>,
) -> ValidationResult {
    let mut warnings = Vec::new();

    for field in schema.root.fields {
        if let FieldKind::Records(record) = field.kind {
            let Some(Value::Array(items)) = result.fields.get_mut(field.name) else {
                continue;
            };
            let Some(identity) = record.identity() else {
                continue;
            };

            let before = items.len();
            items.retain(|item| {
                let name = item.get(identity.name).and_then(Value::as_str).unwrap_or("");
                !contains_injection_pattern(name) && name.chars().count() <= MAX_IDENTITY_LEN
            });
            let removed = before - items.len();
            if removed > 0 {
                warnings.push(format!(
                    "{removed} {} entr{} with suspicious {} removed",
                    record.name,
                    if removed == 1 { "y" } else { "ies" },
                    identity.name
                ));
            }

            if items.len() > MAX_RECORDS {
                warnings.push(format!(
                    "Excessive {} entries ({}) capped to {MAX_RECORDS}",
                    record.name,
                    items.len()
                ));
                items.truncate(MAX_RECORDS);
            }
        }
    }

    let undetermined = undetermined_fields(&result, schema);

    if !warnings.is_empty() {
        tracing::warn!(
            request_id = request_id.unwrap_or("unknown"),
            document_type = %schema.document_type,
            warning_count = warnings.len(),
            "Result validation warnings detected"
        );
    }

    ValidationResult {
        result,
        warnings,
        undetermined,
    }
}

/// Domain-knowledge text fields the model left undetermined, as paths.
fn undetermined_fields(result: &NormalizedResult, schema: &DocumentSchema) -> Vec<String> {
    let mut paths = Vec::new();
    for field in schema.root.fields {
        match field.kind {
            FieldKind::Records(record) => {
                for (index, item) in result.records(field.name).iter().enumerate() {
                    for nested in record.fields {
                        if is_undetermined(nested, item.get(nested.name)) {
                            paths.push(format!("{}[{index}].{}", field.name, nested.name));
                        }
                    }
                }
            }
            _ => {
                if is_undetermined(field, result.get(field.name)) {
                    paths.push(field.name.to_string());
                }
            }
        }
    }
    paths
}

fn is_undetermined(field: &FieldSpec, value: Option<&Value>) -> bool {
    field.source == EvidenceSource::DomainKnowledge
        && matches!(field.kind, FieldKind::Text)
        && value.and_then(Value::as_str) == Some(NOT_DETERMINED)
}

/// Prompt-injection markers that have no place in a medical name.
fn contains_injection_pattern(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("ignore previous")
        || lower.contains("ignore all")
        || lower.contains("disregard")
        || lower.contains("system:")
        || lower.contains("[inst]")
        || lower.contains("<instruction")
        || lower.contains("</document")
        || lower.contains("<|im_start|>")
}
