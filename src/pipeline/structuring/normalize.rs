//! Normalizer: turns an untrusted candidate into a schema-complete result.
//!
//! Records are normalized bottom-up. Within a record the identity field is
//! resolved first (a record without one is dropped), then every present value
//! is coerced to its field kind, and only then are the missing fields filled
//! from their default policy, so sibling-dependent defaults see final values.
//! Every step maps an already-normalized value to itself, which makes
//! `normalize` idempotent.

use serde_json::{Map, Value};

use super::sanitize::clean_output_text;
use super::schema::{DocumentSchema, FieldKind, FieldSpec, RecordSchema};
use super::types::{Candidate, NormalizedResult};

/// One repair applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// A missing or unusable field received its default.
    Defaulted(String),
    /// A value of the wrong shape was converted.
    Coerced { path: String, from: &'static str },
    /// A nested record without identity was removed.
    DroppedRecord(String),
    /// A key not declared by the schema was removed.
    DroppedKey(String),
}

/// Everything normalization had to change, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairLog {
    repairs: Vec<Repair>,
}

impl RepairLog {
    fn push(&mut self, repair: Repair) {
        self.repairs.push(repair);
    }

    pub fn repairs(&self) -> &[Repair] {
        &self.repairs
    }

    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn defaulted(&self) -> impl Iterator<Item = &str> {
        self.repairs.iter().filter_map(|r| match r {
            Repair::Defaulted(path) => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn coerced_count(&self) -> usize {
        self.repairs
            .iter()
            .filter(|r| matches!(r, Repair::Coerced { .. }))
            .count()
    }

    pub fn dropped_records(&self) -> usize {
        self.repairs
            .iter()
            .filter(|r| matches!(r, Repair::DroppedRecord(_)))
            .count()
    }

    pub fn dropped_keys(&self) -> usize {
        self.repairs
            .iter()
            .filter(|r| matches!(r, Repair::DroppedKey(_)))
            .count()
    }
}

/// Normalize `candidate` (or its absence) against `schema`. Never fails.
pub fn normalize(candidate: Option<&Candidate>, schema: &DocumentSchema) -> NormalizedResult {
    normalize_with_report(candidate, schema).0
}

/// Like [`normalize`], also returning the list of repairs applied.
pub fn normalize_with_report(
    candidate: Option<&Candidate>,
    schema: &DocumentSchema,
) -> (NormalizedResult, RepairLog) {
    let mut log = RepairLog::default();
    let empty = Map::new();
    let input = candidate.map(Candidate::fields).unwrap_or(&empty);

    // The root record has no identity field, so it is always kept.
    let fields = normalize_record(input, &schema.root, "", &mut log).unwrap_or_default();

    (
        NormalizedResult {
            document_type: schema.document_type,
            fields,
        },
        log,
    )
}

fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Normalize one record. `None` when its identity field has no usable value.
fn normalize_record(
    input: &Map<String, Value>,
    schema: &RecordSchema,
    path: &str,
    log: &mut RepairLog,
) -> Option<Map<String, Value>> {
    let mut out = Map::new();

    let identity = schema.identity();
    if let Some(id) = identity {
        let value = input
            .get(id.name)
            .and_then(|v| normalize_value(v, id, &field_path(path, id.name), log))?;
        out.insert(id.name.to_string(), value);
    }

    for field in schema.fields {
        if identity.is_some_and(|id| id.name == field.name) {
            continue;
        }
        let field_path = field_path(path, field.name);
        if let Some(value) = input
            .get(field.name)
            .and_then(|v| normalize_value(v, field, &field_path, log))
        {
            out.insert(field.name.to_string(), value);
        }
    }

    for field in schema.fields {
        if out.contains_key(field.name) {
            continue;
        }
        if let Some(default) = field.default_value(&out) {
            if !field.is_list() {
                log.push(Repair::Defaulted(field_path(path, field.name)));
            }
            out.insert(field.name.to_string(), default);
        }
    }

    for key in input.keys() {
        if schema.field(key).is_none() {
            log.push(Repair::DroppedKey(field_path(path, key)));
        }
    }

    Some(out)
}

/// Coerce a present value to the field's kind. `None` means "no usable value".
fn normalize_value(
    value: &Value,
    field: &FieldSpec,
    path: &str,
    log: &mut RepairLog,
) -> Option<Value> {
    match field.kind {
        FieldKind::Text => text_value(value, path, log).map(Value::String),
        FieldKind::Enum { values, .. } => {
            let text = text_value(value, path, log)?;
            match canonical_enum(&text, values) {
                Some(canonical) => {
                    if canonical != text {
                        log.push(Repair::Coerced {
                            path: path.to_string(),
                            from: "non-canonical enum",
                        });
                    }
                    Some(Value::String(canonical.to_string()))
                }
                None => None,
            }
        }
        FieldKind::TextList => text_list(value, path, log).map(Value::Array),
        FieldKind::Records(record) => records(value, record, path, log).map(Value::Array),
    }
}

/// Scalar text from any JSON value. Blank text counts as absent.
fn text_value(value: &Value, path: &str, log: &mut RepairLog) -> Option<String> {
    let text = match value {
        Value::String(s) => clean_output_text(s),
        Value::Number(n) => {
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "number",
            });
            n.to_string()
        }
        Value::Bool(b) => {
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "boolean",
            });
            b.to_string()
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "array",
            });
            parts.join(", ")
        }
        Value::Null | Value::Object(_) => return None,
    };

    if text.is_empty() || is_placeholder(&text) {
        None
    } else {
        Some(text)
    }
}

/// Text of a scalar array element, cleaned. Non-scalars and blanks are skipped.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => clean_output_text(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty() && !is_placeholder(&text)).then_some(text)
}

/// Literal null markers some models emit as strings.
fn is_placeholder(text: &str) -> bool {
    text.eq_ignore_ascii_case("null") || text.eq_ignore_ascii_case("undefined")
}

/// Case-insensitive match, then match on the leading word ("Watch: borderline" → "Watch").
fn canonical_enum(text: &str, values: &'static [&'static str]) -> Option<&'static str> {
    if let Some(exact) = values.iter().find(|v| v.eq_ignore_ascii_case(text)) {
        return Some(*exact);
    }
    let leading = text
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())?;
    values
        .iter()
        .find(|v| v.eq_ignore_ascii_case(leading))
        .copied()
}

fn text_list(value: &Value, path: &str, log: &mut RepairLog) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .iter()
                .filter_map(scalar_text)
                .map(Value::String)
                .collect();
            if kept.len() != items.len() {
                log.push(Repair::Coerced {
                    path: path.to_string(),
                    from: "blank or non-text entries",
                });
            }
            Some(kept)
        }
        Value::Null => None,
        Value::Object(_) => {
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "object",
            });
            Some(Vec::new())
        }
        scalar => {
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "scalar",
            });
            Some(scalar_text(scalar).map(Value::String).into_iter().collect())
        }
    }
}

fn records(
    value: &Value,
    schema: &RecordSchema,
    path: &str,
    log: &mut RepairLog,
) -> Option<Vec<Value>> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => return None,
        single => {
            log.push(Repair::Coerced {
                path: path.to_string(),
                from: "single record",
            });
            vec![single]
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let item_path = format!("{path}[{index}]");
        let promoted;
        let fields = match item {
            Value::Object(fields) => fields,
            Value::String(_) | Value::Number(_) => match schema.identity() {
                Some(id) => {
                    log.push(Repair::Coerced {
                        path: item_path.clone(),
                        from: "bare identity",
                    });
                    let mut map = Map::new();
                    map.insert(id.name.to_string(), item.clone());
                    promoted = map;
                    &promoted
                }
                None => {
                    log.push(Repair::DroppedRecord(item_path));
                    continue;
                }
            },
            _ => {
                log.push(Repair::DroppedRecord(item_path));
                continue;
            }
        };

        match normalize_record(fields, schema, &item_path, log) {
            Some(record) => out.push(Value::Object(record)),
            None => log.push(Repair::DroppedRecord(item_path)),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::registry::{
        SchemaRegistry, CHAT, DISEASE_LOOKUP, GENERIC_STORAGE_ADVICE, MEDICAL_REPORT,
        MEDICINE_SEARCH, PRESCRIPTION, CHAT_NO_RESPONSE,
    };
    use crate::pipeline::structuring::schema::{
        ASSESSMENT_NOT_DETERMINED, NOT_DETERMINED, NOT_ON_DOCUMENT,
    };
    use serde_json::json;

    fn candidate(value: Value) -> Candidate {
        let Value::Object(fields) = value else {
            panic!("candidate must be an object");
        };
        Candidate::new(fields)
    }

    fn run(schema: &DocumentSchema, value: Value) -> NormalizedResult {
        normalize(Some(&candidate(value)), schema)
    }

    /// Candidates that exercise every repair path across all schemas.
    fn messy_candidates() -> Vec<Value> {
        vec![
            json!({}),
            json!({ "medications": [{ "name": "Amoxicillin" }] }),
            json!({ "medications": [{ "purpose": "antibiotic" }] }),
            json!({ "medications": { "name": "Ibuprofen", "dosage": 400 } }),
            json!({ "medications": ["Paracetamol", "", null, 7] }),
            json!({ "medications": [{ "name": "  " }, { "name": "Metformin", "storage": "" }] }),
            json!({ "medications": "Lisinopril", "expectedConditions": "Hypertension" }),
            json!({ "medications": null, "expectedConditions": ["", "Diabetes", null] }),
            json!({
                "overallRiskAssessment": "WATCH: borderline",
                "riskCategory": "watch",
                "detailedTestResults": { "testName": "Hemoglobin", "status": "LOW", "unit": "" }
            }),
            json!({
                "detailedTestResults": [
                    { "testName": "Glucose", "patientValue": 126, "status": "critical" },
                    { "patientValue": "12" }
                ],
                "keyFindingsSummary": ["High glucose", "Low iron"],
                "extra": true
            }),
            json!({ "suggestions": [{ "name": "Metformin", "reason": null }, "Insulin"] }),
            json!({ "name": "Ibuprofen", "dosageForms": "tablet", "commonSideEffects": [1, true] }),
            json!({ "name": "", "imageHint": null }),
            json!({ "response": "Hello <script>x</script>there\u{200B}" }),
            json!({ "response": false }),
        ]
    }

    fn required_fields_present(schema: &DocumentSchema, result: &NormalizedResult) {
        for field in schema.root.fields {
            if field.required {
                let value = result
                    .get(field.name)
                    .unwrap_or_else(|| panic!("{} missing", field.name));
                assert!(!value.is_null(), "{} is null", field.name);
            }
            if let FieldKind::Records(record) = field.kind {
                for item in result.records(field.name) {
                    for nested in record.fields.iter().filter(|f| f.required) {
                        let value = item.get(nested.name).unwrap_or_else(|| {
                            panic!("{}.{} missing", field.name, nested.name)
                        });
                        assert!(!value.is_null());
                    }
                }
            }
        }
    }

    // ── properties ───────────────────────────────────────────

    #[test]
    fn normalize_is_idempotent() {
        for schema in SchemaRegistry::global().schemas() {
            for value in messy_candidates() {
                let once = run(schema, value.clone());
                let twice = normalize(Some(&Candidate::from(once.clone())), schema);
                assert_eq!(once, twice, "{} not idempotent for {value}", schema.document_type);
            }
        }
    }

    #[test]
    fn normalized_result_needs_no_repairs() {
        for schema in SchemaRegistry::global().schemas() {
            for value in messy_candidates() {
                let once = run(schema, value);
                let (_, log) = normalize_with_report(Some(&Candidate::from(once)), schema);
                assert!(log.is_empty(), "{:?}", log.repairs());
            }
        }
    }

    #[test]
    fn normalize_is_total() {
        for schema in SchemaRegistry::global().schemas() {
            required_fields_present(schema, &normalize(None, schema));
            for value in messy_candidates() {
                required_fields_present(schema, &run(schema, value));
            }
        }
    }

    #[test]
    fn every_record_keeps_its_identity() {
        for schema in SchemaRegistry::global().schemas() {
            for value in messy_candidates() {
                let result = run(schema, value);
                for field in schema.root.fields {
                    let FieldKind::Records(record) = field.kind else {
                        continue;
                    };
                    let Some(id) = record.identity() else {
                        continue;
                    };
                    for item in result.records(field.name) {
                        let identity = item.get(id.name).and_then(Value::as_str).unwrap_or("");
                        assert!(!identity.trim().is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn only_declared_fields_survive() {
        let result = run(&MEDICAL_REPORT, json!({ "extra": 1, "conciseSummary": "CBC" }));
        for key in result.fields.keys() {
            assert!(MEDICAL_REPORT.field(key).is_some(), "{key} leaked");
        }
    }

    // ── scenarios ────────────────────────────────────────────

    #[test]
    fn named_medication_gets_knowledge_defaults() {
        let result = run(&PRESCRIPTION, json!({ "medications": [{ "name": "Amoxicillin" }] }));
        let meds = result.records("medications");
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0]["name"], "Amoxicillin");
        assert_eq!(meds[0]["purpose"], NOT_DETERMINED);
        assert_eq!(meds[0]["commonSideEffects"], NOT_DETERMINED);
        assert_eq!(meds[0]["dosage"], NOT_ON_DOCUMENT);
        assert_eq!(meds[0]["storage"], GENERIC_STORAGE_ADVICE);
    }

    #[test]
    fn nameless_medication_is_dropped() {
        let (result, log) = normalize_with_report(
            Some(&candidate(json!({ "medications": [{ "purpose": "antibiotic" }] }))),
            &PRESCRIPTION,
        );
        assert!(result.records("medications").is_empty());
        assert_eq!(log.dropped_records(), 1);
    }

    #[test]
    fn blank_identity_dropped_well_formed_kept() {
        let result = run(
            &PRESCRIPTION,
            json!({ "medications": [
                { "name": "", "purpose": "unknown" },
                { "name": "Metformin", "dosage": "500mg" }
            ] }),
        );
        let meds = result.records("medications");
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0]["name"], "Metformin");
        assert_eq!(meds[0]["dosage"], "500mg");
    }

    #[test]
    fn document_and_knowledge_defaults_differ() {
        let result = run(&PRESCRIPTION, json!({ "medications": [{ "name": "Aspirin" }] }));
        let med = &result.records("medications")[0];
        assert_ne!(med["timing"], med["missedDose"]);
    }

    #[test]
    fn single_record_becomes_one_element_array() {
        let result = run(
            &PRESCRIPTION,
            json!({ "medications": { "name": "Ibuprofen", "dosage": "400mg" } }),
        );
        let meds = result.records("medications");
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0]["dosage"], "400mg");
    }

    #[test]
    fn bare_strings_are_promoted_to_records() {
        let result = run(&DISEASE_LOOKUP, json!({ "suggestions": ["Metformin", "  "] }));
        let suggestions = result.records("suggestions");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0]["name"], "Metformin");
        assert_eq!(suggestions[0]["reason"], NOT_DETERMINED);
    }

    #[test]
    fn missing_aggregates_get_assessment_default() {
        let result = normalize(None, &MEDICAL_REPORT);
        assert_eq!(result.text("overallRiskAssessment"), Some(ASSESSMENT_NOT_DETERMINED));
        assert_eq!(result.text("riskCategory"), Some("Undetermined"));
        assert!(result.records("detailedTestResults").is_empty());
    }

    #[test]
    fn storage_without_identity_context_uses_document_default() {
        // The storage field only sees generic advice when the record has a name.
        let storage = PRESCRIPTION
            .field("medications")
            .and_then(|f| match f.kind {
                FieldKind::Records(r) => r.field("storage"),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            storage.default_value(&Map::new()),
            Some(Value::String(NOT_ON_DOCUMENT.into()))
        );
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let result = run(
            &MEDICAL_REPORT,
            json!({ "detailedTestResults": [{ "testName": "TSH", "unit": "", "status": "normal" }] }),
        );
        let test = &result.records("detailedTestResults")[0];
        assert!(test.get("unit").is_none());
        assert!(test.get("interpretation").is_none());
        assert_eq!(test["status"], "normal");
    }

    #[test]
    fn enums_are_canonicalized() {
        let result = run(
            &MEDICAL_REPORT,
            json!({
                "riskCategory": "DANGER - see doctor",
                "detailedTestResults": [
                    { "testName": "Glucose", "status": "HIGH" },
                    { "testName": "ALT", "status": "elevated" }
                ]
            }),
        );
        assert_eq!(result.text("riskCategory"), Some("Danger"));
        let tests = result.records("detailedTestResults");
        assert_eq!(tests[0]["status"], "high");
        assert_eq!(tests[1]["status"], "info");
    }

    #[test]
    fn scalars_are_stringified_and_arrays_joined() {
        let result = run(
            &MEDICAL_REPORT,
            json!({
                "keyFindingsSummary": ["High glucose", "", "Low iron"],
                "detailedTestResults": [{ "testName": "Glucose", "patientValue": 126 }]
            }),
        );
        assert_eq!(result.text("keyFindingsSummary"), Some("High glucose, Low iron"));
        assert_eq!(result.records("detailedTestResults")[0]["patientValue"], "126");
    }

    #[test]
    fn text_lists_wrap_scalars_and_drop_blanks() {
        let result = run(
            &MEDICINE_SEARCH,
            json!({ "name": "Ibuprofen", "dosageForms": "tablet", "commonSideEffects": ["nausea", " ", null] }),
        );
        assert_eq!(result.get("dosageForms"), Some(&json!(["tablet"])));
        assert_eq!(result.get("commonSideEffects"), Some(&json!(["nausea"])));
        assert_eq!(result.text("imageHint"), Some("medicine"));
    }

    #[test]
    fn placeholder_strings_count_as_missing() {
        let result = run(&MEDICINE_SEARCH, json!({ "name": "null", "usage": "undefined" }));
        assert_eq!(result.text("name"), Some(NOT_DETERMINED));
        assert_eq!(result.text("usage"), Some(NOT_DETERMINED));
    }

    #[test]
    fn output_text_is_cleaned() {
        let result = run(&CHAT, json!({ "response": "  Hi<script>alert(1)</script>\u{200B} " }));
        assert_eq!(result.text("response"), Some("Hi"));
    }

    #[test]
    fn absent_candidate_yields_chat_fallback() {
        let result = normalize(None, &CHAT);
        assert_eq!(result.text("response"), Some(CHAT_NO_RESPONSE));
    }

    #[test]
    fn report_lists_repairs() {
        let (_, log) = normalize_with_report(
            Some(&candidate(json!({ "medications": "Lisinopril", "note": "x" }))),
            &PRESCRIPTION,
        );
        assert!(log.coerced_count() >= 2);
        assert_eq!(log.dropped_keys(), 1);
        assert!(log.defaulted().any(|p| p == "medications[0].purpose"));
    }
}
