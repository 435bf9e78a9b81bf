use std::time::Instant;

use super::parser::parse_candidate;
use super::prompt::Prompt;
use super::schema::DocumentSchema;
use super::types::{Candidate, GenerationRequest, LlmClient};
use super::StructuringError;

/// Exactly one call to the generative backend per `invoke`.
///
/// Errors come back classified (`BackendUnavailable`, `EmptyResponse`,
/// `MalformedResponse`, ...); deciding whether to retry is left to the caller.
pub struct GenerationInvoker<'a> {
    client: &'a dyn LlmClient,
    model: &'a str,
}

impl<'a> GenerationInvoker<'a> {
    pub fn new(client: &'a dyn LlmClient, model: &'a str) -> Self {
        Self { client, model }
    }

    pub fn invoke(
        &self,
        prompt: &Prompt,
        schema: &DocumentSchema,
    ) -> Result<Candidate, StructuringError> {
        let request = GenerationRequest {
            model: self.model.to_string(),
            system: prompt.system.clone(),
            prompt: prompt.user.clone(),
            images: prompt.images.clone(),
            format: prompt.format.clone(),
        };

        let start = Instant::now();
        let raw = self.client.generate(&request);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    document_type = %schema.document_type,
                    model = self.model,
                    elapsed_ms,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Generation failed"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            document_type = %schema.document_type,
            model = self.model,
            elapsed_ms,
            response_len = raw.len(),
            "Generation complete"
        );

        parse_candidate(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::ollama::MockLlmClient;
    use crate::pipeline::structuring::registry::{MEDICINE_SEARCH, PRESCRIPTION};
    use serde_json::json;

    fn prompt_for(schema: &DocumentSchema) -> Prompt {
        Prompt {
            system: "system".into(),
            user: "user".into(),
            images: vec!["aGVsbG8=".into()],
            format: schema.shape_descriptor(),
        }
    }

    #[test]
    fn passes_prompt_and_shape_to_backend() {
        let mock = MockLlmClient::new(r#"{"medications": []}"#);
        let invoker = GenerationInvoker::new(&mock, "medgemma:4b");
        invoker
            .invoke(&prompt_for(&PRESCRIPTION), &PRESCRIPTION)
            .unwrap();

        let sent = mock.last_request().unwrap();
        assert_eq!(sent.model, "medgemma:4b");
        assert_eq!(sent.images, vec!["aGVsbG8=".to_string()]);
        assert_eq!(sent.format, PRESCRIPTION.shape_descriptor());
    }

    #[test]
    fn returns_parsed_candidate() {
        let mock = MockLlmClient::new(r#"{"name": "Ibuprofen"}"#);
        let candidate = GenerationInvoker::new(&mock, "m")
            .invoke(&prompt_for(&MEDICINE_SEARCH), &MEDICINE_SEARCH)
            .unwrap();
        assert_eq!(candidate.get("name"), Some(&json!("Ibuprofen")));
    }

    #[test]
    fn unavailable_backend_is_attempted_once() {
        let mock = MockLlmClient::unavailable("model overloaded");
        let err = GenerationInvoker::new(&mock, "m")
            .invoke(&prompt_for(&PRESCRIPTION), &PRESCRIPTION)
            .unwrap_err();
        assert!(matches!(err, StructuringError::BackendUnavailable(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn empty_reply_is_empty_response() {
        let mock = MockLlmClient::new("");
        let err = GenerationInvoker::new(&mock, "m")
            .invoke(&prompt_for(&PRESCRIPTION), &PRESCRIPTION)
            .unwrap_err();
        assert!(matches!(err, StructuringError::EmptyResponse));
    }

    #[test]
    fn non_object_reply_is_malformed() {
        let mock = MockLlmClient::new("\"just a string\"");
        let err = GenerationInvoker::new(&mock, "m")
            .invoke(&prompt_for(&PRESCRIPTION), &PRESCRIPTION)
            .unwrap_err();
        assert!(matches!(err, StructuringError::MalformedResponse(_)));
    }
}
