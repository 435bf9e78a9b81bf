use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::types::ApiContext;
use crate::pipeline::structuring::{DocumentSchema, PayloadKind};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub document_type: &'static str,
    pub payload: &'static str,
    pub context_fields: Vec<&'static str>,
    pub uses_history: bool,
    pub shape: Value,
}

impl From<&DocumentSchema> for SchemaSummary {
    fn from(schema: &DocumentSchema) -> Self {
        Self {
            document_type: schema.document_type.as_str(),
            payload: match schema.payload {
                PayloadKind::Media => "data_uri",
                PayloadKind::Text | PayloadKind::TextList => "text",
            },
            context_fields: schema.context_fields.iter().map(|f| f.key).collect(),
            uses_history: schema.uses_history,
            shape: schema.shape_descriptor(),
        }
    }
}

/// `GET /api/schemas` lists registered document types and their output shapes.
pub async fn list(State(ctx): State<ApiContext>) -> Json<Vec<SchemaSummary>> {
    Json(
        ctx.pipeline
            .registry()
            .schemas()
            .into_iter()
            .map(SchemaSummary::from)
            .collect(),
    )
}
