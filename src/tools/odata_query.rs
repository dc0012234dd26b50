//! Generic backend query tool for the LLM.

use crate::odata::ODataClient;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::Deserialize;

use std::sync::Arc;

/// Tool for querying the OData backend: filtering, limiting, and counting.
#[derive(Clone)]
pub struct OdataQueryTool {
    client: Arc<ODataClient>,
}

impl OdataQueryTool {
    pub fn new(client: Arc<ODataClient>) -> Self {
        Self { client }
    }
}

/// Error type for the OData query tool.
#[derive(Debug, thiserror::Error)]
#[error("OData query failed: {0}")]
pub struct OdataQueryError(String);

/// Arguments for the OData query tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OdataQueryArgs {
    /// Technical entity name from the metadata, e.g. `Catalog_Counterparties`.
    pub entity: String,
    /// OData filter expression, e.g. `Code eq '001'`.
    #[serde(default)]
    pub filter: Option<String>,
    /// Row limit (default 5).
    #[serde(default)]
    pub top: Option<u32>,
    /// When true, return only the record count.
    #[serde(default)]
    pub count_only: Option<bool>,
}

impl Tool for OdataQueryTool {
    const NAME: &'static str = "execute_odata_query";

    type Error = OdataQueryError;
    type Args = OdataQueryArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Generic query against the backend. Take entity and filter \
                values from the metadata knowledge base. Supports filtering, row \
                limits, and count-only aggregation."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "required": ["entity"],
                "properties": {
                    "entity": {
                        "type": "string",
                        "description": "Technical entity name from the metadata, e.g. Catalog_Counterparties."
                    },
                    "filter": {
                        "type": "string",
                        "description": "OData $filter expression, e.g. Code eq '001'."
                    },
                    "top": {
                        "type": "integer",
                        "minimum": 1,
                        "default": 5,
                        "description": "Maximum number of rows to return."
                    },
                    "count_only": {
                        "type": "boolean",
                        "default": false,
                        "description": "Return only the number of matching records."
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
        let count_only = args.count_only.unwrap_or(false);
        tracing::info!(
            entity = %args.entity,
            filter = ?args.filter,
            top = ?args.top,
            count_only,
            "tool call: execute_odata_query"
        );

        let body = self
            .client
            .execute_query(&args.entity, args.filter.as_deref(), args.top, count_only)
            .await
            .map_err(|e| OdataQueryError(e.to_string()))?;

        Ok(shape_response(&body, count_only))
    }
}

/// Shape a raw backend body for the LLM. Never fails: a body that cannot be
/// formatted is passed through as an opaque code block.
pub fn shape_response(body: &str, count_only: bool) -> String {
    // Count responses are a bare number; hand them back verbatim.
    if count_only {
        return body.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(root) => {
            // OData wraps row listings in a top-level "value" array; strip
            // the envelope and return only the rows.
            let target = root.get("value").unwrap_or(&root);
            serde_json::to_string_pretty(target).unwrap_or_else(|_| body.to_string())
        }
        Err(_) => format!("```json\n{body}\n```"),
    }
}
