use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{ArcadeError, ToolSpec};

/// Which tools to resolve, and for whom.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolRequest {
    pub(crate) toolkits: Vec<String>,
    pub(crate) tools: Vec<String>,
    pub(crate) user_id: String,
    pub(crate) limit: usize,
}

#[async_trait]
pub(crate) trait ToolCatalog: Send + Sync {
    async fn list_toolkit(
        &self,
        toolkit: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ToolDefinition>, ArcadeError>;

    async fn get_tool(&self, name: &str, user_id: &str) -> Result<ToolDefinition, ArcadeError>;
}

// Broker wire shapes. Only the fields the agent needs are modelled.

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolDefinition {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) qualified_name: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) toolkit: ToolkitRef,
    #[serde(default)]
    pub(crate) input: ToolInput,
    #[serde(default)]
    pub(crate) requirements: Option<ToolRequirements>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolkitRef {
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ToolInput {
    #[serde(default)]
    pub(crate) parameters: Vec<ToolParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolParameter {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) required: bool,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) value_schema: ValueSchema,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValueSchema {
    pub(crate) val_type: String,
    #[serde(default)]
    pub(crate) inner_val_type: Option<String>,
    #[serde(default, rename = "enum")]
    pub(crate) enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ToolRequirements {
    #[serde(default)]
    pub(crate) authorization: Option<serde_json::Value>,
}

impl ToolDefinition {
    pub(crate) fn qualified(&self) -> String {
        self.qualified_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.toolkit.name, self.name))
    }

    pub(crate) fn requires_authorization(&self) -> bool {
        self.requirements
            .as_ref()
            .and_then(|r| r.authorization.as_ref())
            .is_some_and(|auth| !auth.is_null())
    }

    pub(crate) fn to_tool_spec(&self) -> ToolSpec {
        let qualified_name = self.qualified();
        ToolSpec {
            name: qualified_name.replace('.', "_"),
            qualified_name,
            toolkit: self.toolkit.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            parameters: parameters_schema(&self.input.parameters),
            requires_authorization: self.requires_authorization(),
        }
    }
}

fn json_type(val_type: &str) -> &'static str {
    match val_type {
        "string" => "string",
        "integer" => "integer",
        "number" => "number",
        "boolean" => "boolean",
        "array" => "array",
        _ => "object",
    }
}

fn value_schema(schema: &ValueSchema) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    out.insert("type".to_string(), serde_json::json!(json_type(&schema.val_type)));
    if schema.val_type == "array" {
        let inner = schema.inner_val_type.as_deref().unwrap_or("string");
        out.insert("items".to_string(), serde_json::json!({"type": json_type(inner)}));
    }
    if let Some(values) = &schema.enum_values {
        if !values.is_empty() {
            out.insert("enum".to_string(), serde_json::json!(values));
        }
    }
    serde_json::Value::Object(out)
}

pub(crate) fn parameters_schema(parameters: &[ToolParameter]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let mut schema = value_schema(&param.value_schema);
        if let (Some(desc), Some(obj)) = (&param.description, schema.as_object_mut()) {
            obj.insert("description".to_string(), serde_json::json!(desc));
        }
        properties.insert(param.name.clone(), schema);
        if param.required {
            required.push(param.name.clone());
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Resolve toolkits first, then individually named tools. The result is
/// deduplicated by qualified name (first occurrence wins) and bounded by
/// `request.limit`.
pub(crate) async fn resolve_tools(
    catalog: &dyn ToolCatalog,
    request: &ToolRequest,
) -> Result<Vec<ToolSpec>, ArcadeError> {
    let mut definitions = Vec::new();
    for toolkit in &request.toolkits {
        let listed = catalog
            .list_toolkit(toolkit, &request.user_id, request.limit)
            .await?;
        debug!(toolkit = %toolkit, count = listed.len(), "listed toolkit");
        definitions.extend(listed);
    }
    for name in &request.tools {
        definitions.push(catalog.get_tool(name, &request.user_id).await?);
    }

    let mut seen = HashSet::new();
    let mut specs: Vec<ToolSpec> = definitions
        .iter()
        .filter(|def| seen.insert(def.qualified()))
        .map(ToolDefinition::to_tool_spec)
        .collect();
    specs.truncate(request.limit);
    info!(count = specs.len(), "resolved tool catalog");
    Ok(specs)
}
