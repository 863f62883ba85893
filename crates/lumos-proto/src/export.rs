//! Export request and result types
//!
//! The scheduler never inspects the project description; it only carries it
//! as an [`ExportPayload`] and injects its serialized form into the runtime.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Project description as submitted by the builder frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ProjectExport {
    /// Project metadata (name, version, description, authors)
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub project: Value,
    /// Agent definitions
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub agents: Vec<Value>,
    /// Tool definitions
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub tools: Vec<Value>,
    /// Agent-to-agent interactions
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub interactions: Vec<Value>,
}

/// Opaque, already-validated configuration blob for one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportPayload(Value);

impl ExportPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Compact JSON form injected into the runtime's environment
    pub fn to_config_string(&self) -> String {
        self.0.to_string()
    }
}

impl From<Value> for ExportPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<ProjectExport> for ExportPayload {
    fn from(export: ProjectExport) -> Self {
        Self(json!({
            "project": export.project,
            "agents": export.agents,
            "tools": export.tools,
            "interactions": export.interactions,
        }))
    }
}

/// Outcome of a successful export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ExportResult {
    /// Name of the provisioned instance (also its route prefix)
    pub instance_name: String,
    /// Publicly reachable URL of the instance
    pub public_url: String,
}

/// Join a tunnel's public base URL with an instance's route prefix
pub fn compose_public_url(public_base: &str, instance_name: &str) -> String {
    format!("{}/{}", public_base.trim_end_matches('/'), instance_name)
}
