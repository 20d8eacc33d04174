//! Catalog definitions that servers are installed from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::McpServerType;

/// How to run a local server's workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTemplate {
    /// Container image (e.g. `ghcr.io/acme/echo-mcp:1.2`).
    pub image: String,

    /// Entrypoint override. When absent the image's own entrypoint is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments passed after the entrypoint.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment baked into the definition; install-time config wins on
    /// key collisions.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A known MCP server definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub server_type: McpServerType,
    /// Required for local entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadTemplate>,
}

impl CatalogEntry {
    /// Create a local entry running `image`.
    #[must_use]
    pub fn local(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            server_type: McpServerType::Local,
            workload: Some(WorkloadTemplate {
                image: image.into(),
                ..WorkloadTemplate::default()
            }),
        }
    }

    /// Override the entrypoint and arguments of a local entry.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        if let Some(workload) = self.workload.as_mut() {
            workload.command = Some(command.into());
            workload.args = args;
        }
        self
    }

    /// Validate the entry for its server type.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("catalog id cannot be empty".to_string());
        }
        match self.server_type {
            McpServerType::Local => {
                let workload = self
                    .workload
                    .as_ref()
                    .ok_or_else(|| format!("local catalog entry '{}' has no workload", self.id))?;
                if workload.image.trim().is_empty() {
                    return Err(format!("local catalog entry '{}' has an empty image", self.id));
                }
                Ok(())
            }
            McpServerType::Remote => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_entry_requires_workload() {
        let mut entry = CatalogEntry::local("echo", "Echo", "echo-mcp");
        assert!(entry.validate().is_ok());

        entry.workload = None;
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_empty_image_rejected() {
        let entry = CatalogEntry::local("echo", "Echo", "  ");
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_remote_entry_needs_no_workload() {
        let entry = CatalogEntry {
            id: "hosted".into(),
            name: "Hosted".into(),
            description: None,
            server_type: McpServerType::Remote,
            workload: None,
        };
        assert!(entry.validate().is_ok());
    }
}
