//! Tool Metadata Store (SPEC_FULL.md §3, §6): per-tool records loaded from a
//! directory tree of structured-text files, indexed by category. Grounded on
//! `mcp/registry.rs::ToolMeta`/`McpRegistry`, generalized from a flat live-query
//! registry to a directory-loaded, immutable-after-load store.

use crate::error::{RouterError, RouterResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub default: Option<Value>,
    pub range: Option<ParameterRange>,
    pub options: Option<Vec<Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub category: String,
    #[serde(default = "default_mode_required")]
    pub mode_required: String,
    #[serde(default)]
    pub selection_required: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sample_prompts: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterDescriptor>,
    #[serde(default)]
    pub related_tools: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

fn default_mode_required() -> String {
    "ANY".to_string()
}

impl ToolMetadata {
    pub fn mode_required_is_any(&self) -> bool {
        self.mode_required.eq_ignore_ascii_case("ANY")
    }
}

/// Immutable-after-load store of `ToolMetadata`, indexed by tool name. A reload
/// replaces the store atomically (§5 Shared resources); callers hold an `Arc`
/// snapshot and simply construct a new store rather than mutate this one in place.
#[derive(Clone, Debug, Default)]
pub struct ToolMetadataStore {
    tools: HashMap<String, ToolMetadata>,
}

impl ToolMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tools(tools: Vec<ToolMetadata>) -> Self {
        let mut map = HashMap::with_capacity(tools.len());
        for t in tools {
            map.insert(t.tool_name.clone(), t);
        }
        Self { tools: map }
    }

    /// Walks `dir` recursively, parsing every `.yaml`/`.yml` file as a single
    /// `ToolMetadata` record. Unknown fields are ignored by serde; missing required
    /// fields (`tool_name`, `category`) fail the load for that file, per §6.
    pub fn load_dir(dir: &Path) -> RouterResult<Self> {
        let mut tools = Vec::new();
        load_dir_into(dir, &mut tools)?;
        info!(count = tools.len(), "tool metadata store loaded");
        Ok(Self::from_tools(tools))
    }

    pub fn get(&self, tool_name: &str) -> Option<&ToolMetadata> {
        self.tools.get(tool_name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolMetadata> {
        self.tools.values()
    }
}

fn load_dir_into(dir: &Path, out: &mut Vec<ToolMetadata>) -> RouterResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| RouterError::parse(format!("cannot read tool metadata dir {dir:?}: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| RouterError::parse(format!("dir entry error: {e}")))?;
        let path = entry.path();
        if path.is_dir() {
            load_dir_into(&path, out)?;
            continue;
        }
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| RouterError::parse(format!("cannot read {path:?}: {e}")))?;
        match serde_yaml::from_str::<ToolMetadata>(&text) {
            Ok(tool) => out.push(tool),
            Err(e) => {
                warn!(?path, error = %e, "skipping malformed tool metadata file");
                return Err(RouterError::parse(format!("malformed tool metadata {path:?}: {e}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_yaml_fields_are_ignored() {
        let doc = r#"
tool_name: mesh_bevel
category: mesh
mode_required: EDIT
selection_required: true
unknown_future_field: 42
"#;
        let meta: ToolMetadata = serde_yaml::from_str(doc).unwrap();
        assert_eq!(meta.tool_name, "mesh_bevel");
        assert_eq!(meta.mode_required, "EDIT");
        assert!(meta.selection_required);
    }

    #[test]
    fn missing_required_field_fails() {
        let doc = r#"
category: mesh
"#;
        let result: Result<ToolMetadata, _> = serde_yaml::from_str(doc);
        assert!(result.is_err());
    }

    #[test]
    fn mode_required_defaults_to_any() {
        let doc = r#"
tool_name: scene_delete_object
category: scene
"#;
        let meta: ToolMetadata = serde_yaml::from_str(doc).unwrap();
        assert!(meta.mode_required_is_any());
    }
}
