//! Workflow Definition loader (SPEC_FULL.md §4.4 `load_custom`, §6): parses a
//! directory of structured-text workflow documents and validates each one against
//! the Parameter Schema invariants of §3 before it ever reaches the Registry.

use super::model::WorkflowDefinition;
use crate::error::{RouterError, RouterResult};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

pub fn load_dir(dir: &Path) -> RouterResult<Vec<WorkflowDefinition>> {
    let mut out = Vec::new();
    load_dir_into(dir, &mut out)?;
    info!(count = out.len(), "workflow definitions loaded");
    Ok(out)
}

fn load_dir_into(dir: &Path, out: &mut Vec<WorkflowDefinition>) -> RouterResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| RouterError::parse(format!("cannot read workflow dir {dir:?}: {e}")))?;
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
        let def = parse_str(&text).map_err(|e| {
            warn!(?path, error = %e, "skipping malformed workflow definition");
            RouterError::parse(format!("malformed workflow definition {path:?}: {e}"))
        })?;
        out.push(def);
    }
    Ok(())
}

/// Parses a single workflow document and validates it against §3's Parameter Schema
/// invariants: at most one of `enum`/`range`; `default` (with `enum`) is a member;
/// `computed` implies non-empty `depends_on`; the computed-parameter graph is
/// acyclic.
pub fn parse_str(doc: &str) -> RouterResult<WorkflowDefinition> {
    let def: WorkflowDefinition =
        serde_yaml::from_str(doc).map_err(|e| RouterError::parse(format!("yaml error: {e}")))?;
    validate(&def)?;
    Ok(def)
}

fn validate(def: &WorkflowDefinition) -> RouterResult<()> {
    for (name, schema) in &def.parameters {
        if schema.enum_values.is_some() && schema.range.is_some() {
            return Err(RouterError::validation(format!(
                "parameter {name} declares both enum and range"
            )));
        }
        if let (Some(default), Some(enum_values)) = (&schema.default, &schema.enum_values) {
            if !enum_values.contains(default) {
                return Err(RouterError::validation(format!(
                    "parameter {name} default {default:?} is not a member of its enum"
                )));
            }
        }
        if schema.computed.is_some() && schema.depends_on.is_empty() {
            return Err(RouterError::validation(format!(
                "computed parameter {name} must declare a non-empty depends_on"
            )));
        }
    }
    assert_acyclic(def)?;
    Ok(())
}

fn assert_acyclic(def: &WorkflowDefinition) -> RouterResult<()> {
    let computed: HashMap<&str, &[String]> = def
        .parameters
        .iter()
        .filter(|(_, s)| s.computed.is_some())
        .map(|(name, s)| (name.as_str(), s.depends_on.as_slice()))
        .collect();

    let mut visiting: HashSet<&str> = HashSet::new();
    let mut done: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        computed: &HashMap<&'a str, &'a [String]>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> RouterResult<()> {
        if done.contains(node) {
            return Ok(());
        }
        if visiting.contains(node) {
            return Err(RouterError::validation(format!(
                "cyclic computed-parameter dependency at {node}"
            )));
        }
        let Some(deps) = computed.get(node) else {
            return Ok(());
        };
        visiting.insert(node);
        for dep in deps.iter() {
            visit(dep.as_str(), computed, visiting, done)?;
        }
        visiting.remove(node);
        done.insert(node);
        Ok(())
    }

    for name in computed.keys() {
        visit(name, &computed, &mut visiting, &mut done)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_enum_and_range_together() {
        let doc = r#"
name: bad_workflow
parameters:
  sides:
    type: int
    enum: [3, 4, 5]
    range: {min: 3, max: 5}
"#;
        assert!(parse_str(doc).is_err());
    }

    #[test]
    fn rejects_computed_without_depends_on() {
        let doc = r#"
name: bad_workflow
parameters:
  plank_count:
    type: int
    computed: "ceil(table_width / plank_max_width)"
"#;
        assert!(parse_str(doc).is_err());
    }

    #[test]
    fn rejects_cyclic_computed_dependencies() {
        let doc = r#"
name: bad_workflow
parameters:
  a:
    type: float
    computed: "b + 1"
    depends_on: [b]
  b:
    type: float
    computed: "a + 1"
    depends_on: [a]
"#;
        assert!(parse_str(doc).is_err());
    }

    #[test]
    fn accepts_well_formed_workflow() {
        let doc = r#"
name: picnic_table_workflow
description: Builds a picnic table.
trigger_keywords: ["picnic table", "table"]
defaults:
  leg_angle_left: 0.32
modifiers:
  "straight legs":
    overrides:
      leg_angle_left: 0.0
parameters:
  table_width:
    type: float
    default: 0.83
steps:
  - tool: modeling_transform_object
    params:
      name: Leg_FL
      rotation: [0, "$leg_angle_left", 0]
"#;
        let def = parse_str(doc).unwrap();
        assert_eq!(def.name, "picnic_table_workflow");
        assert_eq!(def.steps.len(), 1);
    }
}
