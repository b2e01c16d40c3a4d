//! Workflow data model (SPEC_FULL.md §3): the structured-text shape loaded from a
//! workflow definition file. Grounded on `utils::WorkflowPlan`/`StepSpec`, generalized
//! from a closed enum of step kinds to an open, parameter-driven step definition with
//! an `extras` bag for unknown boolean fields (§9 Open schema on steps).

use crate::value::{Value, ValueMap};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Abort,
    Skip,
    Continue,
}

/// The loop clause attached to a step, in its raw (pre-normalization) shape. See
/// `LoopSpec` for the form the expander actually consumes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoopClause {
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub variables: Option<Vec<String>>,
    #[serde(default)]
    pub range: Option<(String, String)>,
    #[serde(default)]
    pub ranges: Option<Vec<(String, String)>>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub value_lists: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub group: Option<String>,
}

impl LoopClause {
    /// The variable list, whether declared singly or as a group.
    pub fn variable_names(&self) -> Vec<String> {
        if let Some(vars) = &self.variables {
            return vars.clone();
        }
        if let Some(v) = &self.variable {
            return vec![v.clone()];
        }
        Vec::new()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub tool: String,
    #[serde(default)]
    pub params: ValueMap,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(rename = "loop", default)]
    pub loop_clause: Option<LoopClause>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub disable_adaptation: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<f64>,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default)]
    pub priority: i64,
    /// Unknown boolean (or other) fields on the step, carried as semantic parameters
    /// for the Workflow Adapter (§4.11) rather than silently dropped (§9).
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl WorkflowStep {
    /// A step is "core" if it is not optional, or is optional but opted out of
    /// adaptation (§4.11, GLOSSARY "Core step").
    pub fn is_core(&self) -> bool {
        !self.optional || self.disable_adaptation
    }

    pub fn extra_bool_fields(&self) -> impl Iterator<Item = (&String, bool)> {
        self.extras.iter().filter_map(|(k, v)| match v {
            Value::Bool(b) => Some((k, *b)),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub range: Option<ParameterRange>,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semantic_hints: Vec<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub computed: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModifierEntry {
    #[serde(default)]
    pub overrides: ValueMap,
    #[serde(default)]
    pub negative_signals: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub trigger_pattern: Option<String>,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub sample_prompts: Vec<String>,
    #[serde(default)]
    pub defaults: ValueMap,
    /// Declared as a mapping in the document but kept in declaration order: §4.4
    /// step 1 resolves overlapping phrases by "last match wins", which only has
    /// meaning if parsing preserves the order the author wrote them in.
    #[serde(default, deserialize_with = "deserialize_ordered_modifiers", serialize_with = "serialize_ordered_modifiers")]
    pub modifiers: Vec<(String, ModifierEntry)>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSchema>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

fn deserialize_ordered_modifiers<'de, D>(deserializer: D) -> Result<Vec<(String, ModifierEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedMapVisitor;

    impl<'de> Visitor<'de> for OrderedMapVisitor {
        type Value = Vec<(String, ModifierEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of modifier phrase to modifier entry")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, ModifierEntry>()? {
                out.push(entry);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor)
}

fn serialize_ordered_modifiers<S>(modifiers: &[(String, ModifierEntry)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(modifiers.len()))?;
    for (phrase, entry) in modifiers {
        map.serialize_entry(phrase, entry)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_boolean_step_field_lands_in_extras() {
        let doc = r#"
tool: mesh_bevel
params:
  offset: 0.05
add_chamfer: true
"#;
        let step: WorkflowStep = serde_yaml::from_str(doc).unwrap();
        assert_eq!(step.extras.get("add_chamfer"), Some(&Value::Bool(true)));
    }

    #[test]
    fn core_step_rules_match_glossary() {
        let mut step: WorkflowStep = serde_yaml::from_str("tool: t\n").unwrap();
        assert!(step.is_core());
        step.optional = true;
        assert!(!step.is_core());
        step.disable_adaptation = true;
        assert!(step.is_core());
    }

    #[test]
    fn modifiers_preserve_declaration_order() {
        let doc = r#"
name: picnic_table_workflow
modifiers:
  "rounded legs":
    overrides:
      leg_style: rounded
  "straight legs":
    overrides:
      leg_style: straight
  "tapered legs":
    overrides:
      leg_style: tapered
"#;
        let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
        let phrases: Vec<&str> = def.modifiers.iter().map(|(phrase, _)| phrase.as_str()).collect();
        assert_eq!(phrases, vec!["rounded legs", "straight legs", "tapered legs"]);
    }
}
