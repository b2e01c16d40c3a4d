//! Override Engine (SPEC_FULL.md §4.9): replaces a single tool call with a short
//! alternative sequence when a `(trigger_tool, trigger_pattern)` rule fires.
//! Grounded on the small static rule table shape of `core/intent.rs`.

use crate::call::CorrectedCall;
use crate::pattern::DetectedPattern;
use crate::value::{Value, ValueMap};

#[derive(Clone, Debug)]
pub struct ReplacementTool {
    pub tool_name: String,
    pub static_params: ValueMap,
    pub inherit_params: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct OverrideRule {
    pub trigger_tool: String,
    /// `None` means unconstrained: the rule fires regardless of detected pattern.
    pub trigger_pattern: Option<String>,
    pub replacements: Vec<ReplacementTool>,
}

#[derive(Default)]
pub struct OverrideEngine {
    rules: Vec<OverrideRule>,
}

impl OverrideEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<OverrideRule>) -> Self {
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: OverrideRule) {
        self.rules.push(rule);
    }

    /// If a rule fires for `(tool_name, detected_pattern)`, returns its expanded
    /// tools with `$name` references substituted from the original call's params.
    /// Otherwise returns `None` (§4.9).
    pub fn resolve(&self, tool_name: &str, original_params: &ValueMap, detected: Option<&DetectedPattern>) -> Option<Vec<CorrectedCall>> {
        let detected_pattern_name = detected.map(|d| d.pattern_type.as_str());
        let rule = self.rules.iter().find(|r| {
            r.trigger_tool == tool_name
                && match &r.trigger_pattern {
                    None => true,
                    Some(pattern) => detected_pattern_name == Some(pattern.as_str()),
                }
        })?;

        let calls = rule
            .replacements
            .iter()
            .map(|replacement| {
                let mut params = replacement.static_params.clone();
                for inherited in &replacement.inherit_params {
                    if let Some(value) = original_params.get(inherited) {
                        params.insert(inherited.clone(), value.clone());
                    }
                }
                substitute_dollar_refs(&mut params, original_params);
                let mut call = CorrectedCall::new(replacement.tool_name.clone(), params);
                call.original_tool_name = Some(tool_name.to_string());
                call.original_params = Some(original_params.clone());
                call.record_correction(format!("override: replaced {tool_name} via rule"));
                call
            })
            .collect();
        Some(calls)
    }
}

fn substitute_dollar_refs(params: &mut ValueMap, original: &ValueMap) {
    for value in params.values_mut() {
        substitute_value(value, original);
    }
}

fn substitute_value(value: &mut Value, original: &ValueMap) {
    match value {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix('$') {
                if let Some(resolved) = original.get(name) {
                    *value = resolved.clone();
                }
            }
        }
        Value::List(items) => {
            for item in items.iter_mut() {
                substitute_value(item, original);
            }
        }
        _ => {}
    }
}
