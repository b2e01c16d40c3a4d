//! Error Firewall (SPEC_FULL.md §4.10): the last line of defense applied to every
//! call before it is emitted. Grounded on `core/output_handler.rs`'s ordered,
//! each-result-aggregated dispatch, generalized from output delivery to a
//! validate/mutate/block decision per call.

use crate::call::CorrectedCall;
use crate::config::RouterConfig;
use crate::scene::{SceneContext, SceneMode};
use crate::tools::ToolMetadataStore;
use crate::value::Value;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirewallAction {
    Allow,
    Block,
    Modify,
    AutoFix,
}

#[derive(Clone, Debug)]
pub struct Violation {
    pub rule_name: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct FirewallResult {
    pub action: FirewallAction,
    pub allowed: bool,
    pub violations: Vec<Violation>,
    pub modified_call: Option<CorrectedCall>,
    pub pre_steps: Vec<CorrectedCall>,
    pub message: String,
}

impl FirewallResult {
    fn allow() -> Self {
        Self {
            action: FirewallAction::Allow,
            allowed: true,
            violations: Vec::new(),
            modified_call: None,
            pre_steps: Vec::new(),
            message: String::new(),
        }
    }
}

/// Shadow scene state the Firewall maintains between calls, separate from the
/// Registry's own simulation — each pipeline stage keeps its own shadow, per §4.5's
/// "heuristic, never authoritative" note.
#[derive(Clone, Debug)]
pub struct FirewallSimContext {
    pub mode: SceneMode,
    pub has_selection: bool,
    pub object_count: usize,
    pub active_min_dim: Option<f64>,
}

impl FirewallSimContext {
    pub fn from_scene(scene: &SceneContext) -> Self {
        Self {
            mode: scene.mode.clone(),
            has_selection: scene.has_selection(),
            object_count: scene.objects.len(),
            active_min_dim: scene.active_object_info().map(|o| {
                let (x, y, z) = o.dimensions;
                x.min(y).min(z)
            }),
        }
    }

    fn apply(&mut self, call: &CorrectedCall) {
        match call.tool_name.as_str() {
            "system_set_mode" => {
                if let Some(Value::String(mode)) = call.params.get("mode") {
                    if let Some(parsed) = SceneMode::parse(mode) {
                        self.mode = parsed;
                    }
                }
            }
            "mesh_select" => match call.params.get("action") {
                Some(Value::String(a)) if a == "all" => self.has_selection = true,
                Some(Value::String(a)) if a == "none" => self.has_selection = false,
                _ => {}
            },
            "modeling_create_primitive" => self.object_count += 1,
            "scene_delete_object" => self.object_count = self.object_count.saturating_sub(1),
            _ => {}
        }
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((prefix, suffix)) => text.starts_with(prefix) && text.ends_with(suffix) && text.len() >= prefix.len() + suffix.len(),
    }
}

pub struct ErrorFirewall<'a> {
    tools: &'a ToolMetadataStore,
    config: &'a RouterConfig,
}

impl<'a> ErrorFirewall<'a> {
    pub fn new(tools: &'a ToolMetadataStore, config: &'a RouterConfig) -> Self {
        Self { tools, config }
    }

    /// Validates one call against the built-in rule set (§4.10), mutating `sim` as a
    /// side effect so subsequent calls see the updated shadow state.
    pub fn check(&self, call: &CorrectedCall, sim: &mut FirewallSimContext) -> FirewallResult {
        if !self.config.firewall.block_invalid_operations {
            sim.apply(call);
            return FirewallResult::allow();
        }

        let min_dim = sim.active_min_dim;

        if glob_match("mesh_*", &call.tool_name) && sim.mode != SceneMode::Edit {
            return self.auto_fix_mode(call, sim, "EDIT", "mesh tool invoked outside EDIT mode");
        }
        if glob_match("sculpt_*", &call.tool_name) && sim.mode != SceneMode::Sculpt {
            return self.auto_fix_mode(call, sim, "SCULPT", "sculpt tool invoked outside SCULPT mode");
        }

        if let Some(meta) = self.tools.get(&call.tool_name) {
            if meta.selection_required && !sim.has_selection {
                return self.auto_fix_selection(call, sim);
            }
        }

        if call.tool_name.contains("bevel") {
            if let (Some(offset), Some(min_dim)) = (call.params.get("offset").and_then(Value::as_f64), min_dim) {
                let ceiling = min_dim * self.config.thresholds.bevel_max_ratio;
                if offset > ceiling {
                    return self.modify_numeric_param(call, sim, "offset", ceiling, "bevel offset exceeds half the active object's min dimension");
                }
            }
        }

        if call.tool_name.contains("subdivide") {
            if let Some(cuts) = call.params.get("cuts").and_then(Value::as_f64) {
                let ceiling = self.config.thresholds.subdivide_max_cuts as f64;
                if cuts > ceiling {
                    return self.modify_numeric_param(call, sim, "cuts", ceiling, "subdivide cut count exceeds the configured ceiling");
                }
            }
        }

        if is_destructive(&call.tool_name) && sim.object_count == 0 {
            warn!(tool = %call.tool_name, "firewall BLOCK: destructive call on empty scene");
            sim.apply(call);
            return FirewallResult {
                action: FirewallAction::Block,
                allowed: false,
                violations: vec![Violation {
                    rule_name: "destructive_on_empty_scene".to_string(),
                    message: format!("'{}' targets an empty scene", call.tool_name),
                }],
                modified_call: None,
                pre_steps: Vec::new(),
                message: "destructive call blocked: scene has no objects".to_string(),
            };
        }

        sim.apply(call);
        FirewallResult::allow()
    }

    fn auto_fix_mode(&self, call: &CorrectedCall, sim: &mut FirewallSimContext, mode: &str, reason: &str) -> FirewallResult {
        if !self.config.firewall.auto_fix_mode_violations {
            return self.block(call, "mode_violation", reason);
        }
        let mut params = crate::value::ValueMap::new();
        params.insert("mode".to_string(), Value::String(mode.to_string()));
        let pre_step = CorrectedCall::injected("system_set_mode", params);
        // The pre-step itself must pass every active rule (§8 Firewall monotonicity);
        // a synthetic mode-switch call has no mode prerequisite of its own (§9).
        sim.apply(&pre_step);
        sim.apply(call);
        let mut modified = call.clone();
        modified.record_correction(format!("firewall auto-fix: {reason}"));
        FirewallResult {
            action: FirewallAction::AutoFix,
            allowed: true,
            violations: vec![Violation { rule_name: "mode_violation".to_string(), message: reason.to_string() }],
            modified_call: Some(modified),
            pre_steps: vec![pre_step],
            message: reason.to_string(),
        }
    }

    fn auto_fix_selection(&self, call: &CorrectedCall, sim: &mut FirewallSimContext) -> FirewallResult {
        if !self.config.firewall.auto_fix_mode_violations {
            return self.block(call, "selection_required", "tool requires a selection but none is present");
        }
        let mut params = crate::value::ValueMap::new();
        params.insert("action".to_string(), Value::String("all".to_string()));
        let pre_step = CorrectedCall::injected("mesh_select", params);
        sim.apply(&pre_step);
        sim.apply(call);
        let mut modified = call.clone();
        modified.record_correction("firewall auto-fix: injected select-all");
        FirewallResult {
            action: FirewallAction::AutoFix,
            allowed: true,
            violations: vec![Violation {
                rule_name: "selection_required".to_string(),
                message: "no selection present".to_string(),
            }],
            modified_call: Some(modified),
            pre_steps: vec![pre_step],
            message: "injected select-all before call".to_string(),
        }
    }

    fn modify_numeric_param(&self, call: &CorrectedCall, sim: &mut FirewallSimContext, name: &str, ceiling: f64, reason: &str) -> FirewallResult {
        let mut modified = call.clone();
        modified.params.insert(name.to_string(), Value::Number(ceiling));
        modified.record_correction(format!("firewall clamp: {reason}"));
        sim.apply(&modified);
        FirewallResult {
            action: FirewallAction::Modify,
            allowed: true,
            violations: vec![Violation { rule_name: format!("{name}_ceiling"), message: reason.to_string() }],
            modified_call: Some(modified),
            pre_steps: Vec::new(),
            message: reason.to_string(),
        }
    }

    fn block(&self, call: &CorrectedCall, rule_name: &str, reason: &str) -> FirewallResult {
        FirewallResult {
            action: FirewallAction::Block,
            allowed: false,
            violations: vec![Violation { rule_name: rule_name.to_string(), message: reason.to_string() }],
            modified_call: None,
            pre_steps: Vec::new(),
            message: reason.to_string(),
        }
    }
}

fn is_destructive(tool_name: &str) -> bool {
    matches!(tool_name, "scene_delete_object" | "mesh_delete" | "scene_clear")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::value::ValueMap;

    #[test]
    fn destructive_call_on_empty_scene_blocks() {
        let tools = ToolMetadataStore::new();
        let config = RouterConfig::default();
        let firewall = ErrorFirewall::new(&tools, &config);
        let scene = SceneContext::minimal();
        let mut sim = FirewallSimContext::from_scene(&scene);

        let call = CorrectedCall::new("scene_delete_object", ValueMap::new());
        let result = firewall.check(&call, &mut sim);
        assert_eq!(result.action, FirewallAction::Block);
        assert!(!result.allowed);
    }

    #[test]
    fn mesh_tool_outside_edit_mode_autofixes() {
        let tools = ToolMetadataStore::new();
        let config = RouterConfig::default();
        let firewall = ErrorFirewall::new(&tools, &config);
        let scene = SceneContext::minimal();
        let mut sim = FirewallSimContext::from_scene(&scene);

        let call = CorrectedCall::new("mesh_bevel", ValueMap::new());
        let result = firewall.check(&call, &mut sim);
        assert_eq!(result.action, FirewallAction::AutoFix);
        assert_eq!(result.pre_steps.len(), 1);
        assert_eq!(result.pre_steps[0].tool_name, "system_set_mode");
        assert_eq!(sim.mode, SceneMode::Edit);
    }

    #[test]
    fn bevel_offset_over_ceiling_is_clamped() {
        let tools = ToolMetadataStore::new();
        let config = RouterConfig::default();
        let firewall = ErrorFirewall::new(&tools, &config);
        let mut sim = FirewallSimContext {
            mode: SceneMode::Edit,
            has_selection: true,
            object_count: 1,
            active_min_dim: Some(0.05),
        };

        let mut params = ValueMap::new();
        params.insert("offset".to_string(), Value::Number(0.9));
        let call = CorrectedCall::new("mesh_bevel", params);
        let result = firewall.check(&call, &mut sim);
        assert_eq!(result.action, FirewallAction::Modify);
        let clamped = result.modified_call.unwrap().params.get("offset").unwrap().as_f64().unwrap();
        assert!((clamped - 0.025).abs() < 1e-9);
    }

    #[test]
    fn bevel_offset_within_ceiling_is_allowed() {
        let tools = ToolMetadataStore::new();
        let config = RouterConfig::default();
        let firewall = ErrorFirewall::new(&tools, &config);
        let mut sim = FirewallSimContext {
            mode: SceneMode::Edit,
            has_selection: true,
            object_count: 1,
            active_min_dim: Some(0.05),
        };

        let mut params = ValueMap::new();
        params.insert("offset".to_string(), Value::Number(0.01));
        let call = CorrectedCall::new("mesh_bevel", params);
        let result = firewall.check(&call, &mut sim);
        assert_eq!(result.action, FirewallAction::Allow);
    }

    #[test]
    fn injected_mode_switch_pre_step_bypasses_its_own_mode_rule() {
        let tools = ToolMetadataStore::new();
        let config = RouterConfig::default();
        let firewall = ErrorFirewall::new(&tools, &config);
        let scene = SceneContext::minimal();
        let mut sim = FirewallSimContext::from_scene(&scene);
        let call = CorrectedCall::new("system_set_mode", {
            let mut p = ValueMap::new();
            p.insert("mode".to_string(), Value::String("EDIT".to_string()));
            p
        });
        let result = firewall.check(&call, &mut sim);
        assert_eq!(result.action, FirewallAction::Allow);
        assert_eq!(sim.mode, SceneMode::Edit);
    }
}
