//! Workflow Registry (SPEC_FULL.md §4.4, §4.5): the single canonical path from a
//! workflow name plus caller context to a list of corrected calls. Grounded on
//! `mcp/registry.rs::McpRegistry`, generalized from a flat name→client lookup table
//! into the six-stage build/resolve/validate/expand/resolve/simulate pipeline.

use super::model::WorkflowDefinition;
use crate::call::CorrectedCall;
use crate::error::{RouterError, RouterResult};
use crate::eval::{evaluate_condition, resolve_computed_parameters, EvalContext, Evaluator};
use crate::proportions;
use crate::scene::SceneContext;
use crate::value::{Value, ValueMap};
use crate::workflow::loopexpand::{self, DEFAULT_MAX_EXPANDED_STEPS};
use crate::workflow::model::WorkflowStep;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct RegistryLimits {
    pub max_workflow_steps: usize,
    pub max_expanded_steps: usize,
}

impl RegistryLimits {
    pub fn new(max_workflow_steps: usize, max_expanded_steps: usize) -> Self {
        Self { max_workflow_steps, max_expanded_steps }
    }
}

pub struct WorkflowRegistry {
    // Lookup by name has no order requirement of its own; callers that rank several
    // workflows against each other (the Ensemble Matcher) break ties on workflow name
    // rather than relying on this map's iteration order.
    workflows: HashMap<String, WorkflowDefinition>,
    limits: RegistryLimits,
}

impl WorkflowRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self { workflows: HashMap::new(), limits }
    }

    pub fn register_workflow(&mut self, def: WorkflowDefinition) {
        info!(name = %def.name, steps = def.steps.len(), "workflow registered");
        self.workflows.insert(def.name.clone(), def);
    }

    pub fn load_custom(&mut self, dir: &std::path::Path) -> RouterResult<()> {
        for def in crate::workflow::loader::load_dir(dir)? {
            self.register_workflow(def);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values()
    }

    pub fn find_by_pattern(&self, pattern: &str) -> Option<&str> {
        self.workflows
            .values()
            .find(|w| w.trigger_pattern.as_deref() == Some(pattern))
            .map(|w| w.name.as_str())
    }

    pub fn find_by_keywords(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.workflows
            .values()
            .find(|w| w.trigger_keywords.iter().any(|kw| lower.contains(&kw.to_lowercase())))
            .map(|w| w.name.as_str())
    }

    /// The canonical six-stage pipeline of §4.4. `steps_override`, when present, is
    /// used in place of the definition's own steps (the adaptation path of §4.11).
    pub fn expand_workflow(
        &self,
        name: &str,
        explicit_params: &ValueMap,
        context: &SceneContext,
        user_prompt: Option<&str>,
        steps_override: Option<&[WorkflowStep]>,
    ) -> RouterResult<Vec<CorrectedCall>> {
        let def = self
            .workflows
            .get(name)
            .ok_or_else(|| RouterError::validation(format!("unknown workflow '{name}'")))?;

        if self.limits.max_workflow_steps > 0 && def.steps.len() > self.limits.max_workflow_steps {
            return Err(RouterError::resource_limit(format!(
                "workflow '{name}' declares {} steps, exceeding max_workflow_steps ({})",
                def.steps.len(),
                self.limits.max_workflow_steps
            )));
        }

        // 1. Build variables: defaults -> matching modifiers (last wins, negative
        //    signals veto) -> explicit params (highest priority). `def.modifiers`
        //    iterates in declaration order, so "last wins" is well defined.
        let mut ctx = EvalContext::new();
        for (k, v) in &def.defaults {
            ctx.set_value(k.clone(), v.clone());
        }
        if let Some(prompt) = user_prompt {
            let lower = prompt.to_lowercase();
            for (phrase, modifier) in &def.modifiers {
                if !lower.contains(&phrase.to_lowercase()) {
                    continue;
                }
                if modifier
                    .negative_signals
                    .iter()
                    .any(|signal| lower.contains(&signal.to_lowercase()))
                {
                    continue;
                }
                for (k, v) in &modifier.overrides {
                    ctx.set_value(k.clone(), v.clone());
                }
            }
        }
        for (k, v) in explicit_params {
            ctx.set_value(k.clone(), v.clone());
        }

        if let Some(active) = context.active_object_info() {
            ctx.set_dimensions(active.dimensions.0, active.dimensions.1, active.dimensions.2);
        }
        if let Some(p) = &context.proportions {
            ctx.set_proportions(p);
        }

        // 2. Resolve computed parameters, topologically.
        let computed: Vec<(String, String, Vec<String>)> = def
            .parameters
            .iter()
            .filter_map(|(name, schema)| {
                schema.computed.as_ref().map(|expr| (name.clone(), expr.clone(), schema.depends_on.clone()))
            })
            .collect();
        resolve_computed_parameters(&mut ctx, &computed)?;

        // 3. Validate each parameter against its schema.
        for (name, schema) in &def.parameters {
            let Some(value) = ctx.get(name) else { continue };
            if let Some(enum_values) = &schema.enum_values {
                if !enum_contains(enum_values, value) {
                    return Err(RouterError::validation(format!(
                        "parameter '{name}' value {value:?} is not one of the declared enum values"
                    )));
                }
            }
            if let Some(range) = &schema.range {
                if let Some(n) = value.as_f64() {
                    if n < range.min || n > range.max {
                        return Err(RouterError::validation(format!(
                            "parameter '{name}' value {n} is outside range [{}, {}]",
                            range.min, range.max
                        )));
                    }
                }
            }
        }

        // 4. Expand loops and interpolate `{var}`.
        let source_steps = steps_override.unwrap_or(&def.steps);
        let expanded = loopexpand::expand_steps(
            source_steps,
            &ctx,
            if self.limits.max_expanded_steps > 0 {
                self.limits.max_expanded_steps
            } else {
                DEFAULT_MAX_EXPANDED_STEPS
            },
        )?;

        // 5 & 6. Resolve step params, evaluate conditions, simulate context.
        let mut sim = SimulatedContext::from_scene(context);
        let mut out = Vec::new();
        for step in &expanded {
            let mut step_ctx = ctx.clone();
            step_ctx.set("mode", sim.mode.as_str());
            step_ctx.set("has_selection", sim.has_selection);
            step_ctx.set("object_count", sim.object_count as f64);

            if !evaluate_condition(&step_ctx, step.condition.as_deref()) {
                debug!(tool = %step.tool, "step condition false, skipped");
                continue;
            }

            let resolved_params = resolve_params(&step.params, &step_ctx, context)?;
            out.push(CorrectedCall::new(step.tool.clone(), resolved_params.clone()));
            sim.apply(&step.tool, &resolved_params);
        }

        Ok(out)
    }
}

fn enum_contains(values: &[Value], needle: &Value) -> bool {
    match needle {
        Value::String(s) => values.iter().any(|v| match v {
            Value::String(other) => other.trim().eq_ignore_ascii_case(s.trim()),
            _ => v == needle,
        }),
        other => values.contains(other),
    }
}

/// Resolves `$CALCULATE(expr)`, `$AUTO_<NAME>`, and `$name` prefixes on scalar step
/// parameter values, recursing into lists and mappings (§4.4 step 5).
fn resolve_params(params: &ValueMap, ctx: &EvalContext, scene: &SceneContext) -> RouterResult<ValueMap> {
    let mut out = ValueMap::new();
    for (k, v) in params {
        out.insert(k.clone(), resolve_value(v, ctx, scene)?);
    }
    Ok(out)
}

fn resolve_value(value: &Value, ctx: &EvalContext, scene: &SceneContext) -> RouterResult<Value> {
    match value {
        Value::String(s) => resolve_scalar_string(s, ctx, scene),
        Value::List(items) => Ok(Value::List(
            items.iter().map(|v| resolve_value(v, ctx, scene)).collect::<RouterResult<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn resolve_scalar_string(s: &str, ctx: &EvalContext, scene: &SceneContext) -> RouterResult<Value> {
    if let Some(expr) = s.strip_prefix("$CALCULATE(").and_then(|rest| rest.strip_suffix(')')) {
        return Evaluator::new(ctx).evaluate(expr);
    }
    if let Some(auto_name) = s.strip_prefix("$AUTO_") {
        let dims = scene.active_object_info().map(|o| o.dimensions);
        return Ok(proportions::resolve_auto(auto_name, dims));
    }
    if let Some(name) = s.strip_prefix('$') {
        return Ok(ctx.get(name).cloned().unwrap_or_else(|| Value::String(s.to_string())));
    }
    Ok(Value::String(s.to_string()))
}

/// The shadow scene context mutated between step emissions (§4.5, GLOSSARY "Simulated
/// context"). Heuristic, never authoritative against the host.
struct SimulatedContext {
    mode: crate::scene::SceneMode,
    has_selection: bool,
    object_count: usize,
}

impl SimulatedContext {
    fn from_scene(scene: &SceneContext) -> Self {
        Self {
            mode: scene.mode.clone(),
            has_selection: scene.has_selection(),
            object_count: scene.objects.len(),
        }
    }

    fn apply(&mut self, tool: &str, params: &ValueMap) {
        match tool {
            "system_set_mode" => {
                if let Some(Value::String(mode)) = params.get("mode") {
                    if let Some(parsed) = crate::scene::SceneMode::parse(mode) {
                        self.mode = parsed;
                    }
                }
            }
            "mesh_select" => match params.get("action") {
                Some(Value::String(action)) if action == "all" => self.has_selection = true,
                Some(Value::String(action)) if action == "none" => self.has_selection = false,
                _ => {}
            },
            "modeling_create_primitive" => self.object_count += 1,
            "scene_delete_object" => self.object_count = self.object_count.saturating_sub(1),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::WorkflowDefinition;

    fn minimal_registry() -> WorkflowRegistry {
        WorkflowRegistry::new(RegistryLimits::new(20, 2000))
    }

    #[test]
    fn modifier_override_applies_per_scenario_s3() {
        let doc = r#"
name: picnic_table_workflow
defaults:
  leg_angle_left: 0.32
modifiers:
  "straight legs":
    overrides:
      leg_angle_left: 0.0
steps:
  - tool: modeling_transform_object
    params:
      name: Leg_FL
      rotation: [0, "$leg_angle_left", 0]
"#;
        let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
        let mut registry = minimal_registry();
        registry.register_workflow(def);

        let scene = SceneContext::minimal();
        let calls = registry
            .expand_workflow(
                "picnic_table_workflow",
                &ValueMap::new(),
                &scene,
                Some("simple table with straight legs"),
                None,
            )
            .unwrap();
        assert_eq!(calls.len(), 1);
        let rotation = calls[0].params.get("rotation").unwrap().as_list().unwrap();
        assert_eq!(rotation[1], Value::Number(0.0));
    }

    #[test]
    fn later_declared_modifier_wins_when_both_match() {
        let doc = r#"
name: picnic_table_workflow
defaults:
  leg_angle_left: 0.32
modifiers:
  "straight legs":
    overrides:
      leg_angle_left: 0.0
  "table":
    overrides:
      leg_angle_left: 0.15
steps:
  - tool: modeling_transform_object
    params:
      name: Leg_FL
      rotation: [0, "$leg_angle_left", 0]
"#;
        let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
        let mut registry = minimal_registry();
        registry.register_workflow(def);

        let scene = SceneContext::minimal();
        let calls = registry
            .expand_workflow(
                "picnic_table_workflow",
                &ValueMap::new(),
                &scene,
                Some("simple table with straight legs"),
                None,
            )
            .unwrap();
        let rotation = calls[0].params.get("rotation").unwrap().as_list().unwrap();
        assert_eq!(rotation[1], Value::Number(0.15));
    }

    #[test]
    fn computed_parameters_resolve_per_scenario_s4() {
        let doc = r#"
name: plank_workflow
parameters:
  table_width:
    type: float
    default: 0.83
  plank_max_width:
    type: float
    default: 0.10
  plank_count:
    type: int
    computed: "ceil(table_width / plank_max_width)"
    depends_on: [table_width, plank_max_width]
  plank_actual_width:
    type: float
    computed: "table_width / plank_count"
    depends_on: [table_width, plank_count]
defaults:
  table_width: 0.83
  plank_max_width: 0.10
steps:
  - tool: modeling_create_primitive
    params:
      width: "$plank_actual_width"
"#;
        let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
        let mut registry = minimal_registry();
        registry.register_workflow(def);

        let scene = SceneContext::minimal();
        let calls = registry
            .expand_workflow("plank_workflow", &ValueMap::new(), &scene, None, None)
            .unwrap();
        let width = calls[0].params.get("width").unwrap().as_f64().unwrap();
        assert!((width - 0.0922).abs() < 1e-3);
    }

    #[test]
    fn context_simulation_reflects_mode_switch() {
        let doc = r#"
name: edit_workflow
steps:
  - tool: system_set_mode
    params:
      mode: EDIT
  - tool: mesh_select
    condition: "mode == 'EDIT'"
    params:
      action: all
"#;
        let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
        let mut registry = minimal_registry();
        registry.register_workflow(def);

        let scene = SceneContext::minimal();
        let calls = registry
            .expand_workflow("edit_workflow", &ValueMap::new(), &scene, None, None)
            .unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].tool_name, "mesh_select");
    }
}
