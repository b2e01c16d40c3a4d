//! Correction Engine (SPEC_FULL.md §4.8): the first stage applied to every
//! intercepted call. Grounded on `core/workflow_engine.rs`'s per-step validation
//! pass, generalized from a fixed step pipeline into a metadata-driven one.

use crate::call::{CorrectedCall, InterceptedCall};
use crate::config::RouterConfig;
use crate::scene::SceneContext;
use crate::tools::ToolMetadataStore;
use crate::value::Value;

pub struct CorrectionOutcome {
    pub pre_steps: Vec<CorrectedCall>,
    pub call: CorrectedCall,
}

pub struct CorrectionEngine<'a> {
    tools: &'a ToolMetadataStore,
    config: &'a RouterConfig,
}

impl<'a> CorrectionEngine<'a> {
    pub fn new(tools: &'a ToolMetadataStore, config: &'a RouterConfig) -> Self {
        Self { tools, config }
    }

    pub fn correct(&self, intercepted: &InterceptedCall, context: &SceneContext) -> CorrectionOutcome {
        let mut pre_steps = Vec::new();
        let mut call = CorrectedCall::from_intercepted(intercepted);

        let Some(meta) = self.tools.get(&intercepted.tool_name) else {
            return CorrectionOutcome { pre_steps, call };
        };

        if self.config.correction.auto_mode_switch
            && !meta.mode_required_is_any()
            && context.mode.as_str() != meta.mode_required
        {
            let mut params = crate::value::ValueMap::new();
            params.insert("mode".to_string(), Value::String(meta.mode_required.clone()));
            pre_steps.push(CorrectedCall::injected("system_set_mode", params));
            call.record_correction(format!("injected mode switch to {}", meta.mode_required));
        }

        if self.config.correction.auto_selection && meta.selection_required && !context.has_selection() {
            let mut params = crate::value::ValueMap::new();
            params.insert("action".to_string(), Value::String("all".to_string()));
            pre_steps.push(CorrectedCall::injected("mesh_select", params));
            call.record_correction("injected select-all for selection-required tool");
        }

        if self.config.correction.clamp_parameters {
            self.clamp_parameters(&mut call, meta, context);
        }

        CorrectionOutcome { pre_steps, call }
    }

    fn clamp_parameters(&self, call: &mut CorrectedCall, meta: &crate::tools::ToolMetadata, context: &SceneContext) {
        let min_dim = context.active_object_info().map(|o| {
            let (x, y, z) = o.dimensions;
            x.min(y).min(z)
        });

        for (name, descriptor) in &meta.parameters {
            let Some(current) = call.params.get(name).and_then(|v| v.as_f64()) else { continue };

            // Dimension-relative clamp for the bevel-style offset family, per config.
            let dimension_ceiling = if name == "offset" && meta.tool_name.contains("bevel") {
                min_dim.map(|m| m * self.config.thresholds.bevel_max_ratio)
            } else {
                None
            };

            let mut clamped = current;
            if let Some(ceiling) = dimension_ceiling {
                clamped = clamped.min(ceiling);
            }
            if let Some(range) = &descriptor.range {
                clamped = clamped.clamp(range.min, range.max);
            }

            if clamped != current {
                call.params.insert(name.clone(), Value::Number(clamped));
                call.record_correction(format!("clamped parameter '{name}' to {clamped}"));
            }
        }
    }
}
