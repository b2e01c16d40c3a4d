//! Supervisor (SPEC_FULL.md §4.13): the single entry point wiring every stage of the
//! pipeline together and owning all per-session state. Grounded on
//! `core/session.rs::RobotSession::handle_input`'s perception -> intent -> decision ->
//! step-execution -> dispatch pipeline, generalized from five stages to ten; per-session
//! state is kept private to this struct exactly the way `SessionManager` keeps
//! `output_handlers`/`router` behind its own API rather than exposing them to the
//! components it wires together (§9 "Shared mutable state").

use crate::call::{CorrectedCall, EmittedCall, InterceptedCall};
use crate::config::RouterConfig;
use crate::correction::CorrectionEngine;
use crate::ensemble::{ConfidenceLevel, EmbeddingProvider, EnsembleMatcher, EnsembleMatcherConfig, EnsembleResult};
use crate::error::{RouterError, RouterResult};
use crate::firewall::{ErrorFirewall, FirewallAction, FirewallSimContext};
use crate::override_engine::OverrideEngine;
use crate::pattern::{DetectedPattern, PatternDetector};
use crate::scene::{HostClient, SceneContext, SceneContextAnalyzer};
use crate::telemetry::{Stats, TelemetryLogger};
use crate::tools::ToolMetadataStore;
use crate::value::ValueMap;
use crate::workflow::{WorkflowAdapter, WorkflowRegistry};
use serde_json::json;
use std::sync::Arc;

/// Result of `set_goal` (§4.13).
pub struct GoalOutcome {
    pub workflow_name: Option<String>,
    pub confidence_level: ConfidenceLevel,
    pub modifiers: ValueMap,
}

/// Wires the Tool Metadata Store, Workflow Registry, Correction/Override/Firewall
/// engines, Ensemble Matcher, and Workflow Adapter together, and owns the per-session
/// state none of those components are allowed to hold themselves (§9).
pub struct Supervisor {
    tools: ToolMetadataStore,
    workflows: WorkflowRegistry,
    override_engine: OverrideEngine,
    config: RouterConfig,
    analyzer: SceneContextAnalyzer,
    pattern_detector: PatternDetector,
    ensemble: EnsembleMatcher,
    embedding: Arc<dyn EmbeddingProvider>,
    adapter: WorkflowAdapter,
    telemetry: TelemetryLogger,

    pending_workflow: Option<String>,
    pending_modifiers: ValueMap,
    last_context: Option<SceneContext>,
    last_pattern: Option<DetectedPattern>,
    last_ensemble_result: Option<EnsembleResult>,
}

struct FirewallOutcome {
    calls: Vec<CorrectedCall>,
    auto_fixes: u32,
}

impl Supervisor {
    pub fn new(
        tools: ToolMetadataStore,
        workflows: WorkflowRegistry,
        override_engine: OverrideEngine,
        config: RouterConfig,
        host: Arc<dyn HostClient>,
        embedding: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let analyzer = SceneContextAnalyzer::new(
            host,
            config.caching.cache_ttl_seconds,
            config.caching.cache_scene_context,
        );
        let adapter = WorkflowAdapter::new(config.thresholds.adaptation_semantic_threshold);
        let ensemble = EnsembleMatcher::new(EnsembleMatcherConfig {
            similarity_threshold: config.thresholds.workflow_similarity_threshold,
        });
        Self {
            tools,
            workflows,
            override_engine,
            config,
            analyzer,
            pattern_detector: PatternDetector::new(),
            ensemble,
            embedding,
            adapter,
            telemetry: TelemetryLogger::default(),
            pending_workflow: None,
            pending_modifiers: ValueMap::new(),
            last_context: None,
            last_pattern: None,
            last_ensemble_result: None,
        }
    }

    /// Runs the Ensemble Matcher against `prompt` and stores the winner as pending
    /// state for the next `process_llm_tool_call` or `execute_pending_workflow`.
    pub async fn set_goal(&mut self, prompt: &str) -> GoalOutcome {
        let context = self.analyzer.analyze().await;
        let pattern = detect_pattern(&self.pattern_detector, &self.config, &context);

        let result = self
            .ensemble
            .evaluate(&self.workflows, prompt, pattern.as_ref(), self.embedding.as_ref())
            .await;
        self.telemetry.record(
            "set_goal",
            None,
            None,
            json!({
                "prompt": prompt,
                "workflow": result.workflow_name,
                "confidence": format!("{:?}", result.confidence_level),
            }),
        );

        self.pending_workflow = result.workflow_name.clone();
        self.pending_modifiers = result.modifiers.clone();
        self.last_context = Some(context);
        self.last_pattern = pattern;
        let outcome = GoalOutcome {
            workflow_name: result.workflow_name.clone(),
            confidence_level: result.confidence_level,
            modifiers: result.modifiers.clone(),
        };
        self.last_ensemble_result = Some(result);
        outcome
    }

    pub fn clear_goal(&mut self) {
        self.pending_workflow = None;
        self.pending_modifiers = ValueMap::new();
        self.last_ensemble_result = None;
    }

    pub async fn invalidate_cache(&self) {
        self.analyzer.invalidate().await;
    }

    pub fn get_stats(&self) -> Stats {
        self.telemetry.stats()
    }

    pub fn reset_stats(&mut self) {
        self.telemetry.reset_stats();
    }

    /// The ten-stage pipeline of §4.13.
    pub async fn process_llm_tool_call(
        &mut self,
        tool_name: &str,
        params: ValueMap,
        prompt: Option<&str>,
        session_id: Option<&str>,
    ) -> RouterResult<Vec<EmittedCall>> {
        // 1. Intercept
        let intercepted = InterceptedCall::new(tool_name, params)
            .with_prompt(prompt)
            .with_session_id(session_id);
        self.telemetry.record("intercept", session_id, Some(tool_name), json!({}));

        // 2. Analyze
        let context = self.analyzer.analyze().await;
        self.telemetry
            .record("analyze", session_id, Some(tool_name), json!({"mode": context.mode.as_str()}));

        // 3. Detect
        let pattern = detect_pattern(&self.pattern_detector, &self.config, &context);
        self.telemetry.record(
            "detect",
            session_id,
            Some(tool_name),
            json!({"pattern": pattern.as_ref().map(|p| p.pattern_type.as_str())}),
        );

        // 4. Correct
        let correction_engine = CorrectionEngine::new(&self.tools, &self.config);
        let outcome = correction_engine.correct(&intercepted, &context);
        let pre_steps = outcome.pre_steps;
        let corrected_call = outcome.call;
        self.telemetry.record(
            "correct",
            session_id,
            Some(tool_name),
            json!({"pre_steps": pre_steps.len(), "corrections": corrected_call.corrections_applied}),
        );

        // 5. Trigger: pending workflow wins; otherwise the heuristic trigger may name
        //    one from the detected pattern, when enabled.
        let had_pending = self.pending_workflow.clone();
        let triggered_workflow = if let Some(name) = &had_pending {
            Some(name.clone())
        } else if self.config.engines.enable_heuristic_trigger {
            pattern
                .as_ref()
                .and_then(|p| p.suggested_workflow.clone())
                .filter(|name| self.workflows.get(name).is_some())
        } else {
            None
        };
        let do_expand = triggered_workflow.is_some() && self.config.engines.enable_workflow_expansion;
        self.telemetry
            .record("trigger", session_id, Some(tool_name), json!({"workflow": triggered_workflow}));

        // 6. Override: only consulted when no workflow is about to fire.
        let override_calls = if !do_expand && self.config.engines.enable_overrides {
            self.override_engine
                .resolve(&corrected_call.tool_name, &corrected_call.params, pattern.as_ref())
        } else {
            None
        };
        if override_calls.is_some() {
            self.telemetry.note_override_fired();
        }
        self.telemetry
            .record("override", session_id, Some(tool_name), json!({"fired": override_calls.is_some()}));

        // 7. Expand: a triggered workflow goes through the Registry (applying the
        //    Adapter first when the matching confidence requires it); otherwise the
        //    Override Engine's tools are used verbatim.
        let tail: Vec<CorrectedCall> = if do_expand {
            let name = triggered_workflow.clone().expect("do_expand implies Some");
            let def = self
                .workflows
                .get(&name)
                .cloned()
                .ok_or_else(|| RouterError::validation(format!("triggered workflow '{name}' is not registered")))?;

            let confidence = self.confidence_for(&name, pattern.as_ref());
            let steps_override = if confidence.requires_adaptation() && self.config.engines.enable_workflow_adaptation {
                Some(self.adapter.adapt(&def, confidence, prompt, &self.pending_modifiers).0)
            } else {
                None
            };

            let mut explicit_params = corrected_call.params.clone();
            for (k, v) in &self.pending_modifiers {
                explicit_params.entry(k.clone()).or_insert_with(|| v.clone());
            }

            let expanded =
                self.workflows
                    .expand_workflow(&name, &explicit_params, &context, prompt, steps_override.as_deref())?;
            self.telemetry.note_workflow_triggered();
            if had_pending.as_deref() == Some(name.as_str()) {
                self.pending_workflow = None;
            }
            expanded
        } else if let Some(calls) = override_calls {
            calls
        } else {
            vec![corrected_call]
        };
        self.telemetry
            .record("expand", session_id, Some(tool_name), json!({"emitted": tail.len()}));

        // 8. Build the final ordered list.
        let mut pipeline_list = pre_steps;
        pipeline_list.extend(tail);

        // 9. Firewall
        let outcome = match self.run_firewall(&context, pipeline_list) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.telemetry.note_firewall_block();
                self.telemetry
                    .record("firewall", session_id, Some(tool_name), json!({"blocked": true}));
                return Err(e);
            }
        };
        for _ in 0..outcome.auto_fixes {
            self.telemetry.note_firewall_auto_fix();
        }
        self.telemetry
            .record("firewall", session_id, Some(tool_name), json!({"auto_fixes": outcome.auto_fixes}));

        self.last_context = Some(context);
        self.last_pattern = pattern;

        // 10. Emit
        self.telemetry.note_call_processed();
        let emitted: Vec<EmittedCall> = outcome.calls.iter().map(CorrectedCall::emit).collect();
        self.telemetry
            .record("emit", session_id, Some(tool_name), json!({"count": emitted.len()}));
        Ok(emitted)
    }

    /// Expands and emits the pending workflow directly, without a preceding
    /// intercepted tool call. `variables` override the workflow's own defaults and
    /// any pending modifiers (§4.13).
    pub async fn execute_pending_workflow(&mut self, variables: Option<ValueMap>) -> RouterResult<Vec<EmittedCall>> {
        let name = self
            .pending_workflow
            .clone()
            .ok_or_else(|| RouterError::validation("no pending workflow to execute"))?;
        let context = self.analyzer.analyze().await;
        let def = self
            .workflows
            .get(&name)
            .cloned()
            .ok_or_else(|| RouterError::validation(format!("pending workflow '{name}' is not registered")))?;

        let pattern = detect_pattern(&self.pattern_detector, &self.config, &context);
        let confidence = self.confidence_for(&name, pattern.as_ref());

        let mut explicit_params = variables.unwrap_or_default();
        for (k, v) in &self.pending_modifiers {
            explicit_params.entry(k.clone()).or_insert_with(|| v.clone());
        }

        let steps_override = if confidence.requires_adaptation() && self.config.engines.enable_workflow_adaptation {
            Some(self.adapter.adapt(&def, confidence, None, &self.pending_modifiers).0)
        } else {
            None
        };

        let expanded = self
            .workflows
            .expand_workflow(&name, &explicit_params, &context, None, steps_override.as_deref())?;

        let outcome = match self.run_firewall(&context, expanded) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.telemetry.note_firewall_block();
                return Err(e);
            }
        };
        for _ in 0..outcome.auto_fixes {
            self.telemetry.note_firewall_auto_fix();
        }

        self.telemetry.note_workflow_triggered();
        self.telemetry.note_call_processed();
        self.pending_workflow = None;
        self.pending_modifiers = ValueMap::new();
        self.last_context = Some(context);
        self.last_pattern = pattern;

        Ok(outcome.calls.iter().map(CorrectedCall::emit).collect())
    }

    /// The confidence level the Adapter should use for a just-triggered workflow: the
    /// Ensemble Matcher's own verdict when it is the one that chose `name`, otherwise
    /// the detected pattern's confidence mapped onto the same scale (decided open
    /// question: the heuristic trigger has no ensemble score of its own to reuse).
    fn confidence_for(&self, name: &str, pattern: Option<&DetectedPattern>) -> ConfidenceLevel {
        if let Some(result) = &self.last_ensemble_result {
            if result.workflow_name.as_deref() == Some(name) {
                return result.confidence_level;
            }
        }
        pattern
            .map(|p| ConfidenceLevel::from_score(p.confidence))
            .unwrap_or(ConfidenceLevel::High)
    }

    /// Validates every entry in order against the Firewall, threading its simulated
    /// context through the whole list (§4.10). A `Block` aborts immediately.
    fn run_firewall(&self, context: &SceneContext, calls: Vec<CorrectedCall>) -> RouterResult<FirewallOutcome> {
        let firewall = ErrorFirewall::new(&self.tools, &self.config);
        let mut sim = FirewallSimContext::from_scene(context);
        let mut out = Vec::with_capacity(calls.len());
        let mut auto_fixes = 0u32;
        for entry in calls {
            let result = firewall.check(&entry, &mut sim);
            match result.action {
                FirewallAction::Block => return Err(RouterError::firewall(result.message)),
                FirewallAction::AutoFix => {
                    auto_fixes += 1;
                    out.extend(result.pre_steps);
                    out.push(result.modified_call.unwrap_or(entry));
                }
                FirewallAction::Modify => out.push(result.modified_call.unwrap_or(entry)),
                FirewallAction::Allow => out.push(entry),
            }
        }
        Ok(FirewallOutcome { calls: out, auto_fixes })
    }
}

fn detect_pattern(detector: &PatternDetector, config: &RouterConfig, context: &SceneContext) -> Option<DetectedPattern> {
    let object = context.active_object_info()?;
    let proportions = context.proportions.as_ref()?;
    detector.get_best_match(object.dimensions, proportions, config.thresholds.generalization_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{BasicEmbeddingProvider, NullEmbeddingProvider};
    use crate::scene::host::RawSceneSnapshot;
    use crate::scene::{NullHostClient, ObjectInfo};
    use crate::tools::{ParameterDescriptor, ParameterRange, ToolMetadata};
    use crate::value::Value;
    use crate::workflow::{RegistryLimits, WorkflowDefinition};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedHost {
        mode: &'static str,
        dims: (f64, f64, f64),
        selected: bool,
    }

    #[async_trait]
    impl HostClient for FixedHost {
        async fn query_scene(&self) -> Result<RawSceneSnapshot, RouterError> {
            Ok(RawSceneSnapshot {
                mode: Some(self.mode.to_string()),
                active_object: Some("Cube".to_string()),
                selected_objects: if self.selected { vec!["Cube".to_string()] } else { vec![] },
                objects: vec![ObjectInfo {
                    name: "Cube".to_string(),
                    type_name: "MESH".to_string(),
                    location: (0.0, 0.0, 0.0),
                    dimensions: self.dims,
                    selected: self.selected,
                    active: true,
                }],
                topology: None,
                materials: vec![],
                modifiers: vec![],
            })
        }
    }

    fn bevel_tool_store() -> ToolMetadataStore {
        let mut parameters = HashMap::new();
        parameters.insert(
            "offset".to_string(),
            ParameterDescriptor {
                type_name: Some("float".to_string()),
                default: None,
                range: Some(ParameterRange { min: 0.001, max: 10.0 }),
                options: None,
            },
        );
        ToolMetadataStore::from_tools(vec![ToolMetadata {
            tool_name: "mesh_bevel".to_string(),
            category: "mesh".to_string(),
            mode_required: "EDIT".to_string(),
            selection_required: true,
            keywords: vec![],
            sample_prompts: vec![],
            parameters,
            related_tools: vec![],
            patterns: vec![],
            description: String::new(),
        }])
    }

    #[tokio::test]
    async fn mode_mismatch_injects_prestep_and_firewall_passes_per_scenario_s1() {
        let tools = bevel_tool_store();
        let registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        let host = Arc::new(FixedHost { mode: "OBJECT", dims: (1.0, 1.0, 1.0), selected: true });
        let embedding = Arc::new(NullEmbeddingProvider);
        let mut supervisor = Supervisor::new(tools, registry, OverrideEngine::new(), RouterConfig::default(), host, embedding);

        let mut params = ValueMap::new();
        params.insert("offset".to_string(), Value::Number(0.01));
        let emitted = supervisor.process_llm_tool_call("mesh_bevel", params, None, None).await.unwrap();

        assert_eq!(emitted[0].tool, "system_set_mode");
        assert_eq!(emitted.last().unwrap().tool, "mesh_bevel");
        assert_eq!(supervisor.get_stats().calls_processed, 1);
    }

    #[tokio::test]
    async fn bevel_offset_clamped_end_to_end_per_scenario_s2() {
        let tools = bevel_tool_store();
        let registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        let host = Arc::new(FixedHost { mode: "EDIT", dims: (0.1, 0.2, 0.05), selected: true });
        let embedding = Arc::new(NullEmbeddingProvider);
        let mut supervisor = Supervisor::new(tools, registry, OverrideEngine::new(), RouterConfig::default(), host, embedding);

        let mut params = ValueMap::new();
        params.insert("offset".to_string(), Value::Number(1.0));
        let emitted = supervisor.process_llm_tool_call("mesh_bevel", params, None, None).await.unwrap();

        assert_eq!(emitted.len(), 1);
        let offset = emitted[0].params.get("offset").unwrap().as_f64().unwrap();
        assert!((offset - 0.025).abs() < 1e-9);
    }

    #[tokio::test]
    async fn destructive_call_on_empty_scene_fails_the_pipeline() {
        let tools = ToolMetadataStore::new();
        let registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        let host = Arc::new(NullHostClient);
        let embedding = Arc::new(NullEmbeddingProvider);
        let mut supervisor = Supervisor::new(tools, registry, OverrideEngine::new(), RouterConfig::default(), host, embedding);

        let result = supervisor.process_llm_tool_call("scene_delete_object", ValueMap::new(), None, None).await;
        assert!(result.is_err());
        assert_eq!(supervisor.get_stats().firewall_blocks, 1);
    }

    #[tokio::test]
    async fn set_goal_then_execute_pending_workflow_runs_the_expansion() {
        let tools = ToolMetadataStore::new();
        let mut registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        let def: WorkflowDefinition = serde_yaml::from_str(
            r#"
name: picnic_table_workflow
trigger_keywords: ["picnic table", "table"]
defaults:
  leg_angle_left: 0.32
steps:
  - tool: modeling_create_primitive
    params:
      shape: cube
      name: Tabletop
"#,
        )
        .unwrap();
        registry.register_workflow(def);
        let host = Arc::new(NullHostClient);
        let embedding = Arc::new(BasicEmbeddingProvider::new(64));
        let mut supervisor = Supervisor::new(tools, registry, OverrideEngine::new(), RouterConfig::default(), host, embedding);

        let goal = supervisor.set_goal("build me a picnic table").await;
        assert_eq!(goal.workflow_name.as_deref(), Some("picnic_table_workflow"));

        let emitted = supervisor.execute_pending_workflow(None).await.unwrap();
        assert_eq!(emitted[0].tool, "modeling_create_primitive");
        assert_eq!(supervisor.get_stats().workflows_triggered, 1);
    }

    #[tokio::test]
    async fn pending_workflow_suppresses_override_engine() {
        let tools = ToolMetadataStore::new();
        let mut registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        let def: WorkflowDefinition = serde_yaml::from_str(
            r#"
name: tower_workflow
steps:
  - tool: modeling_create_primitive
    params: {shape: cylinder}
"#,
        )
        .unwrap();
        registry.register_workflow(def);

        let mut override_engine = OverrideEngine::new();
        override_engine.add_rule(crate::override_engine::OverrideRule {
            trigger_tool: "modeling_add_cube".to_string(),
            trigger_pattern: None,
            replacements: vec![crate::override_engine::ReplacementTool {
                tool_name: "should_not_fire".to_string(),
                static_params: ValueMap::new(),
                inherit_params: vec![],
            }],
        });

        let host = Arc::new(NullHostClient);
        let embedding = Arc::new(NullEmbeddingProvider);
        let mut supervisor = Supervisor::new(tools, registry, override_engine, RouterConfig::default(), host, embedding);
        supervisor.pending_workflow = Some("tower_workflow".to_string());

        let emitted = supervisor.process_llm_tool_call("modeling_add_cube", ValueMap::new(), None, None).await.unwrap();
        assert!(emitted.iter().all(|c| c.tool != "should_not_fire"));
        assert_eq!(emitted[0].tool, "modeling_create_primitive");
    }
}
