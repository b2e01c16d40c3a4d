//! Router configuration record (SPEC_FULL.md §6). Deserializable from a partial
//! document (unknown keys ignored, missing keys defaulted), the same way the
//! Workflow Loader deserializes workflow documents from `serde_yaml`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub auto_mode_switch: bool,
    pub auto_selection: bool,
    pub clamp_parameters: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            auto_mode_switch: true,
            auto_selection: true,
            clamp_parameters: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub enable_overrides: bool,
    pub enable_workflow_expansion: bool,
    pub enable_workflow_adaptation: bool,
    pub enable_heuristic_trigger: bool,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            enable_overrides: true,
            enable_workflow_expansion: true,
            enable_workflow_adaptation: true,
            enable_heuristic_trigger: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub block_invalid_operations: bool,
    pub auto_fix_mode_violations: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            block_invalid_operations: true,
            auto_fix_mode_violations: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub embedding_threshold: f64,
    pub bevel_max_ratio: f64,
    pub subdivide_max_cuts: i64,
    pub adaptation_semantic_threshold: f64,
    pub workflow_similarity_threshold: f64,
    pub generalization_threshold: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            embedding_threshold: 0.40,
            bevel_max_ratio: 0.5,
            subdivide_max_cuts: 6,
            adaptation_semantic_threshold: 0.6,
            workflow_similarity_threshold: 0.5,
            generalization_threshold: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingConfig {
    pub cache_scene_context: bool,
    pub cache_ttl_seconds: f64,
    pub max_workflow_steps: i64,
    pub max_expanded_steps: i64,
    pub log_decisions: bool,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            cache_scene_context: true,
            cache_ttl_seconds: 2.0,
            max_workflow_steps: 20,
            max_expanded_steps: 2000,
            log_decisions: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    pub correction: CorrectionConfig,
    pub engines: EnginesConfig,
    pub firewall: FirewallConfig,
    pub thresholds: ThresholdsConfig,
    pub caching: CachingConfig,
}

impl RouterConfig {
    /// Parse a (possibly partial) YAML/JSON document, falling back to documented
    /// defaults for anything missing. Unknown top-level keys are ignored.
    pub fn from_yaml_str(doc: &str) -> anyhow::Result<Self> {
        let cfg: RouterConfig = serde_yaml::from_str(doc)?;
        Ok(cfg)
    }
}
