//! Workflow Adapter (SPEC_FULL.md §4.11): filters a workflow's steps down to what a
//! given confidence level warrants. Grounded on `core/persona.rs`-style small pure
//! policy objects; the actual expansion stays the Registry's job (`steps_override`).

use crate::ensemble::ConfidenceLevel;
use crate::workflow::model::{WorkflowDefinition, WorkflowStep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptationStrategy {
    Full,
    CoreOnly,
    Filtered,
}

pub struct AdaptationReport {
    pub strategy: AdaptationStrategy,
    pub core_count: usize,
    pub optional_kept: usize,
    pub optional_dropped: usize,
}

pub struct WorkflowAdapter {
    pub semantic_threshold: f64,
}

impl WorkflowAdapter {
    pub fn new(semantic_threshold: f64) -> Self {
        Self { semantic_threshold }
    }

    /// Returns the adapted step list and a small report. Relevance for `MEDIUM` is a
    /// three-level cascade: tag match, semantic-parameter keyword match, then
    /// description/prompt similarity (§4.11).
    pub fn adapt(
        &self,
        definition: &WorkflowDefinition,
        confidence: ConfidenceLevel,
        prompt: Option<&str>,
        modifiers: &crate::value::ValueMap,
    ) -> (Vec<WorkflowStep>, AdaptationReport) {
        let core_count = definition.steps.iter().filter(|s| s.is_core()).count();

        let (steps, strategy): (Vec<WorkflowStep>, AdaptationStrategy) = match confidence {
            ConfidenceLevel::High => (definition.steps.clone(), AdaptationStrategy::Full),
            ConfidenceLevel::Low | ConfidenceLevel::None => (
                definition.steps.iter().filter(|s| s.is_core()).cloned().collect(),
                AdaptationStrategy::CoreOnly,
            ),
            ConfidenceLevel::Medium => {
                let lower_prompt = prompt.map(|p| p.to_lowercase()).unwrap_or_default();
                let filtered = definition
                    .steps
                    .iter()
                    .filter(|s| s.is_core() || self.is_relevant(s, &lower_prompt, modifiers))
                    .cloned()
                    .collect();
                (filtered, AdaptationStrategy::Filtered)
            }
        };

        let optional_kept = steps.iter().filter(|s| !s.is_core()).count();
        let total_optional = definition.steps.iter().filter(|s| !s.is_core()).count();
        let report = AdaptationReport {
            strategy,
            core_count,
            optional_kept,
            optional_dropped: total_optional.saturating_sub(optional_kept),
        };
        (steps, report)
    }

    fn is_relevant(&self, step: &WorkflowStep, lower_prompt: &str, _modifiers: &crate::value::ValueMap) -> bool {
        // 1. tag match
        if step.tags.iter().any(|t| lower_prompt.contains(&t.to_lowercase())) {
            return true;
        }

        // 2. semantic-parameter keyword match (unknown boolean fields, de-prefixed).
        for (name, value) in step.extra_bool_fields() {
            let keyword = name
                .trim_start_matches("add_")
                .trim_start_matches("include_")
                .replace('_', " ");
            let present = lower_prompt.contains(&keyword);
            if value && present {
                return true;
            }
            if !value && !present {
                return true;
            }
        }

        // 3. description/prompt similarity (literal substring fallback without an
        //    embedding backend, matching the keyword-only degraded mode of §6).
        if let Some(desc) = &step.description {
            let lower_desc = desc.to_lowercase();
            let hits = lower_desc
                .split_whitespace()
                .filter(|w| w.len() > 3 && lower_prompt.contains(w))
                .count();
            let words = lower_desc.split_whitespace().count().max(1);
            let similarity = hits as f64 / words as f64;
            if similarity >= self.semantic_threshold {
                return true;
            }
        }

        false
    }
}
