//! The three independent matchers of the Ensemble Matcher (SPEC_FULL.md §4.12).
//! Grounded on `core/decision_engine.rs`'s multiple `DecisionEngine` impls scored
//! against the same interface, generalized here into parallel contributions that the
//! Ensemble aggregates rather than a single chosen implementation.

use crate::ensemble::embedding::EmbeddingProvider;
use crate::pattern::DetectedPattern;
use crate::workflow::WorkflowRegistry;

#[derive(Clone, Debug)]
pub struct MatcherResult {
    pub matcher_name: &'static str,
    pub workflow_name: Option<String>,
    pub confidence: f64,
    pub weight: f64,
}

pub const KEYWORD_WEIGHT: f64 = 0.40;
pub const SEMANTIC_WEIGHT: f64 = 0.40;
pub const PATTERN_WEIGHT: f64 = 0.15;

/// Whether `(candidate_score, candidate_name)` should replace `best`. The registry
/// backing store doesn't preserve insertion order, so an exact score tie is broken by
/// workflow name rather than by visit order, keeping the winner independent of it.
fn is_better(best: &Option<(String, f64)>, candidate_score: f64, candidate_name: &str) -> bool {
    match best {
        None => true,
        Some((best_name, best_score)) => {
            candidate_score > *best_score || (candidate_score == *best_score && candidate_name < best_name.as_str())
        }
    }
}

/// Scans `trigger_keywords` of every workflow for substring hits in the prompt;
/// confidence is proportional to hit density (hits / total keywords).
pub fn keyword_match(registry: &WorkflowRegistry, prompt: &str) -> Option<MatcherResult> {
    let lower_prompt = prompt.to_lowercase();
    let mut best: Option<(String, f64)> = None;
    for def in registry.iter() {
        if def.trigger_keywords.is_empty() {
            continue;
        }
        let hits = def
            .trigger_keywords
            .iter()
            .filter(|kw| lower_prompt.contains(&kw.to_lowercase()))
            .count();
        if hits == 0 {
            continue;
        }
        let confidence = hits as f64 / def.trigger_keywords.len() as f64;
        if is_better(&best, confidence, &def.name) {
            best = Some((def.name.clone(), confidence));
        }
    }
    best.map(|(name, confidence)| MatcherResult {
        matcher_name: "keyword",
        workflow_name: Some(name),
        confidence,
        weight: KEYWORD_WEIGHT,
    })
}

/// Scores workflows by similarity between the prompt embedding and the workflow's
/// aggregated text (sample prompts + keywords + name + description).
pub async fn semantic_match(
    registry: &WorkflowRegistry,
    prompt: &str,
    embedding: &dyn EmbeddingProvider,
) -> Option<MatcherResult> {
    let prompt_vector = embedding.embed(prompt).await.ok()?;
    let mut best: Option<(String, f64)> = None;
    for def in registry.iter() {
        let mut text = def.name.clone();
        text.push(' ');
        text.push_str(&def.description);
        text.push(' ');
        text.push_str(&def.trigger_keywords.join(" "));
        text.push(' ');
        text.push_str(&def.sample_prompts.join(" "));
        let Ok(workflow_vector) = embedding.embed(&text).await else { continue };
        let score = embedding.similarity(&prompt_vector, &workflow_vector) as f64;
        if is_better(&best, score, &def.name) {
            best = Some((def.name.clone(), score));
        }
    }
    best.map(|(name, confidence)| MatcherResult {
        matcher_name: "semantic",
        workflow_name: Some(name),
        confidence: confidence.clamp(0.0, 1.0),
        weight: SEMANTIC_WEIGHT,
    })
}

/// If a pattern was detected and maps to a suggested workflow present in the
/// registry, returns that workflow with confidence equal to the pattern confidence.
pub fn pattern_match(registry: &WorkflowRegistry, detected: Option<&DetectedPattern>) -> Option<MatcherResult> {
    let detected = detected?;
    let workflow_name = detected.suggested_workflow.as_ref()?;
    registry.get(workflow_name)?;
    Some(MatcherResult {
        matcher_name: "pattern",
        workflow_name: Some(workflow_name.clone()),
        confidence: detected.confidence,
        weight: PATTERN_WEIGHT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::embedding::BasicEmbeddingProvider;
    use crate::pattern::PatternType;
    use crate::workflow::{RegistryLimits, WorkflowDefinition};

    fn registry_with(defs: Vec<&str>) -> WorkflowRegistry {
        let mut registry = WorkflowRegistry::new(RegistryLimits::new(20, 2000));
        for doc in defs {
            let def: WorkflowDefinition = serde_yaml::from_str(doc).unwrap();
            registry.register_workflow(def);
        }
        registry
    }

    #[test]
    fn keyword_matcher_scores_by_hit_density() {
        let registry = registry_with(vec![
            r#"name: tower_workflow
trigger_keywords: ["tower", "tall building", "skyscraper"]
"#,
        ]);
        let result = keyword_match(&registry, "build me a tall tower").unwrap();
        assert_eq!(result.workflow_name.as_deref(), Some("tower_workflow"));
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn pattern_matcher_requires_registered_workflow() {
        let registry = registry_with(vec!["name: tower_workflow\n"]);
        let detected = DetectedPattern {
            pattern_type: PatternType::TowerLike,
            confidence: 0.85,
            suggested_workflow: Some("tower_workflow".to_string()),
            detection_rules: vec![],
        };
        let result = pattern_match(&registry, Some(&detected)).unwrap();
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.weight, PATTERN_WEIGHT);
    }

    #[test]
    fn pattern_matcher_is_none_when_workflow_unregistered() {
        let registry = registry_with(vec!["name: other_workflow\n"]);
        let detected = DetectedPattern {
            pattern_type: PatternType::TowerLike,
            confidence: 0.85,
            suggested_workflow: Some("tower_workflow".to_string()),
            detection_rules: vec![],
        };
        assert!(pattern_match(&registry, Some(&detected)).is_none());
    }

    #[test]
    fn keyword_matcher_breaks_ties_by_name() {
        let registry = registry_with(vec![
            r#"name: zebra_workflow
trigger_keywords: ["tower"]
"#,
            r#"name: alpha_workflow
trigger_keywords: ["tower"]
"#,
        ]);
        let result = keyword_match(&registry, "build a tower").unwrap();
        assert_eq!(result.workflow_name.as_deref(), Some("alpha_workflow"));
    }

    #[tokio::test]
    async fn semantic_matcher_prefers_closer_text() {
        let registry = registry_with(vec![
            r#"name: tower_workflow
description: build a tall narrow tower structure
"#,
            r#"name: table_workflow
description: build a flat picnic table
"#,
        ]);
        let embedding = BasicEmbeddingProvider::new(128);
        let result = semantic_match(&registry, "build a tall tower structure", &embedding).await.unwrap();
        assert_eq!(result.workflow_name.as_deref(), Some("tower_workflow"));
    }
}
