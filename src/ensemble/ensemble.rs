//! Ensemble Matcher aggregation and modifier extraction (SPEC_FULL.md §4.12).

use crate::ensemble::embedding::EmbeddingProvider;
use crate::ensemble::matcher::{self, MatcherResult};
use crate::pattern::DetectedPattern;
use crate::value::{Value, ValueMap};
use crate::workflow::WorkflowRegistry;
use std::collections::HashMap;

pub const PATTERN_BOOST: f64 = 1.3;
pub const COMPOSITION_THRESHOLD: f64 = 0.15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.70 {
            ConfidenceLevel::High
        } else if score >= 0.40 {
            ConfidenceLevel::Medium
        } else if score >= 0.20 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::None
        }
    }

    pub fn requires_adaptation(&self) -> bool {
        *self != ConfidenceLevel::High
    }
}

#[derive(Clone, Debug)]
pub struct EnsembleResult {
    pub workflow_name: Option<String>,
    pub final_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub modifiers: ValueMap,
    pub matcher_contributions: HashMap<String, f64>,
    pub requires_adaptation: bool,
    pub composition_mode: bool,
    pub extra_workflows: Vec<String>,
}

pub struct EnsembleMatcherConfig {
    pub similarity_threshold: f64,
}

impl Default for EnsembleMatcherConfig {
    fn default() -> Self {
        Self { similarity_threshold: 0.70 }
    }
}

pub struct EnsembleMatcher {
    config: EnsembleMatcherConfig,
}

impl EnsembleMatcher {
    pub fn new(config: EnsembleMatcherConfig) -> Self {
        Self { config }
    }

    /// Runs the three matchers and aggregates their contributions into an
    /// `EnsembleResult`, then extracts modifiers for the winning workflow.
    pub async fn evaluate(
        &self,
        registry: &WorkflowRegistry,
        prompt: &str,
        detected_pattern: Option<&DetectedPattern>,
        embedding: &dyn EmbeddingProvider,
    ) -> EnsembleResult {
        let keyword = matcher::keyword_match(registry, prompt);
        let semantic = matcher::semantic_match(registry, prompt, embedding).await;
        let pattern = matcher::pattern_match(registry, detected_pattern);

        let contributions: Vec<MatcherResult> = [keyword, semantic, pattern].into_iter().flatten().collect();
        aggregate_and_extract(registry, contributions, prompt, self.config.similarity_threshold)
    }
}

fn aggregate_and_extract(
    registry: &WorkflowRegistry,
    contributions: Vec<MatcherResult>,
    prompt: &str,
    similarity_threshold: f64,
) -> EnsembleResult {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut pattern_fired_for: HashMap<String, bool> = HashMap::new();
    let mut per_matcher: HashMap<String, f64> = HashMap::new();

    for contribution in &contributions {
        let Some(workflow) = &contribution.workflow_name else { continue };
        *scores.entry(workflow.clone()).or_insert(0.0) += contribution.weight * contribution.confidence;
        per_matcher.insert(contribution.matcher_name.to_string(), contribution.confidence);
        if contribution.matcher_name == "pattern" {
            pattern_fired_for.insert(workflow.clone(), true);
        }
    }

    let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
    for (name, score) in ranked.iter_mut() {
        if pattern_fired_for.get(name).copied().unwrap_or(false) {
            *score *= PATTERN_BOOST;
        }
    }
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let Some((winner, final_score)) = ranked.first().cloned() else {
        return EnsembleResult {
            workflow_name: None,
            final_score: 0.0,
            confidence_level: ConfidenceLevel::None,
            modifiers: ValueMap::new(),
            matcher_contributions: per_matcher,
            requires_adaptation: true,
            composition_mode: false,
            extra_workflows: Vec::new(),
        };
    };

    let confidence_level = ConfidenceLevel::from_score(final_score);
    let composition_mode = ranked
        .get(1)
        .map(|(_, score)| (final_score - score).abs() <= COMPOSITION_THRESHOLD)
        .unwrap_or(false);
    let extra_workflows = if composition_mode {
        ranked.get(1).map(|(name, _)| vec![name.clone()]).unwrap_or_default()
    } else {
        Vec::new()
    };

    let modifiers = registry
        .get(&winner)
        .map(|def| extract_modifiers(def, prompt, similarity_threshold))
        .unwrap_or_default();

    EnsembleResult {
        workflow_name: Some(winner),
        final_score,
        confidence_level,
        modifiers,
        matcher_contributions: per_matcher,
        requires_adaptation: confidence_level.requires_adaptation(),
        composition_mode,
        extra_workflows,
    }
}

/// Extracts n-grams (lengths 1-3) from the prompt and, for the winning workflow,
/// picks the globally highest-scoring `(phrase, n-gram)` pair above the similarity
/// threshold; falls back to literal substring matching without an embedding service.
fn extract_modifiers(
    def: &crate::workflow::WorkflowDefinition,
    prompt: &str,
    similarity_threshold: f64,
) -> ValueMap {
    if def.modifiers.is_empty() {
        return ValueMap::new();
    }
    let lower_prompt = prompt.to_lowercase();
    let ngrams = ngrams(&lower_prompt, 1, 3);

    // `def.modifiers` iterates in declaration order, so the strict `score > *s`
    // comparison keeps the first-declared phrase on an exact tie, deterministically.
    let mut best: Option<(&str, f64)> = None;
    for (phrase, _) in &def.modifiers {
        let lower_phrase = phrase.to_lowercase();
        let score = ngrams
            .iter()
            .map(|gram| literal_similarity(&lower_phrase, gram))
            .fold(0.0_f64, f64::max);
        if score >= similarity_threshold
            && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true)
        {
            best = Some((phrase.as_str(), score));
        }
    }

    match best {
        Some((phrase, _)) => def
            .modifiers
            .iter()
            .find(|(p, _)| p == phrase)
            .map(|(_, m)| m.overrides.clone())
            .unwrap_or_default(),
        None => ValueMap::new(),
    }
}

fn ngrams(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out = Vec::new();
    for len in min_len..=max_len {
        if len > words.len() {
            continue;
        }
        for window in words.windows(len) {
            out.push(window.join(" "));
        }
    }
    out
}

/// Literal substring similarity used when no embedding backend is available: exact
/// match scores 1.0, substring containment scores 0.85, otherwise 0.0.
fn literal_similarity(phrase: &str, ngram: &str) -> f64 {
    if phrase == ngram {
        1.0
    } else if ngram.contains(phrase) || phrase.contains(ngram) {
        0.85
    } else {
        0.0
    }
}
