//! Pattern Detector (SPEC_FULL.md §4.7): deterministic rules over `ProportionInfo`
//! that suggest a workflow. Grounded on `core/decision.rs`'s rule-table dispatch,
//! generalized from text classification to geometric classification.

use crate::proportions::{Axis, ProportionInfo};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternType {
    TowerLike,
    PhoneLike,
    TableLike,
    PillarLike,
    WheelLike,
    ScreenArea,
    BoxLike,
    SphereLike,
    CylinderLike,
    Unknown,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::TowerLike => "TOWER_LIKE",
            PatternType::PhoneLike => "PHONE_LIKE",
            PatternType::TableLike => "TABLE_LIKE",
            PatternType::PillarLike => "PILLAR_LIKE",
            PatternType::WheelLike => "WHEEL_LIKE",
            PatternType::ScreenArea => "SCREEN_AREA",
            PatternType::BoxLike => "BOX_LIKE",
            PatternType::SphereLike => "SPHERE_LIKE",
            PatternType::CylinderLike => "CYLINDER_LIKE",
            PatternType::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectedPattern {
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub suggested_workflow: Option<String>,
    pub detection_rules: Vec<String>,
}

impl DetectedPattern {
    pub fn is_confident(&self) -> bool {
        self.confidence > 0.7
    }
}

/// One entry of the rule table in declaration order; ties in `get_best_match` are
/// broken by this order, matching the table in §4.7.
struct Rule {
    pattern_type: PatternType,
    suggested_workflow: Option<&'static str>,
    fires: fn(&ProportionInfo, width: f64, height: f64) -> bool,
    rule_desc: &'static str,
    confidence: f64,
}

const RULES: &[Rule] = &[
    Rule {
        pattern_type: PatternType::TowerLike,
        suggested_workflow: Some("tower_workflow"),
        fires: |p, width, height| p.is_tall && height > width * 3.0,
        rule_desc: "is_tall and height > width * 3",
        confidence: 0.85,
    },
    Rule {
        pattern_type: PatternType::PhoneLike,
        suggested_workflow: Some("phone_workflow"),
        fires: |p, _w, _h| p.is_flat && p.aspect_xy > 0.4 && p.aspect_xy < 0.7,
        rule_desc: "is_flat and 0.4 < aspect_xy < 0.7",
        confidence: 0.8,
    },
    Rule {
        pattern_type: PatternType::TableLike,
        suggested_workflow: Some("table_workflow"),
        fires: |p, _w, _h| p.is_flat && !p.is_tall,
        rule_desc: "is_flat and not is_tall",
        confidence: 0.75,
    },
    Rule {
        pattern_type: PatternType::PillarLike,
        suggested_workflow: Some("pillar_workflow"),
        fires: |p, _w, _h| p.is_tall && p.aspect_xy > 0.8 && p.aspect_xy < 1.25,
        rule_desc: "is_tall and roughly cubic in x-y",
        confidence: 0.75,
    },
    Rule {
        pattern_type: PatternType::WheelLike,
        suggested_workflow: Some("wheel_workflow"),
        fires: |p, _w, _h| p.is_flat && p.aspect_xy > 0.9 && p.aspect_xy < 1.1,
        rule_desc: "is_flat and 0.9 < aspect_xy < 1.1",
        confidence: 0.8,
    },
    Rule {
        pattern_type: PatternType::BoxLike,
        suggested_workflow: None,
        fires: |p, _w, _h| p.is_cubic && !p.is_flat && !p.is_tall,
        rule_desc: "is_cubic and not is_flat and not is_tall",
        confidence: 0.7,
    },
];

pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates every rule against the given dimensions/proportions and returns
    /// every pattern that fired, in declaration order.
    pub fn detect(&self, dims: (f64, f64, f64), proportions: &ProportionInfo) -> Vec<DetectedPattern> {
        let (width, height) = dims_to_width_height(dims, proportions.dominant_axis);
        let mut matches = Vec::new();
        for rule in RULES {
            if (rule.fires)(proportions, width, height) {
                matches.push(DetectedPattern {
                    pattern_type: rule.pattern_type,
                    confidence: rule.confidence,
                    suggested_workflow: rule.suggested_workflow.map(str::to_string),
                    detection_rules: vec![rule.rule_desc.to_string()],
                });
            }
        }
        matches
    }

    /// Returns the highest-confidence pattern above `threshold`; ties are broken by
    /// declaration order in the rule table (§4.7).
    pub fn get_best_match(
        &self,
        dims: (f64, f64, f64),
        proportions: &ProportionInfo,
        threshold: f64,
    ) -> Option<DetectedPattern> {
        self.detect(dims, proportions)
            .into_iter()
            .filter(|m| m.confidence > threshold)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn dims_to_width_height(dims: (f64, f64, f64), dominant: Axis) -> (f64, f64) {
    let (x, y, z) = dims;
    match dominant {
        Axis::Z => (x.max(y), z),
        Axis::Y => (x.max(z), y),
        Axis::X => (y.max(z), x),
    }
}
