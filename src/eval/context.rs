//! Variable context for the evaluator, including the dimension-flattening rule of
//! SPEC_FULL.md §4.1.

use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct EvalContext {
    vars: BTreeMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Flattens `dimensions = [x, y, z]` into `width/height/depth/min_dim/max_dim`.
    pub fn set_dimensions(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.set("x", x);
        self.set("y", y);
        self.set("z", z);
        self.set("width", x);
        self.set("height", y);
        self.set("depth", z);
        self.set("min_dim", x.min(y).min(z));
        self.set("max_dim", x.max(y).max(z));
        self
    }

    /// Mirrors each scalar proportion field as `proportions_<field>`.
    pub fn set_proportions(&mut self, proportions: &crate::proportions::ProportionInfo) {
        self.set("proportions_aspect_xy", proportions.aspect_xy);
        self.set("proportions_aspect_xz", proportions.aspect_xz);
        self.set("proportions_aspect_yz", proportions.aspect_yz);
        self.set("proportions_is_flat", proportions.is_flat);
        self.set("proportions_is_tall", proportions.is_tall);
        self.set("proportions_is_wide", proportions.is_wide);
        self.set("proportions_is_cubic", proportions.is_cubic);
        self.set("proportions_volume", proportions.volume);
        self.set("proportions_surface_area", proportions.surface_area);
    }

    pub fn merge_from(&mut self, other: &EvalContext) {
        for (k, v) in &other.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

impl From<&crate::value::ValueMap> for EvalContext {
    fn from(map: &crate::value::ValueMap) -> Self {
        let mut ctx = EvalContext::new();
        for (k, v) in map {
            ctx.set_value(k.clone(), v.clone());
        }
        ctx
    }
}
