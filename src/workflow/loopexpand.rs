//! Loop Expander (SPEC_FULL.md §4.3): binds `loop` clauses to concrete steps and
//! performs strict `{var}` string interpolation. Grounded on the teacher's hand-
//! rolled JSON-slice extraction in `core/decision_engine.rs`, generalized into a
//! small template-substitution pass since no templating crate is in the teacher's
//! dependency stack.

use super::model::{LoopClause, WorkflowStep};
use crate::error::{RouterError, RouterResult};
use crate::eval::EvalContext;
use crate::value::{Value, ValueMap};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_EXPANDED_STEPS: usize = 2000;

/// One concrete binding of a loop's variable(s) to values, produced by the
/// cross-product iteration described in §4.3.
type Binding = BTreeMap<String, Value>;

/// Expands every step in `steps` against `ctx`, respecting `group` interleaving and
/// the global `max_expanded_steps` bound. Steps without a `loop` clause pass through
/// interpolated exactly once.
pub fn expand_steps(
    steps: &[WorkflowStep],
    ctx: &EvalContext,
    max_expanded_steps: usize,
) -> RouterResult<Vec<WorkflowStep>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < steps.len() {
        let step = &steps[i];
        let group = step.loop_clause.as_ref().and_then(|l| l.group.clone());

        if let Some(group_name) = &group {
            // Gather the contiguous run of steps sharing this group and iteration space.
            let mut j = i + 1;
            while j < steps.len() {
                let same_group = steps[j]
                    .loop_clause
                    .as_ref()
                    .and_then(|l| l.group.clone())
                    .as_deref()
                    == Some(group_name.as_str());
                if !same_group {
                    break;
                }
                j += 1;
            }
            let run = &steps[i..j];
            let bindings = bindings_for(&run[0].loop_clause, ctx)?;
            for binding in &bindings {
                for member in run {
                    out.push(interpolate_step(member, binding)?);
                }
            }
            i = j;
        } else if let Some(clause) = &step.loop_clause {
            let bindings = bindings_for(&Some(clause.clone()), ctx)?;
            for binding in &bindings {
                out.push(interpolate_step(step, binding)?);
            }
            i += 1;
        } else {
            out.push(interpolate_step(step, &Binding::new())?);
            i += 1;
        }

        if out.len() > max_expanded_steps {
            return Err(RouterError::resource_limit(format!(
                "expansion exceeded max_expanded_steps ({max_expanded_steps})"
            )));
        }
    }
    Ok(out)
}

fn bindings_for(clause: &Option<LoopClause>, ctx: &EvalContext) -> RouterResult<Vec<Binding>> {
    let Some(clause) = clause else {
        return Ok(vec![Binding::new()]);
    };
    let vars = clause.variable_names();
    if vars.is_empty() {
        return Err(RouterError::parse("loop clause declares no variable"));
    }

    let mut per_variable: Vec<Vec<Value>> = Vec::with_capacity(vars.len());

    if let Some(values) = &clause.values {
        per_variable.push(values.clone());
    } else if let Some(lists) = &clause.value_lists {
        for list in lists {
            per_variable.push(list.clone());
        }
    } else if let Some((start, end)) = &clause.range {
        per_variable.push(range_values(start, end, ctx)?);
    } else if let Some(ranges) = &clause.ranges {
        for (start, end) in ranges {
            per_variable.push(range_values(start, end, ctx)?);
        }
    } else {
        return Err(RouterError::parse("loop clause declares neither range, ranges, values nor value_lists"));
    }

    if per_variable.len() != vars.len() {
        return Err(RouterError::parse(
            "loop clause variable count does not match its range/value source count",
        ));
    }

    // Cross product in natural order: the outer (first) variable advances slowest.
    let mut bindings = vec![Binding::new()];
    for (var, values) in vars.iter().zip(per_variable.iter()) {
        let mut next = Vec::with_capacity(bindings.len() * values.len());
        for existing in &bindings {
            for value in values {
                let mut b = existing.clone();
                b.insert(var.clone(), value.clone());
                next.push(b);
            }
        }
        bindings = next;
    }
    Ok(bindings)
}

fn range_values(start: &str, end: &str, ctx: &EvalContext) -> RouterResult<Vec<Value>> {
    let lo = crate::eval::Evaluator::new(ctx)
        .evaluate_as_float(start)
        .map_err(|e| RouterError::parse(format!("loop range start: {e}")))?;
    let hi = crate::eval::Evaluator::new(ctx)
        .evaluate_as_float(end)
        .map_err(|e| RouterError::parse(format!("loop range end: {e}")))?;
    let lo = lo.round() as i64;
    let hi = hi.round() as i64;
    if lo > hi {
        return Ok(Vec::new());
    }
    Ok((lo..=hi).map(|n| Value::Number(n as f64)).collect())
}

fn interpolate_step(step: &WorkflowStep, binding: &Binding) -> RouterResult<WorkflowStep> {
    let mut out = step.clone();
    out.params = interpolate_value_map(&step.params, binding)?;
    if let Some(desc) = &step.description {
        out.description = Some(interpolate_str(desc, binding)?);
    }
    if let Some(cond) = &step.condition {
        out.condition = Some(interpolate_str(cond, binding)?);
    }
    if let Some(id) = &step.id {
        out.id = Some(interpolate_str(id, binding)?);
    }
    out.depends_on = step
        .depends_on
        .iter()
        .map(|d| interpolate_str(d, binding))
        .collect::<RouterResult<Vec<_>>>()?;
    Ok(out)
}

fn interpolate_value_map(map: &ValueMap, binding: &Binding) -> RouterResult<ValueMap> {
    let mut out = ValueMap::new();
    for (k, v) in map {
        out.insert(k.clone(), interpolate_value(v, binding)?);
    }
    Ok(out)
}

fn interpolate_value(value: &Value, binding: &Binding) -> RouterResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(interpolate_str(s, binding)?)),
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|v| interpolate_value(v, binding))
                .collect::<RouterResult<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

/// Strict `{name}` interpolation: `{{`/`}}` escape literal braces; an unresolved
/// placeholder fails the whole expansion (§4.3).
fn interpolate_str(template: &str, binding: &Binding) -> RouterResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for nc in chars.by_ref() {
                    if nc == '}' {
                        closed = true;
                        break;
                    }
                    name.push(nc);
                }
                if !closed {
                    return Err(RouterError::parse(format!("unterminated placeholder in '{template}'")));
                }
                let value = binding
                    .get(&name)
                    .ok_or_else(|| RouterError::parse(format!("unresolved interpolation placeholder {{{name}}}")))?;
                out.push_str(&value.to_string());
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{LoopClause, OnFailure};
    use std::collections::HashMap;

    fn step(tool: &str, loop_clause: Option<LoopClause>) -> WorkflowStep {
        WorkflowStep {
            tool: tool.to_string(),
            params: ValueMap::new(),
            id: None,
            description: None,
            condition: Some("{i} <= 3".to_string()),
            loop_clause,
            optional: false,
            disable_adaptation: false,
            tags: Vec::new(),
            depends_on: Vec::new(),
            timeout: None,
            max_retries: None,
            retry_delay: None,
            on_failure: OnFailure::Abort,
            priority: 0,
            extras: HashMap::new(),
        }
    }

    #[test]
    fn group_interleaving_matches_scenario_s5() {
        let clause = LoopClause {
            variable: Some("i".to_string()),
            range: Some(("1".to_string(), "3".to_string())),
            group: Some("planks".to_string()),
            ..Default::default()
        };
        let steps = vec![
            step("create", Some(clause.clone())),
            step("transform", Some(clause)),
        ];
        let ctx = EvalContext::new();
        let expanded = expand_steps(&steps, &ctx, DEFAULT_MAX_EXPANDED_STEPS).unwrap();
        let order: Vec<&str> = expanded.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(order, vec!["create", "transform", "create", "transform", "create", "transform"]);
    }

    #[test]
    fn condition_interpolates_i_before_evaluation() {
        let clause = LoopClause {
            variable: Some("i".to_string()),
            range: Some(("1".to_string(), "2".to_string())),
            ..Default::default()
        };
        let steps = vec![step("create", Some(clause))];
        let ctx = EvalContext::new();
        let expanded = expand_steps(&steps, &ctx, DEFAULT_MAX_EXPANDED_STEPS).unwrap();
        assert_eq!(expanded[0].condition.as_deref(), Some("1 <= 3"));
        assert_eq!(expanded[1].condition.as_deref(), Some("2 <= 3"));
    }

    #[test]
    fn unresolved_placeholder_fails_expansion() {
        let mut s = step("create", None);
        s.description = Some("{missing}".to_string());
        let ctx = EvalContext::new();
        assert!(expand_steps(&[s], &ctx, DEFAULT_MAX_EXPANDED_STEPS).is_err());
    }

    #[test]
    fn escaped_braces_are_literal() {
        let mut s = step("create", None);
        s.description = Some("{{literal}}".to_string());
        let ctx = EvalContext::new();
        let expanded = expand_steps(&[s], &ctx, DEFAULT_MAX_EXPANDED_STEPS).unwrap();
        assert_eq!(expanded[0].description.as_deref(), Some("{literal}"));
    }

    #[test]
    fn exceeding_max_expanded_steps_fails() {
        let clause = LoopClause {
            variable: Some("i".to_string()),
            range: Some(("1".to_string(), "10".to_string())),
            ..Default::default()
        };
        let steps = vec![step("create", Some(clause))];
        let ctx = EvalContext::new();
        assert!(expand_steps(&steps, &ctx, 3).is_err());
    }
}
