//! The shared safe expression/condition evaluator (SPEC_FULL.md §4.1). Tree-walking
//! interpreter over the AST produced by `eval::parser`; no dynamic dispatch back into
//! host code, no attribute/subscript access — only the whitelisted node kinds and
//! call names ever execute.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::context::EvalContext;
use super::parser::parse;
use crate::error::RouterError;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

const WHITELISTED_CALLS: &[&str] = &[
    "abs", "min", "max", "round", "trunc", "floor", "ceil", "sqrt", "pow", "exp", "log", "log10",
    "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "degrees", "radians", "hypot",
];

pub struct Evaluator<'a> {
    ctx: &'a EvalContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a EvalContext) -> Self {
        Self { ctx }
    }

    pub fn evaluate(&self, expr: &str) -> Result<Value, RouterError> {
        let ast = parse(expr.trim()).map_err(RouterError::parse)?;
        self.eval_node(&ast)
    }

    pub fn evaluate_as_bool(&self, expr: &str) -> Result<bool, RouterError> {
        let v = self.evaluate(expr)?;
        Ok(v.is_truthy())
    }

    pub fn evaluate_as_float(&self, expr: &str) -> Result<f64, RouterError> {
        let v = self.evaluate(expr)?;
        match v {
            Value::Number(n) => Ok(n),
            other => Ok(if other.is_truthy() { 1.0 } else { 0.0 }),
        }
    }

    pub fn evaluate_safe(&self, expr: &str, default: Value) -> Value {
        self.evaluate(expr).unwrap_or(default)
    }

    fn eval_node(&self, expr: &Expr) -> Result<Value, RouterError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Name(name) => self
                .ctx
                .get(name)
                .cloned()
                .ok_or_else(|| RouterError::runtime(format!("unknown name '{name}'"))),
            Expr::Unary(op, inner) => self.eval_unary(op, inner),
            Expr::Binary(op, l, r) => self.eval_binary(op, l, r),
            Expr::Chain(first, rest) => self.eval_chain(first, rest),
            Expr::Ternary { body, cond, orelse } => {
                if self.eval_node(cond)?.is_truthy() {
                    self.eval_node(body)
                } else {
                    self.eval_node(orelse)
                }
            }
            Expr::Call(name, args) => self.eval_call(name, args),
        }
    }

    fn eval_unary(&self, op: &UnaryOp, inner: &Expr) -> Result<Value, RouterError> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!self.eval_node(inner)?.is_truthy())),
            UnaryOp::Neg => Ok(Value::Number(-self.as_number(inner)?)),
            UnaryOp::Pos => Ok(Value::Number(self.as_number(inner)?)),
        }
    }

    fn as_number(&self, expr: &Expr) -> Result<f64, RouterError> {
        match self.eval_node(expr)? {
            Value::Number(n) => Ok(n),
            Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
            other => Err(RouterError::runtime(format!("expected a number, got '{other}'"))),
        }
    }

    fn eval_binary(&self, op: &BinaryOp, l: &Expr, r: &Expr) -> Result<Value, RouterError> {
        match op {
            BinaryOp::And => {
                let lv = self.eval_node(l)?;
                if !lv.is_truthy() {
                    return Ok(lv);
                }
                self.eval_node(r)
            }
            BinaryOp::Or => {
                let lv = self.eval_node(l)?;
                if lv.is_truthy() {
                    return Ok(lv);
                }
                self.eval_node(r)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv
            | BinaryOp::Mod | BinaryOp::Pow => self.eval_arith(op, l, r),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
                let lv = self.eval_node(l)?;
                let rv = self.eval_node(r)?;
                Ok(Value::Bool(compare(op, &lv, &rv)?))
            }
        }
    }

    fn eval_arith(&self, op: &BinaryOp, l: &Expr, r: &Expr) -> Result<Value, RouterError> {
        let lv = self.as_number(l)?;
        let rv = self.as_number(r)?;
        let result = match op {
            BinaryOp::Add => lv + rv,
            BinaryOp::Sub => lv - rv,
            BinaryOp::Mul => lv * rv,
            BinaryOp::Div => {
                if rv == 0.0 {
                    return Err(RouterError::runtime("division by zero"));
                }
                lv / rv
            }
            BinaryOp::FloorDiv => {
                if rv == 0.0 {
                    return Err(RouterError::runtime("division by zero"));
                }
                (lv / rv).floor()
            }
            BinaryOp::Mod => {
                if rv == 0.0 {
                    return Err(RouterError::runtime("division by zero"));
                }
                lv.rem_euclid(rv)
            }
            BinaryOp::Pow => lv.powf(rv),
            _ => unreachable!(),
        };
        Ok(Value::Number(result))
    }

    fn eval_chain(&self, first: &Expr, rest: &[(BinaryOp, Expr)]) -> Result<Value, RouterError> {
        let mut prev = self.eval_node(first)?;
        for (op, expr) in rest {
            let next = self.eval_node(expr)?;
            if !compare(op, &prev, &next)? {
                return Ok(Value::Bool(false));
            }
            prev = next;
        }
        Ok(Value::Bool(true))
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<Value, RouterError> {
        if !WHITELISTED_CALLS.contains(&name) {
            return Err(RouterError::runtime(format!("call to '{name}' is not whitelisted")));
        }
        let values: Result<Vec<f64>, RouterError> = args.iter().map(|a| self.as_number(a)).collect();
        let values = values?;
        let result = match name {
            "abs" => values.first().copied().unwrap_or(0.0).abs(),
            "min" => values.into_iter().fold(f64::INFINITY, f64::min),
            "max" => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            "round" => values.first().copied().unwrap_or(0.0).round(),
            "trunc" => values.first().copied().unwrap_or(0.0).trunc(),
            "floor" => values.first().copied().unwrap_or(0.0).floor(),
            "ceil" => values.first().copied().unwrap_or(0.0).ceil(),
            "sqrt" => values.first().copied().unwrap_or(0.0).sqrt(),
            "pow" => values.first().copied().unwrap_or(0.0).powf(values.get(1).copied().unwrap_or(0.0)),
            "exp" => values.first().copied().unwrap_or(0.0).exp(),
            "log" => values.first().copied().unwrap_or(0.0).ln(),
            "log10" => values.first().copied().unwrap_or(0.0).log10(),
            "sin" => values.first().copied().unwrap_or(0.0).sin(),
            "cos" => values.first().copied().unwrap_or(0.0).cos(),
            "tan" => values.first().copied().unwrap_or(0.0).tan(),
            "asin" => values.first().copied().unwrap_or(0.0).asin(),
            "acos" => values.first().copied().unwrap_or(0.0).acos(),
            "atan" => values.first().copied().unwrap_or(0.0).atan(),
            "atan2" => values.first().copied().unwrap_or(0.0).atan2(values.get(1).copied().unwrap_or(0.0)),
            "degrees" => values.first().copied().unwrap_or(0.0).to_degrees(),
            "radians" => values.first().copied().unwrap_or(0.0).to_radians(),
            "hypot" => values.first().copied().unwrap_or(0.0).hypot(values.get(1).copied().unwrap_or(0.0)),
            _ => unreachable!(),
        };
        Ok(Value::Number(result))
    }
}

fn compare(op: &BinaryOp, l: &Value, r: &Value) -> Result<bool, RouterError> {
    use std::cmp::Ordering;
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match op {
        BinaryOp::Eq => Ok(values_equal(l, r)),
        BinaryOp::Ne => Ok(!values_equal(l, r)),
        _ => {
            let ord = ordering.ok_or_else(|| {
                RouterError::runtime("cannot compare values of different/unsupported types")
            })?;
            Ok(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            })
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// Condition wrapper: fail-open over the boolean evaluator (§4.1). Returns `true`
/// when the expression is empty, unparsable, or refers to an unknown name — except
/// the `not <unknown>` pattern, which evaluates the unknown name as true and negates.
pub fn evaluate_condition(ctx: &EvalContext, expr: Option<&str>) -> bool {
    let Some(expr) = expr else { return true };
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return true;
    }
    let evaluator = Evaluator::new(ctx);
    match evaluator.evaluate_as_bool(trimmed) {
        Ok(b) => b,
        Err(_) => {
            if let Some(rest) = trimmed.strip_prefix("not ") {
                // `not <unknown>` must evaluate `unknown` as true, then negate to false.
                if evaluator.evaluate(rest.trim()).is_err() {
                    return false;
                }
            }
            true
        }
    }
}

/// Topologically sorts and evaluates `computed` parameters, failing on cycles or
/// undeclared dependencies (§4.1, §9 "dependency graph").
pub fn resolve_computed_parameters(
    ctx: &mut EvalContext,
    computed: &[(String, String, Vec<String>)],
) -> Result<(), RouterError> {
    let names: HashSet<&str> = computed.iter().map(|(n, _, _)| n.as_str()).collect();
    let by_name: HashMap<&str, &(String, String, Vec<String>)> =
        computed.iter().map(|c| (c.0.as_str(), c)).collect();

    // Kahn's algorithm with an explicit arena-free adjacency via the `by_name` map.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, _, deps) in computed {
        in_degree.entry(name.as_str()).or_insert(0);
        for dep in deps {
            if names.contains(dep.as_str()) {
                *in_degree.entry(name.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            } else if !ctx.contains(dep) {
                return Err(RouterError::validation(format!(
                    "computed parameter '{name}' depends on undeclared name '{dep}'"
                )));
            }
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&n, _)| n)
        .collect();
    queue.sort();
    let mut visited = 0usize;
    let mut order = Vec::new();
    while let Some(node) = queue.pop() {
        order.push(node);
        visited += 1;
        if let Some(deps) = dependents.get(node) {
            let mut newly_ready = Vec::new();
            for &d in deps {
                let e = in_degree.get_mut(d).unwrap();
                *e -= 1;
                if *e == 0 {
                    newly_ready.push(d);
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }
    }

    if visited != computed.len() {
        return Err(RouterError::validation(
            "cyclic dependency among computed parameters".to_string(),
        ));
    }

    for name in order {
        let (_, expr, _) = by_name[name];
        let value = Evaluator::new(ctx).evaluate(expr)?;
        ctx.set_value(name.to_string(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(pairs: &[(&str, f64)]) -> EvalContext {
        let mut ctx = EvalContext::new();
        for (k, v) in pairs {
            ctx.set(*k, *v);
        }
        ctx
    }

    #[test]
    fn evaluates_arithmetic() {
        let ctx = EvalContext::new();
        let e = Evaluator::new(&ctx);
        assert_eq!(e.evaluate("1 + 2 * 3").unwrap(), Value::Number(7.0));
        assert_eq!(e.evaluate("2 ** 3 ** 2").unwrap(), Value::Number(512.0));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let ctx = EvalContext::new();
        let e = Evaluator::new(&ctx);
        assert!(e.evaluate("1 / 0").is_err());
    }

    #[test]
    fn unknown_name_fails_evaluate_but_defaults_via_safe() {
        let ctx = EvalContext::new();
        let e = Evaluator::new(&ctx);
        assert!(e.evaluate("missing").is_err());
        assert_eq!(e.evaluate_safe("missing", Value::Number(42.0)), Value::Number(42.0));
    }

    #[test]
    fn chained_comparison() {
        let ctx = ctx_with(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let e = Evaluator::new(&ctx);
        assert!(e.evaluate_as_bool("a < b < c").unwrap());
        assert!(!e.evaluate_as_bool("a < b < 0").unwrap());
    }

    #[test]
    fn ternary_selects_branch() {
        let ctx = ctx_with(&[("x", 5.0)]);
        let e = Evaluator::new(&ctx);
        assert_eq!(e.evaluate("1 if x > 0 else -1").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn whitelisted_calls_work_and_others_are_rejected() {
        let ctx = EvalContext::new();
        let e = Evaluator::new(&ctx);
        assert_eq!(e.evaluate("ceil(2.1)").unwrap(), Value::Number(3.0));
        assert!(e.evaluate("eval('1')").is_err());
    }

    #[test]
    fn condition_is_fail_open_for_unparsable_and_unknown() {
        let ctx = EvalContext::new();
        assert!(evaluate_condition(&ctx, Some("")));
        assert!(evaluate_condition(&ctx, None));
        assert!(evaluate_condition(&ctx, Some("((broken")));
        assert!(evaluate_condition(&ctx, Some("unknown_flag")));
    }

    #[test]
    fn condition_not_unknown_negates_to_false() {
        let ctx = EvalContext::new();
        assert!(!evaluate_condition(&ctx, Some("not unknown_flag")));
    }

    #[test]
    fn condition_never_panics_across_many_inputs() {
        let ctx = ctx_with(&[("x", 1.0)]);
        for expr in ["", "x > 0", "1/0", "x and", "not x", "x < y < z", "((("] {
            // Must return a bool, never panic or raise.
            let _ = evaluate_condition(&ctx, Some(expr));
        }
    }

    #[test]
    fn computed_parameters_resolve_in_dependency_order() {
        let mut ctx = EvalContext::new();
        ctx.set("table_width", 0.83);
        ctx.set("plank_max_width", 0.10);
        let computed = vec![
            (
                "plank_count".to_string(),
                "ceil(table_width / plank_max_width)".to_string(),
                vec!["table_width".to_string(), "plank_max_width".to_string()],
            ),
            (
                "plank_actual_width".to_string(),
                "table_width / plank_count".to_string(),
                vec!["table_width".to_string(), "plank_count".to_string()],
            ),
        ];
        resolve_computed_parameters(&mut ctx, &computed).unwrap();
        assert_eq!(ctx.get("plank_count"), Some(&Value::Number(9.0)));
        let actual = ctx.get("plank_actual_width").unwrap().as_f64().unwrap();
        assert!((actual - 0.0922).abs() < 1e-3);
    }

    #[test]
    fn cyclic_computed_parameters_are_rejected() {
        let mut ctx = EvalContext::new();
        let computed = vec![
            ("a".to_string(), "b + 1".to_string(), vec!["b".to_string()]),
            ("b".to_string(), "a + 1".to_string(), vec!["a".to_string()]),
        ];
        assert!(resolve_computed_parameters(&mut ctx, &computed).is_err());
    }
}
