use std::collections::BTreeMap;

use super::ExpressionError;
use super::parser::{BinaryOp, Expr, Literal, Segment, UnaryOp};

/// Runtime value produced by expression evaluation.
///
/// `Undefined` is the typed sentinel for anything the context does not
/// contain; every comparison involving it yields `false`, so a reference to
/// a not-yet-collected answer degrades a rule instead of failing it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(number) => {
                number.as_f64().map(Value::Number).unwrap_or(Value::Undefined)
            }
            serde_json::Value::String(text) => Value::Str(text.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => *number != 0.0,
            Value::Str(text) => !text.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Read-only mapping the sandbox resolves paths into. Evaluation can reach
/// nothing outside of it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    roots: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn insert(&mut self, name: &str, value: &serde_json::Value) {
        self.roots.insert(name.to_string(), Value::from_json(value));
    }

    pub fn insert_value(&mut self, name: &str, value: Value) {
        self.roots.insert(name.to_string(), value);
    }

    pub fn root(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }
}

impl Expr {
    /// Walks the tree against the context. Pure: no partial execution and no
    /// effect beyond computing the result.
    pub fn evaluate(&self, ctx: &Context) -> Result<Value, ExpressionError> {
        match self {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(flag) => Value::Bool(*flag),
                Literal::Number(number) => Value::Number(*number),
                Literal::Str(text) => Value::Str(text.clone()),
            }),
            Expr::Path { segments } => resolve_path(segments, ctx),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.evaluate(ctx)?);
                }
                Ok(Value::List(values))
            }
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Number(number) => Ok(Value::Number(-number)),
                        other => Err(ExpressionError::TypeMismatch(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                apply_binary(*op, left, right)
            }
        }
    }
}

fn resolve_path(segments: &[Segment], ctx: &Context) -> Result<Value, ExpressionError> {
    let mut current: Option<Value> = None;
    for segment in segments {
        let next = match segment {
            Segment::Key(key) => match &current {
                None => ctx.root(key).cloned().unwrap_or(Value::Undefined),
                Some(Value::Map(entries)) => {
                    entries.get(key).cloned().unwrap_or(Value::Undefined)
                }
                Some(_) => Value::Undefined,
            },
            Segment::Index(index) => {
                let index = index.evaluate(ctx)?;
                match (&current, index) {
                    (Some(Value::Map(entries)), Value::Str(key)) => {
                        entries.get(&key).cloned().unwrap_or(Value::Undefined)
                    }
                    (Some(Value::List(items)), Value::Number(position)) => {
                        if position.fract() == 0.0 && position >= 0.0 {
                            items
                                .get(position as usize)
                                .cloned()
                                .unwrap_or(Value::Undefined)
                        } else {
                            Value::Undefined
                        }
                    }
                    _ => Value::Undefined,
                }
            }
        };
        current = Some(next);
    }
    Ok(current.unwrap_or(Value::Undefined))
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::And => Ok(Value::Bool(left.truthy() && right.truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.truthy() || right.truthy())),
        BinaryOp::Eq => Ok(Value::Bool(compare_eq(&left, &right) == Some(true))),
        BinaryOp::Ne => Ok(Value::Bool(compare_eq(&left, &right) == Some(false))),
        BinaryOp::Lt => Ok(Value::Bool(compare_ord(&left, &right)
            .map(|ordering| ordering == std::cmp::Ordering::Less)
            .unwrap_or(false))),
        BinaryOp::Le => Ok(Value::Bool(compare_ord(&left, &right)
            .map(|ordering| ordering != std::cmp::Ordering::Greater)
            .unwrap_or(false))),
        BinaryOp::Gt => Ok(Value::Bool(compare_ord(&left, &right)
            .map(|ordering| ordering == std::cmp::Ordering::Greater)
            .unwrap_or(false))),
        BinaryOp::Ge => Ok(Value::Bool(compare_ord(&left, &right)
            .map(|ordering| ordering != std::cmp::Ordering::Less)
            .unwrap_or(false))),
        BinaryOp::In => Ok(Value::Bool(membership(&left, &right) == Some(true))),
        BinaryOp::NotIn => Ok(Value::Bool(membership(&left, &right) == Some(false))),
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => Err(type_error("+", &left, &right)),
        },
        BinaryOp::Sub => numeric(op, &left, &right).map(|(a, b)| Value::Number(a - b)),
        BinaryOp::Mul => numeric(op, &left, &right).map(|(a, b)| Value::Number(a * b)),
        BinaryOp::Div => {
            let (a, b) = numeric(op, &left, &right)?;
            if b == 0.0 {
                return Err(ExpressionError::TypeMismatch("division by zero".into()));
            }
            Ok(Value::Number(a / b))
        }
        BinaryOp::Rem => {
            let (a, b) = numeric(op, &left, &right)?;
            if b == 0.0 {
                return Err(ExpressionError::TypeMismatch("division by zero".into()));
            }
            Ok(Value::Number(a % b))
        }
    }
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64), ExpressionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(type_error(op_symbol(op), left, right)),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        _ => "?",
    }
}

fn type_error(symbol: &str, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch(format!(
        "cannot apply '{symbol}' to {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

/// `Some(true/false)` for comparable operands, `None` when either side is
/// undefined or the types mismatch. Callers fold `None` into `false` so the
/// comparison never fires either way.
fn compare_eq(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Undefined, _) | (_, Value::Undefined) => None,
        (Value::Null, Value::Null) => Some(true),
        (Value::Bool(a), Value::Bool(b)) => Some(a == b),
        (Value::Number(a), Value::Number(b)) => Some(a == b),
        (Value::Str(a), Value::Str(b)) => Some(a == b),
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            let mut all = true;
            for (x, y) in a.iter().zip(b.iter()) {
                match compare_eq(x, y) {
                    Some(true) => {}
                    Some(false) => all = false,
                    None => return None,
                }
            }
            Some(all)
        }
        _ => None,
    }
}

fn compare_ord(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        // Lexicographic ordering; ISO-8601 date/time strings order correctly.
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn membership(needle: &Value, haystack: &Value) -> Option<bool> {
    if matches!(needle, Value::Undefined) {
        return None;
    }
    match haystack {
        Value::List(items) => {
            for item in items {
                if compare_eq(needle, item) == Some(true) {
                    return Some(true);
                }
            }
            Some(false)
        }
        Value::Str(text) => match needle {
            Value::Str(part) => Some(text.contains(part.as_str())),
            _ => None,
        },
        Value::Map(entries) => match needle {
            Value::Str(key) => Some(entries.contains_key(key)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::Expr;
    use super::*;
    use serde_json::json;

    fn ctx(value: serde_json::Value) -> Context {
        let mut ctx = Context::new();
        ctx.insert("answers", &value);
        ctx
    }

    #[test]
    fn undefined_is_not_equal_and_not_unequal() {
        let ctx = ctx(json!({}));
        let eq = Expr::parse("answers.x == 1").unwrap();
        let ne = Expr::parse("answers.x != 1").unwrap();
        assert_eq!(eq.evaluate(&ctx).unwrap(), Value::Bool(false));
        assert_eq!(ne.evaluate(&ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn iso_dates_order_as_strings() {
        let ctx = ctx(json!({"check_in": "2024-03-10", "check_out": "2024-03-05"}));
        let expr = Expr::parse("answers.check_in < answers.check_out").unwrap();
        assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn division_by_zero_is_a_type_error() {
        let expr = Expr::parse("1 / 0").unwrap();
        assert!(matches!(
            expr.evaluate(&Context::new()),
            Err(super::super::ExpressionError::TypeMismatch(_))
        ));
        assert!(!expr.truthy(&Context::new()));
    }

    #[test]
    fn string_concatenation() {
        let expr = Expr::parse("'a' + 'b' == 'ab'").unwrap();
        assert_eq!(expr.evaluate(&Context::new()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn arithmetic_on_missing_answers_degrades() {
        let expr = Expr::parse("answers.a + 1 > 0").unwrap();
        assert!(!expr.truthy(&ctx(json!({}))));
    }

    #[test]
    fn nested_subscripts_resolve_into_context_only() {
        let ctx = ctx(json!({"items": [{"name": "first"}]}));
        let expr = Expr::parse("answers.items[0].name == 'first'").unwrap();
        assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Bool(true));
    }
}
