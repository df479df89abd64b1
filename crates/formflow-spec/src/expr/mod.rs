//! Sandboxed condition expressions for visibility, requiredness, and
//! workflow triggers.
//!
//! Expressions are parsed from author-supplied strings under a fixed grammar
//! that admits literals, context paths, comparisons, boolean connectives,
//! and arithmetic — nothing else. Every input is treated as adversarial:
//! call syntax, dunder identifiers, and subscripts on non-context values are
//! rejected before any evaluation takes place.

mod eval;
mod lexer;
mod parser;

pub use eval::{Context, Value};
pub use parser::{BinaryOp, Expr, Literal, Segment, UnaryOp};

use thiserror::Error;

/// Failure modes of the expression sandbox.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("disallowed construct: {0}")]
    Disallowed(String),
    #[error("unknown variable '{0}'")]
    UndefinedVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl Expr {
    /// Parses an expression string, rejecting any construct outside the
    /// allow-listed grammar before evaluation can begin.
    pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
        let tokens = lexer::tokenize(input)?;
        parser::parse(&tokens, input.len())
    }

    /// Evaluates against a read-only context, degrading evaluation errors to
    /// `false`. Runtime rule evaluation goes through this so that an
    /// author mistake downgrades a rule to "does not fire".
    pub fn truthy(&self, ctx: &Context) -> bool {
        self.evaluate(ctx)
            .map(|value| value.truthy())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(answers: serde_json::Value) -> Context {
        let mut ctx = Context::new();
        ctx.insert("answers", &answers);
        ctx
    }

    #[test]
    fn comparison_against_answer() {
        let expr = Expr::parse("answers.has_allergies == 'yes'").unwrap();
        assert!(expr.truthy(&ctx(json!({"has_allergies": "yes"}))));
        assert!(!expr.truthy(&ctx(json!({"has_allergies": "no"}))));
    }

    #[test]
    fn missing_variable_compares_false() {
        let expr = Expr::parse("answers.later_field == 'x'").unwrap();
        assert!(!expr.truthy(&ctx(json!({}))));
        // Inequality does not fire either; undefined never compares.
        let expr = Expr::parse("answers.later_field != 'x'").unwrap();
        assert!(!expr.truthy(&ctx(json!({}))));
    }

    #[test]
    fn type_mismatch_compares_false() {
        let expr = Expr::parse("answers.count > 'abc'").unwrap();
        assert!(!expr.truthy(&ctx(json!({"count": 3}))));
    }

    #[test]
    fn call_syntax_is_disallowed() {
        let err = Expr::parse("open('/etc/passwd')").unwrap_err();
        assert!(matches!(err, ExpressionError::Disallowed(_)));
    }

    #[test]
    fn dunder_identifiers_are_disallowed() {
        for input in [
            "answers.__class__",
            "__import__",
            "answers['x'].__globals__",
        ] {
            let err = Expr::parse(input).unwrap_err();
            assert!(
                matches!(err, ExpressionError::Disallowed(_)),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn membership_operators() {
        let expr = Expr::parse("answers.color in ['red', 'blue']").unwrap();
        assert!(expr.truthy(&ctx(json!({"color": "red"}))));
        assert!(!expr.truthy(&ctx(json!({"color": "green"}))));

        let expr = Expr::parse("answers.color not in ['red', 'blue']").unwrap();
        assert!(expr.truthy(&ctx(json!({"color": "green"}))));
        // Undefined membership never fires, in either direction.
        assert!(!expr.truthy(&ctx(json!({}))));
    }

    #[test]
    fn arithmetic_and_grouping() {
        let expr = Expr::parse("(answers.a + answers.b) * 2 == 10").unwrap();
        assert!(expr.truthy(&ctx(json!({"a": 2, "b": 3}))));
    }

    #[test]
    fn subscript_access() {
        let expr = Expr::parse("answers['priority'] == 'High'").unwrap();
        assert!(expr.truthy(&ctx(json!({"priority": "High"}))));
    }
}
