//! Authoring-time checks for condition expressions.
//!
//! At runtime a broken condition silently degrades to "does not fire"; this
//! module surfaces the same problems as configuration errors while a schema
//! or workflow is being authored.

use crate::expr::{Expr, ExpressionError};
use crate::spec::{FormVersion, Section, Workflow};

/// A condition that would never fire, attributed to where it is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionIssue {
    pub path: String,
    pub error: ExpressionError,
}

const VERSION_ROOTS: [&str; 3] = ["answers", "user", "now"];
const WORKFLOW_ROOTS: [&str; 3] = ["response", "form_id", "response_id"];

/// Lints every condition of a schema version: parse failures, unknown
/// context roots, and `answers.*` references to question names that do not
/// exist anywhere in the version.
pub fn lint_version(version: &FormVersion) -> Vec<ConditionIssue> {
    let mut names = Vec::new();
    for section in &version.sections {
        collect_names(section, &mut names);
    }

    let mut issues = Vec::new();
    for section in &version.sections {
        lint_section(section, "", &names, &mut issues);
    }
    for rule in &version.rules {
        lint_condition(
            &rule.expression,
            &format!("rules/{}", rule.name),
            &VERSION_ROOTS,
            Some(&names),
            &mut issues,
        );
    }
    issues
}

/// Lints a workflow's trigger condition against the `response` context it
/// will be evaluated in.
pub fn lint_workflow(workflow: &Workflow) -> Vec<ConditionIssue> {
    let mut issues = Vec::new();
    if let Some(condition) = &workflow.trigger_condition {
        lint_condition(
            condition,
            &format!("workflows/{}", workflow.id),
            &WORKFLOW_ROOTS,
            None,
            &mut issues,
        );
    }
    issues
}

fn collect_names(section: &Section, names: &mut Vec<String>) {
    for question in &section.questions {
        names.push(question.name.clone());
    }
    for child in &section.sections {
        collect_names(child, names);
    }
}

fn lint_section(
    section: &Section,
    path_prefix: &str,
    names: &[String],
    issues: &mut Vec<ConditionIssue>,
) {
    let path = format!("{path_prefix}{}", section.name);
    if let Some(condition) = &section.visible_if {
        lint_condition(condition, &path, &VERSION_ROOTS, Some(names), issues);
    }
    for question in &section.questions {
        let question_path = format!("{path}/{}", question.name);
        if let Some(condition) = &question.visible_if {
            lint_condition(condition, &question_path, &VERSION_ROOTS, Some(names), issues);
        }
        if let Some(condition) = &question.required_if {
            lint_condition(condition, &question_path, &VERSION_ROOTS, Some(names), issues);
        }
    }
    for child in &section.sections {
        lint_section(child, &format!("{path}/"), names, issues);
    }
}

fn lint_condition(
    source: &str,
    path: &str,
    roots: &[&str],
    question_names: Option<&[String]>,
    issues: &mut Vec<ConditionIssue>,
) {
    let expr = match Expr::parse(source) {
        Ok(expr) => expr,
        Err(error) => {
            issues.push(ConditionIssue {
                path: path.to_string(),
                error,
            });
            return;
        }
    };

    for reference in expr.referenced_paths() {
        let Some(root) = reference.first() else {
            continue;
        };
        if !roots.contains(&root.as_str()) {
            issues.push(ConditionIssue {
                path: path.to_string(),
                error: ExpressionError::UndefinedVariable(root.clone()),
            });
            continue;
        }
        if root == "answers"
            && let Some(names) = question_names
            && let Some(answer) = reference.get(1)
            && !names.iter().any(|name| name == answer)
        {
            issues.push(ConditionIssue {
                path: path.to_string(),
                error: ExpressionError::UndefinedVariable(format!("answers.{answer}")),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FieldType, Question};
    use chrono::Utc;

    fn question(name: &str) -> Question {
        Question {
            name: name.into(),
            title: name.into(),
            description: None,
            kind: FieldType::Text,
            required: false,
            required_if: None,
            visible_if: None,
            constraint: None,
            choices: vec![],
            meta_data: None,
        }
    }

    fn version(sections: Vec<Section>) -> FormVersion {
        FormVersion {
            tag: "v1".into(),
            created_at: Utc::now(),
            published_at: None,
            sections,
            rules: vec![],
        }
    }

    #[test]
    fn reports_unknown_answer_references() {
        let mut gated = question("details");
        gated.visible_if = Some("answers.nonexistent == 'yes'".into());
        let version = version(vec![Section {
            name: "main".into(),
            title: "Main".into(),
            description: None,
            visible_if: None,
            repeat: None,
            questions: vec![question("known"), gated],
            sections: vec![],
        }]);

        let issues = lint_version(&version);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "main/details");
        assert_eq!(
            issues[0].error,
            ExpressionError::UndefinedVariable("answers.nonexistent".into())
        );
    }

    #[test]
    fn reports_syntax_errors_with_location() {
        let mut bad = question("q");
        bad.visible_if = Some("answers.x ==".into());
        let version = version(vec![Section {
            name: "main".into(),
            title: "Main".into(),
            description: None,
            visible_if: None,
            repeat: None,
            questions: vec![bad],
            sections: vec![],
        }]);

        let issues = lint_version(&version);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].error, ExpressionError::Syntax { .. }));
    }
}
