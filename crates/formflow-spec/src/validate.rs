use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSetBuilder};
use regex::Regex;
use serde_json::{Map, Value};

use crate::answers::{IssueCode, Mode, ValidationError, ValidationIssue};
use crate::expr::{Context, Expr, Value as ExprValue};
use crate::spec::{FieldMeta, FieldType, FormVersion, Question, Section};
use crate::visibility::VisibilityMap;

/// Known constants seeded into every evaluation context alongside the
/// answers collected so far.
#[derive(Debug, Clone)]
pub struct Constants {
    pub user: Value,
    pub now: DateTime<Utc>,
}

impl Constants {
    pub fn new(user: Value, now: DateTime<Utc>) -> Constants {
        Constants { user, now }
    }

    pub fn anonymous(now: DateTime<Utc>) -> Constants {
        Constants { user: Value::Null, now }
    }
}

/// Outcome of a successful validation pass: the hidden-field-stripped
/// payload plus the visibility decisions made along the way.
#[derive(Debug, Clone)]
pub struct Validated {
    pub cleaned: Map<String, Value>,
    pub visibility: VisibilityMap,
}

/// Validates `payload` against an immutable schema version.
///
/// A single top-down pass in document order: each section's and question's
/// visibility is decided against the answers collected so far, hidden
/// subtrees are dropped from the output without being validated, and the
/// remaining answers are checked per field type. Final mode additionally
/// enforces requiredness, constraints, repeat bounds, and global rules.
pub fn validate(
    version: &FormVersion,
    payload: &Value,
    mode: Mode,
    constants: &Constants,
) -> Result<Validated, ValidationError> {
    let survey = survey(version, payload, mode, constants);
    if survey.issues.is_empty() {
        Ok(Validated {
            cleaned: survey.cleaned,
            visibility: survey.visibility,
        })
    } else {
        Err(ValidationError {
            issues: survey.issues,
        })
    }
}

/// Full walk output, shared by [`validate`], visibility resolution, and
/// progress counting. Never fails; issues are collected, not raised.
pub(crate) struct Survey {
    pub cleaned: Map<String, Value>,
    pub visibility: VisibilityMap,
    pub issues: Vec<ValidationIssue>,
    pub answered: usize,
    pub total: usize,
}

pub(crate) fn survey(
    version: &FormVersion,
    payload: &Value,
    mode: Mode,
    constants: &Constants,
) -> Survey {
    let empty = Map::new();
    let root = payload.as_object().unwrap_or(&empty);

    let mut walker = Walker {
        mode,
        constants,
        answers: BTreeMap::new(),
        visibility: VisibilityMap::new(),
        issues: Vec::new(),
        answered: 0,
        total: 0,
    };

    let mut cleaned = Map::new();
    for section in &version.sections {
        walker.walk_section(section, root, "", &mut cleaned);
    }

    if mode == Mode::Final {
        walker.check_global_rules(version);
    }

    Survey {
        cleaned,
        visibility: walker.visibility,
        issues: walker.issues,
        answered: walker.answered,
        total: walker.total,
    }
}

struct Walker<'a> {
    mode: Mode,
    constants: &'a Constants,
    /// Flat answer-name context, folded progressively in document order so
    /// later conditions can reference earlier answers. Forward references
    /// are simply absent and resolve to undefined.
    answers: BTreeMap<String, ExprValue>,
    visibility: VisibilityMap,
    issues: Vec<ValidationIssue>,
    answered: usize,
    total: usize,
}

impl Walker<'_> {
    fn context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.insert("user", &self.constants.user);
        ctx.insert_value("now", ExprValue::Str(self.constants.now.to_rfc3339()));
        ctx.insert_value("answers", ExprValue::Map(self.answers.clone()));
        ctx
    }

    /// Evaluates an optional condition. Absent conditions yield `default`;
    /// parse and evaluation failures degrade to `false` so a broken rule
    /// never fires.
    fn condition_true(&self, source: Option<&str>, default: bool) -> bool {
        match source {
            None => default,
            Some(source) => match Expr::parse(source) {
                Ok(expr) => expr.truthy(&self.context()),
                Err(_) => false,
            },
        }
    }

    fn walk_section(
        &mut self,
        section: &Section,
        parent: &Map<String, Value>,
        path_prefix: &str,
        out: &mut Map<String, Value>,
    ) {
        let path = format!("{path_prefix}{}", section.name);
        let visible = self.condition_true(section.visible_if.as_deref(), true);
        self.visibility.insert(path.clone(), visible);
        if !visible {
            // Everything submitted under a hidden section is dropped without
            // validation, including its descendants.
            return;
        }

        let submitted = parent.get(&section.name);
        if let Some(repeat) = &section.repeat {
            let instances: &[Value] = match submitted {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    self.issues.push(ValidationIssue::new(
                        &path,
                        IssueCode::TypeMismatch,
                        "expected a list of section instances",
                    ));
                    &[]
                }
                None => &[],
            };

            if self.mode == Mode::Final {
                if instances.len() < repeat.min {
                    self.issues.push(ValidationIssue::new(
                        &path,
                        IssueCode::MissingRequired,
                        format!("at least {} instance(s) required", repeat.min),
                    ));
                }
                if let Some(max) = repeat.max
                    && instances.len() > max
                {
                    self.issues.push(ValidationIssue::new(
                        &path,
                        IssueCode::TooManyInstances,
                        format!("at most {max} instance(s) allowed"),
                    ));
                }
            }

            let mut cleaned_instances = Vec::with_capacity(instances.len());
            for (index, instance) in instances.iter().enumerate() {
                let instance_path = format!("{path}[{index}]/");
                let instance_map = match instance.as_object() {
                    Some(map) => map.clone(),
                    None => {
                        self.issues.push(ValidationIssue::new(
                            format!("{path}[{index}]"),
                            IssueCode::TypeMismatch,
                            "expected an object",
                        ));
                        Map::new()
                    }
                };
                // Instance answers shadow outer ones for conditions inside
                // the instance, and are discarded afterwards: repeated
                // answers are not addressable by later sibling conditions.
                let saved = self.answers.clone();
                let mut cleaned = Map::new();
                self.walk_body(section, &instance_map, &instance_path, &mut cleaned);
                self.answers = saved;
                cleaned_instances.push(Value::Object(cleaned));
            }
            if submitted.is_some() {
                out.insert(section.name.clone(), Value::Array(cleaned_instances));
            }
        } else {
            let own = match submitted {
                Some(Value::Object(map)) => Some(map.clone()),
                Some(Value::Null) | None => None,
                Some(_) => {
                    self.issues.push(ValidationIssue::new(
                        &path,
                        IssueCode::TypeMismatch,
                        "expected an object",
                    ));
                    None
                }
            };
            let body = own.clone().unwrap_or_default();
            let mut cleaned = Map::new();
            self.walk_body(section, &body, &format!("{path}/"), &mut cleaned);
            if own.is_some() || !cleaned.is_empty() {
                out.insert(section.name.clone(), Value::Object(cleaned));
            }
        }
    }

    fn walk_body(
        &mut self,
        section: &Section,
        data: &Map<String, Value>,
        path_prefix: &str,
        out: &mut Map<String, Value>,
    ) {
        for question in &section.questions {
            self.walk_question(question, data, path_prefix, out);
        }
        for child in &section.sections {
            self.walk_section(child, data, path_prefix, out);
        }
    }

    fn walk_question(
        &mut self,
        question: &Question,
        data: &Map<String, Value>,
        path_prefix: &str,
        out: &mut Map<String, Value>,
    ) {
        let path = format!("{path_prefix}{}", question.name);
        let visible = self.condition_true(question.visible_if.as_deref(), true);
        self.visibility.insert(path.clone(), visible);
        if !visible {
            return;
        }
        if question.kind == FieldType::Image {
            // Presentational element; any submitted value is stripped.
            return;
        }

        self.total += 1;
        let value = data.get(&question.name);
        if is_empty(value) {
            if self.mode == Mode::Final {
                let required = match question.required_if.as_deref() {
                    Some(condition) => self.condition_true(Some(condition), false),
                    None => question.required,
                };
                if required {
                    self.issues.push(ValidationIssue::new(
                        &path,
                        IssueCode::MissingRequired,
                        "an answer is required",
                    ));
                }
            }
            return;
        }

        let value = value.unwrap_or(&Value::Null);
        self.answered += 1;
        self.validate_value(question, value, &path);
        out.insert(question.name.clone(), value.clone());
        self.answers
            .insert(question.name.clone(), ExprValue::from_json(value));
    }

    fn validate_value(&mut self, question: &Question, value: &Value, path: &str) {
        let final_mode = self.mode == Mode::Final;
        match question.kind {
            FieldType::Text => {
                let Some(text) = value.as_str() else {
                    return self.type_issue(path, "expected a string");
                };
                if final_mode && let Some(constraint) = &question.constraint {
                    self.check_text_constraint(text, constraint, path);
                }
            }
            FieldType::Number => {
                let Some(number) = value.as_f64() else {
                    return self.type_issue(path, "expected a number");
                };
                if final_mode && let Some(constraint) = &question.constraint {
                    self.check_number_constraint(number, constraint, path);
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    self.type_issue(path, "expected a boolean");
                }
            }
            FieldType::Date => {
                let parsed = value
                    .as_str()
                    .and_then(|text| chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok());
                if parsed.is_none() {
                    self.type_issue(path, "expected an ISO-8601 date (YYYY-MM-DD)");
                }
            }
            FieldType::Choice => {
                let Some(text) = value.as_str() else {
                    return self.type_issue(path, "expected a string");
                };
                if final_mode && !question.choices.is_empty() && !question.has_choice(text) {
                    self.issues.push(ValidationIssue::new(
                        path,
                        IssueCode::InvalidOption,
                        format!("'{text}' is not an available option"),
                    ));
                }
            }
            FieldType::MultiChoice => {
                let Some(items) = value.as_array() else {
                    return self.type_issue(path, "expected a list of selections");
                };
                let mut selections = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(text) => selections.push(text),
                        None => return self.type_issue(path, "expected string selections"),
                    }
                }
                if final_mode && !question.choices.is_empty() {
                    for selection in &selections {
                        if !question.has_choice(selection) {
                            self.issues.push(ValidationIssue::new(
                                path,
                                IssueCode::InvalidOption,
                                format!("'{selection}' is not an available option"),
                            ));
                        }
                    }
                    if selections.len() > question.choices.len() {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Cardinality,
                            "more selections than available options",
                        ));
                    }
                }
            }
            FieldType::Rating => {
                let Some(number) = value.as_f64() else {
                    return self.type_issue(path, "expected a rating number");
                };
                if number.fract() != 0.0 {
                    return self.type_issue(path, "expected a whole-number rating");
                }
                if final_mode
                    && let Some(FieldMeta::Rating(meta)) = question.meta()
                {
                    if number < 1.0 {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Min,
                            "rating below 1",
                        ));
                    } else if number > f64::from(meta.max_stars) {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Max,
                            format!("rating above {}", meta.max_stars),
                        ));
                    }
                }
            }
            FieldType::Slider => {
                let Some(number) = value.as_f64() else {
                    return self.type_issue(path, "expected a number");
                };
                if final_mode
                    && let Some(FieldMeta::Slider(meta)) = question.meta()
                {
                    if number < meta.min {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Min,
                            format!("value below {}", meta.min),
                        ));
                    } else if number > meta.max {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Max,
                            format!("value above {}", meta.max),
                        ));
                    } else if meta.step > 0.0 {
                        let steps = (number - meta.min) / meta.step;
                        if (steps - steps.round()).abs() > 1e-9 {
                            self.issues.push(ValidationIssue::new(
                                path,
                                IssueCode::StepMismatch,
                                format!("value not on the {} step grid", meta.step),
                            ));
                        }
                    }
                }
            }
            FieldType::MatrixChoice => {
                let Some(items) = value.as_array() else {
                    return self.type_issue(path, "expected a list of row/column selections");
                };
                let mut pairs = Vec::with_capacity(items.len());
                for item in items {
                    let pair = item.as_object().and_then(|entry| {
                        let row = entry.get("row")?.as_str()?;
                        let column = entry.get("column")?.as_str()?;
                        Some((row, column))
                    });
                    match pair {
                        Some(pair) => pairs.push(pair),
                        None => {
                            return self
                                .type_issue(path, "expected objects with 'row' and 'column'");
                        }
                    }
                }
                if final_mode
                    && let Some(FieldMeta::MatrixChoice(meta)) = question.meta()
                {
                    for (row, column) in &pairs {
                        if !meta.rows.iter().any(|known| known == row) {
                            self.issues.push(ValidationIssue::new(
                                path,
                                IssueCode::InvalidOption,
                                format!("unknown row '{row}'"),
                            ));
                        }
                        if !meta.columns.iter().any(|known| known == column) {
                            self.issues.push(ValidationIssue::new(
                                path,
                                IssueCode::InvalidOption,
                                format!("unknown column '{column}'"),
                            ));
                        }
                    }
                    if pairs.len() > meta.rows.len() * meta.columns.len() {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Cardinality,
                            "more selections than the matrix allows",
                        ));
                    }
                }
            }
            FieldType::FileUpload => {
                // Structural check only; content scanning is an external
                // collaborator's concern.
                let files: Vec<&Map<String, Value>> = match value {
                    Value::Object(file) => vec![file],
                    Value::Array(items) => {
                        let mut files = Vec::with_capacity(items.len());
                        for item in items {
                            match item.as_object() {
                                Some(file) => files.push(file),
                                None => {
                                    return self.type_issue(path, "expected file objects");
                                }
                            }
                        }
                        files
                    }
                    _ => return self.type_issue(path, "expected a file object or list"),
                };
                let mut names = Vec::with_capacity(files.len());
                for file in &files {
                    match file.get("file_name").and_then(Value::as_str) {
                        Some(name) => names.push(name),
                        None => {
                            return self.type_issue(path, "file entries need a 'file_name'");
                        }
                    }
                }
                if final_mode
                    && let Some(FieldMeta::FileUpload(meta)) = question.meta()
                {
                    if let Some(max) = meta.max_files
                        && files.len() > max
                    {
                        self.issues.push(ValidationIssue::new(
                            path,
                            IssueCode::Cardinality,
                            format!("at most {max} file(s) allowed"),
                        ));
                    }
                    if !meta.allowed_patterns.is_empty()
                        && let Some(globs) = build_globset(&meta.allowed_patterns)
                    {
                        for name in names.iter().copied() {
                            if !globs.is_match(name) {
                                self.issues.push(ValidationIssue::new(
                                    path,
                                    IssueCode::PatternMismatch,
                                    format!("'{name}' does not match the allowed file patterns"),
                                ));
                            }
                        }
                    }
                }
            }
            FieldType::Image => unreachable!("image questions carry no answers"),
        }
    }

    fn check_text_constraint(
        &mut self,
        text: &str,
        constraint: &crate::spec::Constraint,
        path: &str,
    ) {
        if let Some(min_len) = constraint.min_len
            && text.chars().count() < min_len
        {
            self.issues.push(ValidationIssue::new(
                path,
                IssueCode::MinLength,
                format!("shorter than {min_len} character(s)"),
            ));
        }
        if let Some(max_len) = constraint.max_len
            && text.chars().count() > max_len
        {
            self.issues.push(ValidationIssue::new(
                path,
                IssueCode::MaxLength,
                format!("longer than {max_len} character(s)"),
            ));
        }
        if let Some(pattern) = &constraint.pattern
            && let Ok(regex) = Regex::new(pattern)
            && !regex.is_match(text)
        {
            self.issues.push(ValidationIssue::new(
                path,
                IssueCode::PatternMismatch,
                "value does not match the required pattern",
            ));
        }
    }

    fn check_number_constraint(
        &mut self,
        number: f64,
        constraint: &crate::spec::Constraint,
        path: &str,
    ) {
        if let Some(min) = constraint.min
            && number < min
        {
            self.issues.push(ValidationIssue::new(
                path,
                IssueCode::Min,
                format!("value below {min}"),
            ));
        }
        if let Some(max) = constraint.max
            && number > max
        {
            self.issues.push(ValidationIssue::new(
                path,
                IssueCode::Max,
                format!("value above {max}"),
            ));
        }
    }

    fn type_issue(&mut self, path: &str, message: &str) {
        self.issues
            .push(ValidationIssue::new(path, IssueCode::TypeMismatch, message));
    }

    fn check_global_rules(&mut self, version: &FormVersion) {
        let ctx = self.context();
        for rule in &version.rules {
            let Ok(expr) = Expr::parse(&rule.expression) else {
                // Authoring mistake; the rule does not fire. Linting reports
                // it ahead of time.
                continue;
            };
            if !expr.truthy(&ctx) {
                let message = rule
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("rule '{}' violated", rule.name));
                if rule.fields.is_empty() {
                    self.issues.push(ValidationIssue::new(
                        &rule.name,
                        IssueCode::GlobalRule,
                        message,
                    ));
                } else {
                    for field in &rule.fields {
                        self.issues.push(ValidationIssue::new(
                            field,
                            IssueCode::GlobalRule,
                            message.clone(),
                        ));
                    }
                }
            }
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn build_globset(patterns: &[String]) -> Option<globset::GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // Invalid author-supplied patterns are skipped, not fatal.
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().ok()
}
