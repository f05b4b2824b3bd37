//! Validation engine.
//!
//! Rules run against the *current* attribute state and accumulate
//! structured `(field, code, message)` errors. Every rule runs; there is no
//! short-circuit between rules (the preflight pipeline is the only place
//! that stops early, and it does so across categories, not rules).

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::Attributes;

/// Field key for whole-object failures.
pub const BASE: &str = "base";

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    /// Machine-readable code (`blank`, `inclusion`, ...).
    pub code: String,
    pub message: String,
}

impl FieldError {
    /// "Name can't be blank"; base messages are returned verbatim.
    pub fn full_message(&self) -> String {
        if self.field == BASE {
            self.message.clone()
        } else {
            format!("{} {}", humanize(&self.field), self.message)
        }
    }
}

/// Ordered error collection of one command instance. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Errors(Vec<FieldError>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error with the default message for `code`.
    pub fn add(&mut self, field: impl Into<String>, code: impl Into<String>) -> &mut Self {
        let code = code.into();
        let message = default_message(&code);
        self.push(FieldError {
            field: field.into(),
            code,
            message,
        })
    }

    pub fn add_message(
        &mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.push(FieldError {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        })
    }

    fn push(&mut self, error: FieldError) -> &mut Self {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
        self
    }

    pub fn merge(&mut self, other: &Errors) {
        for error in &other.0 {
            self.push(error.clone());
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Messages recorded for one field.
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn has(&self, field: &str, code: &str) -> bool {
        self.0.iter().any(|e| e.field == field && e.code == code)
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.0.iter().map(FieldError::full_message).collect()
    }

    pub fn to_sentence(&self) -> String {
        to_sentence(&self.full_messages())
    }
}

impl core::fmt::Display for Errors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            f.write_str("no errors added")
        } else {
            f.write_str(&self.to_sentence())
        }
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Default human-readable message for a code.
pub fn default_message(code: &str) -> String {
    match code {
        "blank" => "can't be blank".into(),
        "present" => "must be blank".into(),
        "inclusion" => "is not included in the list".into(),
        "exclusion" => "is reserved".into(),
        "invalid" => "is invalid".into(),
        "not_a_number" => "is not a number".into(),
        "not_an_integer" => "must be an integer".into(),
        "taken" => "has already been taken".into(),
        "failed" => "failed".into(),
        other => other.replace('_', " "),
    }
}

/// "a", "a and b", "a, b, and c".
pub fn to_sentence(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

fn humanize(field: &str) -> String {
    let trimmed = field.strip_suffix("_id").unwrap_or(field).replace('_', " ");
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Blank: absent, null, whitespace-only string, empty array or mapping, `false`.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(_)) => false,
    }
}

/// Custom predicate rule: inspects the command and its attributes and adds
/// errors as needed.
pub type CustomCheck<C> = fn(&mut C, &Attributes, &mut Errors);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NumericBounds {
    greater_than: Option<f64>,
    greater_than_or_equal_to: Option<f64>,
    less_than: Option<f64>,
    less_than_or_equal_to: Option<f64>,
    only_integer: bool,
}

impl NumericBounds {
    fn check(&self, field: &str, value: Option<&Value>, errors: &mut Errors) {
        let number = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(n) = number else {
            errors.add(field, "not_a_number");
            return;
        };

        if self.only_integer && n.fract() != 0.0 {
            errors.add(field, "not_an_integer");
        }

        let checks: [(Option<f64>, &str, &str, fn(f64, f64) -> bool); 4] = [
            (self.greater_than, "greater_than", "must be greater than", |n, l| n > l),
            (
                self.greater_than_or_equal_to,
                "greater_than_or_equal_to",
                "must be greater than or equal to",
                |n, l| n >= l,
            ),
            (self.less_than, "less_than", "must be less than", |n, l| n < l),
            (
                self.less_than_or_equal_to,
                "less_than_or_equal_to",
                "must be less than or equal to",
                |n, l| n <= l,
            ),
        ];
        for (bound, code, text, holds) in checks {
            let Some(limit) = bound else { continue };
            if !holds(n, limit) {
                errors.add_message(field, code, format!("{text} {}", format_number(limit)));
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

enum Check<C> {
    Presence,
    Inclusion(Vec<Value>),
    Format(Regex),
    Numericality(NumericBounds),
    Length {
        minimum: Option<usize>,
        maximum: Option<usize>,
    },
    Custom(CustomCheck<C>),
}

/// A declared validation rule for command type `C`.
pub struct Rule<C> {
    field: String,
    check: Check<C>,
    allow_nil: bool,
}

impl<C> Rule<C> {
    fn new(field: impl Into<String>, check: Check<C>) -> Self {
        Self {
            field: field.into(),
            check,
            allow_nil: false,
        }
    }

    pub fn presence(field: impl Into<String>) -> Self {
        Self::new(field, Check::Presence)
    }

    pub fn inclusion<I, V>(field: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(field, Check::Inclusion(allowed.into_iter().map(Into::into).collect()))
    }

    pub fn format(field: impl Into<String>, pattern: Regex) -> Self {
        Self::new(field, Check::Format(pattern))
    }

    pub fn numericality(field: impl Into<String>) -> Self {
        Self::new(field, Check::Numericality(NumericBounds::default()))
    }

    pub fn length(field: impl Into<String>) -> Self {
        Self::new(
            field,
            Check::Length {
                minimum: None,
                maximum: None,
            },
        )
    }

    /// Whole-object or derived-attribute rule; `name` only labels the rule.
    pub fn custom(name: impl Into<String>, check: CustomCheck<C>) -> Self {
        Self::new(name, Check::Custom(check))
    }

    /// Skip the rule when the field is absent or null.
    pub fn allow_nil(mut self) -> Self {
        self.allow_nil = true;
        self
    }

    pub fn greater_than(self, limit: f64) -> Self {
        self.with_bounds(|b| b.greater_than = Some(limit))
    }

    pub fn greater_than_or_equal_to(self, limit: f64) -> Self {
        self.with_bounds(|b| b.greater_than_or_equal_to = Some(limit))
    }

    pub fn less_than(self, limit: f64) -> Self {
        self.with_bounds(|b| b.less_than = Some(limit))
    }

    pub fn less_than_or_equal_to(self, limit: f64) -> Self {
        self.with_bounds(|b| b.less_than_or_equal_to = Some(limit))
    }

    pub fn only_integer(self) -> Self {
        self.with_bounds(|b| b.only_integer = true)
    }

    pub fn minimum(mut self, n: usize) -> Self {
        if let Check::Length { minimum, .. } = &mut self.check {
            *minimum = Some(n);
        }
        self
    }

    pub fn maximum(mut self, n: usize) -> Self {
        if let Check::Length { maximum, .. } = &mut self.check {
            *maximum = Some(n);
        }
        self
    }

    fn with_bounds(mut self, f: impl FnOnce(&mut NumericBounds)) -> Self {
        if let Check::Numericality(bounds) = &mut self.check {
            f(bounds);
        }
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn apply(&self, command: &mut C, attributes: &Attributes, errors: &mut Errors) {
        let field = self.field.as_str();
        let value = attributes.value(field);
        let skippable = !matches!(self.check, Check::Presence | Check::Custom(_));
        if self.allow_nil && skippable && value.is_none() {
            return;
        }

        match &self.check {
            Check::Presence => {
                if is_blank(value) {
                    errors.add(field, "blank");
                }
            }
            Check::Inclusion(allowed) => {
                if !value.is_some_and(|v| allowed.contains(v)) {
                    errors.add(field, "inclusion");
                }
            }
            Check::Format(pattern) => {
                if !value.and_then(Value::as_str).is_some_and(|s| pattern.is_match(s)) {
                    errors.add(field, "invalid");
                }
            }
            Check::Numericality(bounds) => bounds.check(field, value, errors),
            Check::Length { minimum, maximum } => {
                let len = match value {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                if let Some(min) = minimum.filter(|min| len < *min) {
                    errors.add_message(
                        field,
                        "too_short",
                        format!("is too short (minimum is {min} characters)"),
                    );
                }
                if let Some(max) = maximum.filter(|max| len > *max) {
                    errors.add_message(
                        field,
                        "too_long",
                        format!("is too long (maximum is {max} characters)"),
                    );
                }
            }
            Check::Custom(check) => check(command, attributes, errors),
        }
    }
}

impl<C> core::fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match &self.check {
            Check::Presence => "presence",
            Check::Inclusion(_) => "inclusion",
            Check::Format(_) => "format",
            Check::Numericality(_) => "numericality",
            Check::Length { .. } => "length",
            Check::Custom(_) => "custom",
        };
        f.debug_struct("Rule")
            .field("field", &self.field)
            .field("kind", &kind)
            .field("allow_nil", &self.allow_nil)
            .finish()
    }
}

/// Capability: a type that declares validation rules.
pub trait Validatable: Sized {
    /// Declared rules, run in order.
    fn rules() -> Vec<Rule<Self>> {
        Vec::new()
    }

    /// Free-form hook run after the declared rules.
    fn validate(&mut self, _attributes: &Attributes, _errors: &mut Errors) {}
}

/// Run every validation for `command` against `attributes` into a cleared
/// `errors`: schema-required presence, declared rules, then the hook.
pub fn run_validations<C: Validatable>(command: &mut C, attributes: &Attributes, errors: &mut Errors) {
    errors.clear();

    for decl in attributes.schema().fields().iter().filter(|f| f.is_required()) {
        if is_blank(attributes.value(decl.name())) {
            errors.add(decl.name(), "blank");
        }
    }

    for rule in C::rules() {
        rule.apply(command, attributes, errors);
    }

    command.validate(attributes, errors);

    tracing::trace!(errors = errors.len(), "validations ran");
}
