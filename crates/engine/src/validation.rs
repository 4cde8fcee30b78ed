//! Validation engine
//!
//! Rules are bound to key paths in a [`ValidationOptions`] schema. After a
//! mutation is staged, every rule whose path relates to a written path is
//! checked against the staged value at the rule's path:
//!
//! - rules on the written path check the new value
//! - rules below the written path check the nested value; a missing nested
//!   value only fails `required` rules
//! - rules above the written path check the ancestor as it now looks
//! - removing a `required` value fails
//!
//! [`validate`] checks one value against one rule: type first, then the
//! type-specific constraints. Stores compile every pattern of a schema once,
//! when the schema is configured.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use statekit_core::{KeyPath, StoreError, StoreResult, Value};
use std::collections::HashMap;
use std::fmt;

/// Expected value type of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// `Value::String`
    String,
    /// `Value::Number`, or `Value::Integer`
    Number,
    /// `Value::Integer`
    Integer,
    /// `Value::Bool`
    Bool,
    /// `Value::Color`
    Color,
    /// `Value::Url`
    Url,
    /// `Value::Array`
    Array,
    /// `Value::Object`
    Object,
}

impl RuleKind {
    /// Whether a value's runtime type satisfies this kind
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (RuleKind::String, Value::String(_))
                | (RuleKind::Number, Value::Number(_) | Value::Integer(_))
                | (RuleKind::Integer, Value::Integer(_))
                | (RuleKind::Bool, Value::Bool(_))
                | (RuleKind::Color, Value::Color(_))
                | (RuleKind::Url, Value::Url(_))
                | (RuleKind::Array, Value::Array(_))
                | (RuleKind::Object, Value::Object(_))
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            RuleKind::String => "string",
            RuleKind::Number => "number",
            RuleKind::Integer => "integer",
            RuleKind::Bool => "bool",
            RuleKind::Color => "color",
            RuleKind::Url => "url",
            RuleKind::Array => "array",
            RuleKind::Object => "object",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraints for the value at one key path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    /// Expected type
    pub kind: RuleKind,
    /// Value must be present and non-null
    #[serde(default)]
    pub required: bool,
    /// Value returned by `get` while the path is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Inclusive lower bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regex the whole string must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Minimum chars / elements / members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum chars / elements / members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ValidationRule {
    /// Optional rule of the given kind without constraints
    pub fn new(kind: RuleKind) -> Self {
        ValidationRule {
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            pattern: None,
            min_length: None,
            max_length: None,
        }
    }

    /// Mark the value as required (builder pattern)
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value (builder pattern)
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the inclusive numeric range (builder pattern)
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the regex pattern (builder pattern)
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the length bounds (builder pattern)
    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }
}

/// Enforcement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Reject the whole change
    #[default]
    Strict,
    /// Apply the change and record the violation
    Lenient,
}

/// Mode plus the key path → rule schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Enforcement policy
    #[serde(default)]
    pub mode: ValidationMode,
    /// Rules by key path
    #[serde(default)]
    pub schema: IndexMap<KeyPath, ValidationRule>,
}

impl ValidationOptions {
    /// Empty schema with a mode
    pub fn new(mode: ValidationMode) -> Self {
        ValidationOptions {
            mode,
            schema: IndexMap::new(),
        }
    }

    /// Bind a rule to a key path (builder pattern)
    pub fn rule(mut self, key_path: KeyPath, rule: ValidationRule) -> Self {
        self.schema.insert(key_path, rule);
        self
    }

    /// Default value configured for a key path
    pub fn default_for(&self, key_path: &KeyPath) -> Option<&Value> {
        self.schema.get(key_path).and_then(|r| r.default.as_ref())
    }

    /// Compile the pattern of every rule
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` naming the first rule whose pattern is not a
    /// valid regex.
    pub(crate) fn compile_patterns(&self) -> StoreResult<Patterns> {
        let mut compiled = HashMap::new();
        for (rule_path, rule) in &self.schema {
            if let Some(pattern) = &rule.pattern {
                let re = compile(pattern).map_err(|reason| {
                    StoreError::InvalidConfiguration(format!("rule at '{}': {}", rule_path, reason))
                })?;
                compiled.insert(rule_path.clone(), re);
            }
        }
        Ok(Patterns(compiled))
    }

    /// Check every rule related to the written paths
    ///
    /// `lookup` reads the staged state. Returns one [`Violation`] per
    /// failing rule, in schema order.
    pub fn check<'a>(
        &self,
        written: impl IntoIterator<Item = &'a KeyPath> + Clone,
        lookup: impl Fn(&KeyPath) -> Option<Value>,
    ) -> Vec<Violation> {
        self.check_with(&Patterns::default(), written, lookup)
    }

    /// [`ValidationOptions::check`] with precompiled patterns
    pub(crate) fn check_with<'a>(
        &self,
        patterns: &Patterns,
        written: impl IntoIterator<Item = &'a KeyPath> + Clone,
        lookup: impl Fn(&KeyPath) -> Option<Value>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (rule_path, rule) in &self.schema {
            if !written.clone().into_iter().any(|p| p.is_related_to(rule_path)) {
                continue;
            }
            let outcome = match lookup(rule_path) {
                Some(value) => validate_with(&value, rule, patterns.0.get(rule_path)),
                None if rule.required => Err("required value is missing".to_string()),
                None => Ok(()),
            };
            if let Err(reason) = outcome {
                violations.push(Violation {
                    key_path: rule_path.clone(),
                    reason,
                });
            }
        }
        violations
    }
}

/// Compiled rule patterns, by rule path
#[derive(Debug, Clone, Default)]
pub(crate) struct Patterns(HashMap<KeyPath, Regex>);

/// A failed rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Path the rule is bound to
    pub key_path: KeyPath,
    /// Why it failed
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key_path, self.reason)
    }
}

/// Check one value against one rule
///
/// An invalid pattern is reported as a failure.
pub fn validate(value: &Value, rule: &ValidationRule) -> Result<(), String> {
    validate_with(value, rule, None)
}

fn validate_with(value: &Value, rule: &ValidationRule, compiled: Option<&Regex>) -> Result<(), String> {
    if value.is_null() {
        return if rule.required {
            Err("required value is null".to_string())
        } else {
            Ok(())
        };
    }

    if !rule.kind.accepts(value) {
        return Err(format!("expected {}, got {}", rule.kind, value.tag()));
    }

    match value {
        Value::String(s) | Value::Color(s) | Value::Url(s) => {
            check_length(s.chars().count(), rule)?;
            if let Some(pattern) = &rule.pattern {
                let owned;
                let re = match compiled {
                    Some(re) => re,
                    None => {
                        owned = compile(pattern)?;
                        &owned
                    }
                };
                if !re.is_match(s) {
                    return Err(format!("'{}' does not match pattern '{}'", s, pattern));
                }
            }
            Ok(())
        }
        Value::Integer(_) | Value::Number(_) => {
            let n = value.as_f64().unwrap_or_default();
            if let Some(min) = rule.min {
                if n < min {
                    return Err(format!("{} is below minimum {}", value, min));
                }
            }
            if let Some(max) = rule.max {
                if n > max {
                    return Err(format!("{} is above maximum {}", value, max));
                }
            }
            Ok(())
        }
        Value::Array(items) => check_length(items.len(), rule),
        Value::Object(members) => check_length(members.len(), rule),
        Value::Bool(_) | Value::Null => Ok(()),
    }
}

/// Anchored so the whole string has to match
fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))
}

fn check_length(len: usize, rule: &ValidationRule) -> Result<(), String> {
    if let Some(min) = rule.min_length {
        if len < min {
            return Err(format!("length {} is below minimum {}", len, min));
        }
    }
    if let Some(max) = rule.max_length {
        if len > max {
            return Err(format!("length {} is above maximum {}", len, max));
        }
    }
    Ok(())
}
