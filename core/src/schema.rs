//! Runtime data schemas for the `data` field of a success envelope.
//!
//! # Design
//! `DataSchema` is the seam: `ApiClient::request` accepts anything that can
//! turn an optional JSON value into a typed output or a list of issues.
//! Two implementations ship with the crate:
//!
//! - `Schema`, a declarative shape checked at runtime. It collects every
//!   mismatch with its path and, like zod objects, strips keys an object
//!   schema does not declare.
//! - `Typed<T>`, which lets any `DeserializeOwned` type act as the schema.
//!
//! The value passed to `parse_value` is `None` when the field is absent from
//! its parent object, which is distinct from an explicit JSON `null`.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{join_path, ValidationIssue};

/// Validates (and converts) the `data` payload of a success envelope.
pub trait DataSchema {
    type Output;

    /// Issue paths are relative to the value being parsed; the caller
    /// re-roots them.
    fn parse_value(&self, value: Option<&Value>) -> Result<Self::Output, Vec<ValidationIssue>>;
}

/// A declarative JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Accepts anything, including an absent value.
    Any,
    String,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    Boolean,
    /// Exactly this JSON value.
    Literal(Value),
    Array(Box<Schema>),
    /// Declared fields, in order. Undeclared keys are dropped from the output.
    Object(Vec<(String, Schema)>),
    /// The inner schema, or JSON `null`.
    Nullable(Box<Schema>),
    /// The inner schema, or an absent field.
    Optional(Box<Schema>),
    /// The field must be absent.
    Undefined,
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array(Box::new(items))
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Schema::Object(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Schema::Literal(value.into())
    }

    pub fn nullable(self) -> Self {
        Schema::Nullable(Box::new(self))
    }

    pub fn optional(self) -> Self {
        Schema::Optional(Box::new(self))
    }

    /// Check `value` against this schema, pushing every mismatch onto
    /// `issues`. Returns the (possibly stripped) output, or `None` when the
    /// value is absent or invalid.
    pub(crate) fn check(
        &self,
        value: Option<&Value>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        match self {
            Schema::Any => value.cloned(),
            Schema::Undefined => {
                if let Some(v) = value {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("expected undefined, received {}", kind(v)),
                    ));
                }
                None
            }
            Schema::Optional(inner) => value.and_then(|v| inner.check(Some(v), path, issues)),
            Schema::Nullable(inner) => match value {
                Some(Value::Null) => Some(Value::Null),
                other => inner.check(other, path, issues),
            },
            _ => {
                let Some(v) = value else {
                    issues.push(ValidationIssue::new(path, "required"));
                    return None;
                };
                self.check_present(v, path, issues)
            }
        }
    }

    fn check_present(
        &self,
        value: &Value,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        let matches = match (self, value) {
            (Schema::String, Value::String(_)) | (Schema::Number, Value::Number(_)) | (Schema::Boolean, Value::Bool(_)) => true,
            (Schema::Integer, Value::Number(n)) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            (Schema::Literal(expected), v) => {
                if expected != v {
                    issues.push(ValidationIssue::new(path, format!("expected literal {expected}, received {v}")));
                    return None;
                }
                true
            }
            (Schema::Array(items), Value::Array(elements)) => {
                let mut out = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let child = join_path(path, &format!("[{i}]"));
                    out.push(items.check(Some(element), &child, issues).unwrap_or(Value::Null));
                }
                return Some(Value::Array(out));
            }
            (Schema::Object(fields), Value::Object(map)) => {
                let mut out = Map::new();
                for (name, field) in fields {
                    let child = join_path(path, name);
                    if let Some(v) = field.check(map.get(name), &child, issues) {
                        out.insert(name.clone(), v);
                    }
                }
                return Some(Value::Object(out));
            }
            _ => false,
        };
        if matches {
            Some(value.clone())
        } else {
            issues.push(ValidationIssue::new(
                path,
                format!("expected {}, received {}", self, kind(value)),
            ));
            None
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Any => f.write_str("any"),
            Schema::String => f.write_str("string"),
            Schema::Number => f.write_str("number"),
            Schema::Integer => f.write_str("integer"),
            Schema::Boolean => f.write_str("boolean"),
            Schema::Literal(v) => write!(f, "literal {v}"),
            Schema::Array(_) => f.write_str("array"),
            Schema::Object(_) => f.write_str("object"),
            Schema::Nullable(inner) => write!(f, "{inner} or null"),
            Schema::Optional(inner) => write!(f, "optional {inner}"),
            Schema::Undefined => f.write_str("undefined"),
        }
    }
}

impl DataSchema for Schema {
    /// An absent value that the schema allows comes back as `Value::Null`.
    type Output = Value;

    fn parse_value(&self, value: Option<&Value>) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let out = self.check(value, "", &mut issues);
        if issues.is_empty() {
            Ok(out.unwrap_or(Value::Null))
        } else {
            Err(issues)
        }
    }
}

/// Uses `T`'s `Deserialize` impl as the schema.
///
/// An absent value is deserialized from `null`, so `Option<_>` and `()`
/// accept it.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Typed(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned> DataSchema for Typed<T> {
    type Output = T;

    fn parse_value(&self, value: Option<&Value>) -> Result<T, Vec<ValidationIssue>> {
        let value = value.cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| vec![ValidationIssue::new("", e.to_string())])
    }
}

/// Shorthand for `Typed::<T>::new()`.
pub fn typed<T: DeserializeOwned>() -> Typed<T> {
    Typed::new()
}

/// JSON type name used in diagnostics.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
