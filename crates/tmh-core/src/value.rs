//! Values, addresses and program stores.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, TmhError};

/// Outcome of a random choice, an ERP parameter, or a program return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    /// Boolean outcome.
    Bool(bool),
    /// Integer outcome.
    Int(i64),
    /// Real outcome.
    Real(f64),
}

impl Value {
    /// Numeric view of the value (`true` is `1.0`).
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Bool(flag) => f64::from(u8::from(*flag)),
            Value::Int(raw) => *raw as f64,
            Value::Real(raw) => *raw,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Result<bool, TmhError> {
        match self {
            Value::Bool(flag) => Ok(*flag),
            other => Err(type_mismatch("bool", other)),
        }
    }

    /// Integer view of the value.
    pub fn as_int(&self) -> Result<i64, TmhError> {
        match self {
            Value::Int(raw) => Ok(*raw),
            other => Err(type_mismatch("int", other)),
        }
    }
}

fn type_mismatch(expected: &str, found: &Value) -> TmhError {
    TmhError::Program(
        ErrorInfo::new("value-type", "unexpected value type")
            .with_context("expected", expected)
            .with_context("found", found.to_string()),
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Int(raw) => write!(f, "{raw}"),
            Value::Real(raw) => write!(f, "{raw}"),
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(raw: i64) -> Self {
        Value::Int(raw)
    }
}

impl From<f64> for Value {
    fn from(raw: f64) -> Self {
        Value::Real(raw)
    }
}

/// Stable identifier of a choice's position in program execution.
///
/// Addresses must be reproduced exactly when the program re-executes along
/// the same control path; that is how choices are matched across traces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Creates an address from its textual form.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Extends the address with a path segment.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }

    /// Returns the textual form of the address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Program state captured alongside a continuation. Opaque to the kernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    entries: BTreeMap<String, Value>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Binds `key` to `value`, replacing any previous binding.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Store::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
