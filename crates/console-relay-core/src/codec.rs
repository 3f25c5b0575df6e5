//! Console argument codec.
//!
//! Turns an arbitrary console argument list into a single human-readable
//! line. The codec is total: no argument makes it fail or panic.

use std::{fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;

/// A value with a structural (JSON) representation and a plain coercion.
///
/// The coercion is used when structural encoding fails, e.g. for cyclic
/// graphs whose `Serialize` impl refuses to recurse.
pub trait Structured: fmt::Display + Send + Sync {
    /// Encode the value as compact JSON.
    ///
    /// # Errors
    /// Returns error if the value cannot be represented structurally.
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

impl<T> Structured for T
where
    T: Serialize + fmt::Display + Send + Sync,
{
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One argument passed to a console method.
#[derive(Clone)]
pub enum Arg {
    /// Absent value.
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Already-structured JSON data.
    Json(Value),
    /// Object-like value, encoded structurally with a coercion fallback.
    Object(Arc<dyn Structured>),
    /// Value whose only meaningful rendering is its coercion text
    /// (functions, symbols, handles).
    Opaque(String),
}

impl Arg {
    /// Wrap an object-like value.
    #[must_use]
    pub fn object<T: Structured + 'static>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }

    /// Wrap a value that only has a coercion text.
    #[must_use]
    pub fn opaque(text: impl Into<String>) -> Self {
        Self::Opaque(text.into())
    }

    /// Render this argument on its own.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => coerce_number(*n),
            Self::Str(s) | Self::Opaque(s) => s.clone(),
            Self::Json(value) => render_json(value),
            Self::Object(object) => object.to_json().unwrap_or_else(|e| {
                tracing::trace!("structural encoding failed, using coercion: {e}");
                object.to_string()
            }),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Object(..)"),
            other => f.debug_tuple("Arg").field(&other.render()).finish(),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Json(Value::from(n))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Serialize a console argument list into one line, space separated.
#[must_use]
pub fn serialize(args: &[Arg]) -> String {
    args.iter().map(Arg::render).collect::<Vec<_>>().join(" ")
}

fn render_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
        }
    }
}

// Number coercion the way a console prints it: integral values carry no
// fraction, very large or small magnitudes use exponent form and the
// non-finite values have their own spelling.
fn coerce_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        // Exponent form with an explicit sign on positive exponents: 1e+21.
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => text,
        }
    } else {
        n.to_string()
    }
}
