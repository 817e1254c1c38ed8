//! Values exchanged between the harness and the embedded script runtime.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// An opaque runtime-owned handle (e.g. a compiled module factory) that the
/// harness threads through without inspecting.
#[derive(Clone)]
pub struct ForeignValue(pub Arc<dyn Any + Send + Sync>);

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForeignValue")
    }
}

/// A script value crossing the runtime boundary.
///
/// Amounts wider than 32 bits travel as `BigInt` so precision survives the
/// trip into the script; 32-bit fields (e.g. an input's `vout` index) stay
/// plain `Number`s.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    Str(String),
    Array(Vec<ScriptValue>),
    /// Ordered key/value pairs; the runtime publishes these as frozen
    /// (non-writable, non-configurable) own properties.
    Object(Vec<(String, ScriptValue)>),
    Foreign(ForeignValue),
}

impl ScriptValue {
    /// Build a string value.
    pub fn string<S: Into<String>>(s: S) -> Self {
        Self::Str(s.into())
    }

    /// Build an integer number value.
    #[must_use]
    pub fn integer(n: i64) -> Self {
        Self::Number(n as f64)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::BigInt(b) => b.to_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Render the value the way the runtime's string conversion would, for
    /// the result buffer handed back to the embedder. `Undefined` renders to
    /// `None`: an undefined final expression produces no result string.
    #[must_use]
    pub fn to_result_string(&self) -> Option<String> {
        match self {
            Self::Undefined => None,
            Self::Null => Some("null".to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(format_number(*n)),
            Self::BigInt(b) => Some(b.to_string()),
            Self::Str(s) => Some(s.clone()),
            Self::Array(items) => Some(
                items
                    .iter()
                    .map(|v| v.to_result_string().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Object(_) => Some("[object Object]".to_string()),
            Self::Foreign(_) => None,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Number formatting matching the runtime's `String(n)` conversion: integral
/// values print without a fractional part.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Where an exception was raised, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionSite {
    /// Resource name from the script origin (e.g. `contract.js`).
    pub resource: String,
    /// 1-based line number within the compiled unit.
    pub line: i32,
    /// The offending source line's text.
    pub source_line: String,
    /// Start column of the offending range.
    pub start_column: i32,
    /// End column of the offending range.
    pub end_column: i32,
    /// Stack trace text when the runtime captured one.
    pub stack: Option<String>,
}

/// How a script evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// The source did not compile.
    Compile,
    /// The script threw and nothing caught it.
    Runtime,
    /// Execution was aborted by a termination request.
    Terminated,
}

/// A failure produced by or injected into the script runtime.
///
/// Capability bindings return this to throw into the script; the runtime
/// returns it when compilation or evaluation fails. Native code never unwinds
/// through the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    pub site: Option<ExceptionSite>,
}

impl ScriptError {
    /// A script-level throw with a deterministic message (argument
    /// validation failures, unset capabilities, loader errors).
    pub fn throw<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ScriptErrorKind::Runtime,
            message: message.into(),
            site: None,
        }
    }

    /// A compile failure.
    pub fn compile<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ScriptErrorKind::Compile,
            message: message.into(),
            site: None,
        }
    }

    /// Execution aborted after a termination request.
    #[must_use]
    pub fn terminated() -> Self {
        Self {
            kind: ScriptErrorKind::Terminated,
            message: "execution terminated".to_string(),
            site: None,
        }
    }

    /// Attach the exception site captured by the runtime.
    #[must_use]
    pub fn with_site(mut self, site: ExceptionSite) -> Self {
        self.site = Some(site);
        self
    }

    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self.kind, ScriptErrorKind::Terminated)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
