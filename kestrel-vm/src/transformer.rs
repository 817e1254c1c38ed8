//! Source transformation: rewriting user source so every basic block reports
//! to `_instruction_counter` before it runs.
//!
//! The rewrite itself is performed by the trusted `instruction_counter.js`
//! library, resolved through the module loader; this module builds the
//! bootstrap that feeds it the escaped user source and unpacks its result.

use crate::runtime::{RuntimeIsolate, ScriptError, ScriptOrigin, ScriptValue};

/// The trusted instrumentation module.
pub const INSTRUMENTER_MODULE: &str = "instruction_counter.js";

const BOOTSTRAP_ORIGIN: &str = "_inject_tracer.js";

/// Escape source so it survives embedding inside a double-quoted script
/// string literal.
pub(crate) fn escape_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// The bootstrap program handed to the runtime.
pub(crate) fn bootstrap_source(escaped: &str, strict_disallow_usage: bool) -> String {
    format!(
        "(function(){{\n\
         const instCounter = require(\"{INSTRUMENTER_MODULE}\");\n\
         const source = \"{escaped}\";\n\
         return instCounter.processScript(source, {});\n\
         }})();",
        i32::from(strict_disallow_usage)
    )
}

/// Runs the instrumentation pass inside the given isolate. Returns the
/// traceable source and its line offset.
pub(crate) fn inject(
    isolate: &mut dyn RuntimeIsolate,
    source: &str,
    line_offset: i32,
    strict_disallow_usage: bool,
) -> Result<(String, i32), ScriptError> {
    let bootstrap = bootstrap_source(&escape_source(source), strict_disallow_usage);
    let origin = ScriptOrigin::new(BOOTSTRAP_ORIGIN, line_offset);
    let value = isolate.eval(&bootstrap, &origin)?;
    unpack(value)
}

/// The instrumenter must return `{traceableSource, lineOffset}`.
fn unpack(value: ScriptValue) -> Result<(String, i32), ScriptError> {
    let ScriptValue::Object(fields) = value else {
        return Err(malformed_result());
    };
    let mut source = None;
    let mut offset = None;
    for (key, val) in fields {
        match key.as_str() {
            "traceableSource" => source = val.as_str().map(str::to_string),
            "lineOffset" => offset = val.as_number(),
            _ => {}
        }
    }
    match (source, offset) {
        (Some(source), Some(offset)) => Ok((source, offset as i32)),
        _ => Err(malformed_result()),
    }
}

fn malformed_result() -> ScriptError {
    ScriptError::throw(
        "instruction_counter.js:processScript() should return object \
         with traceableSource and lineOffset keys",
    )
}
