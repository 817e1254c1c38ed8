//! Execution-environment bootstrap: the privileged preamble and whitelisted
//! libraries loaded into every fresh context before user code runs.

use crate::loader::{LibraryRoot, RequireEnv, EXECUTION_ENV, LIB_DIR};
use crate::runtime::{RuntimeIsolate, ScriptError, ScriptOrigin};

/// Library files loaded after the preamble when present under the root.
const WHITELISTED_LIBRARIES: [&str; 2] = ["blockchain.js", "storage.js"];

/// Loads and runs `execution_env.js`, which defines the global runtime shims
/// (`require`, `console`, `Blockchain`, ...) scripts expect. Failure aborts
/// the invocation with an exception outcome.
pub(crate) fn setup_execution_env(
    isolate: &mut dyn RuntimeIsolate,
    env: &RequireEnv,
) -> Result<(), ScriptError> {
    let versioned = env
        .callbacks
        .lib_version
        .as_ref()
        .and_then(|delegate| delegate(env.handler, EXECUTION_ENV))
        .unwrap_or_else(|| format!("{LIB_DIR}/{EXECUTION_ENV}"));

    let path = env.lib_root.base().join(&versioned);
    let source = std::fs::read_to_string(&path)
        .map_err(|_| ScriptError::throw(format!("{EXECUTION_ENV} is not found.")))?;

    let origin = ScriptOrigin::new(EXECUTION_ENV, 0);
    isolate.eval(&source, &origin)?;
    Ok(())
}

/// Loads the whitelisted libraries that ship with the node. Missing files
/// are skipped; the preamble already defines the resolver that loads the
/// rest on demand.
pub(crate) fn load_libraries(isolate: &mut dyn RuntimeIsolate, lib_root: &LibraryRoot) {
    for name in WHITELISTED_LIBRARIES {
        let path = lib_root.root().join(name);
        let Ok(source) = std::fs::read_to_string(&path) else {
            continue;
        };
        let origin = ScriptOrigin::new(name, 0);
        if let Err(err) = isolate.eval(&source, &origin) {
            tracing::warn!(library = name, error = %err, "library failed to load");
        }
    }
}
