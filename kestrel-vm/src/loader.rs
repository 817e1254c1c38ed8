//! Module loading: the `_native_require` global, the library-path whitelist,
//! and the engine-side module registry the require delegate serves from.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{VmError, VmResult};
use crate::host::{HostCallbacks, ModuleSource};
use crate::runtime::{NativeFn, RuntimeContext, ScriptError, ScriptOrigin, ScriptValue};

/// The contract-entry module id as the script-side resolver hands it to
/// `_native_require`; it bypasses filesystem whitelist checks.
pub const ENTRY_MODULE: &str = "jslib/contract.js";

/// Library files live under this directory, relative to the working
/// directory.
pub const LIB_DIR: &str = "jslib";

/// The privileged preamble defining the script-side module system.
pub const EXECUTION_ENV: &str = "execution_env.js";

const MAX_PATH_LEN: usize = 1024;

const WRAPPER_PREFIX: &str = "(function(){\nreturn function (exports, module, require) {\n";
const WRAPPER_SUFFIX: &str = "\n};\n})();\n";

/// The compiled wrapper adds two lines ahead of the module body.
const WRAPPER_LINE_OFFSET: i32 = -2;

/// Wraps module contents in the factory closure the script-side resolver
/// expects.
pub(crate) fn wrap_module(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len() + WRAPPER_PREFIX.len() + WRAPPER_SUFFIX.len());
    out.push_str(WRAPPER_PREFIX);
    out.push_str(contents);
    out.push_str(WRAPPER_SUFFIX);
    out
}

/// Normalizes a module id: bare library names gain the `jslib/` prefix,
/// `.`/`..`/empty segments are squashed.
pub(crate) fn normalize_module_id(id: &str) -> String {
    let prefixed: String = if id.starts_with('/') || id.starts_with("./") || id.starts_with("../") {
        id.to_string()
    } else if id.starts_with(&format!("{LIB_DIR}/")) {
        id.to_string()
    } else {
        format!("{LIB_DIR}/{id}")
    };

    let mut parts: Vec<&str> = Vec::new();
    for p in prefixed.split('/') {
        match p {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// One registered in-memory module.
#[derive(Debug, Clone)]
pub(crate) struct ModuleEntry {
    pub source: String,
    pub line_offset: i32,
}

/// Engine-side module table consulted before the filesystem.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: HashMap<String, ModuleEntry>,
}

impl ModuleRegistry {
    pub(crate) fn add(&mut self, id: String, source: String, line_offset: i32) {
        tracing::debug!(id, "registering module");
        self.modules.insert(id, ModuleEntry { source, line_offset });
    }

    pub(crate) fn get(&self, id: &str) -> Option<ModuleEntry> {
        self.modules.get(id).cloned()
    }
}

/// The canonical whitelist root all filesystem `require` targets must live
/// under.
#[derive(Debug, Clone)]
pub struct LibraryRoot {
    /// Directory containing `jslib/`; relative requires resolve against it.
    base: PathBuf,
    /// Canonical `<base>/jslib`.
    root: PathBuf,
}

impl LibraryRoot {
    /// Discover the root from the working directory by canonicalizing
    /// `<cwd>/jslib/execution_env.js` and stripping the filename.
    pub fn discover() -> VmResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| VmError::unexpected(format!("cannot read working directory: {e}")))?;
        Self::at(&cwd)
    }

    /// Build the root under an explicit base directory.
    pub fn at(base: &Path) -> VmResult<Self> {
        let base = base
            .canonicalize()
            .map_err(|e| VmError::unexpected(format!("cannot resolve {}: {e}", base.display())))?;
        let env = base.join(LIB_DIR).join(EXECUTION_ENV);
        let canonical_env = env.canonicalize().map_err(|_| {
            VmError::unexpected(format!("{} not found under {}", EXECUTION_ENV, base.display()))
        })?;
        let root = canonical_env
            .parent()
            .ok_or_else(|| VmError::unexpected("library root has no parent"))?
            .to_path_buf();
        Ok(Self { base, root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a versioned relative path to an absolute file inside the
    /// whitelist root. Containment is checked lexically before touching the
    /// filesystem so `..` escapes fail the same way whether or not the
    /// target exists, then re-checked on the canonical path.
    pub(crate) fn resolve(&self, versioned: &str) -> Result<PathBuf, ScriptError> {
        let joined = if Path::new(versioned).is_absolute() {
            PathBuf::from(versioned)
        } else {
            self.base.join(versioned)
        };

        let normalized = lexical_normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(ScriptError::throw("require path is not in lib"));
        }

        let canonical = normalized
            .canonicalize()
            .map_err(|_| ScriptError::throw("require path is invalid absolutepath"))?;
        if !canonical.starts_with(&self.root) {
            return Err(ScriptError::throw("require path is not in lib"));
        }
        if !canonical.is_file() {
            return Err(ScriptError::throw("require path is not file"));
        }
        Ok(canonical)
    }
}

/// Squash `.` and `..` components without consulting the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Everything the `_native_require` closure captures.
#[derive(Clone)]
pub(crate) struct RequireEnv {
    pub callbacks: Arc<HostCallbacks>,
    pub modules: Arc<Mutex<ModuleRegistry>>,
    pub lib_root: LibraryRoot,
    pub handler: u64,
}

impl RequireEnv {
    /// Map a library name to its version-pinned relative path; without a
    /// delegate, bare names are pinned under `jslib/`.
    fn attach_version(&self, name: &str) -> String {
        if let Some(delegate) = self.callbacks.lib_version.as_ref() {
            if let Some(pinned) = delegate(self.handler, name) {
                return pinned;
            }
        }
        if name.starts_with(&format!("{LIB_DIR}/")) {
            name.to_string()
        } else {
            format!("{LIB_DIR}/{name}")
        }
    }

    /// In-memory sources: the engine's module registry, then the embedder's
    /// require delegate.
    fn read_memory(&self, name: &str) -> Option<ModuleSource> {
        if let Some(entry) = self.modules.lock().get(&normalize_module_id(name)) {
            return Some(ModuleSource {
                source: entry.source,
                line_offset: entry.line_offset,
            });
        }
        self.callbacks
            .require_delegate
            .as_ref()
            .and_then(|delegate| delegate(self.handler, name))
    }

    /// Locate module contents for `name`: registry and require delegate
    /// before any filesystem access, then the whitelisted file. Whitelist
    /// violations propagate; a plain miss returns `None`.
    fn load(&self, name: &str) -> Result<Option<ModuleSource>, ScriptError> {
        // An embedded quote would escape the wrapper text.
        let quoted = name.contains('"');
        if !quoted {
            if let Some(module) = self.read_memory(name) {
                return Ok(Some(module));
            }
        }
        if name == ENTRY_MODULE {
            // The entry module skips path resolution; read it relative to
            // the base directory when it exists on disk.
            let path = self.lib_root.base().join(name);
            if !path.is_file() {
                return Ok(None);
            }
            return Ok(read_file(&path));
        }
        let resolved = self.lib_root.resolve(&self.attach_version(name))?;
        if quoted {
            return Ok(None);
        }
        Ok(read_file(&resolved))
    }
}

fn read_file(path: &Path) -> Option<ModuleSource> {
    let source = std::fs::read_to_string(path).ok()?;
    Some(ModuleSource {
        source,
        line_offset: 0,
    })
}

/// Builds the `_native_require` global.
pub(crate) fn require_fn(env: RequireEnv) -> NativeFn {
    Arc::new(move |ctx: &mut dyn RuntimeContext, args: &[ScriptValue]| {
        let Some(first) = args.first() else {
            return Err(ScriptError::throw("require missing path"));
        };
        let Some(name) = first.as_str() else {
            return Err(ScriptError::throw("require path must be string"));
        };
        if name.len() >= MAX_PATH_LEN {
            return Err(ScriptError::throw("require path length more"));
        }

        let Some(module) = env.load(name)? else {
            return Err(ScriptError::throw(format!(
                "require cannot find module '{name}'"
            )));
        };

        let wrapped = wrap_module(&module.source);
        let origin = ScriptOrigin::new(name, module.line_offset + WRAPPER_LINE_OFFSET);
        ctx.eval(&wrapped, &origin)
    })
}
