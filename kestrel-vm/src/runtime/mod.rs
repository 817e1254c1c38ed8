//! The contract this engine requires from an embedded script runtime.
//!
//! The runtime itself (compiler, garbage collector, interpreter or JIT) is an
//! external collaborator. The harness talks to it exclusively through the
//! traits here: a [`ScriptRuntime`] mints one [`RuntimeIsolate`] per engine, a
//! fully isolated heap that evaluates one script at a time; [`Terminator`] and
//! [`HeapProbe`] are the two handles other threads may touch while a script
//! runs.

mod value;

pub use value::{
    ExceptionSite, ForeignValue, ScriptError, ScriptErrorKind, ScriptValue,
};

use std::sync::Arc;

/// Compile origin for a unit of source: resource name plus the line/column
/// offsets diagnostics must be shifted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOrigin {
    pub name: String,
    pub line_offset: i32,
    pub column_offset: i32,
}

impl ScriptOrigin {
    pub fn new<S: Into<String>>(name: S, line_offset: i32) -> Self {
        Self {
            name: name.into(),
            line_offset,
            column_offset: 0,
        }
    }
}

/// Heap statistics snapshot read from the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total_heap_size: u64,
    pub total_heap_size_executable: u64,
    pub total_physical_size: u64,
    pub total_available_size: u64,
    pub used_heap_size: u64,
    pub heap_size_limit: u64,
    pub malloced_memory: u64,
    pub peak_malloced_memory: u64,
    pub total_array_buffer_size: u64,
    pub peak_array_buffer_size: u64,
}

/// A native function installed on the script global. The runtime invokes it
/// with a re-entrant [`RuntimeContext`] so natives (notably `require`) can
/// evaluate further source in the same context.
pub type NativeFn = Arc<
    dyn Fn(&mut dyn RuntimeContext, &[ScriptValue]) -> Result<ScriptValue, ScriptError>
        + Send
        + Sync,
>;

/// A named native function slot.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new<S: Into<String>>(name: S, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

/// A native object template: a global with read-only, non-configurable
/// methods and accessors.
#[derive(Clone)]
pub struct NativeObject {
    pub name: String,
    pub methods: Vec<NativeFunction>,
    /// Zero-argument getters surfaced as read-only properties.
    pub accessors: Vec<NativeFunction>,
}

impl NativeObject {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            accessors: Vec::new(),
        }
    }

    #[must_use]
    pub fn method<S: Into<String>>(mut self, name: S, func: NativeFn) -> Self {
        self.methods.push(NativeFunction::new(name, func));
        self
    }

    #[must_use]
    pub fn accessor<S: Into<String>>(mut self, name: S, func: NativeFn) -> Self {
        self.accessors.push(NativeFunction::new(name, func));
        self
    }
}

/// A frozen data global (own property, non-writable, non-configurable).
#[derive(Debug, Clone)]
pub struct DataGlobal {
    pub name: String,
    pub value: ScriptValue,
}

/// Everything the harness installs on a fresh context before any source runs.
#[derive(Clone, Default)]
pub struct ContextSpec {
    pub objects: Vec<NativeObject>,
    pub functions: Vec<NativeFunction>,
    pub data: Vec<DataGlobal>,
}

/// Re-entrant evaluation surface handed to native functions while a script is
/// on the stack.
pub trait RuntimeContext {
    /// Compile and run `source` in the current context, returning the value
    /// of its last expression.
    fn eval(&mut self, source: &str, origin: &ScriptOrigin)
        -> Result<ScriptValue, ScriptError>;
}

/// Requests cooperative termination of a running script. Must be safe to call
/// from any thread, repeatedly; the runtime aborts at its next interruption
/// point.
pub trait Terminator: Send + Sync {
    fn terminate(&self);
}

/// Reads heap statistics while a script may be running on another thread.
pub trait HeapProbe: Send + Sync {
    fn heap_statistics(&self) -> HeapStats;
}

/// One isolated runtime instance: its own heap, no shared state.
pub trait RuntimeIsolate: Send {
    /// Create a fresh global context carrying the given spec. Any previous
    /// context is discarded.
    fn open_context(&mut self, spec: ContextSpec) -> Result<(), ScriptError>;

    /// Compile and run source in the current context.
    fn eval(&mut self, source: &str, origin: &ScriptOrigin)
        -> Result<ScriptValue, ScriptError>;

    /// Compile without running (syntax checking).
    fn compile_only(&mut self, source: &str, origin: &ScriptOrigin) -> Result<(), ScriptError>;

    /// Handle used to abort the current script from another thread.
    fn terminator(&self) -> Arc<dyn Terminator>;

    /// Handle used to read heap statistics from another thread.
    fn heap_probe(&self) -> Arc<dyn HeapProbe>;
}

/// Factory for isolates; registered once at platform initialization.
pub trait ScriptRuntime: Send + Sync {
    fn create_isolate(&self) -> Box<dyn RuntimeIsolate>;
}
