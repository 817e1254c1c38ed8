//! Engine lifecycle: isolate ownership, limits, the run pipeline, and the
//! contract-execution convenience entry.

mod shared;
pub(crate) mod supervisor;

pub use shared::{CapabilityVersion, MemoryStats};
pub(crate) use shared::EngineShared;

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{VmError, VmResult, VmStatus};
use crate::host::HostCallbacks;
use crate::loader::{normalize_module_id, LibraryRoot, ModuleRegistry};
use crate::runtime::{HeapProbe, RuntimeIsolate, ScriptOrigin, ScriptRuntime, Terminator};
use supervisor::{Invocation, Opcode, WorkerDeps, WorkerOutput};

/// Default wall-clock budget per invocation.
pub const DEFAULT_TIMEOUT_US: u64 = 5_000_000;

/// Hard ceiling on the instruction limit an embedder may request.
pub const MAX_INSTRUCTION_LIMIT: u64 = 10_000_000;

/// Instructions charged for an invocation that had to be killed on the
/// deadline.
pub const TIMEOUT_GAS_COST: u64 = 100_000_000;

/// Memory cushion applied when the embedder passes no explicit memory limit.
pub const DEFAULT_MEMORY_LIMIT: u64 = 40_000_000;

/// The runtime refuses to run under this heap budget.
pub const MIN_MEMORY_LIMIT: u64 = 6_000_000;

/// Capacity of the process-wide transformed-source cache.
const TRANSFORM_CACHE_CAPACITY: usize = 40_960;

/// Outcome of one `run_script` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub status: VmStatus,
    /// On success, the script's last expression rendered as a string; on an
    /// exception, the exception message.
    pub result: Option<String>,
}

/// Outcome of the high-level `execute` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub status: VmStatus,
    pub result: String,
    /// Instructions charged to the invocation, clamped to the limit.
    pub instructions: u64,
}

/// Process-wide engine factory. Holds the script runtime and the immutable
/// host capability table; build exactly one before creating engines.
pub struct Platform {
    runtime: Arc<dyn ScriptRuntime>,
    callbacks: Arc<HostCallbacks>,
    lib_root: LibraryRoot,
}

impl Platform {
    /// Initialize against the working directory's `jslib` tree.
    pub fn initialize(
        runtime: Arc<dyn ScriptRuntime>,
        callbacks: Arc<HostCallbacks>,
    ) -> VmResult<Self> {
        let lib_root = LibraryRoot::discover()?;
        Ok(Self {
            runtime,
            callbacks,
            lib_root,
        })
    }

    /// Initialize with an explicit base directory containing `jslib/`.
    pub fn initialize_at(
        runtime: Arc<dyn ScriptRuntime>,
        callbacks: Arc<HostCallbacks>,
        base: &Path,
    ) -> VmResult<Self> {
        let lib_root = LibraryRoot::at(base)?;
        Ok(Self {
            runtime,
            callbacks,
            lib_root,
        })
    }

    /// The canonical library root engines created here will serve `require`
    /// from.
    #[must_use]
    pub fn library_root(&self) -> &Path {
        self.lib_root.root()
    }

    /// Creates an engine with a fresh isolate and default limits.
    #[must_use]
    pub fn create_engine(&self) -> Engine {
        let isolate = self.runtime.create_isolate();
        let probe = isolate.heap_probe();
        let terminator = isolate.terminator();
        Engine {
            isolate: Arc::new(Mutex::new(isolate)),
            probe,
            terminator,
            shared: EngineShared::new(),
            callbacks: Arc::clone(&self.callbacks),
            modules: Arc::new(Mutex::new(ModuleRegistry::default())),
            lib_root: self.lib_root.clone(),
            version: CapabilityVersion::DEFAULT,
            timeout_us: DEFAULT_TIMEOUT_US,
            handler: 0,
            source: String::new(),
        }
    }
}

/// A one-script-at-a-time execution handle wrapping an isolated runtime
/// instance. Dropping the engine disposes the isolate; no worker may be
/// running against it at that point.
pub struct Engine {
    isolate: Arc<Mutex<Box<dyn RuntimeIsolate>>>,
    probe: Arc<dyn HeapProbe>,
    terminator: Arc<dyn Terminator>,
    shared: Arc<EngineShared>,
    callbacks: Arc<HostCallbacks>,
    modules: Arc<Mutex<ModuleRegistry>>,
    lib_root: LibraryRoot,
    version: CapabilityVersion,
    timeout_us: u64,
    handler: u64,
    source: String,
}

impl Engine {
    /// Supplies the contract source for the next `execute` call.
    pub fn import_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    /// Identifies the caller (typically a contract address) on capability
    /// calls made by `execute`.
    pub fn set_handler(&mut self, handler: u64) {
        self.handler = handler;
    }

    /// Seeds the deterministic random fallback for this invocation.
    pub fn import_seed(&mut self, seed: i64) {
        self.shared.seed_rng(seed as u64);
    }

    /// Replaces the capability version mask.
    pub fn set_version(&mut self, version: CapabilityVersion) {
        self.version = version;
    }

    /// Sets the wall-clock budget in microseconds; zero disables the
    /// deadline.
    pub fn set_timeout_us(&mut self, timeout_us: u64) {
        self.timeout_us = timeout_us;
    }

    /// Sets instruction and memory limits. The limits take effect even when
    /// validation fails, mirroring the embedder contract: a zero instruction
    /// limit and an undersized heap are reported but not silently repaired.
    pub fn set_execution_limits(&self, max_instructions: u64, max_memory: u64) -> VmResult<()> {
        let total_memory = if max_memory > 0 {
            max_memory
        } else {
            DEFAULT_MEMORY_LIMIT
        };
        self.shared.set_limits(max_instructions, total_memory);

        if max_instructions == 0 {
            tracing::error!(max_instructions, total_memory, "execution limit is empty");
            return Err(VmError::invalid_limits("instruction limit must be non-zero"));
        }
        if total_memory < MIN_MEMORY_LIMIT {
            tracing::error!(
                total_memory,
                "memory limit below the runtime's minimum heap"
            );
            return Err(VmError::invalid_limits(format!(
                "the runtime needs at least {MIN_MEMORY_LIMIT} bytes of heap"
            )));
        }
        Ok(())
    }

    /// Instructions charged so far.
    #[must_use]
    pub fn instructions_executed(&self) -> u64 {
        self.shared.instructions()
    }

    /// Refreshes and returns the statistics snapshot.
    pub fn read_memory_statistics(&self) -> MemoryStats {
        self.shared.refresh_stats(self.probe.heap_statistics())
    }

    /// Requests cooperative termination of the running script. Idempotent;
    /// safe from any thread.
    pub fn terminate_execution(&self) {
        if self.shared.termination_requested() {
            return;
        }
        self.shared.request_termination();
        self.terminator.terminate();
    }

    /// Flags that the node itself failed while serving a capability call.
    /// The current invocation finishes with `InnerVmError`.
    pub fn set_inner_vm_error(&self, message: &str) {
        self.shared.set_inner_vm_error(message);
    }

    /// A cheap handle host callbacks can hold to flag inner-vm failure while
    /// a script is running.
    #[must_use]
    pub fn inner_error_handle(&self) -> InnerVmErrorHandle {
        InnerVmErrorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Compiles the source without running it.
    pub fn check_syntax(&self, source: &str) -> VmResult<()> {
        let origin = ScriptOrigin::new("contract.js", 0);
        self.isolate
            .lock()
            .compile_only(source, &origin)
            .map_err(|err| VmError::exception(err.message))
    }

    /// Registers an in-memory module, instrumenting it through the
    /// transformed-source cache.
    pub fn add_module(&self, id: &str, source: &str, line_offset: i32) -> VmResult<()> {
        let (traceable, traceable_offset) = self.instrument_cached(source, line_offset)?;
        self.modules
            .lock()
            .add(normalize_module_id(id), traceable, traceable_offset);
        Ok(())
    }

    /// Runs source on a dedicated worker under the engine's limits and
    /// deadline. The entry point behind `execute`; also usable directly with
    /// pre-instrumented source.
    pub fn run_script(&self, source: &str, line_offset: i32, handler: u64) -> ScriptOutcome {
        self.shared.begin_run();
        let output = supervisor::run_supervised(
            self.worker_deps(),
            Invocation {
                source: source.to_string(),
                line_offset,
                handler,
                opcode: Opcode::Run,
            },
            self.timeout_us,
        );
        self.finish_run(output)
    }

    /// Rewrites source so each basic block reports to the instruction
    /// counter. Returns the traceable source and its line offset.
    pub fn transform_source(
        &self,
        source: &str,
        line_offset: i32,
        strict_disallow_usage: bool,
    ) -> VmResult<(String, i32)> {
        self.shared.begin_run();
        let output = supervisor::run_supervised(
            self.worker_deps(),
            Invocation {
                source: source.to_string(),
                line_offset,
                handler: self.handler,
                opcode: Opcode::Transform {
                    strict_disallow_usage,
                },
            },
            self.timeout_us,
        );
        match (output.status, output.result) {
            (VmStatus::Success, Some(traceable)) => Ok((traceable, output.line_offset)),
            _ => Err(VmError::transform_failed(
                "instrumentation bootstrap did not produce traceable source",
            )),
        }
    }

    /// Invokes `function(args)` on the imported contract source: registers
    /// the entry module, synthesizes the runner script, applies limits with
    /// the hard instruction ceiling, and maps a gas overrun at the ceiling
    /// to a timeout outcome.
    pub fn execute(&mut self, function: &str, args: &str) -> VmResult<Execution> {
        let source = self.source.clone();
        self.add_module("contract.js", &source, 0)?;

        let runnable = format!(
            "var __instance = require(\"contract.js\");\
             __instance[\"{function}\"].apply(__instance, [{args}]);"
        );

        let stats = self.read_memory_statistics();
        let memory_budget = stats.total_memory_size + DEFAULT_MEMORY_LIMIT;
        self.set_execution_limits(self.shared.max_instructions(), memory_budget)?;
        if self.shared.max_instructions() > MAX_INSTRUCTION_LIMIT {
            self.set_execution_limits(MAX_INSTRUCTION_LIMIT, self.shared.max_memory())?;
        }

        let outcome = self.run_script(&runnable, 0, self.handler);
        let mut status = outcome.status;
        let mut result = outcome.result.unwrap_or_default();
        if status == VmStatus::GasLimit
            && self.shared.max_instructions() == MAX_INSTRUCTION_LIMIT
        {
            // At the ceiling an exhausted budget means the script simply ran
            // too long.
            status = VmStatus::Timeout;
            result = "null".to_string();
        }

        Ok(Execution {
            status,
            result,
            instructions: self.shared.instructions(),
        })
    }

    fn worker_deps(&self) -> WorkerDeps {
        WorkerDeps {
            isolate: Arc::clone(&self.isolate),
            shared: Arc::clone(&self.shared),
            callbacks: Arc::clone(&self.callbacks),
            modules: Arc::clone(&self.modules),
            lib_root: self.lib_root.clone(),
            version: self.version,
            probe: Arc::clone(&self.probe),
            terminator: Arc::clone(&self.terminator),
        }
    }

    /// Applies limit accounting to a finished run: gas/memory overruns
    /// override the worker's status, and killed or failed invocations have
    /// their instruction charge clamped.
    fn finish_run(&self, output: WorkerOutput) -> ScriptOutcome {
        let stats = self.read_memory_statistics();
        let limit = self.shared.max_instructions();
        let memory_limit = self.shared.max_memory();

        let mut status = output.status;
        let mut result = output.result;
        match status {
            VmStatus::Timeout => {
                let charged = if limit > 0 && TIMEOUT_GAS_COST > limit {
                    limit
                } else {
                    TIMEOUT_GAS_COST
                };
                self.shared.set_instructions(charged);
            }
            VmStatus::InnerVmError => {
                let message = self.shared.inner_vm_message();
                result = Some(if message.is_empty() {
                    "Inner Contract: \"\"".to_string()
                } else {
                    format!("Inner Contract: {message}")
                });
                if limit > 0 && self.shared.instructions() > limit {
                    self.shared.set_instructions(limit);
                }
            }
            VmStatus::Unexpected => {}
            _ => {
                if limit > 0 && stats.count_of_executed_instructions > limit {
                    status = VmStatus::GasLimit;
                    self.shared.set_instructions(limit);
                } else if memory_limit > 0 && stats.total_memory_size > memory_limit {
                    status = VmStatus::MemLimit;
                    self.shared.set_instructions(limit);
                }
            }
        }

        ScriptOutcome { status, result }
    }

    fn instrument_cached(&self, source: &str, line_offset: i32) -> VmResult<(String, i32)> {
        let key = hex::encode(Sha256::digest(source.as_bytes()));
        if let Some(hit) = transform_cache().lock().get(&key) {
            return Ok(hit.clone());
        }
        let transformed = self.transform_source(source, line_offset, false)?;
        transform_cache().lock().put(key, transformed.clone());
        Ok(transformed)
    }
}

/// Clonable handle for signalling node-side failure from a host callback.
/// Never unwinds into the runtime; the engine surfaces the flag as an
/// `InnerVmError` outcome when the run finishes.
#[derive(Clone)]
pub struct InnerVmErrorHandle {
    shared: Arc<EngineShared>,
}

impl InnerVmErrorHandle {
    pub fn set(&self, message: &str) {
        self.shared.set_inner_vm_error(message);
    }
}

fn transform_cache() -> &'static Mutex<LruCache<String, (String, i32)>> {
    static CACHE: OnceLock<Mutex<LruCache<String, (String, i32)>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(TRANSFORM_CACHE_CAPACITY).expect("nonzero capacity"),
        ))
    })
}

/// Drops every cached transformed source.
pub fn clear_source_module_cache() {
    transform_cache().lock().clear();
}
