//! Sandboxed contract-script execution harness.
//!
//! Each invocation is a one-shot, fully isolated evaluation: source text in,
//! a result string or a typed failure out, with a bounded instruction count,
//! bounded memory, a wall-clock deadline, and a controlled set of host
//! capabilities (chain queries, per-contract storage, transfers, logging,
//! events, verified crypto, reward accounting, deterministic randomness).
//!
//! The script runtime itself is an external collaborator reached through the
//! [`runtime`] traits; this crate owns everything around it: the isolate
//! lifecycle, the metering and termination protocol, the capability surface,
//! the tracing-instruction source transform, and the whitelisted module
//! loader.

mod bindings;
mod config;
mod counter;
mod engine;
mod env;
mod error;
mod host;
mod loader;
mod reporter;
mod transformer;

pub mod runtime;

pub use config::EngineConfig;
pub use engine::{
    clear_source_module_cache, CapabilityVersion, Engine, Execution, InnerVmErrorHandle,
    MemoryStats, Platform, ScriptOutcome, DEFAULT_MEMORY_LIMIT, DEFAULT_TIMEOUT_US,
    MAX_INSTRUCTION_LIMIT, MIN_MEMORY_LIMIT, TIMEOUT_GAS_COST,
};
pub use error::{VmError, VmResult, VmStatus};
pub use host::{
    Costed, HostCallbacks, HostCallbacksBuilder, LogLevel, ModuleSource, TxInput, TxOutput,
    TxSnapshot, UtxoSnapshot,
};
pub use loader::{LibraryRoot, ENTRY_MODULE, EXECUTION_ENV, LIB_DIR};
pub use transformer::INSTRUMENTER_MODULE;
