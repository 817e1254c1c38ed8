//! Per-invocation worker thread and the supervising deadline loop.
//!
//! Every invocation runs on a fresh, detached worker with an enlarged stack.
//! The calling thread polls the shared `is_finished` flag every 10 µs and
//! requests cooperative termination of the isolate once the wall-clock
//! deadline passes; there is no forced thread kill, so the worker sets
//! `is_finished` on every exit path.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::bindings::{self, BindingEnv};
use crate::counter::LimitsListener;
use crate::engine::shared::{CapabilityVersion, EngineShared};
use crate::error::VmStatus;
use crate::host::HostCallbacks;
use crate::loader::{LibraryRoot, ModuleRegistry, RequireEnv};
use crate::reporter;
use crate::runtime::{HeapProbe, RuntimeIsolate, ScriptOrigin, Terminator};
use crate::{env as execution_env, transformer};

/// Origin name user source is compiled under.
const RUNNER_ORIGIN: &str = "_contract_runner.js";

/// Worker stack size; instrumented contracts recurse deeper than the
/// platform default allows.
const WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Supervisor poll interval.
const POLL_INTERVAL: Duration = Duration::from_micros(10);

/// What one invocation should do.
#[derive(Debug, Clone)]
pub(crate) enum Opcode {
    Run,
    Transform { strict_disallow_usage: bool },
}

/// One invocation's inputs. Lifetime = one `run_supervised` call.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub source: String,
    pub line_offset: i32,
    pub handler: u64,
    pub opcode: Opcode,
}

/// The worker's outputs, overwritten by the supervisor on timeout.
#[derive(Debug, Clone)]
pub(crate) struct WorkerOutput {
    pub status: VmStatus,
    pub result: Option<String>,
    pub line_offset: i32,
}

impl Default for WorkerOutput {
    fn default() -> Self {
        Self {
            status: VmStatus::Unexpected,
            result: None,
            line_offset: 0,
        }
    }
}

struct InvocationCtx {
    input: Invocation,
    output: Mutex<WorkerOutput>,
    is_finished: AtomicBool,
}

/// Everything the worker thread needs, shared by `Arc` so the spawned
/// closure is `'static`.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub isolate: Arc<Mutex<Box<dyn RuntimeIsolate>>>,
    pub shared: Arc<EngineShared>,
    pub callbacks: Arc<HostCallbacks>,
    pub modules: Arc<Mutex<ModuleRegistry>>,
    pub lib_root: LibraryRoot,
    pub version: CapabilityVersion,
    pub probe: Arc<dyn HeapProbe>,
    pub terminator: Arc<dyn Terminator>,
}

/// Runs one invocation on a dedicated worker, enforcing `timeout_us` from
/// the calling thread. Returns the final, possibly overwritten, output.
pub(crate) fn run_supervised(
    deps: WorkerDeps,
    invocation: Invocation,
    timeout_us: u64,
) -> WorkerOutput {
    let ctx = Arc::new(InvocationCtx {
        input: invocation,
        output: Mutex::new(WorkerOutput::default()),
        is_finished: AtomicBool::new(false),
    });

    let started = Instant::now();
    let worker_ctx = Arc::clone(&ctx);
    let worker_deps = deps.clone();
    let spawned = std::thread::Builder::new()
        .name("kestrel-vm-worker".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                execute_invocation(&worker_deps, &worker_ctx)
            }));
            match result {
                Ok(output) => *worker_ctx.output.lock() = output,
                Err(_) => {
                    worker_deps.shared.set_unexpected_error();
                    *worker_ctx.output.lock() = WorkerOutput::default();
                }
            }
            worker_ctx.is_finished.store(true, Ordering::SeqCst);
        });

    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to create script thread");
        return WorkerOutput::default();
    }

    let mut is_killed = false;
    loop {
        if ctx.is_finished.load(Ordering::SeqCst) {
            let mut output = ctx.output.lock().clone();
            if is_killed {
                output.status = VmStatus::Timeout;
            } else if deps.shared.inner_vm_error() {
                output.status = VmStatus::InnerVmError;
            }
            return output;
        }

        std::thread::sleep(POLL_INTERVAL);
        let elapsed_us = started.elapsed().as_micros() as u64;
        if timeout_us > 0 && elapsed_us >= timeout_us && !is_killed {
            tracing::warn!(timeout_us, elapsed_us, "script deadline passed, terminating");
            deps.shared.request_termination();
            deps.terminator.terminate();
            is_killed = true;
        }
    }
}

/// The worker body: the per-run sequence behind the engine lock.
fn execute_invocation(deps: &WorkerDeps, ctx: &InvocationCtx) -> WorkerOutput {
    // Engine lock: at most one worker per engine.
    let mut guard = deps.isolate.lock();
    let isolate: &mut dyn RuntimeIsolate = &mut **guard;

    let listener = LimitsListener::new(
        Arc::clone(&deps.shared),
        Arc::clone(&deps.probe),
        Arc::clone(&deps.terminator),
    );
    let binding_env = BindingEnv {
        callbacks: Arc::clone(&deps.callbacks),
        shared: Arc::clone(&deps.shared),
        listener,
        handler: ctx.input.handler,
    };
    let require_env = RequireEnv {
        callbacks: Arc::clone(&deps.callbacks),
        modules: Arc::clone(&deps.modules),
        lib_root: deps.lib_root.clone(),
        handler: ctx.input.handler,
    };

    let spec = bindings::context_spec(&binding_env, deps.version, require_env.clone());
    if let Err(err) = isolate.open_context(spec) {
        tracing::error!(error = %err, "failed to open script context");
        return WorkerOutput::default();
    }

    if let Err(err) = execution_env::setup_execution_env(isolate, &require_env) {
        let origin = ScriptOrigin::new(crate::loader::EXECUTION_ENV, 0);
        tracing::error!("execution env failed:\n{}", reporter::format_exception(&err, &origin));
        return WorkerOutput {
            status: VmStatus::Exception,
            result: Some(reporter::exception_message(&err)),
            line_offset: 0,
        };
    }
    execution_env::load_libraries(isolate, &deps.lib_root);

    let mut output = match &ctx.input.opcode {
        Opcode::Run => run_user_source(isolate, ctx),
        Opcode::Transform {
            strict_disallow_usage,
        } => transform_user_source(isolate, ctx, *strict_disallow_usage),
    };

    if deps.shared.unexpected_error() {
        output.status = VmStatus::Unexpected;
    }
    output
}

fn run_user_source(isolate: &mut dyn RuntimeIsolate, ctx: &InvocationCtx) -> WorkerOutput {
    let origin = ScriptOrigin::new(RUNNER_ORIGIN, ctx.input.line_offset);
    match isolate.eval(&ctx.input.source, &origin) {
        Ok(value) => WorkerOutput {
            status: VmStatus::Success,
            result: value.to_result_string(),
            line_offset: ctx.input.line_offset,
        },
        Err(err) => {
            tracing::debug!("script exception:\n{}", reporter::format_exception(&err, &origin));
            WorkerOutput {
                status: VmStatus::Exception,
                result: Some(reporter::exception_message(&err)),
                line_offset: ctx.input.line_offset,
            }
        }
    }
}

fn transform_user_source(
    isolate: &mut dyn RuntimeIsolate,
    ctx: &InvocationCtx,
    strict_disallow_usage: bool,
) -> WorkerOutput {
    match transformer::inject(
        isolate,
        &ctx.input.source,
        ctx.input.line_offset,
        strict_disallow_usage,
    ) {
        Ok((traceable, line_offset)) => WorkerOutput {
            status: VmStatus::Success,
            result: Some(traceable),
            line_offset,
        },
        Err(err) => {
            tracing::error!(error = %err, "tracing injection failed");
            WorkerOutput {
                status: VmStatus::Exception,
                result: None,
                line_offset: 0,
            }
        }
    }
}
