//! Instruction counter and the limits listener driven by it.
//!
//! Instrumented user source calls `_instruction_counter.incr(n)` before each
//! basic block; capability bindings feed storage-accounting costs through the
//! same counter. Every increment triggers the listener, which refreshes
//! memory statistics and requests cooperative termination when a configured
//! limit is crossed.

use std::sync::Arc;

use crate::engine::EngineShared;
use crate::runtime::{HeapProbe, NativeObject, ScriptError, ScriptValue, Terminator};

/// Checks engine limits after each counter increment. Idempotent under
/// repeated triggering: once termination has been requested, further
/// increments only re-request it.
pub(crate) struct LimitsListener {
    shared: Arc<EngineShared>,
    probe: Arc<dyn HeapProbe>,
    terminator: Arc<dyn Terminator>,
}

impl LimitsListener {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        probe: Arc<dyn HeapProbe>,
        terminator: Arc<dyn Terminator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared,
            probe,
            terminator,
        })
    }

    /// Invoked with the counter total after every increment.
    pub(crate) fn on_increment(&self, total: u64) {
        let stats = self.shared.refresh_stats(self.probe.heap_statistics());

        let max_instructions = self.shared.max_instructions();
        if max_instructions > 0 && total > max_instructions {
            tracing::debug!(total, max_instructions, "instruction limit reached");
            self.shared.request_termination();
            self.terminator.terminate();
            return;
        }

        let max_memory = self.shared.max_memory();
        if max_memory > 0 && stats.total_memory_size > max_memory {
            tracing::debug!(
                total_memory = stats.total_memory_size,
                max_memory,
                "memory limit reached"
            );
            self.shared.request_termination();
            self.terminator.terminate();
        }
    }
}

/// Builds the `_instruction_counter` global: `incr(n)` plus a read-only
/// `count` accessor.
pub(crate) fn instruction_counter_object(
    shared: Arc<EngineShared>,
    listener: Arc<LimitsListener>,
) -> NativeObject {
    let incr_shared = Arc::clone(&shared);
    NativeObject::new("_instruction_counter")
        .method(
            "incr",
            Arc::new(move |_ctx, args: &[ScriptValue]| {
                if args.is_empty() {
                    return Err(ScriptError::throw("incr: missing params"));
                }
                let Some(n) = args[0].as_number() else {
                    return Err(ScriptError::throw("incr: value must be number"));
                };
                // incr always answers true; negative values leave the
                // counter untouched.
                let val = n as i64;
                if val >= 0 {
                    let total = incr_shared.add_instructions(val as u64);
                    listener.on_increment(total);
                }
                Ok(ScriptValue::Bool(true))
            }),
        )
        .accessor(
            "count",
            Arc::new(move |_ctx, _args: &[ScriptValue]| {
                Ok(ScriptValue::Number(shared.instructions() as f64))
            }),
        )
}
