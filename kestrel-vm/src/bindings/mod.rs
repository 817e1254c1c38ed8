//! Capability bindings: the native objects installed on every fresh context.
//!
//! Each binding validates arguments, delegates to the host callback table
//! with the invocation's opaque handler, converts the result back into a
//! script value, and feeds any storage-accounting cost into the instruction
//! counter. Failures surface as script-level throws with deterministic
//! messages; native errors never unwind through the runtime.

mod blockchain;
mod crypto;
mod event;
mod logger;
mod math;
mod reward;
mod storage;
mod tx;

use std::sync::Arc;

use crate::counter::{instruction_counter_object, LimitsListener};
use crate::engine::{CapabilityVersion, EngineShared};
use crate::host::HostCallbacks;
use crate::loader::{require_fn, RequireEnv};
use crate::runtime::{ContextSpec, NativeFunction, ScriptError, ScriptValue};

/// Shared state every binding closure captures.
#[derive(Clone)]
pub(crate) struct BindingEnv {
    pub callbacks: Arc<HostCallbacks>,
    pub shared: Arc<EngineShared>,
    pub listener: Arc<LimitsListener>,
    pub handler: u64,
}

impl BindingEnv {
    /// Feed a host-reported storage-accounting increment to the counter,
    /// triggering the limits listener like any instrumented increment.
    pub(crate) fn add_cost(&self, cost: u64) {
        if cost > 0 {
            let total = self.shared.add_instructions(cost);
            self.listener.on_increment(total);
        }
    }
}

/// Builds the full context spec for one invocation, honoring the engine's
/// capability version mask.
pub(crate) fn context_spec(
    env: &BindingEnv,
    version: CapabilityVersion,
    require_env: RequireEnv,
) -> ContextSpec {
    let mut spec = ContextSpec::default();

    spec.objects.push(instruction_counter_object(
        Arc::clone(&env.shared),
        Arc::clone(&env.listener),
    ));
    if version.contains(CapabilityVersion::BLOCKCHAIN) {
        spec.objects.push(blockchain::object(env));
    }
    spec.objects.push(storage::object(env));
    spec.objects.push(reward::object(env));
    spec.objects.push(crypto::object(env));
    spec.objects.push(event::object(env));
    spec.objects.push(logger::object(env));
    if version.contains(CapabilityVersion::MATH) {
        spec.objects.push(math::object(env, version));
    }

    spec.functions
        .push(NativeFunction::new("_native_require", require_fn(require_env)));

    spec.data = tx::data_globals(env);
    spec
}

/// Throws when the argument count differs from the binding's arity.
pub(crate) fn expect_arity(
    args: &[ScriptValue],
    arity: usize,
    message: &str,
) -> Result<(), ScriptError> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(ScriptError::throw(message))
    }
}

/// Extracts a string argument or throws the binding's deterministic message.
pub(crate) fn string_arg(
    args: &[ScriptValue],
    index: usize,
    message: &str,
) -> Result<String, ScriptError> {
    args.get(index)
        .and_then(ScriptValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| ScriptError::throw(message))
}

/// Extracts a numeric argument or throws the binding's deterministic message.
pub(crate) fn number_arg(
    args: &[ScriptValue],
    index: usize,
    message: &str,
) -> Result<f64, ScriptError> {
    args.get(index)
        .and_then(ScriptValue::as_number)
        .ok_or_else(|| ScriptError::throw(message))
}
