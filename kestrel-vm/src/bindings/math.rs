//! The `math` global: deterministic randomness.

use std::sync::Arc;

use super::{expect_arity, number_arg, BindingEnv};
use crate::engine::CapabilityVersion;
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv, version: CapabilityVersion) -> NativeObject {
    NativeObject::new("math").method("random", random(env.clone(), version))
}

/// `math.random(max)` returns an integer in `[0, max)`.
///
/// The value comes from the host's random callback when one is installed;
/// with the `MATH_RANDOM` capability enabled the engine falls back to its
/// per-invocation seed, so replaying nodes observe the same sequence.
fn random(env: BindingEnv, version: CapabilityVersion) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 1, "math.random() requires 1 argument")?;
        let max = number_arg(args, 0, "input must be a number")? as i64;
        if max <= 0 {
            return Err(ScriptError::throw("max must be a positive number"));
        }

        if let Some(cb) = env.callbacks.random.as_ref() {
            let value = cb(env.handler, max).clamp(0, max - 1);
            return Ok(ScriptValue::integer(value));
        }
        if version.contains(CapabilityVersion::MATH_RANDOM) {
            let value = (env.shared.next_random() % max as u64) as i64;
            return Ok(ScriptValue::integer(value));
        }
        Err(ScriptError::throw("random is not supported by the host"))
    })
}
