//! The `_native_reward` global: reward accounting.

use std::sync::Arc;

use super::{expect_arity, string_arg, BindingEnv};
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("_native_reward").method("record", record(env.clone()))
}

fn record(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 2, "RewardDistributor.record() requires 2 arguments")?;
        let address = string_arg(args, 0, "address must be string")?;
        let amount = string_arg(args, 1, "amount must be string")?;
        let cb = env
            .callbacks
            .record_reward
            .as_ref()
            .ok_or_else(|| ScriptError::throw("reward recording is not supported by the host"))?;
        Ok(ScriptValue::from(cb(env.handler, &address, &amount)))
    })
}
