//! The `event` global: contract event emission.

use std::sync::Arc;

use super::{expect_arity, string_arg, BindingEnv};
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("event").method("trigger", trigger(env.clone()))
}

fn trigger(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 2, "event.trigger() requires 2 arguments")?;
        let topic = string_arg(args, 0, "topic must be string")?;
        let data = string_arg(args, 1, "data must be string")?;
        let cb = env
            .callbacks
            .trigger_event
            .as_ref()
            .ok_or_else(|| ScriptError::throw("events are not supported by the host"))?;
        Ok(ScriptValue::from(cb(env.handler, &topic, &data)))
    })
}
