//! The `_native_storage` global: per-contract key/value storage.

use std::sync::Arc;

use super::{expect_arity, string_arg, BindingEnv};
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("_native_storage")
        .method("get", get(env.clone()))
        .method("set", set(env.clone()))
        .method("del", del(env.clone()))
}

fn get(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 1, "Storage.get() requires 1 argument")?;
        let key = string_arg(args, 0, "key must be string")?;
        let cb = env
            .callbacks
            .storage_get
            .as_ref()
            .ok_or_else(|| ScriptError::throw("storage is not supported by the host"))?;
        let costed = cb(env.handler, &key);
        env.add_cost(costed.cost);
        match costed.value {
            Some(value) => Ok(ScriptValue::Str(value)),
            None => Ok(ScriptValue::Null),
        }
    })
}

fn set(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 2, "Storage.set() requires 2 arguments")?;
        let key = string_arg(args, 0, "key must be string")?;
        let value = string_arg(args, 1, "value must be string")?;
        let cb = env
            .callbacks
            .storage_set
            .as_ref()
            .ok_or_else(|| ScriptError::throw("storage is not supported by the host"))?;
        let costed = cb(env.handler, &key, &value);
        env.add_cost(costed.cost);
        Ok(ScriptValue::from(costed.value))
    })
}

fn del(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 1, "Storage.del() requires 1 argument")?;
        let key = string_arg(args, 0, "key must be string")?;
        let cb = env
            .callbacks
            .storage_del
            .as_ref()
            .ok_or_else(|| ScriptError::throw("storage is not supported by the host"))?;
        let costed = cb(env.handler, &key);
        env.add_cost(costed.cost);
        Ok(ScriptValue::from(costed.value))
    })
}
