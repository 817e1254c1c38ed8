//! The `_native_blockchain` global: chain queries, transfers, and contract
//! deletion.

use std::sync::Arc;

use super::{expect_arity, string_arg, BindingEnv};
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("_native_blockchain")
        .method("verifyAddress", verify_address(env.clone()))
        .method("transfer", transfer(env.clone()))
        .method("getCurrBlockHeight", block_height(env.clone()))
        .method("getNodeAddress", node_address(env.clone()))
        .method("deleteContract", delete_contract(env.clone()))
}

fn verify_address(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 1, "Blockchain.verifyAddress() requires 1 argument")?;
        let address = string_arg(args, 0, "address must be string")?;
        let cb = env
            .callbacks
            .verify_address
            .as_ref()
            .ok_or_else(|| ScriptError::throw("verifyAddress is not supported by the host"))?;
        let costed = cb(&address);
        env.add_cost(costed.cost);
        Ok(ScriptValue::integer(i64::from(costed.value)))
    })
}

fn transfer(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 3, "Blockchain.transfer() requires 3 arguments")?;
        let to = string_arg(args, 0, "to must be string")?;
        let amount = string_arg(args, 1, "amount must be string")?;
        let tip = string_arg(args, 2, "tip must be string")?;
        let cb = env
            .callbacks
            .transfer
            .as_ref()
            .ok_or_else(|| ScriptError::throw("transfer is not supported by the host"))?;
        let costed = cb(env.handler, &to, &amount, &tip);
        env.add_cost(costed.cost);
        Ok(ScriptValue::from(costed.value))
    })
}

fn block_height(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(
            args,
            0,
            "Blockchain.getCurrBlockHeight() does not require any argument",
        )?;
        let cb = env
            .callbacks
            .block_height
            .as_ref()
            .ok_or_else(|| ScriptError::throw("getCurrBlockHeight is not supported by the host"))?;
        Ok(ScriptValue::integer(cb(env.handler) as i64))
    })
}

fn node_address(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(
            args,
            0,
            "Blockchain.getNodeAddress() does not require any argument",
        )?;
        let cb = env
            .callbacks
            .node_address
            .as_ref()
            .ok_or_else(|| ScriptError::throw("getNodeAddress is not supported by the host"))?;
        match cb(env.handler) {
            Some(address) => Ok(ScriptValue::Str(address)),
            None => Ok(ScriptValue::Null),
        }
    })
}

fn delete_contract(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(
            args,
            0,
            "Blockchain.deleteContract() does not require any argument",
        )?;
        let cb = env
            .callbacks
            .delete_contract
            .as_ref()
            .ok_or_else(|| ScriptError::throw("deleteContract is not supported by the host"))?;
        Ok(ScriptValue::from(cb(env.handler)))
    })
}
