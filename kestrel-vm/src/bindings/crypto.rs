//! The `crypto` global: verified signature and public-key checks.

use std::sync::Arc;

use super::{expect_arity, string_arg, BindingEnv};
use crate::runtime::{NativeObject, ScriptError, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("crypto")
        .method("verifySignature", verify_signature(env.clone()))
        .method("verifyPublicKey", verify_public_key(env.clone()))
}

fn verify_signature(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 3, "crypto.verifySignature() requires 3 arguments")?;
        let msg = string_arg(args, 0, "message must be string")?;
        let pubkey = string_arg(args, 1, "public key must be string")?;
        let sig = string_arg(args, 2, "signature must be string")?;
        let cb = env
            .callbacks
            .verify_signature
            .as_ref()
            .ok_or_else(|| ScriptError::throw("verifySignature is not supported by the host"))?;
        Ok(ScriptValue::Bool(cb(&msg, &pubkey, &sig)))
    })
}

fn verify_public_key(env: BindingEnv) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        expect_arity(args, 2, "crypto.verifyPublicKey() requires 2 arguments")?;
        let addr = string_arg(args, 0, "address must be string")?;
        let pubkey = string_arg(args, 1, "public key must be string")?;
        let cb = env
            .callbacks
            .verify_public_key
            .as_ref()
            .ok_or_else(|| ScriptError::throw("verifyPublicKey is not supported by the host"))?;
        Ok(ScriptValue::Bool(cb(&addr, &pubkey)))
    })
}
