//! The `_log` global: script logging forwarded to the host.

use std::sync::Arc;

use super::BindingEnv;
use crate::host::LogLevel;
use crate::runtime::{NativeObject, ScriptValue};

pub(super) fn object(env: &BindingEnv) -> NativeObject {
    NativeObject::new("_log")
        .method("debug", log_fn(env.clone(), LogLevel::Debug))
        .method("info", log_fn(env.clone(), LogLevel::Info))
        .method("warn", log_fn(env.clone(), LogLevel::Warn))
        .method("error", log_fn(env.clone(), LogLevel::Error))
}

fn log_fn(env: BindingEnv, level: LogLevel) -> crate::runtime::NativeFn {
    Arc::new(move |_ctx, args: &[ScriptValue]| {
        let rendered: Vec<String> = args
            .iter()
            .map(|v| v.to_result_string().unwrap_or_else(|| "undefined".to_string()))
            .collect();

        if let Some(cb) = env.callbacks.logger.as_ref() {
            cb(level, &rendered);
        } else {
            let line = rendered.join(" ");
            match level {
                LogLevel::Debug => tracing::debug!(target: "contract", "{line}"),
                LogLevel::Info => tracing::info!(target: "contract", "{line}"),
                LogLevel::Warn => tracing::warn!(target: "contract", "{line}"),
                LogLevel::Error => tracing::error!(target: "contract", "{line}"),
            }
        }
        Ok(ScriptValue::Undefined)
    })
}
