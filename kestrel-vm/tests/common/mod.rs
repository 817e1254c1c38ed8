//! A programmable stand-in for the embedded script runtime.
//!
//! The engine only ever talks to the runtime through the `runtime` traits,
//! so the suite drives it with scripted behaviors: each test registers a
//! closure for an exact source string, and the closure exercises the
//! installed native bindings through the re-entrant context exactly the way
//! compiled script code would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use kestrel_vm::runtime::{
    ContextSpec, ForeignValue, HeapProbe, HeapStats, RuntimeContext, RuntimeIsolate, ScriptError,
    ScriptOrigin, ScriptRuntime, ScriptValue, Terminator,
};
use kestrel_vm::{HostCallbacks, Platform, VmResult};
use tempfile::TempDir;

type Behavior =
    Arc<dyn Fn(&mut StubCtx<'_>) -> Result<ScriptValue, ScriptError> + Send + Sync>;

#[derive(Default)]
struct SharedState {
    behaviors: Mutex<HashMap<String, Behavior>>,
    compile_failures: Mutex<Vec<String>>,
    heap: Mutex<HeapStats>,
    eval_log: Mutex<Vec<String>>,
}

/// Scripted runtime; one per test.
#[derive(Default)]
pub struct StubRuntime {
    state: Arc<SharedState>,
}

impl StubRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers the behavior executed when the engine evaluates `source`.
    pub fn on<F>(&self, source: &str, behavior: F)
    where
        F: Fn(&mut StubCtx<'_>) -> Result<ScriptValue, ScriptError> + Send + Sync + 'static,
    {
        self.state
            .behaviors
            .lock()
            .unwrap()
            .insert(source.to_string(), Arc::new(behavior));
    }

    /// Any compiled source containing `marker` fails compilation.
    pub fn fail_compile(&self, marker: &str) {
        self.state
            .compile_failures
            .lock()
            .unwrap()
            .push(marker.to_string());
    }

    /// Overrides the heap statistics the runtime reports.
    pub fn set_heap(&self, heap: HeapStats) {
        *self.state.heap.lock().unwrap() = heap;
    }

    /// Origin names of every source evaluated so far, in order.
    pub fn eval_log(&self) -> Vec<String> {
        self.state.eval_log.lock().unwrap().clone()
    }
}

impl ScriptRuntime for StubRuntime {
    fn create_isolate(&self) -> Box<dyn RuntimeIsolate> {
        Box::new(StubIsolate {
            state: Arc::clone(&self.state),
            ctrl: Arc::new(IsolateCtrl::default()),
            spec: None,
        })
    }
}

#[derive(Default)]
struct IsolateCtrl {
    terminated: AtomicBool,
}

struct StubTerminator(Arc<IsolateCtrl>);

impl Terminator for StubTerminator {
    fn terminate(&self) {
        self.0.terminated.store(true, Ordering::SeqCst);
    }
}

struct StubProbe(Arc<SharedState>);

impl HeapProbe for StubProbe {
    fn heap_statistics(&self) -> HeapStats {
        *self.0.heap.lock().unwrap()
    }
}

struct StubIsolate {
    state: Arc<SharedState>,
    ctrl: Arc<IsolateCtrl>,
    spec: Option<Arc<ContextSpec>>,
}

impl RuntimeIsolate for StubIsolate {
    fn open_context(&mut self, spec: ContextSpec) -> Result<(), ScriptError> {
        self.ctrl.terminated.store(false, Ordering::SeqCst);
        self.spec = Some(Arc::new(spec));
        Ok(())
    }

    fn eval(
        &mut self,
        source: &str,
        origin: &ScriptOrigin,
    ) -> Result<ScriptValue, ScriptError> {
        let spec = self
            .spec
            .clone()
            .ok_or_else(|| ScriptError::throw("no context is open"))?;
        let mut ctx = StubCtx {
            state: &self.state,
            ctrl: &self.ctrl,
            spec,
        };
        ctx.eval(source, origin)
    }

    fn compile_only(
        &mut self,
        source: &str,
        _origin: &ScriptOrigin,
    ) -> Result<(), ScriptError> {
        for marker in self.state.compile_failures.lock().unwrap().iter() {
            if source.contains(marker.as_str()) {
                return Err(ScriptError::compile(format!(
                    "SyntaxError: unexpected token near '{marker}'"
                )));
            }
        }
        Ok(())
    }

    fn terminator(&self) -> Arc<dyn Terminator> {
        Arc::new(StubTerminator(Arc::clone(&self.ctrl)))
    }

    fn heap_probe(&self) -> Arc<dyn HeapProbe> {
        Arc::new(StubProbe(Arc::clone(&self.state)))
    }
}

/// The re-entrant context handed to behaviors and natives.
pub struct StubCtx<'a> {
    state: &'a SharedState,
    ctrl: &'a IsolateCtrl,
    spec: Arc<ContextSpec>,
}

impl RuntimeContext for StubCtx<'_> {
    fn eval(
        &mut self,
        source: &str,
        origin: &ScriptOrigin,
    ) -> Result<ScriptValue, ScriptError> {
        self.check_interrupt()?;
        self.state.eval_log.lock().unwrap().push(origin.name.clone());

        let behavior = self.state.behaviors.lock().unwrap().get(source).cloned();
        if let Some(behavior) = behavior {
            return behavior.as_ref()(self);
        }

        if origin.name == "_inject_tracer.js" {
            return synth_transform(source);
        }
        if source.starts_with("(function(){\nreturn function (exports, module, require)") {
            // A loaded module factory; the tests only care that loading
            // succeeded.
            return Ok(ScriptValue::Foreign(ForeignValue(Arc::new(()))));
        }
        if matches!(
            origin.name.as_str(),
            "execution_env.js" | "blockchain.js" | "storage.js"
        ) {
            return Ok(ScriptValue::Undefined);
        }

        Err(ScriptError::throw(format!(
            "stub runtime has no behavior for source compiled as {}",
            origin.name
        )))
    }
}

impl StubCtx<'_> {
    /// Fails with a termination error once the isolate has been asked to
    /// abort; behaviors call this the way compiled code hits interruption
    /// points.
    pub fn check_interrupt(&self) -> Result<(), ScriptError> {
        if self.ctrl.terminated.load(Ordering::SeqCst) {
            Err(ScriptError::terminated())
        } else {
            Ok(())
        }
    }

    /// Invokes a method on an installed native object.
    pub fn call(
        &mut self,
        object: &str,
        method: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        self.check_interrupt()?;
        let func = {
            let obj = self
                .spec
                .objects
                .iter()
                .find(|o| o.name == object)
                .ok_or_else(|| ScriptError::throw(format!("{object} is not defined")))?;
            obj.methods
                .iter()
                .find(|m| m.name == method)
                .ok_or_else(|| {
                    ScriptError::throw(format!("{object}.{method} is not a function"))
                })?
                .func
                .clone()
        };
        func.as_ref()(self, args)
    }

    /// Reads an accessor on an installed native object.
    pub fn read_accessor(
        &mut self,
        object: &str,
        accessor: &str,
    ) -> Result<ScriptValue, ScriptError> {
        let func = {
            let obj = self
                .spec
                .objects
                .iter()
                .find(|o| o.name == object)
                .ok_or_else(|| ScriptError::throw(format!("{object} is not defined")))?;
            obj.accessors
                .iter()
                .find(|a| a.name == accessor)
                .ok_or_else(|| {
                    ScriptError::throw(format!("{object}.{accessor} is not defined"))
                })?
                .func
                .clone()
        };
        func.as_ref()(self, &[])
    }

    /// Calls `_native_require(name)`.
    pub fn require(&mut self, name: &str) -> Result<ScriptValue, ScriptError> {
        self.call_function("_native_require", &[ScriptValue::string(name)])
    }

    /// Invokes an installed global function with arbitrary arguments.
    pub fn call_function(
        &mut self,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let func = self
            .spec
            .functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ScriptError::throw(format!("{name} is not defined")))?
            .func
            .clone();
        func.as_ref()(self, args)
    }

    /// Reads a frozen data global such as `_tx`.
    pub fn data_global(&self, name: &str) -> Option<ScriptValue> {
        self.spec
            .data
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.clone())
    }

    /// Attempts to overwrite a global; frozen globals reject the write the
    /// way a strict-mode script would observe it.
    pub fn assign_global(&mut self, name: &str) -> Result<(), ScriptError> {
        if self.spec.data.iter().any(|d| d.name == name)
            || self.spec.objects.iter().any(|o| o.name == name)
        {
            return Err(ScriptError::throw(format!(
                "Cannot assign to read only property '{name}'"
            )));
        }
        Err(ScriptError::throw(format!("{name} is not defined")))
    }

    /// Sugar for `_instruction_counter.incr(n)` followed by an interruption
    /// point.
    pub fn incr(&mut self, n: f64) -> Result<(), ScriptError> {
        self.call("_instruction_counter", "incr", &[ScriptValue::Number(n)])?;
        self.check_interrupt()
    }
}

/// Emulates the trusted instrumenter: unwraps the escaped source from the
/// bootstrap and returns it untouched, honoring the strict-usage flag.
fn synth_transform(bootstrap: &str) -> Result<ScriptValue, ScriptError> {
    const HEAD: &str = "const source = \"";
    const TAIL: &str = "\";\nreturn instCounter.processScript(source, ";

    let start = bootstrap
        .find(HEAD)
        .ok_or_else(|| ScriptError::throw("malformed instrumentation bootstrap"))?
        + HEAD.len();
    let end = bootstrap[start..]
        .find(TAIL)
        .ok_or_else(|| ScriptError::throw("malformed instrumentation bootstrap"))?
        + start;
    let escaped = &bootstrap[start..end];
    let strict = bootstrap[end..].contains("processScript(source, 1)");

    let source = unescape(escaped);
    if strict && source.contains("Math.random") {
        return Err(ScriptError::throw(
            "disallowed usage of Math.random in reproducible context",
        ));
    }

    Ok(ScriptValue::Object(vec![
        (
            "traceableSource".to_string(),
            ScriptValue::Str(source),
        ),
        ("lineOffset".to_string(), ScriptValue::Number(0.0)),
    ]))
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Writes the library tree the engine expects under `<base>/jslib`.
pub fn write_jslib(base: &Path) {
    let jslib = base.join("jslib");
    std::fs::create_dir_all(&jslib).unwrap();
    std::fs::write(
        jslib.join("execution_env.js"),
        include_str!("../../jslib/execution_env.js"),
    )
    .unwrap();
    std::fs::write(
        jslib.join("instruction_counter.js"),
        include_str!("../../jslib/instruction_counter.js"),
    )
    .unwrap();
    std::fs::write(
        jslib.join("blockchain.js"),
        include_str!("../../jslib/blockchain.js"),
    )
    .unwrap();
    std::fs::write(
        jslib.join("storage.js"),
        include_str!("../../jslib/storage.js"),
    )
    .unwrap();
}

/// A platform over a fresh library tree and a scripted runtime.
pub fn platform_with(
    callbacks: Arc<HostCallbacks>,
) -> VmResult<(TempDir, Arc<StubRuntime>, Platform)> {
    let dir = tempfile::tempdir().unwrap();
    write_jslib(dir.path());
    let runtime = StubRuntime::new();
    let platform = Platform::initialize_at(
        Arc::clone(&runtime) as Arc<dyn ScriptRuntime>,
        callbacks,
        dir.path(),
    )?;
    Ok((dir, runtime, platform))
}
