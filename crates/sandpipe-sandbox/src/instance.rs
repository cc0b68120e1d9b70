//! 已加载的脚本实例
//! Loaded script instances.
//!
//! A [`SandboxInstance`] owns everything one script needs: its own Rhai
//! [`Engine`], the compiled [`AST`], the private state map bound as `this` in
//! every entry point, and the per-call execution budget. Nothing is shared
//! between instances, so dropping an instance is a complete teardown.

use crate::config::{LoadOptions, ScriptSecurityConfig};
use crate::convert::{dynamic_to_json, json_to_dynamic};
use crate::error::{LoadError, LoadResult};
use crate::host::{MessageSlot, register_host_functions};
use crate::message::Message;
use crate::resolver::ConfinedModuleResolver;
use crate::result::{CallResult, CapabilityDenied, ExecutionTimeout, root_cause};
use parking_lot::Mutex;
use rhai::{
    AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Module, Scope, Shared, Stmt,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Name of the per-message entry point.
pub const PROCESS_MESSAGE: &str = "process_message";
/// Name of the periodic entry point.
pub const TIMER_EVENT: &str = "timer_event";

// ============================================================================
// 入口点
// Entry points
// ============================================================================

/// 脚本定义了哪些可选入口点
/// Which optional entry points a script defines.
///
/// Resolved once at load; the hot path only consults this record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPoints {
    Neither,
    ProcessOnly,
    TimerOnly,
    Both,
}

impl EntryPoints {
    pub fn from_flags(process_message: bool, timer_event: bool) -> Self {
        match (process_message, timer_event) {
            (false, false) => EntryPoints::Neither,
            (true, false) => EntryPoints::ProcessOnly,
            (false, true) => EntryPoints::TimerOnly,
            (true, true) => EntryPoints::Both,
        }
    }

    /// `fn process_message()` with no parameters.
    pub fn has_process_message(self) -> bool {
        matches!(self, EntryPoints::ProcessOnly | EntryPoints::Both)
    }

    /// `fn timer_event(ns)` with one parameter.
    pub fn has_timer_event(self) -> bool {
        matches!(self, EntryPoints::TimerOnly | EntryPoints::Both)
    }

    fn of(ast: &AST) -> Self {
        let mut process = false;
        let mut timer = false;
        for f in ast.iter_functions() {
            match (f.name, f.params.len()) {
                (PROCESS_MESSAGE, 0) => process = true,
                (TIMER_EVENT, 1) => timer = true,
                _ => {}
            }
        }
        Self::from_flags(process, timer)
    }
}

// ============================================================================
// 执行预算
// Execution budget
// ============================================================================

/// Wall-clock deadline and operation accounting for the call in progress.
#[derive(Debug, Default)]
struct ExecutionBudget {
    deadline: Mutex<Option<Instant>>,
    peak_operations: AtomicU64,
}

impl ExecutionBudget {
    fn arm(&self, limit: Option<Duration>) {
        *self.deadline.lock() = limit.map(|l| Instant::now() + l);
    }

    fn disarm(&self) {
        *self.deadline.lock() = None;
    }

    /// Progress callback: `Some` terminates the running script.
    fn on_progress(&self, operations: u64) -> Option<Dynamic> {
        self.peak_operations.fetch_max(operations, Ordering::Relaxed);
        match *self.deadline.lock() {
            Some(deadline) if Instant::now() >= deadline => Some(Dynamic::from(ExecutionTimeout)),
            _ => None,
        }
    }
}

// ============================================================================
// 沙箱实例
// Sandbox instance
// ============================================================================

/// 绑定到单个插件实例的已编译脚本
/// One compiled script bound to one plugin instance.
pub struct SandboxInstance {
    name: String,
    script_path: PathBuf,
    module_dir: PathBuf,
    engine: Engine,
    ast: AST,
    state: Dynamic,
    entry_points: EntryPoints,
    slot: MessageSlot,
    budget: Arc<ExecutionBudget>,
    time_limit: Option<Duration>,
    poisoned: bool,
}

impl SandboxInstance {
    /// Load and initialise the script at `script_path`.
    ///
    /// `import` statements resolve only inside `module_dir`.
    pub fn load(
        script_path: impl AsRef<Path>,
        module_dir: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> LoadResult<Self> {
        let script_path = script_path.as_ref().to_path_buf();
        let source = std::fs::read_to_string(&script_path).map_err(|source| LoadError::Io {
            path: script_path.clone(),
            source,
        })?;
        Self::from_source(&script_path, &source, module_dir, options)
    }

    /// Load a script whose source is already in memory. `script_path` is
    /// only used as the script's identity.
    pub fn from_source(
        script_path: impl AsRef<Path>,
        source: &str,
        module_dir: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> LoadResult<Self> {
        let script_path = script_path.as_ref().to_path_buf();
        let module_dir = module_dir.as_ref().to_path_buf();
        let name = options.name.clone().unwrap_or_else(|| {
            script_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sandbox")
                .to_string()
        });

        let mut engine = Engine::new();
        apply_security_limits(&mut engine, &options.security);
        engine.set_module_resolver(ConfinedModuleResolver::new(&module_dir));

        let slot: MessageSlot = Arc::new(Mutex::new(None));
        register_host_functions(&mut engine, &name, options, slot.clone());

        let budget = Arc::new(ExecutionBudget::default());
        let tracker = budget.clone();
        engine.on_progress(move |ops| tracker.on_progress(ops));

        let time_limit = match options.security.max_execution_time_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let ast = guarded(|| engine.compile_into_self_contained(&Scope::new(), source))
            .map_err(LoadError::Initialization)?
            .map_err(|e| load_error(&e))?;
        let entry_points = EntryPoints::of(&ast);

        // Top-level variables seed the private state.
        budget.arm(time_limit);
        let mut scope = Scope::new();
        let top_level = guarded(|| engine.run_ast_with_scope(&mut scope, &ast));
        budget.disarm();
        top_level
            .map_err(LoadError::Initialization)?
            .map_err(|e| load_error(&e))?;

        let mut state = Map::new();
        for (var, _constant, value) in scope.iter() {
            state.insert(var.into(), value);
        }

        // Top-level imports stay reachable from the entry points.
        let imports = guarded(|| top_level_imports(&engine, &ast))
            .map_err(LoadError::Initialization)?
            .map_err(|e| load_error(&e))?;
        for (alias, module) in imports {
            engine.register_static_module(alias, module);
        }

        info!(
            plugin = %name,
            script = %script_path.display(),
            modules = %module_dir.display(),
            ?entry_points,
            "sandbox loaded"
        );

        Ok(Self {
            name,
            script_path,
            module_dir,
            engine,
            ast,
            state: Dynamic::from_map(state),
            entry_points,
            slot,
            budget,
            time_limit,
            poisoned: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn entry_points(&self) -> EntryPoints {
        self.entry_points
    }

    /// Largest operation count any single evaluation reached so far.
    pub fn peak_operations(&self) -> u64 {
        self.budget.peak_operations.load(Ordering::Relaxed)
    }

    /// True after a host panic; every later call is fatal.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Run `process_message` against `message`.
    pub fn process_message(&mut self, message: &Message) -> CallResult {
        if !self.entry_points.has_process_message() {
            return CallResult::fatal(PROCESS_MESSAGE, "is not defined");
        }
        *self.slot.lock() = Some(message.clone());
        let result = self.invoke(PROCESS_MESSAGE, ());
        *self.slot.lock() = None;
        result
    }

    /// Run `timer_event` with `now` as Unix nanoseconds.
    pub fn timer_event(&mut self, now: SystemTime) -> CallResult {
        if !self.entry_points.has_timer_event() {
            return CallResult::fatal(TIMER_EVENT, "is not defined");
        }
        let ns = now
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        self.invoke(TIMER_EVENT, (ns,))
    }

    fn invoke(&mut self, entry: &str, args: impl FuncArgs) -> CallResult {
        if self.poisoned {
            return CallResult::fatal(entry, "instance is unusable after a host panic");
        }

        self.budget.arm(self.time_limit);
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.state);
        let engine = &self.engine;
        let ast = &self.ast;
        let outcome = guarded(move || {
            let mut scope = Scope::new();
            engine.call_fn_with_options::<Dynamic>(options, &mut scope, ast, entry, args)
        });
        self.budget.disarm();

        let result = match outcome {
            Ok(Ok(value)) => CallResult::from_return(entry, value),
            Ok(Err(err)) => CallResult::from_fault(entry, &err),
            Err(panic) => {
                self.poisoned = true;
                warn!(plugin = %self.name, entry, panic = %panic, "host panic inside sandbox");
                CallResult::fatal(entry, format!("host panic: {panic}"))
            }
        };
        debug!(plugin = %self.name, entry, severity = %result.severity(), "sandbox call finished");
        result
    }

    /// The private state as a JSON object.
    pub fn state_snapshot(&self) -> serde_json::Value {
        dynamic_to_json(&self.state)
    }

    /// Merge a snapshot taken by [`state_snapshot`](Self::state_snapshot)
    /// into the private state.
    pub fn restore_state(&mut self, snapshot: &serde_json::Value) -> LoadResult<()> {
        let serde_json::Value::Object(_) = snapshot else {
            return Err(LoadError::State("snapshot must be a JSON object".into()));
        };
        let Some(restored) = json_to_dynamic(snapshot).try_cast::<Map>() else {
            return Err(LoadError::State("snapshot is not a map".into()));
        };
        let mut state = std::mem::take(&mut self.state)
            .try_cast::<Map>()
            .unwrap_or_default();
        state.extend(restored);
        self.state = Dynamic::from_map(state);
        Ok(())
    }
}

impl std::fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("name", &self.name)
            .field("script_path", &self.script_path)
            .field("module_dir", &self.module_dir)
            .field("entry_points", &self.entry_points)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 辅助函数
// Helpers
// ============================================================================

fn apply_security_limits(engine: &mut Engine, security: &ScriptSecurityConfig) {
    engine.set_max_call_levels(security.max_call_stack_depth);
    engine.set_max_operations(security.max_operations);
    engine.set_max_array_size(security.max_array_size);
    engine.set_max_map_size(security.max_map_size);
    engine.set_max_string_size(security.max_string_size);
    engine.set_max_modules(security.max_modules);
    engine.set_allow_looping(security.allow_loops);
    // Scripts must not compile new code at runtime.
    engine.disable_symbol("eval");
}

/// Run `f`, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 脚本顶层导入的模块（按别名）
/// Modules imported at the script's top level, keyed by alias.
///
/// Only the `import` statements are evaluated, so the rest of the top level
/// runs exactly once.
fn top_level_imports(
    engine: &Engine,
    ast: &AST,
) -> Result<Vec<(String, Shared<Module>)>, Box<EvalAltResult>> {
    let imports: Vec<Stmt> = ast
        .statements()
        .iter()
        .filter(|stmt| matches!(stmt, Stmt::Import(..)))
        .cloned()
        .collect();
    if imports.is_empty() {
        return Ok(Vec::new());
    }
    let module = Module::eval_ast_as_new(Scope::new(), &AST::new(imports, Module::new()), engine)?;
    Ok(module
        .iter_sub_modules()
        .map(|(alias, m)| (alias.to_string(), m.clone()))
        .collect())
}

fn load_error(err: &EvalAltResult) -> LoadError {
    match root_cause(err) {
        EvalAltResult::ErrorParsing(..) => LoadError::Compile(err.to_string()),
        EvalAltResult::ErrorModuleNotFound(path, _) => LoadError::ModuleNotFound(path.clone()),
        EvalAltResult::ErrorRuntime(value, _) if value.is::<CapabilityDenied>() => {
            LoadError::CapabilityDenied(value.clone().cast::<CapabilityDenied>().0)
        }
        other => LoadError::Initialization(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::{Severity, USER_ABORT_SENTINEL};

    fn load(source: &str) -> SandboxInstance {
        load_with(source, &LoadOptions::default())
    }

    fn load_with(source: &str, options: &LoadOptions) -> SandboxInstance {
        SandboxInstance::from_source("inline.rhai", source, ".", options).unwrap()
    }

    #[test]
    fn entry_points_are_detected() {
        let both = load("fn process_message() { 0 } fn timer_event(ns) { 0 }");
        assert_eq!(both.entry_points(), EntryPoints::Both);

        let process = load("fn process_message() { 0 }");
        assert_eq!(process.entry_points(), EntryPoints::ProcessOnly);

        let timer = load("fn timer_event(ns) { 0 }");
        assert_eq!(timer.entry_points(), EntryPoints::TimerOnly);

        // Wrong arity does not count.
        let neither = load("fn process_message(x) { 0 } fn timer_event() { 0 }");
        assert_eq!(neither.entry_points(), EntryPoints::Neither);
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        let err = SandboxInstance::from_source("bad.rhai", "fn process_message( {", ".", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Compile(_)), "got {err:?}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SandboxInstance::load("/nonexistent/script.rhai", ".", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn top_level_fault_is_an_initialization_error() {
        let err = SandboxInstance::from_source("bad.rhai", r#"throw "no";"#, ".", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Initialization(_)));
    }

    #[test]
    fn state_persists_across_calls() {
        let mut sb = load(
            r#"
            let seen = 0;
            fn process_message() {
                this.seen += 1;
                0
            }
            "#,
        );
        let msg = Message::with_payload("x");
        for _ in 0..3 {
            assert!(sb.process_message(&msg).is_success());
        }
        assert_eq!(sb.state_snapshot()["seen"], serde_json::json!(3));
    }

    #[test]
    fn instances_do_not_share_state() {
        let source = r#"
            let seen = 0;
            fn process_message() { this.seen += 1; 0 }
        "#;
        let mut a = load(source);
        let b = load(source);
        a.process_message(&Message::new());
        assert_eq!(a.state_snapshot()["seen"], serde_json::json!(1));
        assert_eq!(b.state_snapshot()["seen"], serde_json::json!(0));
    }

    #[test]
    fn read_message_sees_current_payload() {
        let mut sb = load(
            r#"
            fn process_message() {
                if read_message("Payload") == "bad" { return [-1, "bad payload"]; }
                0
            }
            "#,
        );
        assert!(sb.process_message(&Message::with_payload("good")).is_success());
        let r = sb.process_message(&Message::with_payload("bad"));
        assert_eq!(r, CallResult::failure(-1, "bad payload"));
    }

    #[test]
    fn abort_yields_user_abort_sentinel() {
        let mut sb = load("fn process_message() { abort(); 0 }");
        let r = sb.process_message(&Message::new());
        assert_eq!(r.severity(), Severity::UserAbort);
        assert_eq!(r.describe(), USER_ABORT_SENTINEL);
    }

    #[test]
    fn thrown_error_is_fatal() {
        let mut sb = load(r#"fn process_message() { throw "kaput"; }"#);
        let r = sb.process_message(&Message::new());
        assert_eq!(r.severity(), Severity::FatalError);
        assert!(r.describe().contains("kaput"));
        assert_ne!(r.describe(), USER_ABORT_SENTINEL);
    }

    #[test]
    fn runaway_loop_hits_instruction_limit() {
        let options = LoadOptions::new()
            .with_security(ScriptSecurityConfig::new().with_max_operations(10_000));
        let mut sb = load_with("fn process_message() { loop { } }", &options);
        let r = sb.process_message(&Message::new());
        assert_eq!(r.severity(), Severity::FatalError);
        assert!(r.describe().contains("instruction limit exceeded"), "{}", r.describe());
    }

    #[test]
    fn runaway_loop_hits_time_limit() {
        let options = LoadOptions::new().with_security(
            ScriptSecurityConfig::new()
                .with_max_operations(0)
                .with_max_execution_time_ms(20),
        );
        let mut sb = load_with("fn timer_event(ns) { loop { } }", &options);
        let r = sb.timer_event(SystemTime::now());
        assert_eq!(r.severity(), Severity::FatalError);
        assert!(r.describe().contains("execution time limit exceeded"), "{}", r.describe());
        assert!(sb.peak_operations() > 0);
    }

    #[test]
    fn loops_can_be_forbidden() {
        let options =
            LoadOptions::new().with_security(ScriptSecurityConfig::new().with_allow_loops(false));
        let err = SandboxInstance::from_source(
            "loop.rhai",
            "fn process_message() { loop { } }",
            ".",
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Compile(_)));
    }

    #[test]
    fn eval_is_unavailable() {
        let loaded = SandboxInstance::from_source(
            "eval.rhai",
            r#"fn process_message() { eval("1") }"#,
            ".",
            &LoadOptions::default(),
        );
        if let Ok(mut sb) = loaded {
            assert_eq!(sb.process_message(&Message::new()).severity(), Severity::FatalError);
        }
    }

    #[test]
    fn bad_return_value_is_fatal() {
        let mut sb = load(r#"fn process_message() { "done" }"#);
        assert_eq!(sb.process_message(&Message::new()).severity(), Severity::FatalError);
    }

    #[test]
    fn timer_event_receives_nanoseconds() {
        let mut sb = load(
            r#"
            let last = 0;
            fn timer_event(ns) { this.last = ns; 0 }
            "#,
        );
        let now = UNIX_EPOCH + Duration::from_secs(10);
        assert!(sb.timer_event(now).is_success());
        assert_eq!(sb.state_snapshot()["last"], serde_json::json!(10_000_000_000_i64));
    }

    #[test]
    fn missing_entry_point_call_is_fatal() {
        let mut sb = load("fn process_message() { 0 }");
        assert_eq!(sb.timer_event(SystemTime::now()).severity(), Severity::FatalError);
    }

    #[test]
    fn read_config_exposes_params() {
        let options = LoadOptions::new().with_param("limit", 5);
        let mut sb = load_with(
            r#"fn process_message() { if read_config("limit") == 5 { 0 } else { -1 } }"#,
            &options,
        );
        assert!(sb.process_message(&Message::new()).is_success());
    }

    #[test]
    fn state_snapshot_restores_into_new_instance() {
        let source = r#"
            let total = 0;
            fn process_message() { this.total += 2; 0 }
        "#;
        let mut first = load(source);
        first.process_message(&Message::new());
        let snapshot = first.state_snapshot();

        let mut second = load(source);
        second.restore_state(&snapshot).unwrap();
        second.process_message(&Message::new());
        assert_eq!(second.state_snapshot()["total"], serde_json::json!(4));

        assert!(second.restore_state(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn escaping_import_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = SandboxInstance::from_source(
            "escape.rhai",
            r#"import "../secret" as s;"#,
            dir.path(),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::CapabilityDenied(_)), "got {err:?}");
    }

    #[test]
    fn missing_module_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let err = SandboxInstance::from_source(
            "missing.rhai",
            r#"import "nowhere" as n;"#,
            dir.path(),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::ModuleNotFound(_)), "got {err:?}");
    }

    #[test]
    fn modules_resolve_inside_module_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.rhai"), r#"let prefix = "p:"; export prefix as PREFIX;"#).unwrap();
        let sb = SandboxInstance::from_source(
            "uses_module.rhai",
            r#"
            import "util" as util;
            let prefix = util::PREFIX;
            fn process_message() { 0 }
            "#,
            dir.path(),
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(sb.state_snapshot()["prefix"], serde_json::json!("p:"));
    }

    #[test]
    fn imported_module_functions_are_callable_from_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.rhai"), r#"fn shout(s) { s.to_upper() + "!" }"#).unwrap();
        let mut sb = SandboxInstance::from_source(
            "shout.rhai",
            r#"
            import "util" as util;
            let last = "";
            fn process_message() {
                this.last = util::shout(read_message("Payload"));
                0
            }
            fn timer_event(ns) {
                if util::shout("x") != "X!" { return [-1, "module lost"]; }
                0
            }
            "#,
            dir.path(),
            &LoadOptions::default(),
        )
        .unwrap();

        assert!(sb.process_message(&Message::with_payload("hi")).is_success());
        assert_eq!(sb.state_snapshot()["last"], serde_json::json!("HI!"));
        assert!(sb.process_message(&Message::with_payload("again")).is_success());
        assert_eq!(sb.state_snapshot()["last"], serde_json::json!("AGAIN!"));
        assert!(sb.timer_event(SystemTime::now()).is_success());
    }

    #[test]
    fn top_level_runs_once_when_modules_are_imported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.rhai"), "fn one() { 1 }").unwrap();
        let out = tempfile::tempdir().unwrap();
        let options = LoadOptions::new()
            .with_output_dir(out.path())
            .with_security(ScriptSecurityConfig::new().with_allow_file_operations(true));
        SandboxInstance::from_source(
            "once.rhai",
            r#"
            import "util" as util;
            append_file("top.log", "x");
            fn process_message() { util::one() - 1 }
            "#,
            dir.path(),
            &options,
        )
        .unwrap();

        let log = std::fs::read_to_string(out.path().join("top.log")).unwrap();
        assert_eq!(log, "x");
    }

    #[test]
    fn far_future_tick_saturates_instead_of_wrapping() {
        let mut sb = load(
            r#"fn timer_event(ns) { if ns == 9223372036854775807 { 0 } else { [-1, `${ns}`] } }"#,
        );
        let far = UNIX_EPOCH + Duration::from_secs(400 * 365 * 86_400);
        let r = sb.timer_event(far);
        assert!(r.is_success(), "got {r:?}");
    }

    #[test]
    fn host_panic_is_fatal_and_poisons_the_instance() {
        let mut sb = load("fn process_message() { boom(); 0 }");
        sb.engine
            .register_fn("boom", || -> i64 { panic!("kaboom") });

        let first = sb.process_message(&Message::new());
        assert_eq!(first.severity(), Severity::FatalError);
        assert_eq!(
            first.detail.as_deref(),
            Some("FATAL: process_message() host panic: kaboom")
        );
        assert!(sb.is_poisoned());

        let second = sb.process_message(&Message::new());
        assert_eq!(second.severity(), Severity::FatalError);
        assert_eq!(
            second.detail.as_deref(),
            Some("FATAL: process_message() instance is unusable after a host panic")
        );
    }
}
