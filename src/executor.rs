//! Executor — one guarded call from request to result.
//!
//! The sequence for a call: rate-limit check, trust-ceiling check,
//! capability assembly, interpreter invocation, result mapping. The
//! caller always receives an [`ExecutionResult`]; nothing here panics
//! or propagates an error across the boundary. Once a request is
//! admitted, `record_end` runs on every exit path exactly once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capability::CommandSpec;
use crate::error::{RejectReason, SandboxError};
use crate::interpreter::{Interpreter, InterpreterOutcome, SkillCompiler};
use crate::policy::{self, ExecutionContext, PolicyConfig, Provenance, TrustLevel};
use crate::ratelimit::{RateLimiter, Rejection};
use crate::skill::{LoadedSkill, SkillLoader};

/// What the host gets back from every call.
#[derive(Debug)]
pub struct ExecutionResult {
    pub value: Option<Value>,
    pub error: Option<SandboxError>,
    pub fuel_used: u64,
    pub trace: Option<Vec<String>>,
    pub warnings: Vec<String>,
    pub success: bool,
    pub duration: Duration,
    /// Set when the request was refused before execution.
    pub rate_limit_reason: Option<RejectReason>,
    pub retry_after: Option<Duration>,
}

impl ExecutionResult {
    fn failure(error: SandboxError, started: Instant) -> Self {
        Self {
            value: None,
            error: Some(error),
            fuel_used: 0,
            trace: None,
            warnings: Vec::new(),
            success: false,
            duration: started.elapsed(),
            rate_limit_reason: None,
            retry_after: None,
        }
    }

    fn rate_limited(rejection: Rejection, started: Instant) -> Self {
        let mut result = Self::failure(
            SandboxError::RateLimited {
                reason: rejection.reason,
                retry_after: rejection.retry_after,
            },
            started,
        );
        result.rate_limit_reason = Some(rejection.reason);
        result.retry_after = rejection.retry_after;
        result
    }

    fn from_outcome(outcome: InterpreterOutcome, started: Instant, keep_trace: bool) -> Self {
        Self {
            success: outcome.error.is_none(),
            value: outcome.value,
            error: outcome.error,
            fuel_used: outcome.fuel_used,
            trace: if keep_trace { outcome.trace } else { None },
            warnings: outcome.warnings,
            duration: started.elapsed(),
            rate_limit_reason: None,
            retry_after: None,
        }
    }
}

/// Per-skill capability adjustments an operator configures. Applied
/// after defaults during assembly, so operator policy wins.
#[derive(Clone, Default)]
pub struct CapabilityOverrides {
    pub extra_allowed_hosts: Vec<String>,
    pub extra_commands: Vec<CommandSpec>,
    /// Replaces the context's writable sub-directories when set.
    pub writable_subdirs: Option<Vec<String>>,
}

/// Executor-wide configuration.
#[derive(Clone, Default)]
pub struct ExecutorConfig {
    /// Overrides the per-level fuel budget when set.
    pub fuel: Option<u64>,
    /// Overrides the per-level timeout when set.
    pub timeout: Option<Duration>,
    pub enable_trace: bool,
    /// Per-skill trust-level overrides, keyed by skill name.
    pub trust_overrides: HashMap<String, TrustLevel>,
    /// Per-skill capability overrides, keyed by skill name.
    pub capability_overrides: HashMap<String, CapabilityOverrides>,
    pub policy: PolicyConfig,
}

/// Out-of-band audit hooks. Hooks observe; they never influence the
/// outcome.
#[derive(Clone, Default)]
pub struct ExecutorHooks {
    pub on_before_execute: Option<Arc<dyn Fn(&str, &ExecutionContext) + Send + Sync>>,
    pub on_after_execute: Option<Arc<dyn Fn(&str, &ExecutionResult) + Send + Sync>>,
    pub on_trust_denied: Option<Arc<dyn Fn(&str, TrustLevel, Provenance) + Send + Sync>>,
    pub on_rate_limited: Option<Arc<dyn Fn(&str, &Rejection) + Send + Sync>>,
}

/// Brackets an admitted request so `record_end` runs exactly once on
/// every exit path, early returns included.
struct RateGuard {
    limiter: Option<Arc<RateLimiter>>,
    id: Option<String>,
}

impl RateGuard {
    fn start(limiter: Option<Arc<RateLimiter>>, id: Option<String>) -> Self {
        if let (Some(limiter), Some(id)) = (&limiter, &id) {
            limiter.record_start(id);
        }
        Self { limiter, id }
    }
}

impl Drop for RateGuard {
    fn drop(&mut self) {
        if let (Some(limiter), Some(id)) = (&self.limiter, &self.id) {
            limiter.record_end(id);
        }
    }
}

/// The orchestrator.
pub struct Executor {
    interpreter: Arc<dyn Interpreter>,
    loader: SkillLoader,
    limiter: Option<Arc<RateLimiter>>,
    config: ExecutorConfig,
    hooks: ExecutorHooks,
    cache: Mutex<HashMap<PathBuf, Arc<LoadedSkill>>>,
}

impl Executor {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        compiler: Arc<dyn SkillCompiler>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            interpreter,
            loader: SkillLoader::new(compiler),
            limiter: None,
            config,
            hooks: ExecutorHooks::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_hooks(mut self, hooks: ExecutorHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// The attached rate limiter, for the administrative surface.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Loads (or retrieves from cache) a skill and executes it.
    pub async fn execute_path(
        &self,
        path: &Path,
        args: Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        let skill = match self.load_cached(path).await {
            Ok(skill) => skill,
            Err(error) => return ExecutionResult::failure(error, started),
        };
        self.execute(&skill, args, ctx).await
    }

    /// Executes an already-loaded skill.
    pub async fn execute(
        &self,
        skill: &LoadedSkill,
        args: Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        let name = skill.manifest.name.clone();

        if let (Some(limiter), Some(id)) = (&self.limiter, &ctx.requester_id) {
            if let Err(rejection) = limiter.check(id) {
                info!(skill = %name, requester = %id, reason = %rejection.reason, "rate limited");
                if let Some(hook) = &self.hooks.on_rate_limited {
                    hook(&name, &rejection);
                }
                return ExecutionResult::rate_limited(rejection, started);
            }
        }

        // From here on the request is admitted; the guard pairs the
        // record_start below with exactly one record_end.
        let _guard = RateGuard::start(self.limiter.clone(), ctx.requester_id.clone());
        self.run_admitted(skill, args, ctx, started).await
    }

    async fn run_admitted(
        &self,
        skill: &LoadedSkill,
        args: Value,
        ctx: &ExecutionContext,
        started: Instant,
    ) -> ExecutionResult {
        let name = skill.manifest.name.clone();

        if name.trim().is_empty() || skill.program.is_empty() {
            return ExecutionResult::failure(SandboxError::SkillValidationFailed, started);
        }

        let level = self
            .config
            .trust_overrides
            .get(&name)
            .copied()
            .unwrap_or(skill.trust_level);

        if policy::check_ceiling(level, ctx.provenance).is_err() {
            warn!(skill = %name, level = level.as_str(), provenance = ?ctx.provenance, "trust denied");
            if let Some(hook) = &self.hooks.on_trust_denied {
                hook(&name, level, ctx.provenance);
            }
            return ExecutionResult::failure(SandboxError::TrustDenied, started);
        }

        let mut effective = ctx.clone();
        if let Some(overrides) = self.config.capability_overrides.get(&name) {
            effective
                .allowed_hosts
                .extend(overrides.extra_allowed_hosts.iter().cloned());
            for command in &overrides.extra_commands {
                effective.extra_commands.retain(|c| c.name != command.name);
                effective.extra_commands.push(command.clone());
            }
            if let Some(dirs) = &overrides.writable_subdirs {
                effective.writable_subdirs = dirs.clone();
            }
        }

        let table = match policy::assemble(level, &effective, &self.config.policy) {
            Ok(table) => table,
            Err(err) => {
                warn!(skill = %name, error = %err, "capability assembly failed");
                return ExecutionResult::failure(SandboxError::HostError, started);
            }
        };

        if let Some(hook) = &self.hooks.on_before_execute {
            hook(&name, ctx);
        }

        let mut context_map = effective.metadata.clone();
        context_map.insert("skill".to_string(), name.clone());
        context_map.insert(
            "provenance".to_string(),
            format!("{:?}", ctx.provenance).to_lowercase(),
        );
        context_map.insert("trust_level".to_string(), level.as_str().to_string());
        if let Some(requester) = &ctx.requester_id {
            context_map.insert("requester".to_string(), requester.clone());
        }
        if let Some(channel) = &ctx.channel_id {
            context_map.insert("channel".to_string(), channel.clone());
        }

        let fuel = self.config.fuel.unwrap_or_else(|| level.fuel_budget());
        let timeout = self.config.timeout.unwrap_or_else(|| level.timeout());
        debug!(skill = %name, level = level.as_str(), fuel, ?timeout, "invoking interpreter");

        let outcome = match tokio::time::timeout(
            timeout,
            self.interpreter
                .execute(&skill.program, args, &table, fuel, timeout, &context_map),
        )
        .await
        {
            Ok(outcome) => outcome,
            // The interpreter failed to honor its own deadline; the
            // backstop aborts it and unwinds pending capability calls.
            Err(_) => InterpreterOutcome::failure(SandboxError::Timeout, fuel),
        };

        let result = ExecutionResult::from_outcome(outcome, started, self.config.enable_trace);
        if let Some(hook) = &self.hooks.on_after_execute {
            hook(&name, &result);
        }
        result
    }

    async fn load_cached(&self, path: &Path) -> Result<Arc<LoadedSkill>, SandboxError> {
        if let Some(skill) = self.cache.lock().get(path) {
            return Ok(skill.clone());
        }
        let skill = Arc::new(self.loader.load(path).await?);
        self.cache
            .lock()
            .insert(path.to_path_buf(), skill.clone());
        Ok(skill)
    }

    // ── administrative surface ──────────────────────────────────

    /// Drops one cached skill so the next call reloads it from disk.
    pub fn invalidate(&self, path: &Path) {
        self.cache.lock().remove(path);
    }

    /// Drops the whole skill cache.
    pub fn reset_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Program;
    use crate::ratelimit::RateLimiterConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Interpreter stub that echoes its arguments and context.
    struct EchoInterpreter {
        invocations: AtomicUsize,
    }

    impl EchoInterpreter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                invocations: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Interpreter for EchoInterpreter {
        async fn execute(
            &self,
            _program: &Program,
            args: Value,
            capabilities: &crate::capability::CapabilityTable,
            fuel: u64,
            _timeout: Duration,
            context: &HashMap<String, String>,
        ) -> InterpreterOutcome {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            InterpreterOutcome::success(
                json!({
                    "args": args,
                    "capabilities": capabilities.names(),
                    "context": context,
                    "fuel_granted": fuel,
                }),
                7,
            )
        }
    }

    /// Interpreter stub that sleeps past any reasonable deadline.
    struct StuckInterpreter;

    #[async_trait::async_trait]
    impl Interpreter for StuckInterpreter {
        async fn execute(
            &self,
            _program: &Program,
            _args: Value,
            _capabilities: &crate::capability::CapabilityTable,
            _fuel: u64,
            _timeout: Duration,
            _context: &HashMap<String, String>,
        ) -> InterpreterOutcome {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            InterpreterOutcome::default()
        }
    }

    struct PassthroughCompiler;

    impl SkillCompiler for PassthroughCompiler {
        fn compile(&self, source: &str) -> Result<Program, SandboxError> {
            Ok(Program::new(json!({ "source": source })))
        }
    }

    fn skill(name: &str, level: TrustLevel) -> LoadedSkill {
        LoadedSkill {
            manifest: crate::skill::SkillManifest {
                name: name.to_string(),
                description: String::new(),
                version: None,
                trust_level: Some(level),
                capabilities: Vec::new(),
                input_schema: None,
                output_schema: None,
                source: None,
            },
            source: "1".to_string(),
            program: Program::new(json!({ "source": "1" })),
            trust_level: level,
        }
    }

    fn executor(interpreter: Arc<dyn Interpreter>) -> Executor {
        Executor::new(interpreter, Arc::new(PassthroughCompiler), ExecutorConfig::default())
    }

    fn context(dir: &Path, provenance: Provenance) -> ExecutionContext {
        ExecutionContext::new(provenance, dir)
    }

    // ── happy path ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_successful_execution() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(EchoInterpreter::new());
        let result = exec
            .execute(
                &skill("echo", TrustLevel::Read),
                json!({ "q": 1 }),
                &context(dir.path(), Provenance::Main),
            )
            .await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.fuel_used, 7);
        let value = result.value.unwrap();
        assert_eq!(value["args"]["q"], 1);
        assert_eq!(value["fuel_granted"], 500);
        assert_eq!(value["context"]["trust_level"], "read");
        assert_eq!(value["context"]["provenance"], "main");
    }

    #[tokio::test]
    async fn test_capability_table_matches_level() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(EchoInterpreter::new());
        let result = exec
            .execute(
                &skill("probe", TrustLevel::Network),
                json!({}),
                &context(dir.path(), Provenance::Main),
            )
            .await;
        assert_eq!(result.value.unwrap()["capabilities"], json!(["fetch"]));
    }

    // ── trust ceiling ───────────────────────────────────────────

    #[tokio::test]
    async fn test_public_shell_skill_denied_before_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = EchoInterpreter::new();
        let exec = executor(interpreter.clone());

        let result = exec
            .execute(
                &skill("dangerous", TrustLevel::Shell),
                json!({}),
                &context(dir.path(), Provenance::Public),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(SandboxError::TrustDenied));
        assert_eq!(interpreter.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trust_denied_hook_fires() {
        let dir = tempfile::tempdir().unwrap();
        let denied: Arc<parking_lot::Mutex<Vec<String>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = denied.clone();
        let exec = executor(EchoInterpreter::new()).with_hooks(ExecutorHooks {
            on_trust_denied: Some(Arc::new(move |name, level, provenance| {
                sink.lock()
                    .push(format!("{name}:{}:{provenance:?}", level.as_str()));
            })),
            ..ExecutorHooks::default()
        });

        exec.execute(
            &skill("dangerous", TrustLevel::Full),
            json!({}),
            &context(dir.path(), Provenance::Group),
        )
        .await;
        assert_eq!(denied.lock().as_slice(), ["dangerous:full:Group"]);
    }

    #[tokio::test]
    async fn test_operator_trust_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExecutorConfig::default();
        config
            .trust_overrides
            .insert("declared-full".to_string(), TrustLevel::Read);
        let exec = Executor::new(
            EchoInterpreter::new(),
            Arc::new(PassthroughCompiler),
            config,
        );

        // Declared full, overridden down to read: admissible from a DM.
        let result = exec
            .execute(
                &skill("declared-full", TrustLevel::Full),
                json!({}),
                &context(dir.path(), Provenance::Dm),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.value.unwrap()["context"]["trust_level"], "read");
    }

    // ── rate limiting ───────────────────────────────────────────

    #[tokio::test]
    async fn test_self_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = EchoInterpreter::new();
        let limiter = Arc::new(RateLimiter::new(
            RateLimiterConfig::default_public().self_id("bot-1"),
        ));
        let exec = executor(interpreter.clone()).with_limiter(limiter.clone());

        let ctx = context(dir.path(), Provenance::Dm).requester("BOT-1");
        let result = exec.execute(&skill("any", TrustLevel::None), json!({}), &ctx).await;

        assert!(!result.success);
        assert_eq!(result.rate_limit_reason, Some(RejectReason::SelfMessage));
        assert_eq!(interpreter.invocations.load(Ordering::SeqCst), 0);
        // No counters were touched.
        assert_eq!(limiter.stats().global_window_len, 0);
    }

    #[tokio::test]
    async fn test_record_end_runs_on_success_and_denial() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default_public()));
        let exec = executor(EchoInterpreter::new()).with_limiter(limiter.clone());

        let ctx = context(dir.path(), Provenance::Public).requester("u1");
        // One success, one trust denial: both exit paths must release
        // their concurrency slot.
        exec.execute(&skill("ok", TrustLevel::None), json!({}), &ctx).await;
        exec.execute(&skill("high", TrustLevel::Full), json!({}), &ctx).await;

        assert_eq!(limiter.stats().global_concurrent, 0);
        assert_eq!(limiter.stats().global_window_len, 2);
    }

    #[tokio::test]
    async fn test_rate_limited_result_carries_retry_after() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            max_requests_per_window: 1,
            cooldown: Duration::from_secs(30),
            ..RateLimiterConfig::default_public()
        }));
        let exec = executor(EchoInterpreter::new()).with_limiter(limiter);
        let ctx = context(dir.path(), Provenance::Dm).requester("u1");

        exec.execute(&skill("s", TrustLevel::None), json!({}), &ctx).await;
        let result = exec.execute(&skill("s", TrustLevel::None), json!({}), &ctx).await;

        assert_eq!(
            result.rate_limit_reason,
            Some(RejectReason::RequesterRateLimit)
        );
        assert!(result.retry_after.unwrap() > Duration::ZERO);
        assert!(matches!(
            result.error,
            Some(SandboxError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_requester_id_skips_rate_limiting() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            max_requests_per_window: 0,
            ..RateLimiterConfig::default_public()
        }));
        let exec = executor(EchoInterpreter::new()).with_limiter(limiter);

        // Anonymous requests (operator-driven) bypass the limiter.
        let result = exec
            .execute(
                &skill("s", TrustLevel::None),
                json!({}),
                &context(dir.path(), Provenance::Main),
            )
            .await;
        assert!(result.success);
    }

    // ── timeout backstop ────────────────────────────────────────

    #[tokio::test]
    async fn test_stuck_interpreter_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig {
            timeout: Some(Duration::from_millis(100)),
            ..ExecutorConfig::default()
        };
        let exec = Executor::new(
            Arc::new(StuckInterpreter),
            Arc::new(PassthroughCompiler),
            config,
        );

        let started = Instant::now();
        let result = exec
            .execute(
                &skill("stuck", TrustLevel::None),
                json!({}),
                &context(dir.path(), Provenance::Main),
            )
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.error, Some(SandboxError::Timeout));
        assert!(!result.success);
    }

    // ── validation, hooks, cache ────────────────────────────────

    #[tokio::test]
    async fn test_empty_program_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(EchoInterpreter::new());
        let mut bad = skill("empty", TrustLevel::None);
        bad.program = Program::new(Value::Null);

        let result = exec
            .execute(&bad, json!({}), &context(dir.path(), Provenance::Main))
            .await;
        assert_eq!(result.error, Some(SandboxError::SkillValidationFailed));
    }

    #[tokio::test]
    async fn test_before_and_after_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let events: Arc<parking_lot::Mutex<Vec<String>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let before = events.clone();
        let after = events.clone();
        let exec = executor(EchoInterpreter::new()).with_hooks(ExecutorHooks {
            on_before_execute: Some(Arc::new(move |name, _ctx| {
                before.lock().push(format!("before:{name}"));
            })),
            on_after_execute: Some(Arc::new(move |name, result| {
                after.lock().push(format!("after:{name}:{}", result.success));
            })),
            ..ExecutorHooks::default()
        });

        exec.execute(
            &skill("observed", TrustLevel::None),
            json!({}),
            &context(dir.path(), Provenance::Main),
        )
        .await;
        assert_eq!(
            events.lock().as_slice(),
            ["before:observed", "after:observed:true"]
        );
    }

    #[tokio::test]
    async fn test_execute_path_caches_and_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.skill");
        std::fs::write(
            &path,
            "---\nname = \"cached\"\ntrust_level = \"none\"\n---\n1\n",
        )
        .unwrap();

        let exec = executor(EchoInterpreter::new());
        let ctx = context(dir.path(), Provenance::Main);

        let first = exec.execute_path(&path, json!({}), &ctx).await;
        assert!(first.success);

        // Delete the file; the cache still serves the skill.
        std::fs::remove_file(&path).unwrap();
        let second = exec.execute_path(&path, json!({}), &ctx).await;
        assert!(second.success);

        // After invalidation the reload fails.
        exec.invalidate(&path);
        let third = exec.execute_path(&path, json!({}), &ctx).await;
        assert!(!third.success);
        assert_eq!(third.error, Some(SandboxError::HostError));
    }

    #[tokio::test]
    async fn test_trace_gated_by_config() {
        struct TracingInterpreter;

        #[async_trait::async_trait]
        impl Interpreter for TracingInterpreter {
            async fn execute(
                &self,
                _program: &Program,
                _args: Value,
                _capabilities: &crate::capability::CapabilityTable,
                _fuel: u64,
                _timeout: Duration,
                _context: &HashMap<String, String>,
            ) -> InterpreterOutcome {
                InterpreterOutcome {
                    value: Some(json!(1)),
                    trace: Some(vec!["op:load".to_string()]),
                    ..InterpreterOutcome::default()
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Provenance::Main);
        let quiet = Executor::new(
            Arc::new(TracingInterpreter),
            Arc::new(PassthroughCompiler),
            ExecutorConfig::default(),
        );
        assert!(quiet
            .execute(&skill("t", TrustLevel::None), json!({}), &ctx)
            .await
            .trace
            .is_none());

        let tracing = Executor::new(
            Arc::new(TracingInterpreter),
            Arc::new(PassthroughCompiler),
            ExecutorConfig {
                enable_trace: true,
                ..ExecutorConfig::default()
            },
        );
        assert_eq!(
            tracing
                .execute(&skill("t", TrustLevel::None), json!({}), &ctx)
                .await
                .trace,
            Some(vec!["op:load".to_string()])
        );
    }
}
