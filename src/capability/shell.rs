//! Shell capability — allowlisted commands, validated arguments, jailed
//! working directory, time- and output-bounded execution.
//!
//! Nothing here ever invokes a shell interpreter: `run` lexes the
//! command line itself and refuses shell meta-characters outright, and
//! the child is spawned directly with an argv. Every spawn enters a new
//! process group so a timeout can take down the whole descendant tree,
//! not just the immediate child.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::security;

use super::process::{kill_tree, new_process_group, DEFAULT_GRACE};
use super::{normalize_lexically, BlockedHook};

/// Default wall-clock limit for one command.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default combined stdout+stderr cap: 1 MiB.
const DEFAULT_MAX_OUTPUT: u64 = 1024 * 1024;

/// How often the wait loop polls for exit, overflow and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Characters that turn a token into shell syntax. Any token carrying
/// one of these is refused by `run`.
const META_CHARS: [char; 14] = [
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '\\',
];

/// Environment handed to every child, before per-command additions.
const BASE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Hook fired before a spawn: `(binary, args)`.
pub type BeforeExecHook = Arc<dyn Fn(&str, &[String]) + Send + Sync>;

/// Hook fired after a completed spawn: `(binary, exit_code)`.
pub type AfterExecHook = Arc<dyn Fn(&str, i32) + Send + Sync>;

/// One allowlist entry.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    /// When present and `strict_args` is set, every argument must match
    /// at least one of these.
    pub arg_patterns: Vec<Regex>,
    /// With no `arg_patterns`, refuses any argument at all.
    pub strict_args: bool,
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub max_output_bytes: Option<u64>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_patterns: Vec::new(),
            strict_args: false,
            workdir: None,
            env: HashMap::new(),
            timeout: None,
            max_output_bytes: None,
        }
    }

    pub fn arg_pattern(mut self, pattern: Regex) -> Self {
        self.arg_patterns.push(pattern);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_args = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn max_output(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }
}

/// Construction parameters for [`ShellCapability`].
#[derive(Clone)]
pub struct ShellConfig {
    pub workdir: PathBuf,
    pub commands: Vec<CommandSpec>,
    /// Extra refusal patterns over non-flag arguments, on top of the
    /// security catalog.
    pub extra_blocked_paths: Vec<Regex>,
    pub timeout: Duration,
    pub max_output_bytes: u64,
}

impl ShellConfig {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            commands: Vec::new(),
            extra_blocked_paths: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    /// Read-only text utilities safe to offer untrusted skills by
    /// default. Anything that can write, spawn or evaluate stays out.
    pub fn default_allowlist() -> Vec<CommandSpec> {
        ["echo", "ls", "cat", "head", "tail", "wc", "grep", "sort", "uniq", "date", "pwd"]
            .into_iter()
            .map(CommandSpec::new)
            .collect()
    }
}

/// Result of a completed command.
#[derive(Debug, Clone, Serialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Shell capability bound to one working directory and one allowlist.
pub struct ShellCapability {
    config: ShellConfig,
    workdir: PathBuf,
    on_before_exec: Option<BeforeExecHook>,
    on_after_exec: Option<AfterExecHook>,
    on_blocked: Option<BlockedHook>,
}

/// Splits a command line on whitespace, honoring single and double
/// quotes. Returns `None` on an unbalanced quote.
fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if quote.is_some() {
        return None;
    }
    if in_token {
        tokens.push(current);
    }
    Some(tokens)
}

fn contains_meta(token: &str) -> bool {
    token.chars().any(|c| META_CHARS.contains(&c))
}

/// Heuristic for "this argument names a file": worth a jail check.
fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || arg.starts_with('.') || arg.starts_with('~')
}

impl ShellCapability {
    /// Builds the capability. The working directory must exist; it is
    /// canonicalized once.
    pub fn new(config: ShellConfig) -> anyhow::Result<Self> {
        let workdir = std::fs::canonicalize(&config.workdir)?;
        Ok(Self {
            config,
            workdir,
            on_before_exec: None,
            on_after_exec: None,
            on_blocked: None,
        })
    }

    pub fn on_before_exec(mut self, hook: BeforeExecHook) -> Self {
        self.on_before_exec = Some(hook);
        self
    }

    pub fn on_after_exec(mut self, hook: AfterExecHook) -> Self {
        self.on_after_exec = Some(hook);
        self
    }

    pub fn on_blocked(mut self, hook: BlockedHook) -> Self {
        self.on_blocked = Some(hook);
        self
    }

    fn refuse(&self, op: &str, target: &str, reason: &str) -> CapabilityError {
        warn!(op, target, reason, "shell operation blocked");
        if let Some(hook) = &self.on_blocked {
            hook(op, target, reason);
        }
        CapabilityError::shell()
    }

    /// Parses and executes a command line. Quote-aware lexing only —
    /// any token carrying shell syntax is refused, never interpreted.
    pub async fn run(&self, command_line: &str) -> Result<ShellOutput, CapabilityError> {
        let tokens = match tokenize(command_line) {
            Some(tokens) if !tokens.is_empty() => tokens,
            Some(_) => return Err(self.refuse("run", command_line, "Empty command")),
            None => return Err(self.refuse("run", command_line, "Unbalanced quotes")),
        };

        for token in &tokens {
            if contains_meta(token) {
                return Err(self.refuse("run", command_line, "Shell metacharacters"));
            }
        }

        let binary = tokens[0].clone();
        let args = tokens[1..].to_vec();
        self.exec(&binary, &args).await
    }

    /// Executes an allowlisted binary with pre-split arguments,
    /// bypassing the command-line parser. Arguments still go through the
    /// full path taxonomy; they are passed as an argv and never reach a
    /// shell, so meta-characters in them are inert.
    pub async fn exec(&self, binary: &str, args: &[String]) -> Result<ShellOutput, CapabilityError> {
        if binary.contains('/') || binary.contains('\\') {
            return Err(self.refuse("exec", binary, "Binary must be a bare name"));
        }
        let spec = self
            .config
            .commands
            .iter()
            .find(|c| c.name == binary)
            .cloned()
            .ok_or_else(|| self.refuse("exec", binary, "Command not in allowlist"))?;

        self.validate_args(&spec, args)?;
        self.spawn(&spec, args).await
    }

    fn validate_args(&self, spec: &CommandSpec, args: &[String]) -> Result<(), CapabilityError> {
        if spec.strict_args && spec.arg_patterns.is_empty() && !args.is_empty() {
            return Err(self.refuse("exec", &spec.name, "Unexpected arguments"));
        }

        for arg in args {
            if arg.contains('\0') {
                return Err(self.refuse("exec", arg, "Null byte in argument"));
            }

            let is_flag = arg.starts_with('-');
            if !is_flag {
                // The catalog covers traversal, absolute system paths,
                // home references, encoded escapes and sensitive file
                // names — `credentials.json` is refused even though it
                // does not look like a path.
                let check = security::is_blocked(arg);
                if check.blocked {
                    let reason = check.description.unwrap_or("Blocked argument");
                    return Err(self.refuse("exec", arg, reason));
                }
                for pattern in &self.config.extra_blocked_paths {
                    if pattern.is_match(arg) {
                        return Err(self.refuse("exec", arg, "Blocked argument"));
                    }
                }
                if looks_like_path(arg) && !self.contained_in_workdir(arg) {
                    return Err(self.refuse("exec", arg, "Path escapes working directory"));
                }
            }

            if spec.strict_args && !spec.arg_patterns.is_empty() {
                let matched = spec.arg_patterns.iter().any(|p| p.is_match(arg));
                if !matched {
                    return Err(self.refuse("exec", arg, "Argument rejected by pattern"));
                }
            }
        }
        Ok(())
    }

    /// Lexical containment check for path-looking arguments. The file
    /// need not exist; this only rules out escapes by shape.
    fn contained_in_workdir(&self, arg: &str) -> bool {
        let candidate = Path::new(arg);
        let resolved = if candidate.is_absolute() {
            normalize_lexically(candidate)
        } else {
            normalize_lexically(&self.workdir.join(candidate))
        };
        match resolved.strip_prefix(&self.workdir) {
            Ok(offset) => offset.components().next() != Some(Component::ParentDir),
            Err(_) => false,
        }
    }

    async fn spawn(&self, spec: &CommandSpec, args: &[String]) -> Result<ShellOutput, CapabilityError> {
        let workdir = spec.workdir.as_deref().unwrap_or(&self.workdir);
        let effective_timeout = spec.timeout.unwrap_or(self.config.timeout);
        let cap = spec.max_output_bytes.unwrap_or(self.config.max_output_bytes);

        if let Some(hook) = &self.on_before_exec {
            hook(&spec.name, args);
        }
        debug!(binary = %spec.name, ?args, "spawning command");

        let mut cmd = Command::new(&spec.name);
        cmd.args(args)
            .current_dir(workdir)
            .env_clear()
            .env("PATH", BASE_PATH)
            // HOME points into the jail so tilde expansion inside the
            // child resolves somewhere harmless.
            .env("HOME", &self.workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in &spec.env {
            cmd.env(name, value);
        }
        new_process_group(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|_| self.refuse("exec", &spec.name, "Spawn failed"))?;

        let total = Arc::new(AtomicU64::new(0));
        let overflow = Arc::new(AtomicBool::new(false));
        let stdout_task = drain(child.stdout.take(), total.clone(), cap, overflow.clone());
        let stderr_task = drain(child.stderr.take(), total.clone(), cap, overflow.clone());

        let deadline = Instant::now() + effective_timeout;
        let mut exit_status = None;
        let mut failure: Option<&'static str> = None;

        loop {
            if overflow.load(Ordering::SeqCst) {
                kill_tree(&mut child, DEFAULT_GRACE).await;
                failure = Some("Output limit exceeded");
                break;
            }
            if Instant::now() >= deadline {
                kill_tree(&mut child, DEFAULT_GRACE).await;
                failure = Some("Timeout");
                break;
            }
            match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
                Ok(Ok(status)) => {
                    exit_status = Some(status);
                    break;
                }
                Ok(Err(_)) => {
                    failure = Some("Wait failed");
                    break;
                }
                Err(_) => {} // still running
            }
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if let Some(reason) = failure {
            return Err(self.refuse("exec", &spec.name, reason));
        }

        let exit_code = exit_status.and_then(|s| s.code()).unwrap_or(-1);
        if let Some(hook) = &self.on_after_exec {
            hook(&spec.name, exit_code);
        }

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }
}

/// Reads a child pipe to completion, stopping early when the shared
/// byte counter crosses the cap. The cap is enforced mid-stream, not
/// only on completion.
fn drain<R>(
    stream: Option<R>,
    total: Arc<AtomicU64>,
    cap: u64,
    overflow: Arc<AtomicBool>,
) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut out = Vec::new();
        let Some(mut stream) = stream else {
            return out;
        };
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let so_far = total.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
                    if so_far > cap {
                        overflow.store(true, Ordering::SeqCst);
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
            }
        }
        out
    })
}
