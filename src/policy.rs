//! Trust-level policy: the ladder of authority, provenance ceilings,
//! execution budgets, and capability-set assembly.
//!
//! Levels form a strict total order; each one extends the previous
//! level's capability set. `full` relaxes writes and deletes but still
//! enforces the shell allowlist — there is no level at which untrusted
//! code reaches an unrestricted shell.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{
    CapabilityTable, CommandSpec, FetchCapability, FetchConfig, FsCapability, FsConfig,
    LlmBackend, LlmCapability, LlmConfig, ShellCapability, ShellConfig,
};
use crate::error::SandboxError;

/// The seven-rung trust ladder. Declaration order is authority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    None,
    Network,
    Read,
    Llm,
    Write,
    Shell,
    Full,
}

impl TrustLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::None => "none",
            TrustLevel::Network => "network",
            TrustLevel::Read => "read",
            TrustLevel::Llm => "llm",
            TrustLevel::Write => "write",
            TrustLevel::Shell => "shell",
            TrustLevel::Full => "full",
        }
    }

    /// Interpreter fuel budget for this level.
    pub fn fuel_budget(self) -> u64 {
        match self {
            TrustLevel::None => 100,
            TrustLevel::Network => 500,
            TrustLevel::Read => 500,
            TrustLevel::Llm => 2000,
            TrustLevel::Write => 1000,
            TrustLevel::Shell => 2000,
            TrustLevel::Full => 5000,
        }
    }

    /// Wall-clock budget for this level.
    pub fn timeout(self) -> Duration {
        let secs = match self {
            TrustLevel::None => 5,
            TrustLevel::Network => 30,
            TrustLevel::Read => 15,
            TrustLevel::Llm => 120,
            TrustLevel::Write => 30,
            TrustLevel::Shell => 60,
            TrustLevel::Full => 300,
        };
        Duration::from_secs(secs)
    }
}

impl FromStr for TrustLevel {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TrustLevel::None),
            "network" => Ok(TrustLevel::Network),
            "read" => Ok(TrustLevel::Read),
            "llm" => Ok(TrustLevel::Llm),
            "write" => Ok(TrustLevel::Write),
            "shell" => Ok(TrustLevel::Shell),
            "full" => Ok(TrustLevel::Full),
            _ => Err(SandboxError::SkillValidationFailed),
        }
    }
}

/// Who initiated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The local operator.
    Main,
    /// A direct message.
    Dm,
    /// A group chat.
    Group,
    /// An open public channel.
    Public,
}

impl Provenance {
    /// The highest trust level this provenance may run.
    pub fn ceiling(self) -> TrustLevel {
        match self {
            Provenance::Main => TrustLevel::Full,
            Provenance::Dm => TrustLevel::Write,
            Provenance::Group => TrustLevel::Llm,
            Provenance::Public => TrustLevel::Network,
        }
    }
}

/// Refuses a (level, provenance) pair above the ceiling. Runs before
/// the interpreter is ever invoked.
pub fn check_ceiling(level: TrustLevel, provenance: Provenance) -> Result<(), SandboxError> {
    if level > provenance.ceiling() {
        return Err(SandboxError::TrustDenied);
    }
    Ok(())
}

/// Maps capability-name strings (from a manifest, a source sweep, or a
/// compiler-emitted set) to the minimum trust level that satisfies them.
pub fn infer_trust_level<I, S>(capabilities: I) -> TrustLevel
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut level = TrustLevel::None;
    for capability in capabilities {
        let name = capability.as_ref().to_lowercase();
        let needed = if ["exec", "spawn", "shell"].iter().any(|k| name.contains(k)) {
            TrustLevel::Shell
        } else if ["write", "delete", "mkdir"].iter().any(|k| name.contains(k)) {
            TrustLevel::Write
        } else if ["llm", "predict", "embed"].iter().any(|k| name.contains(k)) {
            TrustLevel::Llm
        } else if ["read", "list", "stat", "exists", "fs"]
            .iter()
            .any(|k| name.contains(k))
        {
            TrustLevel::Read
        } else if ["fetch", "http", "network"].iter().any(|k| name.contains(k)) {
            TrustLevel::Network
        } else {
            TrustLevel::None
        };
        level = level.max(needed);
    }
    level
}

/// Execution context a host hands in per call.
#[derive(Clone)]
pub struct ExecutionContext {
    pub provenance: Provenance,
    pub requester_id: Option<String>,
    pub channel_id: Option<String>,
    /// Jail root for filesystem and shell capabilities.
    pub workdir: PathBuf,
    /// Host patterns added to the fetch capability's allowed set.
    pub allowed_hosts: Vec<String>,
    /// Sub-directories writes are confined to below `full`.
    pub writable_subdirs: Vec<String>,
    /// Allowlist entries added on top of the configured commands.
    /// A same-named entry replaces the configured one.
    pub extra_commands: Vec<CommandSpec>,
    pub llm: Option<Arc<dyn LlmBackend>>,
    /// Free-form fields propagated to the skill.
    pub metadata: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(provenance: Provenance, workdir: impl Into<PathBuf>) -> Self {
        Self {
            provenance,
            requester_id: None,
            channel_id: None,
            workdir: workdir.into(),
            allowed_hosts: Vec::new(),
            writable_subdirs: Vec::new(),
            extra_commands: Vec::new(),
            llm: None,
            metadata: HashMap::new(),
        }
    }

    pub fn requester(mut self, id: impl Into<String>) -> Self {
        self.requester_id = Some(id.into());
        self
    }

    pub fn channel(mut self, id: impl Into<String>) -> Self {
        self.channel_id = Some(id.into());
        self
    }

    pub fn allow_host(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_hosts.push(pattern.into());
        self
    }

    pub fn llm_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.llm = Some(backend);
        self
    }
}

/// Deployment-wide capability configuration consumed during assembly.
#[derive(Clone)]
pub struct PolicyConfig {
    /// Shell allowlist offered at `shell` and above.
    pub shell_commands: Vec<CommandSpec>,
    /// Base fetch configuration; context hosts are appended.
    pub fetch: FetchConfig,
    pub llm: LlmConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            shell_commands: ShellConfig::default_allowlist(),
            fetch: FetchConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Assembles the capability table for one trust level.
///
/// Assembly is monotonic: each level starts from the prior level's set
/// and adds or relaxes exactly one concern.
pub fn assemble(
    level: TrustLevel,
    ctx: &ExecutionContext,
    policy: &PolicyConfig,
) -> anyhow::Result<CapabilityTable> {
    let mut table = CapabilityTable::new();

    if level >= TrustLevel::Network {
        let mut config = policy.fetch.clone();
        config.allowed_hosts.extend(ctx.allowed_hosts.iter().cloned());
        table = table.with_fetch(FetchCapability::new(config));
    }

    if level >= TrustLevel::Read {
        let mut config = FsConfig::default();
        if level >= TrustLevel::Write {
            config.allow_write = true;
            config.allow_create = true;
            if !ctx.writable_subdirs.is_empty() && level < TrustLevel::Full {
                config.write_allow_patterns = Some(
                    ctx.writable_subdirs
                        .iter()
                        .map(|d| format!("{}/*", d.trim_end_matches('/')))
                        .collect(),
                );
            }
        }
        if level >= TrustLevel::Full {
            config.allow_delete = true;
        }
        table = table.with_fs(FsCapability::new(&ctx.workdir, config)?);
    }

    if level >= TrustLevel::Llm {
        if let Some(backend) = &ctx.llm {
            table = table.with_llm(LlmCapability::new(backend.clone(), policy.llm.clone()));
        }
    }

    if level >= TrustLevel::Shell {
        let mut config = ShellConfig::new(&ctx.workdir);
        config.commands = policy.shell_commands.clone();
        for extra in &ctx.extra_commands {
            config.commands.retain(|c| c.name != extra.name);
            config.commands.push(extra.clone());
        }
        table = table.with_shell(ShellCapability::new(config)?);
    }

    debug!(level = level.as_str(), capabilities = ?table.names(), "capability table assembled");
    Ok(table)
}
