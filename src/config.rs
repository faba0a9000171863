//! Operator-facing sandbox policy file.
//!
//! The host loads a TOML document describing the deployment's policy —
//! rate-limit profile, fetch host lists, shell allowlist entries,
//! LLM budgets, per-skill trust overrides — and turns it into the typed
//! configurations the executor consumes. Values support `${ENV_VAR}`
//! substitution so secrets and machine-specific paths stay out of the
//! file.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;

use crate::capability::{CommandSpec, FetchConfig, LlmConfig, ShellConfig};
use crate::executor::ExecutorConfig;
use crate::policy::{PolicyConfig, TrustLevel};
use crate::ratelimit::RateLimiterConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub ratelimit: RateLimitSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub shell: ShellSection,
    /// Per-skill trust-level overrides, keyed by skill name.
    #[serde(default)]
    pub trust_overrides: HashMap<String, TrustLevel>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExecutorSection {
    #[serde(default)]
    pub enable_trace: bool,
    /// Overrides the per-level fuel budget when set.
    pub fuel: Option<u64>,
    /// Overrides the per-level timeout when set.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSection {
    /// Base profile: "public" or "strict".
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub self_ids: Vec<String>,
    pub max_requests_per_window: Option<usize>,
    pub max_global_requests_per_window: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub max_global_concurrent: Option<usize>,
    pub cooldown_secs: Option<u64>,
}

fn default_profile() -> String {
    "public".to_string()
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            self_ids: Vec::new(),
            max_requests_per_window: None,
            max_global_requests_per_window: None,
            max_concurrent: None,
            max_global_concurrent: None,
            cooldown_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FetchSection {
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
    pub schemes: Option<Vec<String>>,
    pub max_response_bytes: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub requests_per_minute: Option<usize>,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmSection {
    pub max_tokens_per_request: Option<u32>,
    pub session_token_budget: Option<u64>,
    pub session_request_cap: Option<u64>,
    #[serde(default)]
    pub blocked_prompt_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShellSection {
    /// Whether to start from the built-in read-only allowlist.
    #[serde(default = "default_true")]
    pub default_allowlist: bool,
    #[serde(default)]
    pub commands: Vec<CommandEntry>,
}

fn default_true() -> bool {
    true
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            default_allowlist: true,
            commands: Vec::new(),
        }
    }
}

/// One shell allowlist entry as written in the policy file.
#[derive(Debug, Deserialize, Clone)]
pub struct CommandEntry {
    pub name: String,
    /// Argument patterns as regex strings.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub strict: bool,
    pub timeout_secs: Option<u64>,
    pub max_output_bytes: Option<u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandEntry {
    fn to_spec(&self) -> anyhow::Result<CommandSpec> {
        let mut spec = CommandSpec::new(&self.name);
        for pattern in &self.args {
            spec = spec.arg_pattern(Regex::new(pattern)?);
        }
        if self.strict {
            spec = spec.strict();
        }
        if let Some(secs) = self.timeout_secs {
            spec = spec.timeout(std::time::Duration::from_secs(secs));
        }
        if let Some(bytes) = self.max_output_bytes {
            spec = spec.max_output(bytes);
        }
        for (name, value) in &self.env {
            spec = spec.env(name, value);
        }
        Ok(spec)
    }
}

impl SandboxConfig {
    /// Loads the policy file, expanding `${ENV_VAR}` references.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = shellexpand::env(&content)?;
        let config: SandboxConfig = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// The capability-assembly policy this file describes.
    pub fn policy(&self) -> anyhow::Result<PolicyConfig> {
        let mut shell_commands = if self.shell.default_allowlist {
            ShellConfig::default_allowlist()
        } else {
            Vec::new()
        };
        for entry in &self.shell.commands {
            let spec = entry.to_spec()?;
            shell_commands.retain(|c| c.name != spec.name);
            shell_commands.push(spec);
        }

        let mut fetch = FetchConfig {
            allowed_hosts: self.fetch.allowed_hosts.clone(),
            ..FetchConfig::default()
        };
        fetch
            .blocked_hosts
            .extend(self.fetch.blocked_hosts.iter().cloned());
        if let Some(schemes) = &self.fetch.schemes {
            fetch.allowed_schemes = schemes.clone();
        }
        if let Some(bytes) = self.fetch.max_response_bytes {
            fetch.max_response_bytes = bytes;
        }
        if let Some(secs) = self.fetch.timeout_secs {
            fetch.timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(limit) = self.fetch.requests_per_minute {
            fetch.max_requests_per_minute = limit;
        }
        fetch.default_headers.extend(
            self.fetch
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut llm = LlmConfig::default();
        if let Some(cap) = self.llm.max_tokens_per_request {
            llm.max_tokens_per_request = cap;
        }
        if let Some(budget) = self.llm.session_token_budget {
            llm.session_token_budget = budget;
        }
        if let Some(cap) = self.llm.session_request_cap {
            llm.session_request_cap = cap;
        }
        for pattern in &self.llm.blocked_prompt_patterns {
            llm.blocked_prompt_patterns.push(Regex::new(pattern)?);
        }

        Ok(PolicyConfig {
            shell_commands,
            fetch,
            llm,
        })
    }

    /// The executor configuration this file describes.
    pub fn executor_config(&self) -> anyhow::Result<ExecutorConfig> {
        Ok(ExecutorConfig {
            fuel: self.executor.fuel,
            timeout: self
                .executor
                .timeout_secs
                .map(std::time::Duration::from_secs),
            enable_trace: self.executor.enable_trace,
            trust_overrides: self.trust_overrides.clone(),
            capability_overrides: HashMap::new(),
            policy: self.policy()?,
        })
    }

    /// The rate-limiter configuration this file describes.
    pub fn rate_limiter(&self) -> RateLimiterConfig {
        let mut config = match self.ratelimit.profile.as_str() {
            "strict" => RateLimiterConfig::strict(),
            _ => RateLimiterConfig::default_public(),
        };
        config.self_ids = self.ratelimit.self_ids.clone();
        if let Some(v) = self.ratelimit.max_requests_per_window {
            config.max_requests_per_window = v;
        }
        if let Some(v) = self.ratelimit.max_global_requests_per_window {
            config.max_global_requests_per_window = v;
        }
        if let Some(v) = self.ratelimit.max_concurrent {
            config.max_concurrent = v;
        }
        if let Some(v) = self.ratelimit.max_global_concurrent {
            config.max_global_concurrent = v;
        }
        if let Some(secs) = self.ratelimit.cooldown_secs {
            config.cooldown = std::time::Duration::from_secs(secs);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[executor]
enable_trace = true
timeout_secs = 45

[ratelimit]
profile = "strict"
self_ids = ["bot@example.com"]
max_concurrent = 3

[fetch]
allowed_hosts = ["*.example.com", "api.partner.io"]
schemes = ["https"]
requests_per_minute = 30

[llm]
session_token_budget = 50000

[shell]
default_allowlist = true

[[shell.commands]]
name = "git"
args = ["^(status|log|diff)$", "^--[a-z-]+$"]
strict = true
timeout_secs = 10

[trust_overrides]
scraper = "network"
"#;

    #[test]
    fn test_parse_sample() {
        let config: SandboxConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.executor.enable_trace);
        assert_eq!(config.executor.timeout_secs, Some(45));
        assert_eq!(config.ratelimit.profile, "strict");
        assert_eq!(config.fetch.allowed_hosts.len(), 2);
        assert_eq!(config.llm.session_token_budget, Some(50000));
        assert_eq!(config.shell.commands.len(), 1);
        assert_eq!(
            config.trust_overrides.get("scraper"),
            Some(&TrustLevel::Network)
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: SandboxConfig = toml::from_str("").unwrap();
        assert!(!config.executor.enable_trace);
        assert_eq!(config.ratelimit.profile, "public");
        assert!(config.shell.default_allowlist);
        let limiter = config.rate_limiter();
        assert_eq!(limiter.max_requests_per_window, 10);
    }

    #[test]
    fn test_rate_limiter_profile_and_overrides() {
        let config: SandboxConfig = toml::from_str(SAMPLE).unwrap();
        let limiter = config.rate_limiter();
        // Strict base with one field overridden.
        assert_eq!(limiter.max_requests_per_window, 5);
        assert_eq!(limiter.max_concurrent, 3);
        assert_eq!(limiter.self_ids, vec!["bot@example.com"]);
    }

    #[test]
    fn test_policy_conversion() {
        let config: SandboxConfig = toml::from_str(SAMPLE).unwrap();
        let policy = config.policy().unwrap();

        assert_eq!(policy.fetch.allowed_hosts.len(), 2);
        assert_eq!(policy.fetch.max_requests_per_minute, 30);
        assert_eq!(policy.llm.session_token_budget, 50000);

        // git is appended to the default allowlist, with its patterns.
        let git = policy
            .shell_commands
            .iter()
            .find(|c| c.name == "git")
            .unwrap();
        assert!(git.strict_args);
        assert_eq!(git.arg_patterns.len(), 2);
        assert!(policy.shell_commands.iter().any(|c| c.name == "echo"));
    }

    #[test]
    fn test_custom_entry_replaces_default() {
        let doc = r#"
[[shell.commands]]
name = "echo"
strict = true
"#;
        let config: SandboxConfig = toml::from_str(doc).unwrap();
        let policy = config.policy().unwrap();
        let echoes: Vec<_> = policy
            .shell_commands
            .iter()
            .filter(|c| c.name == "echo")
            .collect();
        assert_eq!(echoes.len(), 1);
        assert!(echoes[0].strict_args);
    }

    #[test]
    fn test_bad_arg_pattern_fails() {
        let doc = r#"
[[shell.commands]]
name = "git"
args = ["["]
"#;
        let config: SandboxConfig = toml::from_str(doc).unwrap();
        assert!(config.policy().is_err());
    }

    #[test]
    fn test_executor_config_conversion() {
        let config: SandboxConfig = toml::from_str(SAMPLE).unwrap();
        let exec = config.executor_config().unwrap();
        assert!(exec.enable_trace);
        assert_eq!(exec.timeout, Some(std::time::Duration::from_secs(45)));
        assert_eq!(exec.fuel, None);
        assert_eq!(
            exec.trust_overrides.get("scraper"),
            Some(&TrustLevel::Network)
        );
    }

    #[test]
    fn test_env_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::env::set_var("SANDBOX_TEST_SELF_ID", "agent@host");
        std::fs::write(
            &path,
            "[ratelimit]\nself_ids = [\"${SANDBOX_TEST_SELF_ID}\"]\n",
        )
        .unwrap();

        let config = SandboxConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.ratelimit.self_ids, vec!["agent@host"]);
    }
}
