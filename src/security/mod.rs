//! Security pattern catalog — the single place where concrete
//! "what is sensitive" knowledge lives.
//!
//! Three read-only tables, compiled once at startup:
//!
//! 1. Blocked file patterns (credential stores, key material, shell
//!    history) matched against whole paths and individual components.
//! 2. Dangerous path patterns (traversal, absolute system paths,
//!    home-directory references, encoded escapes, null bytes).
//! 3. Dangerous environment variable names and prefixes.
//!
//! Host and IP classification lives in [`hosts`].
//!
//! Classification never fails: input that matches no pattern is simply
//! not blocked. All matching is case-insensitive.

pub mod hosts;

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// One entry of the blocked-file table.
pub struct BlockedPattern {
    regex: Regex,
    pattern: &'static str,
    description: &'static str,
    category: &'static str,
}

/// Result of a catalog lookup. `blocked == false` leaves the other
/// fields empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedCheck {
    pub blocked: bool,
    pub pattern: Option<&'static str>,
    pub description: Option<&'static str>,
    pub category: Option<&'static str>,
}

impl BlockedCheck {
    fn clear() -> Self {
        Self::default()
    }

    fn hit(entry: &BlockedPattern) -> Self {
        Self {
            blocked: true,
            pattern: Some(entry.pattern),
            description: Some(entry.description),
            category: Some(entry.category),
        }
    }
}

macro_rules! blocked {
    ($pattern:literal, $description:literal, $category:literal) => {
        BlockedPattern {
            regex: Regex::new(concat!("(?i)", $pattern)).expect("invalid catalog pattern"),
            pattern: $pattern,
            description: $description,
            category: $category,
        }
    };
}

lazy_static! {
    /// Files whose presence alone is sensitive. Matched against the whole
    /// path and against each path component.
    static ref BLOCKED_FILES: Vec<BlockedPattern> = vec![
        blocked!(r"(^|/)\.env(\.[^/]+)?$", "Environment file", "credentials"),
        blocked!(r"(^|/)\.npmrc$", "npm credentials", "credentials"),
        blocked!(r"(^|/)\.netrc$", "netrc credentials", "credentials"),
        blocked!(r"(^|/)\.pypirc$", "PyPI credentials", "credentials"),
        blocked!(r"(^|/)\.git-credentials$", "Git credential store", "credentials"),
        blocked!(r"credentials?(\.(json|ya?ml|toml|xml|ini))?$", "Credential file", "credentials"),
        blocked!(r"secrets?\.(json|ya?ml|toml|xml|ini)$", "Secrets file", "credentials"),
        blocked!(r"(^|/)(apikeys?|api[-_]keys?)(\.[^/]+)?$", "API key file", "credentials"),
        blocked!(r"(^|/)id_(rsa|dsa|ecdsa|ed25519)(\.pub)?$", "SSH key", "keys"),
        blocked!(r"\.(pem|key|p12|pfx|jks|keystore)$", "Key material", "keys"),
        blocked!(r"(^|/)\.ssh(/|$)", "SSH directory", "keys"),
        blocked!(r"(^|/)\.gnupg(/|$)", "GnuPG directory", "keys"),
        blocked!(r"(^|/)\.aws(/|$)", "AWS configuration", "cloud"),
        blocked!(r"(^|/)\.kube(/|$)", "Kubernetes configuration", "cloud"),
        blocked!(r"(^|/)\.azure(/|$)", "Azure configuration", "cloud"),
        blocked!(r"(^|/)\.docker/config\.json$", "Docker registry auth", "cloud"),
        blocked!(r"(^|/)(passwd|shadow|sudoers)$", "System account database", "system"),
        blocked!(r"(^|/)\.(bash|zsh|sh)_history$", "Shell history", "history"),
        blocked!(r"(^|/)\.histfile$", "Shell history", "history"),
        blocked!(r"wallet\.dat$", "Wallet file", "credentials"),
        blocked!(r"(^|/)(keychain|login)\.keychain(-db)?$", "Keychain database", "credentials"),
        blocked!(r"(^|/)\.mozilla/.*/(key4|logins)\.", "Browser credential store", "credentials"),
    ];

    /// Path shapes that are refused before any resolution happens.
    static ref DANGEROUS_PATHS: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r"(^|[/\\])\.\.([/\\]|$)").expect("invalid catalog pattern"),
            "Dangerous path pattern",
        ),
        (
            Regex::new(r"(?i)^/(etc|proc|sys|dev|boot|root)(/|$)").expect("invalid catalog pattern"),
            "Absolute system path",
        ),
        (
            Regex::new(r"(?i)^/(var/log|var/run)(/|$)").expect("invalid catalog pattern"),
            "Absolute system path",
        ),
        (
            Regex::new(r"(?i)^[a-z]:[/\\]windows([/\\]|$)").expect("invalid catalog pattern"),
            "Absolute system path",
        ),
        (
            Regex::new(r"(^|[/\\])~([/\\]|$)|^~").expect("invalid catalog pattern"),
            "Home directory reference",
        ),
        (
            Regex::new(r"(?i)\$\{?HOME\}?").expect("invalid catalog pattern"),
            "Home directory reference",
        ),
        (
            Regex::new(r"(?i)%2e%2e|%252e").expect("invalid catalog pattern"),
            "Encoded path traversal",
        ),
        (
            Regex::new(r"\x00|%00").expect("invalid catalog pattern"),
            "Null byte in path",
        ),
    ];

    /// Environment variables never forwarded to child processes.
    static ref DANGEROUS_ENV: Vec<&'static str> = vec![
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "AZURE_CLIENT_SECRET",
        "GOOGLE_APPLICATION_CREDENTIALS",
        "GITHUB_TOKEN",
        "GH_TOKEN",
        "GITLAB_TOKEN",
        "NPM_TOKEN",
        "CARGO_REGISTRY_TOKEN",
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
        "DATABASE_URL",
        "SSH_AUTH_SOCK",
        "GPG_AGENT_INFO",
    ];
}

/// Environment variable prefixes that change loader behavior.
const DANGEROUS_ENV_PREFIXES: [&str; 2] = ["LD_", "DYLD_"];

/// Checks a path against the dangerous-path table first, then the
/// blocked-file table. First match wins. The blocked-file table is run
/// against the whole path and against each component, so `foo/.env/bar`
/// and a bare `credentials.json` are both caught.
pub fn is_blocked(path: &str) -> BlockedCheck {
    for (regex, description) in DANGEROUS_PATHS.iter() {
        if regex.is_match(path) {
            return BlockedCheck {
                blocked: true,
                pattern: Some(regex.as_str()),
                description: Some(description),
                category: Some("dangerous_path"),
            };
        }
    }

    let normalized = path.replace('\\', "/");
    for entry in BLOCKED_FILES.iter() {
        if entry.regex.is_match(&normalized) {
            return BlockedCheck::hit(entry);
        }
        for component in normalized.split('/') {
            if !component.is_empty() && entry.regex.is_match(component) {
                return BlockedCheck::hit(entry);
            }
        }
    }

    BlockedCheck::clear()
}

/// Returns true if the environment variable must not reach a child
/// process: enumerated names, the `LD_`/`DYLD_` loader prefixes, and the
/// exact name `PATH` (the shell capability injects its own).
pub fn is_dangerous_env(name: &str) -> bool {
    let upper = name.to_uppercase();
    if upper == "PATH" {
        return true;
    }
    if DANGEROUS_ENV_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return true;
    }
    DANGEROUS_ENV.iter().any(|v| *v == upper)
}

/// Keyed filter over an environment map. Idempotent:
/// `sanitize_env(sanitize_env(e)) == sanitize_env(e)`.
pub fn sanitize_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .filter(|(name, _)| !is_dangerous_env(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
