//! Error taxonomy for the sandbox.
//!
//! Every refusal carries a *kind* and an opaque message. The messages a
//! skill can observe are drawn from a tiny closed vocabulary so that a
//! blocked skill cannot learn *why* it was blocked; the detailed reason
//! travels out-of-band through the capability hooks instead.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque refusal message for filesystem denials.
pub const ACCESS_DENIED: &str = "Access denied";

/// Opaque refusal message for shell denials.
pub const COMMAND_FAILED: &str = "Command failed";

/// Opaque refusal message for fetch and LLM denials.
pub const REQUEST_BLOCKED: &str = "Request blocked";

/// Capability family named in a [`SandboxError::CapabilityRefused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityDomain {
    Fs,
    Shell,
    Fetch,
    Llm,
}

impl fmt::Display for CapabilityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityDomain::Fs => "fs",
            CapabilityDomain::Shell => "shell",
            CapabilityDomain::Fetch => "fetch",
            CapabilityDomain::Llm => "llm",
        };
        f.write_str(s)
    }
}

/// Why the rate limiter refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    SelfMessage,
    RequesterCooldown,
    RequesterConcurrent,
    RequesterRateLimit,
    GlobalConcurrent,
    GlobalRateLimit,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::SelfMessage => "self_message",
            RejectReason::RequesterCooldown => "requester_cooldown",
            RejectReason::RequesterConcurrent => "requester_concurrent",
            RejectReason::RequesterRateLimit => "requester_rate_limit",
            RejectReason::GlobalConcurrent => "global_concurrent",
            RejectReason::GlobalRateLimit => "global_rate_limit",
        };
        f.write_str(s)
    }
}

/// A capability-level refusal: the family that refused plus the opaque
/// message the skill is allowed to see.
///
/// Constructed by the capability implementations; the detailed reason has
/// already been delivered to the relevant `on_blocked` hook by the time
/// one of these exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CapabilityError {
    pub domain: CapabilityDomain,
    pub message: &'static str,
}

impl CapabilityError {
    pub fn fs() -> Self {
        Self {
            domain: CapabilityDomain::Fs,
            message: ACCESS_DENIED,
        }
    }

    pub fn shell() -> Self {
        Self {
            domain: CapabilityDomain::Shell,
            message: COMMAND_FAILED,
        }
    }

    pub fn fetch() -> Self {
        Self {
            domain: CapabilityDomain::Fetch,
            message: REQUEST_BLOCKED,
        }
    }

    pub fn llm() -> Self {
        Self {
            domain: CapabilityDomain::Llm,
            message: REQUEST_BLOCKED,
        }
    }
}

/// Error surfaced to the host in an `ExecutionResult`.
///
/// The host always receives one of these inside a result record — the
/// executor never propagates an error or panics across its boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SandboxError {
    /// The skill manifest or compiled program failed validation.
    #[error("skill validation failed")]
    SkillValidationFailed,

    /// The skill's trust level exceeds the ceiling for its provenance.
    #[error("trust level denied")]
    TrustDenied,

    /// The rate limiter refused the request before execution.
    #[error("rate limited ({reason})")]
    RateLimited {
        reason: RejectReason,
        retry_after: Option<Duration>,
    },

    /// A capability refused an effect during execution.
    #[error("{0}")]
    CapabilityRefused(#[from] CapabilityError),

    /// The interpreter ran out of fuel.
    #[error("fuel exhausted")]
    FuelExhausted,

    /// The wall-clock timeout elapsed.
    #[error("execution timed out")]
    Timeout,

    /// The interpreter reported a program-level failure.
    #[error("interpreter error")]
    InterpreterError,

    /// The host environment failed (I/O, spawn, backend outage).
    #[error("host error")]
    HostError,
}

impl SandboxError {
    /// Short kind tag, stable across releases. Used in logs and results.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::SkillValidationFailed => "skill_validation_failed",
            SandboxError::TrustDenied => "trust_denied",
            SandboxError::RateLimited { .. } => "rate_limited",
            SandboxError::CapabilityRefused(_) => "capability_refused",
            SandboxError::FuelExhausted => "fuel_exhausted",
            SandboxError::Timeout => "timeout",
            SandboxError::InterpreterError => "interpreter_error",
            SandboxError::HostError => "host_error",
        }
    }
}
