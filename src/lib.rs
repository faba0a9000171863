//! skilljail — a capability-based sandbox for untrusted, LLM-authored
//! skills.
//!
//! A skill can perform only the effects whose implementations the host
//! explicitly bound into its capability table; nothing else is
//! reachable by name, arithmetic, or metaprogramming. The crate
//! provides the enforcement layer: the capability factories (shell,
//! filesystem, fetch, LLM), the trust-level policy mapping request
//! provenance to an allowed capability set, the rate limiter guarding
//! the host against recursion and flooding, and the executor composing
//! these into one guarded call.
//!
//! The restricted-language interpreter and the skill transpiler are
//! external collaborators, wired in through the [`interpreter`]
//! contracts. Refusals surface to skills as a closed vocabulary of
//! opaque messages; detailed reasons flow only through the event hooks.

pub mod capability;
pub mod config;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod policy;
pub mod ratelimit;
pub mod security;
pub mod skill;

pub use capability::{
    CapabilityTable, CommandSpec, FetchCapability, FetchConfig, FetchRequest, FetchResponse,
    FsCapability, FsConfig, LlmBackend, LlmCapability, LlmConfig, PredictOptions,
    ShellCapability, ShellConfig, ShellOutput,
};
pub use config::SandboxConfig;
pub use error::{CapabilityDomain, CapabilityError, RejectReason, SandboxError};
pub use executor::{
    CapabilityOverrides, ExecutionResult, Executor, ExecutorConfig, ExecutorHooks,
};
pub use interpreter::{Interpreter, InterpreterOutcome, Program, SkillCompiler};
pub use policy::{ExecutionContext, PolicyConfig, Provenance, TrustLevel};
pub use ratelimit::{
    RateLimiter, RateLimiterConfig, RateLimiterStats, Rejection, TokenBucketConfig,
    TokenBucketLimiter,
};
pub use skill::{LoadedSkill, SkillLoader, SkillManifest};
