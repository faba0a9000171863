//! LLM capability — budget and content enforcement around an injected
//! model backend.
//!
//! The backend is whatever the host already uses to talk to a model;
//! this wrapper adds per-request and per-session token budgets, a
//! session request cap, and a screening pass over prompts. The screen
//! is a speed bump, not a guarantee — the real defense is that the
//! model sits behind the same capability boundary as every other
//! effect.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::CapabilityError;

use super::BlockedHook;

/// Rough token estimate: ~4 characters per token.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 + 3) / 4
}

lazy_static! {
    /// Common prompt-injection shapes refused outright.
    static ref DEFAULT_BLOCKED_PROMPTS: Vec<Regex> = vec![
        Regex::new(r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions").unwrap(),
        Regex::new(r"(?i)disregard\s+(all\s+)?(previous|prior|your)\s+instructions").unwrap(),
        Regex::new(r"(?i)pretend\s+(you\s+are|to\s+be)").unwrap(),
        Regex::new(r"(?i)(reveal|print|repeat|show)\s+(your\s+)?system\s+prompt").unwrap(),
        Regex::new(r"(?i)you\s+are\s+now\s+(an?\s+)?unrestricted").unwrap(),
    ];
}

/// Options for one prediction.
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub system: Option<String>,
    /// Requested reply cap, counted against the session budget up front.
    pub max_tokens: u32,
}

/// Abstraction over the host's model client. The host wires in its own
/// implementation; nothing in the sandbox knows which provider it is.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn predict(&self, prompt: &str, options: &PredictOptions) -> anyhow::Result<String>;

    /// Optional embedding support; backends without it refuse.
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("embedding not supported"))
    }
}

/// Filter applied to prompts before screening, or to responses before
/// they are returned to the skill.
pub type TextFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Hook fired with the admitted prompt before the backend call.
pub type LlmRequestHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook fired after a completed call: `(prompt, response, tokens)`.
pub type LlmResponseHook = Arc<dyn Fn(&str, &str, u64) + Send + Sync>;

/// Construction parameters for [`LlmCapability`].
#[derive(Clone)]
pub struct LlmConfig {
    pub max_tokens_per_request: u32,
    pub session_token_budget: u64,
    pub session_request_cap: u64,
    /// Extra blocked-prompt patterns on top of the built-in set.
    pub blocked_prompt_patterns: Vec<Regex>,
    /// When non-empty, the system prompt must be present and match all
    /// of these.
    pub required_system_patterns: Vec<Regex>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_request: 4096,
            session_token_budget: 100_000,
            session_request_cap: 100,
            blocked_prompt_patterns: Vec::new(),
            required_system_patterns: Vec::new(),
        }
    }
}

#[derive(Default)]
struct BudgetState {
    tokens_used: u64,
    requests_made: u64,
}

/// LLM capability wrapping an injected backend.
pub struct LlmCapability {
    backend: Arc<dyn LlmBackend>,
    config: LlmConfig,
    state: Mutex<BudgetState>,
    prompt_filter: Option<TextFilter>,
    response_filter: Option<TextFilter>,
    on_request: Option<LlmRequestHook>,
    on_response: Option<LlmResponseHook>,
    on_blocked: Option<BlockedHook>,
}

impl LlmCapability {
    pub fn new(backend: Arc<dyn LlmBackend>, config: LlmConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(BudgetState::default()),
            prompt_filter: None,
            response_filter: None,
            on_request: None,
            on_response: None,
            on_blocked: None,
        }
    }

    pub fn prompt_filter(mut self, filter: TextFilter) -> Self {
        self.prompt_filter = Some(filter);
        self
    }

    pub fn response_filter(mut self, filter: TextFilter) -> Self {
        self.response_filter = Some(filter);
        self
    }

    pub fn on_request(mut self, hook: LlmRequestHook) -> Self {
        self.on_request = Some(hook);
        self
    }

    pub fn on_response(mut self, hook: LlmResponseHook) -> Self {
        self.on_response = Some(hook);
        self
    }

    pub fn on_blocked(mut self, hook: BlockedHook) -> Self {
        self.on_blocked = Some(hook);
        self
    }

    fn refuse(&self, reason: &str) -> CapabilityError {
        warn!(reason, "llm request blocked");
        if let Some(hook) = &self.on_blocked {
            hook("predict", "", reason);
        }
        CapabilityError::llm()
    }

    fn screen(&self, text: &str) -> Result<(), CapabilityError> {
        for pattern in DEFAULT_BLOCKED_PROMPTS
            .iter()
            .chain(self.config.blocked_prompt_patterns.iter())
        {
            if pattern.is_match(text) {
                return Err(self.refuse("Prompt matches blocked pattern"));
            }
        }
        Ok(())
    }

    /// Runs one prediction under budget and content enforcement.
    /// Failed backend calls do not consume quota.
    pub async fn predict(
        &self,
        prompt: &str,
        options: &PredictOptions,
    ) -> Result<String, CapabilityError> {
        let prompt = match &self.prompt_filter {
            Some(filter) => filter(prompt),
            None => prompt.to_string(),
        };

        self.screen(&prompt)?;
        if let Some(system) = &options.system {
            self.screen(system)?;
        }
        if !self.config.required_system_patterns.is_empty() {
            let Some(system) = &options.system else {
                return Err(self.refuse("System prompt required"));
            };
            for pattern in &self.config.required_system_patterns {
                if !pattern.is_match(system) {
                    return Err(self.refuse("System prompt rejected by pattern"));
                }
            }
        }

        if options.max_tokens > self.config.max_tokens_per_request {
            return Err(self.refuse("Per-request token cap exceeded"));
        }
        let estimate = estimate_tokens(&prompt) + u64::from(options.max_tokens);

        {
            let mut state = self.state.lock();
            if state.requests_made >= self.config.session_request_cap {
                drop(state);
                return Err(self.refuse("Session request cap exceeded"));
            }
            if state.tokens_used + estimate > self.config.session_token_budget {
                drop(state);
                return Err(self.refuse("Session token budget exceeded"));
            }
            state.requests_made += 1;
        }

        if let Some(hook) = &self.on_request {
            hook(&prompt);
        }
        debug!(estimate, "llm predict admitted");

        let response = match self.backend.predict(&prompt, options).await {
            Ok(response) => response,
            Err(err) => {
                self.state.lock().requests_made -= 1;
                warn!(error = %err, "llm backend call failed");
                return Err(self.refuse("Backend failure"));
            }
        };

        let response = match &self.response_filter {
            Some(filter) => filter(&response),
            None => response,
        };

        let actual = estimate_tokens(&prompt) + estimate_tokens(&response);
        self.state.lock().tokens_used += actual;

        if let Some(hook) = &self.on_response {
            hook(&prompt, &response, actual);
        }
        Ok(response)
    }

    /// Embeds one input under the same budget logic, at one token-unit
    /// per input.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        {
            let mut state = self.state.lock();
            if state.requests_made >= self.config.session_request_cap {
                drop(state);
                return Err(self.refuse("Session request cap exceeded"));
            }
            if state.tokens_used + 1 > self.config.session_token_budget {
                drop(state);
                return Err(self.refuse("Session token budget exceeded"));
            }
            state.requests_made += 1;
        }

        match self.backend.embed(text).await {
            Ok(embedding) => {
                self.state.lock().tokens_used += 1;
                Ok(embedding)
            }
            Err(err) => {
                self.state.lock().requests_made -= 1;
                warn!(error = %err, "llm embed failed");
                Err(self.refuse("Backend failure"))
            }
        }
    }

    pub fn remaining_tokens(&self) -> u64 {
        self.config
            .session_token_budget
            .saturating_sub(self.state.lock().tokens_used)
    }

    pub fn remaining_requests(&self) -> u64 {
        self.config
            .session_request_cap
            .saturating_sub(self.state.lock().requests_made)
    }
}
