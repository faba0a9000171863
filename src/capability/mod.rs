//! Capability implementations and the table the interpreter drives.
//!
//! A capability is a host-supplied value implementing one family of
//! effects. The interpreter never sees the implementations; it dispatches
//! by opcode name through [`CapabilityTable::invoke`], passing JSON
//! parameters and receiving JSON results. Anything not bound into the
//! table is unreachable from skill code.

pub mod fetch;
pub mod fs;
pub mod llm;
pub mod process;
pub mod shell;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{CapabilityError, SandboxError};

pub use fetch::{FetchCapability, FetchConfig, FetchRequest, FetchResponse};
pub use fs::{FileStat, FsCapability, FsConfig};
pub use llm::{LlmBackend, LlmCapability, LlmConfig, PredictOptions};
pub use shell::{CommandSpec, ShellCapability, ShellConfig, ShellOutput};

/// Hook fired on every admitted operation: `(operation, target)`.
pub type AccessHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Hook fired on every refusal with the detailed, non-opaque reason:
/// `(operation, target, reason)`. This is the only place reasons escape.
pub type BlockedHook = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Collapses `.` and `..` lexically without touching the filesystem.
/// A `..` that would climb past the front of the path is kept, so
/// jail-offset checks see the escape attempt instead of a silently
/// clamped path.
pub(crate) fn normalize_lexically(path: &std::path::Path) -> std::path::PathBuf {
    use std::path::Component;
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Minimal wildcard matcher: `*` matches any run of characters
/// (including separators); everything else matches literally.
/// Comparison is case-insensitive, which fits both host patterns and
/// the filesystem allow patterns built on top of it.
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn matches(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => {
                // Collapse consecutive stars, then try every split point.
                let rest = &p[1..];
                (0..=t.len()).any(|i| matches(rest, &t[i..]))
            }
            Some(c) => t.first() == Some(c) && matches(&p[1..], &t[1..]),
        }
    }
    matches(
        pattern.to_lowercase().as_bytes(),
        text.to_lowercase().as_bytes(),
    )
}

/// The set of capabilities bound into one execution.
///
/// Levels below `full` leave slots empty; an empty slot makes the whole
/// effect family unreachable, which is the enforcement mechanism — there
/// is no "disabled" state to toggle back on from skill code.
#[derive(Default, Clone)]
pub struct CapabilityTable {
    fs: Option<Arc<FsCapability>>,
    shell: Option<Arc<ShellCapability>>,
    fetch: Option<Arc<FetchCapability>>,
    llm: Option<Arc<LlmCapability>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fs(mut self, fs: FsCapability) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    pub fn with_shell(mut self, shell: ShellCapability) -> Self {
        self.shell = Some(Arc::new(shell));
        self
    }

    pub fn with_fetch(mut self, fetch: FetchCapability) -> Self {
        self.fetch = Some(Arc::new(fetch));
        self
    }

    pub fn with_llm(mut self, llm: LlmCapability) -> Self {
        self.llm = Some(Arc::new(llm));
        self
    }

    pub fn fs(&self) -> Option<&Arc<FsCapability>> {
        self.fs.as_ref()
    }

    pub fn shell(&self) -> Option<&Arc<ShellCapability>> {
        self.shell.as_ref()
    }

    pub fn fetch(&self) -> Option<&Arc<FetchCapability>> {
        self.fetch.as_ref()
    }

    pub fn llm(&self) -> Option<&Arc<LlmCapability>> {
        self.llm.as_ref()
    }

    /// Names of the bound capability families, for logging and for the
    /// context map propagated to skills.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.fs.is_some() {
            names.push("fs");
        }
        if self.shell.is_some() {
            names.push("shell");
        }
        if self.fetch.is_some() {
            names.push("fetch");
        }
        if self.llm.is_some() {
            names.push("llm");
        }
        names
    }

    /// Dispatches one opcode with JSON parameters.
    ///
    /// Unknown opcodes and opcodes whose family is not bound both fail;
    /// an unbound family fails with the same opaque refusal a blocked
    /// call would produce, so a skill cannot probe which families exist.
    pub async fn invoke(&self, op: &str, params: Value) -> Result<Value, SandboxError> {
        match op {
            "fs.read" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                let content = fs.read(path).await?;
                Ok(json!({ "content": content }))
            }
            "fs.write" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                let content = require_str(&params, "content")?;
                fs.write(path, content).await?;
                Ok(json!({ "written": true }))
            }
            "fs.exists" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                Ok(json!({ "exists": fs.exists(path).await }))
            }
            "fs.list" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                Ok(json!({ "entries": fs.list(path).await? }))
            }
            "fs.stat" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                let stat = fs.stat(path).await?;
                Ok(serde_json::to_value(stat).unwrap_or(Value::Null))
            }
            "fs.delete" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                fs.delete(path).await?;
                Ok(json!({ "deleted": true }))
            }
            "fs.mkdir" => {
                let fs = self.fs.as_ref().ok_or_else(CapabilityError::fs)?;
                let path = require_str(&params, "path")?;
                fs.mkdir(path).await?;
                Ok(json!({ "created": true }))
            }
            "shell.run" => {
                let shell = self.shell.as_ref().ok_or_else(CapabilityError::shell)?;
                let command = require_str(&params, "command")?;
                let output = shell.run(command).await?;
                Ok(serde_json::to_value(output).unwrap_or(Value::Null))
            }
            "shell.exec" => {
                let shell = self.shell.as_ref().ok_or_else(CapabilityError::shell)?;
                let binary = require_str(&params, "binary")?;
                let args: Vec<String> = params
                    .get("args")
                    .and_then(|v| v.as_array())
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                let output = shell.exec(binary, &args).await?;
                Ok(serde_json::to_value(output).unwrap_or(Value::Null))
            }
            "fetch" => {
                let fetch = self.fetch.as_ref().ok_or_else(CapabilityError::fetch)?;
                let request = FetchRequest::from_params(&params)?;
                let response = fetch.fetch(request).await?;
                let status = response.status();
                let headers = response.header_map();
                let body = response.text().await?;
                Ok(json!({ "status": status, "headers": headers, "body": body }))
            }
            "llm.predict" => {
                let llm = self.llm.as_ref().ok_or_else(CapabilityError::llm)?;
                let prompt = require_str(&params, "prompt")?;
                let options = PredictOptions {
                    system: params
                        .get("system")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    max_tokens: params
                        .get("max_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(1024) as u32,
                };
                let text = llm.predict(prompt, &options).await?;
                Ok(json!({ "text": text }))
            }
            "llm.embed" => {
                let llm = self.llm.as_ref().ok_or_else(CapabilityError::llm)?;
                let text = require_str(&params, "text")?;
                Ok(json!({ "embedding": llm.embed(text).await? }))
            }
            _ => Err(SandboxError::InterpreterError),
        }
    }
}

/// Extracts a required string parameter; a missing parameter is a
/// program bug, not a policy refusal.
fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, SandboxError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or(SandboxError::InterpreterError)
}
