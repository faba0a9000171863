//! Filesystem capability — every file effect goes through a path jail.
//!
//! All operations resolve their input against a jail root and refuse
//! anything that escapes it, matches the security catalog, or falls
//! outside the allow patterns. Refusals surface the opaque
//! "Access denied"; the concrete reason goes to the `on_blocked` hook.
//!
//! Each call opens and closes its own handles; no handle outlives a
//! call. I/O uses `tokio::fs` so large files never block the runtime.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::security;

use super::{normalize_lexically, wildcard_match, AccessHook, BlockedHook};

/// Default read cap: 10 MiB.
const DEFAULT_MAX_READ: u64 = 10 * 1024 * 1024;

/// Default write cap: 1 MiB.
const DEFAULT_MAX_WRITE: u64 = 1024 * 1024;

/// Construction parameters for [`FsCapability`].
#[derive(Clone)]
pub struct FsConfig {
    /// Allow patterns over root-relative paths; at least one must match.
    /// `*` crosses directory separators, so the default admits
    /// everything under the root.
    pub allow_patterns: Vec<String>,
    /// When set, write-side operations (write, delete, mkdir) must
    /// additionally match one of these patterns. Models writable
    /// sub-directories inside a broader readable jail.
    pub write_allow_patterns: Option<Vec<String>>,
    /// Extra block patterns on top of the security catalog, matched
    /// against the relative and absolute resolved paths.
    pub block_patterns: Vec<Regex>,
    pub allow_write: bool,
    pub allow_create: bool,
    pub allow_delete: bool,
    pub max_read_bytes: u64,
    pub max_write_bytes: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            allow_patterns: vec!["*".to_string()],
            write_allow_patterns: None,
            block_patterns: Vec::new(),
            allow_write: false,
            allow_create: false,
            allow_delete: false,
            max_read_bytes: DEFAULT_MAX_READ,
            max_write_bytes: DEFAULT_MAX_WRITE,
        }
    }
}

/// Metadata returned by `stat`.
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
    pub readonly: bool,
    /// Seconds since the Unix epoch, when the platform reports it.
    pub modified_epoch_secs: Option<u64>,
}

/// Filesystem capability jailed to one root directory.
pub struct FsCapability {
    root: PathBuf,
    config: FsConfig,
    on_access: Option<AccessHook>,
    on_blocked: Option<BlockedHook>,
}

impl FsCapability {
    /// Builds a capability jailed to `root`. The root must exist; it is
    /// canonicalized once so later checks compare like with like.
    pub fn new(root: impl AsRef<Path>, config: FsConfig) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self {
            root,
            config,
            on_access: None,
            on_blocked: None,
        })
    }

    pub fn on_access(mut self, hook: AccessHook) -> Self {
        self.on_access = Some(hook);
        self
    }

    pub fn on_blocked(mut self, hook: BlockedHook) -> Self {
        self.on_blocked = Some(hook);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn refuse(&self, op: &str, target: &str, reason: &str) -> CapabilityError {
        warn!(op, target, reason, "fs operation blocked");
        if let Some(hook) = &self.on_blocked {
            hook(op, target, reason);
        }
        CapabilityError::fs()
    }

    fn accessed(&self, op: &str, target: &str) {
        debug!(op, target, "fs operation admitted");
        if let Some(hook) = &self.on_access {
            hook(op, target);
        }
    }

    /// Admission pipeline shared by every operation. Returns the
    /// resolved absolute path and the root-relative offset.
    fn admit(&self, op: &str, input: &str) -> Result<(PathBuf, String), CapabilityError> {
        if input.starts_with('~') {
            return Err(self.refuse(op, input, "Home directory reference"));
        }

        let check = security::is_blocked(input);
        if check.blocked {
            let reason = check.description.unwrap_or("Blocked path");
            return Err(self.refuse(op, input, reason));
        }

        let candidate = Path::new(input);
        let resolved = if candidate.is_absolute() {
            normalize_lexically(candidate)
        } else {
            normalize_lexically(&self.root.join(candidate))
        };

        let offset = match resolved.strip_prefix(&self.root) {
            Ok(offset) => offset.to_path_buf(),
            Err(_) => return Err(self.refuse(op, input, "Path escapes jail root")),
        };
        if offset.components().next() == Some(Component::ParentDir) || offset.is_absolute() {
            return Err(self.refuse(op, input, "Path escapes jail root"));
        }

        let relative = offset.to_string_lossy().replace('\\', "/");
        let absolute = resolved.to_string_lossy().to_string();

        let relative_check = security::is_blocked(&relative);
        if relative_check.blocked {
            let reason = relative_check.description.unwrap_or("Blocked path");
            return Err(self.refuse(op, input, reason));
        }
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            let check = security::is_blocked(component);
            if check.blocked {
                let reason = check.description.unwrap_or("Blocked path");
                return Err(self.refuse(op, input, reason));
            }
        }
        if security::is_blocked(&absolute).blocked {
            return Err(self.refuse(op, input, "Blocked path"));
        }
        for pattern in &self.config.block_patterns {
            if pattern.is_match(&relative) || pattern.is_match(&absolute) {
                return Err(self.refuse(op, input, "Blocked path"));
            }
        }

        let allowed = self
            .config
            .allow_patterns
            .iter()
            .any(|p| wildcard_match(p, &relative));
        if !allowed {
            return Err(self.refuse(op, input, "Path not in allow patterns"));
        }

        Ok((resolved, relative))
    }

    /// Additional gate for write-side operations.
    fn admit_write(&self, op: &str, input: &str) -> Result<(PathBuf, String), CapabilityError> {
        if !self.config.allow_write {
            return Err(self.refuse(op, input, "Writes not permitted"));
        }
        let (resolved, relative) = self.admit(op, input)?;
        if let Some(patterns) = &self.config.write_allow_patterns {
            if !patterns.iter().any(|p| wildcard_match(p, &relative)) {
                return Err(self.refuse(op, input, "Path not writable"));
            }
        }
        Ok((resolved, relative))
    }

    /// Reads a file as UTF-8. Directories, oversize files and undecodable
    /// bytes are refused.
    pub async fn read(&self, path: &str) -> Result<String, CapabilityError> {
        let (resolved, relative) = self.admit("read", path)?;

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| self.refuse("read", path, "Not readable"))?;
        if meta.is_dir() {
            return Err(self.refuse("read", path, "Is a directory"));
        }
        if meta.len() > self.config.max_read_bytes {
            return Err(self.refuse("read", path, "File exceeds read cap"));
        }

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|_| self.refuse("read", path, "Not readable"))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| self.refuse("read", path, "Not valid UTF-8"))?;

        self.accessed("read", &relative);
        Ok(content)
    }

    /// Writes UTF-8 content. A missing target or parent directory is only
    /// created when `allow_create` is set. A write aborted by the host
    /// (timeout, crash) is not rolled back; callers that need atomicity
    /// must write to a scratch name and rename from their own code.
    pub async fn write(&self, path: &str, content: &str) -> Result<(), CapabilityError> {
        let (resolved, relative) = self.admit_write("write", path)?;

        if content.len() as u64 > self.config.max_write_bytes {
            return Err(self.refuse("write", path, "Content exceeds write cap"));
        }

        let exists = tokio::fs::try_exists(&resolved).await.unwrap_or(false);
        if !exists && !self.config.allow_create {
            return Err(self.refuse("write", path, "Creation not permitted"));
        }
        if let Some(parent) = resolved.parent() {
            let parent_exists = tokio::fs::try_exists(parent).await.unwrap_or(false);
            if !parent_exists {
                if !self.config.allow_create {
                    return Err(self.refuse("write", path, "Creation not permitted"));
                }
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|_| self.refuse("write", path, "Not writable"))?;
            }
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|_| self.refuse("write", path, "Not writable"))?;

        self.accessed("write", &relative);
        Ok(())
    }

    /// Existence probe. A path that would be refused answers `false`
    /// rather than erroring, so blocked paths are indistinguishable from
    /// absent ones.
    pub async fn exists(&self, path: &str) -> bool {
        let Ok((resolved, relative)) = self.admit("exists", path) else {
            return false;
        };
        let exists = tokio::fs::try_exists(&resolved).await.unwrap_or(false);
        self.accessed("exists", &relative);
        exists
    }

    /// Lists a directory, returning only the entries that would
    /// themselves pass the blocked-pattern test. Listing never discloses
    /// the presence of hidden secrets.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, CapabilityError> {
        let (resolved, relative) = self.admit("list", path)?;

        let mut dir = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|_| self.refuse("list", path, "Not readable"))?;

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let joined = if relative.is_empty() {
                name.clone()
            } else {
                format!("{relative}/{name}")
            };
            if security::is_blocked(&joined).blocked || security::is_blocked(&name).blocked {
                continue;
            }
            if self
                .config
                .block_patterns
                .iter()
                .any(|p| p.is_match(&joined) || p.is_match(&name))
            {
                continue;
            }
            entries.push(name);
        }
        entries.sort();

        self.accessed("list", &relative);
        Ok(entries)
    }

    /// Returns metadata for a jailed path.
    pub async fn stat(&self, path: &str) -> Result<FileStat, CapabilityError> {
        let (resolved, relative) = self.admit("stat", path)?;

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| self.refuse("stat", path, "Not readable"))?;
        let modified_epoch_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        self.accessed("stat", &relative);
        Ok(FileStat {
            size: meta.len(),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            readonly: meta.permissions().readonly(),
            modified_epoch_secs,
        })
    }

    /// Deletes a regular file. Directories and symlinks are refused.
    pub async fn delete(&self, path: &str) -> Result<(), CapabilityError> {
        if !self.config.allow_delete {
            return Err(self.refuse("delete", path, "Deletes not permitted"));
        }
        let (resolved, relative) = self.admit_write("delete", path)?;

        let meta = tokio::fs::symlink_metadata(&resolved)
            .await
            .map_err(|_| self.refuse("delete", path, "Not readable"))?;
        if !meta.is_file() {
            return Err(self.refuse("delete", path, "Not a regular file"));
        }

        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|_| self.refuse("delete", path, "Not writable"))?;

        self.accessed("delete", &relative);
        Ok(())
    }

    /// Creates a directory (and missing parents) inside the jail.
    pub async fn mkdir(&self, path: &str) -> Result<(), CapabilityError> {
        if !self.config.allow_create {
            return Err(self.refuse("mkdir", path, "Creation not permitted"));
        }
        let (resolved, relative) = self.admit_write("mkdir", path)?;

        tokio::fs::create_dir_all(&resolved)
            .await
            .map_err(|_| self.refuse("mkdir", path, "Not writable"))?;

        self.accessed("mkdir", &relative);
        Ok(())
    }
}
