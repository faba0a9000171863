//! Skill manifests and the on-disk loader.
//!
//! A skill ships either as a source file with a TOML front-matter block
//! (delimited by `---` lines) or as a source file with a sibling
//! `<name>.toml` manifest. The loader parses the manifest, screens the
//! source for forbidden constructs, compiles it through the injected
//! compiler, and resolves the effective trust level — declared, or
//! inferred from the capability tags, or inferred from a sweep of the
//! source text.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::interpreter::{Program, SkillCompiler};
use crate::policy::{infer_trust_level, TrustLevel};

lazy_static! {
    /// Constructs that end validation immediately: code evaluators,
    /// module loaders, and prototype/constructor reachability.
    static ref FORBIDDEN_CONSTRUCTS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\beval\s*\(").unwrap(), "eval"),
        (Regex::new(r"\bnew\s+Function\b|\bFunction\s*\(").unwrap(), "Function constructor"),
        (Regex::new(r"\brequire\s*\(").unwrap(), "require"),
        (Regex::new(r"\bimport\b").unwrap(), "import"),
        (Regex::new(r"__proto__").unwrap(), "prototype access"),
        (Regex::new(r"\.\s*prototype\b").unwrap(), "prototype access"),
        (Regex::new(r"\.\s*constructor\b").unwrap(), "constructor access"),
        (Regex::new(r"\bclass\s+\w").unwrap(), "class declaration"),
    ];

    /// Capability names recognized by the source sweep.
    static ref CAPABILITY_USES: Regex = Regex::new(
        r"\b(fs\.(?:read|write|list|stat|exists|delete|mkdir)|shell\.(?:run|exec)|llm\.(?:predict|embed)|fetch)\b"
    )
    .unwrap();
}

/// Manifest fields as a skill author writes them.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub trust_level: Option<TrustLevel>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    /// Source file reference, for manifests that live apart from the
    /// source. Informational; the loader is handed the source path.
    #[serde(default)]
    pub source: Option<String>,
}

/// A skill that passed validation and compilation.
#[derive(Clone, Debug)]
pub struct LoadedSkill {
    pub manifest: SkillManifest,
    pub source: String,
    pub program: Program,
    /// Effective trust level: declared, or inferred.
    pub trust_level: TrustLevel,
}

/// Scans source text for forbidden constructs. Returns the first match.
pub fn scan_forbidden(source: &str) -> Option<&'static str> {
    FORBIDDEN_CONSTRUCTS
        .iter()
        .find(|(regex, _)| regex.is_match(source))
        .map(|(_, name)| *name)
}

/// Sweeps source text for capability uses. Approximate by construction:
/// a host with a compiler-emitted capability set should prefer feeding
/// that set to `infer_trust_level` directly.
pub fn sweep_capabilities(source: &str) -> BTreeSet<String> {
    CAPABILITY_USES
        .find_iter(source)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Splits a front-matter document into (manifest, source). The manifest
/// sits between a leading `---` line and the next `---` line.
fn split_front_matter(text: &str) -> Option<(String, String)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let manifest = rest[..offset].to_string();
            let source = rest[offset + line.len()..].to_string();
            return Some((manifest, source));
        }
        offset += line.len();
    }
    None
}

/// Loads and validates skills from disk.
pub struct SkillLoader {
    compiler: Arc<dyn SkillCompiler>,
}

impl SkillLoader {
    pub fn new(compiler: Arc<dyn SkillCompiler>) -> Self {
        Self { compiler }
    }

    /// Loads a skill from `path`. Front-matter wins; otherwise a sibling
    /// `<stem>.toml` manifest is required.
    pub async fn load(&self, path: &Path) -> Result<LoadedSkill, SandboxError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            warn!(path = %path.display(), error = %err, "skill source unreadable");
            SandboxError::HostError
        })?;

        let (manifest_text, source) = match split_front_matter(&text) {
            Some(parts) => parts,
            None => {
                let manifest_path = path.with_extension("toml");
                let manifest_text =
                    tokio::fs::read_to_string(&manifest_path).await.map_err(|_| {
                        warn!(path = %path.display(), "no front matter and no sibling manifest");
                        SandboxError::SkillValidationFailed
                    })?;
                (manifest_text, text)
            }
        };

        let manifest: SkillManifest = toml::from_str(&manifest_text).map_err(|err| {
            warn!(path = %path.display(), error = %err, "manifest parse failed");
            SandboxError::SkillValidationFailed
        })?;
        if manifest.name.trim().is_empty() {
            return Err(SandboxError::SkillValidationFailed);
        }

        if let Some(construct) = scan_forbidden(&source) {
            warn!(skill = %manifest.name, construct, "forbidden construct in source");
            return Err(SandboxError::SkillValidationFailed);
        }

        let program = self.compiler.compile(&source)?;
        if program.is_empty() {
            return Err(SandboxError::SkillValidationFailed);
        }

        let trust_level = match manifest.trust_level {
            Some(level) => level,
            None if !manifest.capabilities.is_empty() => {
                infer_trust_level(&manifest.capabilities)
            }
            None => infer_trust_level(sweep_capabilities(&source)),
        };
        debug!(skill = %manifest.name, level = trust_level.as_str(), "skill loaded");

        Ok(LoadedSkill {
            manifest,
            source,
            program,
            trust_level,
        })
    }
}
