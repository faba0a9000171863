//! Contracts for the external interpreter and transpiler.
//!
//! The sandboxed bytecode interpreter and the skill-source transpiler
//! are collaborators, not part of this crate: the host wires in
//! implementations of [`Interpreter`] and [`SkillCompiler`]. The
//! executor only relies on the contracts here — a compiled [`Program`]
//! runs against an injected capability table under a fuel budget and a
//! wall-clock timeout, and every effect the program attempts goes
//! through [`CapabilityTable::invoke`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::CapabilityTable;
use crate::error::SandboxError;

/// A compiled skill program. Opaque to the sandbox; only the
/// interpreter understands the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub code: Value,
}

impl Program {
    pub fn new(code: Value) -> Self {
        Self { code }
    }

    /// An empty program fails executor validation.
    pub fn is_empty(&self) -> bool {
        self.code.is_null()
    }
}

/// Pure compilation of skill source into a [`Program`].
pub trait SkillCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Program, SandboxError>;
}

/// Outcome of one interpreter run.
#[derive(Debug, Default)]
pub struct InterpreterOutcome {
    pub value: Option<Value>,
    pub error: Option<SandboxError>,
    pub fuel_used: u64,
    pub trace: Option<Vec<String>>,
    pub warnings: Vec<String>,
}

impl InterpreterOutcome {
    pub fn success(value: Value, fuel_used: u64) -> Self {
        Self {
            value: Some(value),
            fuel_used,
            ..Self::default()
        }
    }

    pub fn failure(error: SandboxError, fuel_used: u64) -> Self {
        Self {
            error: Some(error),
            fuel_used,
            ..Self::default()
        }
    }
}

/// The sandboxed interpreter. Executes a compiled program against an
/// injected capability table; dispatches one capability call at a time;
/// terminates on fuel exhaustion and honors the wall-clock timeout.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn execute(
        &self,
        program: &Program,
        args: Value,
        capabilities: &CapabilityTable,
        fuel: u64,
        timeout: Duration,
        context: &HashMap<String, String>,
    ) -> InterpreterOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_emptiness() {
        assert!(Program::new(Value::Null).is_empty());
        assert!(!Program::new(serde_json::json!({"ops": []})).is_empty());
    }

    #[test]
    fn test_interpreter_is_object_safe() {
        fn _assert_object_safe(_: &dyn Interpreter) {}
        fn _assert_compiler_object_safe(_: &dyn SkillCompiler) {}
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = InterpreterOutcome::success(serde_json::json!(42), 7);
        assert_eq!(ok.value, Some(serde_json::json!(42)));
        assert_eq!(ok.fuel_used, 7);
        assert!(ok.error.is_none());

        let bad = InterpreterOutcome::failure(SandboxError::FuelExhausted, 100);
        assert!(bad.value.is_none());
        assert_eq!(bad.error, Some(SandboxError::FuelExhausted));
    }
}
