//! Static validation of code actions before execution.
//!
//! The validator is total and deterministic: one pass over the lines, no
//! execution. It rejects imports outside the authorized set and
//! filesystem, network, and process primitives unless explicitly
//! permitted.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AgentError, Result};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:import|require|use|include|from)\s+["']?([A-Za-z_][\w./-]*)"#)
        .expect("valid regex")
});
static FILESYSTEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:open|read_file|write_file|delete_file|remove_file|mkdir|rmdir|unlink|glob)\s*\(")
        .expect("valid regex")
});
static NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:socket|connect|fetch|urlopen|download)\s*\(|https?://").expect("valid regex")
});
static PROCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:system|exec|spawn|fork|kill|popen|subprocess|backtick)\s*\(")
        .expect("valid regex")
});

/// Validates code actions against the sandbox policy.
#[derive(Debug, Clone, Default)]
pub struct CodeValidator {
    authorized_imports: BTreeSet<String>,
    allow_filesystem: bool,
    allow_network: bool,
    allow_process: bool,
}

impl CodeValidator {
    /// Create a validator with the given authorized imports and everything
    /// else forbidden.
    #[must_use]
    pub fn new(authorized_imports: BTreeSet<String>) -> Self {
        Self {
            authorized_imports,
            ..Self::default()
        }
    }

    /// Permit filesystem primitives.
    #[must_use]
    pub const fn allow_filesystem(mut self) -> Self {
        self.allow_filesystem = true;
        self
    }

    /// Permit network primitives.
    #[must_use]
    pub const fn allow_network(mut self) -> Self {
        self.allow_network = true;
        self
    }

    /// Permit process primitives.
    #[must_use]
    pub const fn allow_process(mut self) -> Self {
        self.allow_process = true;
        self
    }

    /// Validate a code action. Returns the first violation found.
    pub fn validate(&self, code: &str) -> Result<()> {
        for (line_no, line) in code.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(captures) = IMPORT_RE.captures(trimmed) {
                let name = &captures[1];
                if !self.authorized_imports.contains(name) {
                    return Err(AgentError::interpreter(format!(
                        "line {}: import of '{name}' is not authorized",
                        line_no + 1
                    )));
                }
                continue;
            }

            if !self.allow_filesystem && FILESYSTEM_RE.is_match(trimmed) {
                return Err(AgentError::interpreter(format!(
                    "line {}: filesystem access is forbidden",
                    line_no + 1
                )));
            }
            if !self.allow_network && NETWORK_RE.is_match(trimmed) {
                return Err(AgentError::interpreter(format!(
                    "line {}: network access is forbidden",
                    line_no + 1
                )));
            }
            if !self.allow_process && PROCESS_RE.is_match(trimmed) {
                return Err(AgentError::interpreter(format!(
                    "line {}: process control is forbidden",
                    line_no + 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tool_calls_pass() {
        let validator = CodeValidator::default();
        assert!(
            validator
                .validate("result = search(query: \"ruby\")\nfinal_answer(answer: result)")
                .is_ok()
        );
    }

    #[test]
    fn unauthorized_import_is_rejected() {
        let validator = CodeValidator::default();
        assert!(validator.validate("require \"net/http\"").is_err());
        assert!(validator.validate("import os").is_err());
    }

    #[test]
    fn authorized_import_passes() {
        let validator = CodeValidator::new(BTreeSet::from(["json".to_owned()]));
        assert!(validator.validate("require \"json\"").is_ok());
        assert!(validator.validate("import json").is_ok());
    }

    #[test]
    fn forbidden_primitives() {
        let validator = CodeValidator::default();
        assert!(validator.validate("open(\"/etc/passwd\")").is_err());
        assert!(validator.validate("connect(\"evil.example\")").is_err());
        assert!(validator.validate("x = fetch(https://example.com)").is_err());
        assert!(validator.validate("system(\"rm -rf /\")").is_err());
    }

    #[test]
    fn permissions_open_gates() {
        let validator = CodeValidator::default().allow_filesystem();
        assert!(validator.validate("open(\"notes.txt\")").is_ok());
        assert!(validator.validate("system(\"ls\")").is_err());
    }

    #[test]
    fn comments_are_ignored() {
        let validator = CodeValidator::default();
        assert!(validator.validate("# system(\"rm\") would be bad\nsearch(query: \"x\")").is_ok());
    }

    #[test]
    fn deterministic_over_repeated_runs() {
        let validator = CodeValidator::default();
        let code = "a = search(query: \"x\")\nopen(\"f\")";
        let first = validator.validate(code).unwrap_err().to_string();
        let second = validator.validate(code).unwrap_err().to_string();
        assert_eq!(first, second);
    }
}
