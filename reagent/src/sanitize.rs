//! Prompt sanitization.
//!
//! The sanitizer scans two inputs for injection patterns: custom
//! instructions at config construction, and rendered observations before
//! they are emitted in events. Depending on mode a match is logged or
//! treated as fatal.

use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::error::{AgentError, Result};

/// What to do when an injection pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanitizerMode {
    /// Log the match and continue.
    #[default]
    Warn,
    /// Treat the match as a fatal error.
    Fatal,
}

/// Substituted for observations withheld in fatal mode.
pub const OBSERVATION_WITHHELD: &str = "[observation withheld: injection pattern detected]";

const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)ignore (all )?(previous|prior|above) instructions",
    r"(?i)disregard (all )?(your|previous|prior) (instructions|rules)",
    r"(?i)you are now (in )?(developer|jailbreak|dan) mode",
    r"(?i)reveal (your )?system prompt",
    r"(?i)override (your )?safety",
];

/// Pattern-based prompt injection detector.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    mode: SanitizerMode,
    patterns: Arc<Vec<Regex>>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerMode::Warn)
    }
}

impl Sanitizer {
    /// Create a sanitizer with the default pattern set.
    #[must_use]
    pub fn new(mode: SanitizerMode) -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            mode,
            patterns: Arc::new(patterns),
        }
    }

    /// Create a sanitizer with extra patterns on top of the defaults.
    pub fn with_patterns(mode: SanitizerMode, extra: &[&str]) -> Result<Self> {
        let mut sanitizer = Self::new(mode);
        let mut patterns = (*sanitizer.patterns).clone();
        for p in extra {
            let regex = Regex::new(p).map_err(|e| {
                AgentError::configuration(format!("invalid sanitizer pattern {p:?}: {e}"))
            })?;
            patterns.push(regex);
        }
        sanitizer.patterns = Arc::new(patterns);
        Ok(sanitizer)
    }

    /// The configured mode.
    #[must_use]
    pub const fn mode(&self) -> SanitizerMode {
        self.mode
    }

    /// Scan text, returning the first matching pattern.
    #[must_use]
    pub fn scan(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|p| p.is_match(text))
            .map(|p| p.as_str().to_owned())
    }

    /// Inspect text, applying the configured mode: a match logs in warn
    /// mode and errors in fatal mode.
    pub fn inspect(&self, text: &str, context: &str) -> Result<()> {
        if let Some(pattern) = self.scan(text) {
            match self.mode {
                SanitizerMode::Warn => {
                    warn!(context, pattern = %pattern, "Injection pattern matched");
                }
                SanitizerMode::Fatal => {
                    return Err(AgentError::PromptInjection { pattern });
                }
            }
        }
        Ok(())
    }
}
