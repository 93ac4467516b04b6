//! Extraction of code blocks from model output.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AgentError, Result};

static FENCE_WITH_LANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z][A-Za-z0-9_+-]*[ \t]*\n(.*?)```").expect("valid regex")
});
static FENCE_PLAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*\n?(.*?)```").expect("valid regex"));
static CODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<code>(.*?)</code>").expect("valid regex"));

/// Extract the first code block from model output.
///
/// Delimiters are tried in order: triple-backtick with a language tag,
/// triple-backtick plain, `<code>` tags.
pub fn extract_code_block(text: &str) -> Result<String> {
    for pattern in [&*FENCE_WITH_LANG, &*FENCE_PLAIN, &*CODE_TAG] {
        if let Some(captures) = pattern.captures(text) {
            return Ok(captures[1].trim().to_owned());
        }
    }
    Err(AgentError::parsing(text, "expected a fenced code block"))
}
