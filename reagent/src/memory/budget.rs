//! Budget-constrained rendering of agent memory.
//!
//! Long runs accumulate more history than a context window can hold. The
//! [`MemoryConfig`] selects a strategy for shrinking the rendered message
//! list while preserving the most recent, most load-bearing steps.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::ChatMessage;
use crate::memory::step::Step;

/// Placeholder substituted for masked observations.
pub const OBSERVATIONS_MASKED: &str = "[observations truncated]";

/// Callback that collapses a span of steps into a summary string.
///
/// Summarizers are synchronous and model-free by contract, so nothing in
/// run teardown can trigger a nested model call.
pub type Summarizer = Arc<dyn Fn(&[Step]) -> String + Send + Sync>;

/// Strategy for fitting memory into a token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Render every message.
    #[default]
    Full,
    /// Mask observations on non-recent action steps.
    Mask,
    /// Collapse non-recent action steps into a synthesized summary.
    Summarize,
    /// Summarize, then mask any remaining overflow against the budget.
    Hybrid,
}

impl std::fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Mask => "mask",
            Self::Summarize => "summarize",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Frozen memory budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// The budget strategy.
    pub strategy: MemoryStrategy,
    /// Number of most recent action steps kept verbatim.
    pub preserve_recent: usize,
    /// Token budget, when the strategy needs one.
    pub budget: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategy::Full,
            preserve_recent: 3,
            budget: None,
        }
    }
}

impl MemoryConfig {
    /// Create a config for the given strategy with defaults.
    #[must_use]
    pub fn new(strategy: MemoryStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Copy with a different `preserve_recent`.
    #[must_use]
    pub fn with_preserve_recent(mut self, preserve_recent: usize) -> Self {
        self.preserve_recent = preserve_recent;
        self
    }

    /// Copy with a token budget.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(budget) = self.budget
            && budget == 0
        {
            return Err(AgentError::configuration("memory budget must be positive"));
        }
        if self.strategy == MemoryStrategy::Hybrid && self.budget.is_none() {
            return Err(AgentError::configuration(
                "hybrid memory strategy requires a token budget",
            ));
        }
        Ok(())
    }
}

/// Estimate the token count of a message list.
///
/// A monotonic function of content length (ceiling of chars / 4); exact
/// tokenization is a provider concern.
#[must_use]
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content_len().div_ceil(4)).sum()
}

/// Index of the first action step considered "recent".
///
/// Returns the step index such that exactly `preserve_recent` action steps
/// sit at or after it; steps before it are candidates for masking or
/// summarization.
fn recent_boundary(steps: &[Step], preserve_recent: usize) -> usize {
    let mut remaining = preserve_recent;
    for (i, step) in steps.iter().enumerate().rev() {
        if step.as_action().is_some() {
            if remaining == 0 {
                return i + 1;
            }
            remaining -= 1;
        }
    }
    0
}

/// Render with observations masked on action steps older than the boundary.
pub(super) fn render_masked(
    system: &[ChatMessage],
    steps: &[Step],
    preserve_recent: usize,
) -> Vec<ChatMessage> {
    let boundary = recent_boundary(steps, preserve_recent);
    let mut messages = system.to_vec();
    for (i, step) in steps.iter().enumerate() {
        match step {
            Step::Action(action) if i < boundary && action.observations.is_some() => {
                let mut masked = (**action).clone();
                masked.observations = Some(OBSERVATIONS_MASKED.to_owned());
                messages.extend(masked.to_messages(false));
            }
            other => messages.extend(other.to_messages(false)),
        }
    }
    messages
}

/// Render with non-recent action steps collapsed into one summary message.
///
/// Falls back to [`render_masked`] when no summarizer is supplied.
pub(super) fn render_summarized(
    system: &[ChatMessage],
    steps: &[Step],
    preserve_recent: usize,
    summarizer: Option<&Summarizer>,
) -> Vec<ChatMessage> {
    let Some(summarizer) = summarizer else {
        return render_masked(system, steps, preserve_recent);
    };

    let boundary = recent_boundary(steps, preserve_recent);
    let collapsed: Vec<Step> = steps[..boundary]
        .iter()
        .filter(|s| s.as_action().is_some())
        .cloned()
        .collect();

    let mut messages = system.to_vec();
    let mut summary_emitted = collapsed.is_empty();
    for (i, step) in steps.iter().enumerate() {
        if i < boundary && step.as_action().is_some() {
            if !summary_emitted {
                let summary = summarizer(&collapsed);
                messages.push(ChatMessage::assistant(format!(
                    "Summary of earlier steps:\n{summary}"
                )));
                summary_emitted = true;
            }
            continue;
        }
        messages.extend(step.to_messages(false));
    }
    messages
}

/// Render under the hybrid strategy: summarize first, then mask remaining
/// overflow oldest-first until the estimate fits the budget.
pub(super) fn render_hybrid(
    system: &[ChatMessage],
    steps: &[Step],
    config: &MemoryConfig,
    summarizer: Option<&Summarizer>,
) -> Vec<ChatMessage> {
    let budget = match config.budget {
        Some(b) => b,
        // Validation rejects this, but render defensively as summarize.
        None => return render_summarized(system, steps, config.preserve_recent, summarizer),
    };

    let full = super::render_full(system, steps);
    if estimate_tokens(&full) <= budget {
        return full;
    }

    let summarized = render_summarized(system, steps, config.preserve_recent, summarizer);
    if estimate_tokens(&summarized) <= budget {
        return summarized;
    }

    // Still over budget: shrink the preserved window one step at a time.
    let mut preserve = config.preserve_recent;
    while preserve > 0 {
        preserve -= 1;
        let tighter = render_summarized(system, steps, preserve, summarizer);
        let rendered = render_masked_overlay(tighter);
        if estimate_tokens(&rendered) <= budget {
            return rendered;
        }
        if preserve == 0 {
            return rendered;
        }
    }
    render_masked(system, steps, 0)
}

/// Replace observation bodies in already-rendered tool-response messages.
fn render_masked_overlay(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .map(|m| {
            if m.role == crate::message::MessageRole::ToolResponse
                && m.text_content()
                    .is_some_and(|t| t.starts_with("Observation:"))
            {
                ChatMessage {
                    content: Some(vec![crate::message::MessageContent::text(format!(
                        "Observation:\n{OBSERVATIONS_MASKED}"
                    ))]),
                    ..m
                }
            } else {
                m
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::step::ActionStep;

    fn action(step_number: usize, obs: &str) -> Step {
        Step::Action(Box::new(ActionStep {
            step_number,
            observations: Some(obs.to_owned()),
            model_output: Some(format!("thought {step_number}")),
            ..Default::default()
        }))
    }

    fn fixture() -> (Vec<ChatMessage>, Vec<Step>) {
        let system = vec![ChatMessage::system("sys")];
        let steps = vec![
            Step::Task(crate::memory::step::TaskStep::new("do the thing")),
            action(1, "obs one"),
            action(2, "obs two"),
            action(3, "obs three"),
        ];
        (system, steps)
    }

    #[test]
    fn mask_preserves_recent_observations_verbatim() {
        let (system, steps) = fixture();
        let rendered = render_masked(&system, &steps, 2);
        let text = rendered
            .iter()
            .filter_map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n");

        assert!(!text.contains("obs one"));
        assert!(text.contains(OBSERVATIONS_MASKED));
        assert!(text.contains("obs two"));
        assert!(text.contains("obs three"));
    }

    #[test]
    fn mask_with_large_window_is_identity() {
        let (system, steps) = fixture();
        let full = crate::memory::render_full(&system, &steps);
        let masked = render_masked(&system, &steps, 10);
        assert_eq!(full.len(), masked.len());
    }

    #[test]
    fn summarize_collapses_old_steps() {
        let (system, steps) = fixture();
        let summarizer: Summarizer = Arc::new(|steps: &[Step]| format!("{} steps", steps.len()));
        let rendered = render_summarized(&system, &steps, 1, Some(&summarizer));
        let text = rendered
            .iter()
            .filter_map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n");

        assert!(text.contains("Summary of earlier steps:\n2 steps"));
        assert!(!text.contains("obs one"));
        assert!(text.contains("obs three"));
    }

    #[test]
    fn summarize_without_callback_falls_back_to_mask() {
        let (system, steps) = fixture();
        let rendered = render_summarized(&system, &steps, 1, None);
        let text = rendered
            .iter()
            .filter_map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n");
        assert!(text.contains(OBSERVATIONS_MASKED));
    }

    #[test]
    fn hybrid_returns_full_when_under_budget() {
        let (system, steps) = fixture();
        let config = MemoryConfig::new(MemoryStrategy::Hybrid)
            .with_budget(100_000)
            .with_preserve_recent(1);
        let full = crate::memory::render_full(&system, &steps);
        let rendered = render_hybrid(&system, &steps, &config, None);
        assert_eq!(full.len(), rendered.len());
    }

    #[test]
    fn estimate_is_monotonic_in_length() {
        let short = vec![ChatMessage::user("ab")];
        let long = vec![ChatMessage::user("ab".repeat(100))];
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
    }

    #[test]
    fn config_validation() {
        assert!(MemoryConfig::new(MemoryStrategy::Mask).validate().is_ok());
        assert!(
            MemoryConfig::new(MemoryStrategy::Hybrid)
                .validate()
                .is_err()
        );
        assert!(
            MemoryConfig::new(MemoryStrategy::Hybrid)
                .with_budget(1000)
                .validate()
                .is_ok()
        );
    }
}
