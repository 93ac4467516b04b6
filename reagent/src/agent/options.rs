//! Run options.

use std::collections::HashMap;

use serde_json::Value;

/// Options for one agent run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The task to perform.
    pub(crate) task: String,
    /// Images attached to the task, for vision models.
    pub(crate) images: Vec<Vec<u8>>,
    /// Named values injected into the run (readable from code actions).
    pub(crate) context: HashMap<String, Value>,
    /// Whether to reset memory before running.
    pub(crate) reset: bool,
}

impl RunOptions {
    /// Create run options for a task.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            images: Vec::new(),
            context: HashMap::new(),
            reset: true,
        }
    }

    /// Attach images.
    #[must_use]
    pub fn images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = images;
        self
    }

    /// Inject a named context value.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Continue from the previous run instead of resetting.
    #[must_use]
    pub const fn no_reset(mut self) -> Self {
        self.reset = false;
        self
    }
}

impl<S: Into<String>> From<S> for RunOptions {
    fn from(task: S) -> Self {
        Self::new(task)
    }
}
