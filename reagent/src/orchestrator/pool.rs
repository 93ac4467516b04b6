//! Parallel fan-out of independent agent runs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::agent::{Agent, RunOptions, RunResult};

/// Fans independent runs out over a bounded number of workers.
///
/// Scheduling is fair FIFO: runs queue on a semaphore in submission order.
/// Each agent is moved into its own task, so runs share no mutable state.
#[derive(Debug, Clone, Copy)]
pub struct AgentPool {
    max_concurrent: usize,
}

/// Result of a pool fan-out.
#[derive(Debug)]
pub struct OrchestratorResult {
    /// Runs that completed.
    pub succeeded: Vec<RunResult>,
    /// Runs that terminated without completing.
    pub failed: Vec<RunResult>,
    /// Total wall-clock duration of the fan-out, in seconds.
    pub duration_secs: f64,
}

impl OrchestratorResult {
    /// Total number of runs.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl AgentPool {
    /// Create a pool running at most `max_concurrent` agents at once.
    #[must_use]
    pub const fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Run every job to completion and partition the results by outcome.
    pub async fn run_all(
        &self,
        jobs: Vec<(Agent, RunOptions)>,
    ) -> OrchestratorResult {
        let started = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));

        let futures: Vec<_> = jobs
            .into_iter()
            .map(|(mut agent, options)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .expect("pool semaphore is never closed");
                    agent.run(options).await
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;
        let (succeeded, failed): (Vec<_>, Vec<_>) = results
            .into_iter()
            .partition(|r| r.outcome.is_completed());

        let duration_secs = started.elapsed().as_secs_f64();
        info!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            duration_secs,
            "Agent pool fan-out finished",
        );

        OrchestratorResult {
            succeeded,
            failed,
            duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::error::ModelError;
    use crate::model::{MockModel, MockReply};
    use serde_json::json;

    #[test]
    fn empty_fan_out_completes() {
        let pool = AgentPool::new(4);
        let result = tokio_test::block_on(pool.run_all(Vec::new()));
        assert_eq!(result.total(), 0);
        assert!(result.succeeded.is_empty());
    }

    #[test]
    fn results_partition_by_outcome() {
        let answering = Agent::builder()
            .model(MockModel::new(vec![MockReply::ToolCall {
                name: "final_answer".to_owned(),
                arguments: json!({"answer": "ok"}),
            }]))
            .try_build()
            .unwrap();
        let failing = Agent::builder()
            .model(MockModel::new(vec![MockReply::Error(
                ModelError::new("mock-model", "invalid api key").with_status(401),
            )]))
            .try_build()
            .unwrap();

        let pool = AgentPool::new(1);
        let result = tokio_test::block_on(pool.run_all(vec![
            (answering, RunOptions::new("first task")),
            (failing, RunOptions::new("second task")),
        ]));

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.succeeded[0].output, Some(json!("ok")));
    }
}
