//! Bidirectional cooperative control between a child agent and its parent.
//!
//! A running child issues a [`ControlRequest`] and suspends; the request
//! travels over an explicit channel pair to whoever holds the
//! [`ControlListener`] (the parent, or a registered [`ControlHandler`]),
//! and the child resumes with the [`ControlResponse`]. The exchange is
//! expressed in messages, not coroutines: each request is one envelope with
//! its own reply channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::event::{EventBus, EventKind};

/// A typed pause issued by a running agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Ask the user (via the parent) for input.
    UserInput {
        /// The question to ask.
        prompt: String,
        /// Choices to offer, when the question is closed.
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
    },
    /// Ask for confirmation before an action.
    Confirmation {
        /// Short name of the action.
        action: String,
        /// What the action will do.
        description: String,
        /// Consequences worth flagging.
        #[serde(skip_serializing_if = "Option::is_none")]
        consequences: Option<String>,
        /// Whether the action can be undone.
        reversible: bool,
    },
    /// Ask a sibling sub-agent a question.
    SubAgentQuery {
        /// Name of the agent to query.
        agent_name: String,
        /// The question.
        query: String,
        /// Choices to offer, when the question is closed.
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
    },
}

impl ControlRequest {
    /// Stable request-type tag carried in `ControlYielded` events.
    #[must_use]
    pub const fn request_type(&self) -> &'static str {
        match self {
            Self::UserInput { .. } => "user_input",
            Self::Confirmation { .. } => "confirmation",
            Self::SubAgentQuery { .. } => "sub_agent_query",
        }
    }

    /// The prompt shown to the handler.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        match self {
            Self::UserInput { prompt, .. } => prompt.clone(),
            Self::Confirmation {
                action,
                description,
                ..
            } => format!("{action}: {description}"),
            Self::SubAgentQuery {
                agent_name, query, ..
            } => format!("[{agent_name}] {query}"),
        }
    }
}

/// Reply to a control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the request was approved.
    pub approved: bool,
    /// Value returned to the child.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ControlResponse {
    /// Approve with a value.
    #[must_use]
    pub fn approve(value: impl Into<Value>) -> Self {
        Self {
            approved: true,
            value: Some(value.into()),
        }
    }

    /// Approve without a value.
    #[must_use]
    pub const fn approved() -> Self {
        Self {
            approved: true,
            value: None,
        }
    }

    /// Deny the request.
    #[must_use]
    pub const fn deny() -> Self {
        Self {
            approved: false,
            value: None,
        }
    }
}

/// Handler answering control requests on behalf of the parent.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// Produce a response for the request.
    async fn handle(&self, request: &ControlRequest) -> ControlResponse;
}

struct ControlEnvelope {
    request_id: String,
    request: ControlRequest,
    reply: oneshot::Sender<ControlResponse>,
}

/// The child-held side of a control channel.
#[derive(Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<ControlEnvelope>,
    bus: Arc<EventBus>,
}

impl ControlClient {
    /// Issue a control request and suspend until the parent responds.
    ///
    /// Emits `ControlYielded` when the request is posted and
    /// `ControlResumed` when the reply arrives. Fails with an environment
    /// error when the parent side is gone.
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let request_id = Uuid::new_v4().to_string();
        self.bus.emit(EventKind::ControlYielded {
            request_type: request.request_type().to_owned(),
            request_id: request_id.clone(),
            prompt: request.prompt_text(),
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlEnvelope {
                request_id: request_id.clone(),
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AgentError::environment("no parent"))?;

        let response = reply_rx
            .await
            .map_err(|_| AgentError::environment("control channel closed before reply"))?;

        self.bus.emit(EventKind::ControlResumed {
            request_id,
            approved: response.approved,
            value: response.value.clone(),
        });
        Ok(response)
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient").finish_non_exhaustive()
    }
}

/// The parent-held side of a control channel.
pub struct ControlListener {
    rx: mpsc::Receiver<ControlEnvelope>,
}

impl ControlListener {
    /// Answer requests with the given handler until every client is gone.
    pub async fn serve(mut self, handler: Arc<dyn ControlHandler>) {
        while let Some(envelope) = self.rx.recv().await {
            let response = handler.handle(&envelope.request).await;
            // The client may have been cancelled while we were deciding.
            let _ = envelope.reply.send(response);
            tracing::debug!(request_id = %envelope.request_id, "Control request answered");
        }
    }
}

impl std::fmt::Debug for ControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlListener").finish_non_exhaustive()
    }
}

/// Create a connected control channel pair on the given bus.
#[must_use]
pub fn control_channel(bus: Arc<EventBus>) -> (ControlClient, ControlListener) {
    let (tx, rx) = mpsc::channel(8);
    (ControlClient { tx, bus }, ControlListener { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedHandler {
        response: ControlResponse,
    }

    #[async_trait]
    impl ControlHandler for ScriptedHandler {
        async fn handle(&self, _request: &ControlRequest) -> ControlResponse {
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn request_yields_and_resumes() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe(move |event| sink.lock().unwrap().push(event.name().to_owned()));

        let (client, listener) = control_channel(Arc::clone(&bus));
        tokio::spawn(listener.serve(Arc::new(ScriptedHandler {
            response: ControlResponse::approve("a.rb"),
        })));

        let response = client
            .request(ControlRequest::UserInput {
                prompt: "file?".into(),
                options: Some(vec!["a.rb".into(), "b.rb".into()]),
            })
            .await
            .unwrap();

        assert!(response.approved);
        assert_eq!(response.value, Some(Value::String("a.rb".into())));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["control_yielded", "control_resumed"]
        );
    }

    #[tokio::test]
    async fn dropped_listener_is_an_environment_error() {
        let bus = Arc::new(EventBus::new());
        let (client, listener) = control_channel(Arc::clone(&bus));
        drop(listener);

        let err = client
            .request(ControlRequest::Confirmation {
                action: "delete".into(),
                description: "remove the file".into(),
                consequences: None,
                reversible: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Environment { .. }));
    }

    #[test]
    fn request_types_are_stable() {
        let input = ControlRequest::UserInput {
            prompt: "p".into(),
            options: None,
        };
        assert_eq!(input.request_type(), "user_input");

        let query = ControlRequest::SubAgentQuery {
            agent_name: "helper".into(),
            query: "q".into(),
            options: None,
        };
        assert_eq!(query.request_type(), "sub_agent_query");
        assert!(query.prompt_text().contains("helper"));
    }
}
