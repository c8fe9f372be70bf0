//! Task Router — spec §4.1.
//!
//! The router runs as a background worker task (the "scheduler" in
//! [`scheduler::run`]); callers only ever hold a [`RouterHandle`], a cheap
//! `Clone`-able set of channel endpoints. This mirrors the teacher's
//! `RouterState` being shared behind an `Arc` — here the shared thing is a
//! channel, not a lock, because the state it protects (the queue, the
//! currently running task) must be mutated by a single serialized actor to
//! keep the five-step route decision and the priority queue consistent
//! (spec §5).

pub mod decision;
pub mod queue;
pub mod scheduler;
pub mod scoring;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::RouterError;
use crate::memory::MemoryEngine;
use crate::providers::ProviderRegistry;
use crate::types::{CancelOutcome, RouterConfig, RouterSnapshot, SubmitAck, TaskEvent};

use scheduler::RouterCommand;

pub use queue::DEFAULT_CAPACITY as DEFAULT_QUEUE_CAPACITY;

/// Cheap, `Clone`-able handle to a running scheduler. Every method sends a
/// command and awaits its reply over a `oneshot` channel; `subscribe()`
/// hands out an independent `broadcast::Receiver` for the Channel Gateway to
/// stream from.
#[derive(Clone)]
pub struct RouterHandle {
    commands: mpsc::Sender<RouterCommand>,
    events: broadcast::Sender<TaskEvent>,
}

impl RouterHandle {
    /// Launch the scheduler as a background task and return a handle to it.
    pub fn spawn(
        memory: Arc<MemoryEngine>,
        providers: Arc<ProviderRegistry>,
        config: RouterConfig,
        queue_capacity: usize,
        default_cloud_provider: impl Into<String>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(scheduler::COMMAND_CHANNEL_CAPACITY);
        let (events_tx, _events_rx) = broadcast::channel(scheduler::EVENT_CHANNEL_CAPACITY);

        tokio::spawn(scheduler::run(
            commands_rx,
            commands_tx.clone(),
            events_tx.clone(),
            memory,
            providers,
            config,
            queue_capacity,
            default_cloud_provider.into(),
        ));

        Self { commands: commands_tx, events: events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, channel_id: impl Into<String>, user_id: impl Into<String>, message: impl Into<String>) -> Result<SubmitAck, RouterError> {
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(RouterCommand::Submit { channel_id: channel_id.into(), user_id: user_id.into(), message: message.into(), resp })
            .await
            .map_err(|_| RouterError::RequestTimeout)?;
        rx.await.map_err(|_| RouterError::RequestTimeout)?
    }

    pub async fn cancel(&self, id: impl Into<String>) -> CancelOutcome {
        let (resp, rx) = oneshot::channel();
        let id = id.into();
        if self.commands.send(RouterCommand::Cancel { id, resp }).await.is_err() {
            return CancelOutcome::NotFound;
        }
        rx.await.unwrap_or(CancelOutcome::NotFound)
    }

    pub async fn clear_queue(&self) {
        let _ = self.commands.send(RouterCommand::ClearQueue).await;
    }

    pub async fn update_config(&self, config: RouterConfig) {
        let _ = self.commands.send(RouterCommand::UpdateConfig { config }).await;
    }

    pub async fn set_executor_status(&self, local_model_loaded: bool, cloud_available: bool) {
        let _ = self.commands.send(RouterCommand::SetExecutorStatus { local_model_loaded, cloud_available }).await;
    }

    pub async fn status(&self) -> RouterSnapshot {
        let (resp, rx) = oneshot::channel();
        if self.commands.send(RouterCommand::Status { resp }).await.is_err() {
            return RouterSnapshot { queue_len: 0, current: None, urgent_count: 0, normal_count: 0, background_count: 0 };
        }
        rx.await.unwrap_or(RouterSnapshot { queue_len: 0, current: None, urgent_count: 0, normal_count: 0, background_count: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoutingMode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn handle_with_local_provider(server: &MockServer) -> RouterHandle {
        let mut registry = ProviderRegistry::new();
        registry.register("local", "local", server.uri(), 5_000);
        let memory = Arc::new(MemoryEngine::new());
        let handle = RouterHandle::spawn(memory, Arc::new(registry), RouterConfig { mode: RoutingMode::Local, threshold: 6, privacy_mode: false }, DEFAULT_QUEUE_CAPACITY, "local");
        handle.set_executor_status(true, false).await;
        handle
    }

    fn sse_body(tokens: &[&str]) -> String {
        let mut body = String::new();
        for t in tokens {
            body.push_str(&format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{t}\"}}}}]}}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn submit_dispatches_and_streams_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&["hello", " world"]), "text/event-stream"))
            .mount(&server)
            .await;

        let handle = handle_with_local_provider(&server).await;
        let mut events = handle.subscribe();
        let ack = handle.submit("chan", "user", "hi").await.unwrap();

        let mut saw_complete = false;
        for _ in 0..10 {
            match tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await {
                Ok(Ok(TaskEvent::Complete { id, response })) if id == ack.id => {
                    assert_eq!(response, "hello world");
                    saw_complete = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_complete, "expected a Complete event for the submitted task");
    }

    #[tokio::test]
    async fn urgent_submission_preempts_a_running_lower_priority_task() {
        let server = MockServer::start().await;
        // A slow-to-start stream keeps the first task "running" long enough
        // for the second, URGENT submission to observe and preempt it.
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(300)).set_body_raw(sse_body(&["slow"]), "text/event-stream"))
            .mount(&server)
            .await;

        let handle = handle_with_local_provider(&server).await;
        let mut events = handle.subscribe();
        let background = handle.submit("c", "u", "a short background message").await.unwrap();
        let urgent = handle.submit("c", "u", "now immediately urgent request").await.unwrap();

        let mut saw_preempted = false;
        for _ in 0..10 {
            match tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await {
                Ok(Ok(TaskEvent::Preempted { id })) if id == background.id => {
                    saw_preempted = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_preempted, "expected the background task to be preempted by the urgent one");
        assert_ne!(urgent.id, background.id);
    }

    #[tokio::test]
    async fn cancel_unknown_task_reports_not_found() {
        let memory = Arc::new(MemoryEngine::new());
        let registry = Arc::new(ProviderRegistry::new());
        let handle = RouterHandle::spawn(memory, registry, RouterConfig::default(), DEFAULT_QUEUE_CAPACITY, "local");
        let outcome = handle.cancel("nonexistent-id").await;
        assert_eq!(outcome, CancelOutcome::NotFound);
    }
}
