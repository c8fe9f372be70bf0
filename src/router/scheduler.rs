//! The scheduler — the Task Router's event loop, run as a background worker
//! task (spec §4.1, §5 "the router is not a library call, it is a service").
//!
//! Commands arrive over an `mpsc` handoff channel; every observable event
//! (queued, routed, streamed, completed, preempted, cancelled, dropped,
//! errored) goes out over a `broadcast` channel so any number of Channel
//! Gateway connections can subscribe. Dispatch of the currently running task
//! happens in its own spawned subtask so the loop can keep accepting
//! commands — in particular, so a higher-priority `Submit` can preempt a
//! running task without waiting for it to finish.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::RouterError;
use crate::memory::MemoryEngine;
use crate::providers::{NormalizedMessage, ProviderRegistry};
use crate::types::{CancelOutcome, DropReason, Priority, Route, RouterConfig, RouterSnapshot, SubmitAck, Task, TaskEvent, TurnRole};

use super::decision::{decide_route, derive_priority};
use super::queue::{AdmitOutcome, TaskQueue};
use super::scoring::score;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 256;

pub enum RouterCommand {
    Submit { channel_id: String, user_id: String, message: String, resp: oneshot::Sender<Result<SubmitAck, RouterError>> },
    Cancel { id: String, resp: oneshot::Sender<CancelOutcome> },
    ClearQueue,
    UpdateConfig { config: RouterConfig },
    SetExecutorStatus { local_model_loaded: bool, cloud_available: bool },
    Status { resp: oneshot::Sender<RouterSnapshot> },
    /// Self-notification sent by a dispatch subtask when it finishes
    /// (complete, errored, or cancelled) — not part of the public API.
    Finished { id: String },
}

/// Bookkeeping for the task currently being dispatched, so a preempting
/// `Submit` can tell the scheduler which in-flight dispatch to cancel and,
/// if preempted, re-admit the same task at the front of its lane.
struct RunningTask {
    task: Task,
    cancel: CancellationToken,
}

struct SchedulerState {
    queue: TaskQueue,
    config: RouterConfig,
    executor: crate::types::ExecutorStatus,
    current: Option<RunningTask>,
}

/// Drives dispatch for one task: assembles context, streams tokens from the
/// chosen provider, forwards them as `TaskEvent::Stream`, and emits
/// `Complete`/`Error`/`Cancelled` at the end. Runs as its own spawned task so
/// preemption can cancel it without blocking the command loop.
///
/// Races the whole dispatch against cancellation rather than only checking
/// it between tokens, so preemption can drop an in-flight request before it
/// even reaches the streaming loop.
async fn dispatch_task(
    task: Task,
    memory: Arc<MemoryEngine>,
    providers: Arc<ProviderRegistry>,
    default_cloud_provider: String,
    cancel: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    self_tx: mpsc::Sender<RouterCommand>,
) {
    let id = task.id.clone();
    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = events.send(TaskEvent::Cancelled { id: id.clone() });
        }
        _ = run_dispatch(&task, &memory, &providers, &default_cloud_provider, &events) => {}
    }
    let _ = self_tx.send(RouterCommand::Finished { id }).await;
}

async fn run_dispatch(
    task: &Task,
    memory: &Arc<MemoryEngine>,
    providers: &Arc<ProviderRegistry>,
    default_cloud_provider: &str,
    events: &broadcast::Sender<TaskEvent>,
) {
    let _ = events.send(TaskEvent::Routed {
        id: task.id.clone(),
        route: task.route,
        complexity: task.complexity,
        priority: task.priority,
        realtime: task.realtime,
        privacy_flag: task.privacy_flag,
    });

    memory.record_turn(&task.channel_id, &task.user_id, TurnRole::User, &task.message).await;

    let provider_id = match task.route {
        Route::Local => "local",
        Route::Cloud => default_cloud_provider,
    };

    let client = match providers.get(provider_id) {
        Ok(client) => client,
        Err(e) => {
            let _ = events.send(TaskEvent::Error { id: task.id.clone(), error: e.to_string() });
            return;
        }
    };

    let context = task.context.clone().unwrap_or_else(|| task.message.clone());
    let messages = vec![NormalizedMessage::user(context)];
    let model = default_model_for(task.route);
    let credential = providers.credential_for(provider_id);

    let stream = match client.chat_stream(credential, model, &messages).await {
        Ok(s) => s,
        Err(e) => {
            let _ = events.send(TaskEvent::Error { id: task.id.clone(), error: e.to_string() });
            return;
        }
    };

    use futures_util::StreamExt as _;
    tokio::pin!(stream);
    let mut accumulated = String::new();
    while let Some(next) = stream.next().await {
        match next {
            Ok(token) => {
                accumulated.push_str(&token);
                let _ = events.send(TaskEvent::Stream { id: task.id.clone(), token });
            }
            Err(e) => {
                let _ = events.send(TaskEvent::Error { id: task.id.clone(), error: e.to_string() });
                return;
            }
        }
    }

    memory.record_turn(&task.channel_id, &task.user_id, TurnRole::Assistant, &accumulated).await;
    let _ = events.send(TaskEvent::Complete { id: task.id.clone(), response: accumulated });
}

fn default_model_for(route: Route) -> &'static str {
    match route {
        Route::Local => "local-default",
        Route::Cloud => "cloud-default",
    }
}

/// Pull the next queued task (if any) and launch its dispatch subtask,
/// recording it as `current`.
fn start_next(
    state: &mut SchedulerState,
    memory: &Arc<MemoryEngine>,
    providers: &Arc<ProviderRegistry>,
    default_cloud_provider: &str,
    events: &broadcast::Sender<TaskEvent>,
    self_tx: &mpsc::Sender<RouterCommand>,
) {
    let Some(task) = state.queue.pop_next() else {
        state.current = None;
        return;
    };
    let cancel = CancellationToken::new();
    state.current = Some(RunningTask { task: task.clone(), cancel: cancel.clone() });
    tokio::spawn(dispatch_task(task, memory.clone(), providers.clone(), default_cloud_provider.to_string(), cancel, events.clone(), self_tx.clone()));
}

/// The scheduler's main command loop. Owns all mutable state; every other
/// handle only ever talks to it through [`RouterCommand`].
pub async fn run(
    mut commands: mpsc::Receiver<RouterCommand>,
    self_tx: mpsc::Sender<RouterCommand>,
    events: broadcast::Sender<TaskEvent>,
    memory: Arc<MemoryEngine>,
    providers: Arc<ProviderRegistry>,
    initial_config: RouterConfig,
    queue_capacity: usize,
    default_cloud_provider: String,
) {
    let mut state = SchedulerState {
        queue: TaskQueue::new(queue_capacity),
        config: initial_config,
        executor: crate::types::ExecutorStatus::default(),
        current: None,
    };

    while let Some(command) = commands.recv().await {
        match command {
            RouterCommand::Submit { channel_id, user_id, message, resp } => {
                let scored = score(&message, &state.config);
                let priority = derive_priority(scored.complexity, scored.realtime);
                let route = match decide_route(scored.privacy_flag, scored.realtime, scored.complexity, &state.config, &state.executor) {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = resp.send(Err(e));
                        continue;
                    }
                };

                let mut task = Task::new(channel_id, user_id, message);
                task.complexity = scored.complexity;
                task.priority = priority;
                task.route = route;
                task.realtime = scored.realtime;
                task.privacy_flag = scored.privacy_flag;
                task.context = Some(memory.assemble_context(&task.message, &task.message).await);
                let id = task.id.clone();

                let preempts_current = priority == Priority::Urgent
                    && state.current.as_ref().map(|c| c.task.priority != Priority::Urgent).unwrap_or(false);

                if preempts_current {
                    let running = state.current.take().expect("preempts_current implies Some");
                    running.cancel.cancel();
                    let _ = events.send(TaskEvent::Preempted { id: running.task.id.clone() });
                    state.queue.requeue_front(running.task);

                    let cancel = CancellationToken::new();
                    state.current = Some(RunningTask { task: task.clone(), cancel: cancel.clone() });
                    tokio::spawn(dispatch_task(task, memory.clone(), providers.clone(), default_cloud_provider.clone(), cancel, events.clone(), self_tx.clone()));
                    let _ = resp.send(Ok(SubmitAck { id, queued_position: None }));
                    continue;
                }

                match state.queue.admit(task) {
                    AdmitOutcome::Enqueued { position } => {
                        let _ = events.send(TaskEvent::Queued { id: id.clone(), position });
                        let _ = resp.send(Ok(SubmitAck { id, queued_position: Some(position) }));
                    }
                    AdmitOutcome::EnqueuedWithEviction { position, evicted_id } => {
                        let _ = events.send(TaskEvent::Dropped { id: evicted_id, reason: DropReason::QueueOverflow });
                        let _ = events.send(TaskEvent::Queued { id: id.clone(), position });
                        let _ = resp.send(Ok(SubmitAck { id, queued_position: Some(position) }));
                    }
                    AdmitOutcome::Rejected => {
                        let _ = resp.send(Err(RouterError::QueueFull));
                    }
                }

                if state.current.is_none() {
                    start_next(&mut state, &memory, &providers, &default_cloud_provider, &events, &self_tx);
                }
            }
            RouterCommand::Cancel { id, resp } => {
                if let Some(running) = &state.current {
                    if running.task.id == id {
                        running.cancel.cancel();
                        let _ = resp.send(CancelOutcome::AlreadyRunning);
                        continue;
                    }
                }
                let outcome = if state.queue.remove(&id).is_some() { CancelOutcome::Cancelled } else { CancelOutcome::NotFound };
                let _ = resp.send(outcome);
            }
            RouterCommand::ClearQueue => {
                state.queue.clear();
            }
            RouterCommand::UpdateConfig { config } => {
                state.config = config;
            }
            RouterCommand::SetExecutorStatus { local_model_loaded, cloud_available } => {
                state.executor.local_model_loaded = local_model_loaded;
                state.executor.cloud_available = cloud_available;
            }
            RouterCommand::Status { resp } => {
                let snapshot = state.queue.snapshot(state.current.as_ref().map(|c| c.task.id.clone()));
                let _ = resp.send(snapshot);
            }
            RouterCommand::Finished { id } => {
                // A dispatch subtask finishing a task that preemption has
                // already displaced must not clear the new `current` slot.
                if state.current.as_ref().map(|c| c.task.id == id).unwrap_or(false) {
                    state.current = None;
                }
            }
        }

        if state.current.is_none() && !state.queue.is_empty() {
            start_next(&mut state, &memory, &providers, &default_cloud_provider, &events, &self_tx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_command_channel_capacities_are_sane() {
        assert!(EVENT_CHANNEL_CAPACITY >= COMMAND_CHANNEL_CAPACITY);
    }
}
