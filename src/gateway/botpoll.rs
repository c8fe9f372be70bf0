//! Bot long-poll worker — spec.md §4.4 "Bot long-poll loop".
//!
//! Issues `getUpdates` against the configured bot API with a
//! monotonically-increasing `offset` cursor, translating each update into a
//! task submitted to the Router (or, for the bounded slash-command set,
//! handling it synchronously without touching the Router at all). The wire
//! shape mirrors a Telegram-style bot API — the concrete shape spec.md
//! leaves unspecified; this crate picks the one the pack's other examples
//! use (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::types::TaskEvent;

use super::GatewayState;

const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const SLASH_COMMANDS: &[&str] = &["/start", "/help", "/clear", "/model", "/status"];

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<Voice>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Voice {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    data: Option<String>,
    message: Option<Message>,
}

/// Runs forever, polling `base_url` and dispatching into `state.router`.
/// Spawned once from `main` when `gateway.bot_api_base` is configured.
pub async fn run(state: Arc<GatewayState>, base_url: String, poll_interval: Duration) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 5))
        .build()
        .expect("failed to build bot API client");

    let mut offset: i64 = 0;
    loop {
        match get_updates(&client, &base_url, offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    handle_update(&state, &client, &base_url, update).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "bot getUpdates failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn get_updates(client: &reqwest::Client, base_url: &str, offset: i64) -> anyhow::Result<Vec<Update>> {
    let url = format!("{base_url}/getUpdates");
    let response = client
        .get(&url)
        .query(&[("offset", offset.to_string()), ("timeout", LONG_POLL_TIMEOUT_SECS.to_string())])
        .send()
        .await?;
    let body: GetUpdatesResponse = response.json().await?;
    Ok(body.result)
}

async fn send_message(client: &reqwest::Client, base_url: &str, chat_id: i64, text: &str) {
    let url = format!("{base_url}/sendMessage");
    let payload = json!({ "chat_id": chat_id, "text": text });
    if let Err(e) = client.post(&url).json(&payload).send().await {
        warn!(error = %e, "sendMessage failed");
    }
}

async fn handle_update(state: &Arc<GatewayState>, client: &reqwest::Client, base_url: &str, update: Update) {
    if let Some(callback) = update.callback_query {
        let Some(chat_id) = callback.message.as_ref().map(|m| m.chat.id) else { return };
        let data = callback.data.unwrap_or_default();
        let text = format!("[CALLBACK:{data}]");
        dispatch_text(state, client, base_url, chat_id, text).await;
        return;
    }

    let Some(message) = update.message else { return };
    let chat_id = message.chat.id;

    if let Some(text) = message.text {
        if let Some(reply) = handle_slash_command(state, &text).await {
            send_message(client, base_url, chat_id, &reply).await;
            return;
        }
        dispatch_text(state, client, base_url, chat_id, text).await;
        return;
    }

    if let Some(voice) = message.voice {
        let placeholder = format!("[VOICE MESSAGE file_id={}]", voice.file_id);
        dispatch_text(state, client, base_url, chat_id, placeholder).await;
    }
}

/// Submit `text` to the Router as the given chat's task and relay its
/// terminal event back via `sendMessage`.
async fn dispatch_text(state: &Arc<GatewayState>, client: &reqwest::Client, base_url: &str, chat_id: i64, text: String) {
    let channel_id = format!("bot:{chat_id}");
    let mut events = state.router.subscribe();

    let ack = match state.router.submit(channel_id, chat_id.to_string(), text).await {
        Ok(ack) => ack,
        Err(e) => {
            send_message(client, base_url, chat_id, &format!("error: {e}")).await;
            return;
        }
    };

    loop {
        match events.recv().await {
            Ok(TaskEvent::Complete { id, response }) if id == ack.id => {
                send_message(client, base_url, chat_id, &response).await;
                return;
            }
            Ok(TaskEvent::Error { id, error }) if id == ack.id => {
                send_message(client, base_url, chat_id, &format!("error: {error}")).await;
                return;
            }
            Ok(TaskEvent::Cancelled { id }) if id == ack.id => {
                send_message(client, base_url, chat_id, "cancelled").await;
                return;
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}

/// Handles the bounded slash-command set synchronously, bypassing the
/// Router entirely. Returns `None` for non-command text.
async fn handle_slash_command(state: &Arc<GatewayState>, text: &str) -> Option<String> {
    let command = text.split_whitespace().next()?;
    if !command.starts_with('/') {
        return None;
    }
    if !SLASH_COMMANDS.contains(&command) {
        return Some("Unknown command".to_string());
    }

    Some(match command {
        "/start" => "Welcome! Send a message to get started.".to_string(),
        "/help" => "Commands: /start, /help, /clear, /model, /status".to_string(),
        "/clear" => {
            state.router.clear_queue().await;
            "Queue cleared.".to_string()
        }
        "/model" => {
            let config = state.config.read().await;
            config
                .providers
                .get("local")
                .and_then(|p| p.model.clone())
                .unwrap_or_else(|| "No local model configured.".to_string())
        }
        "/status" => {
            let snapshot = state.router.status().await;
            format!(
                "queue={} urgent={} normal={} background={}",
                snapshot.queue_len, snapshot.urgent_count, snapshot.normal_count, snapshot.background_count
            )
        }
        _ => unreachable!("command already checked against SLASH_COMMANDS"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::memory::MemoryEngine;
    use crate::providers::ProviderRegistry;
    use crate::router::RouterHandle;
    use crate::traffic::TrafficLog;
    use tokio::sync::RwLock;

    fn test_state() -> Arc<GatewayState> {
        let memory = Arc::new(MemoryEngine::new());
        let providers = Arc::new(ProviderRegistry::new());
        let router = RouterHandle::spawn(memory.clone(), providers, Default::default(), 50, "local");
        Arc::new(GatewayState {
            router,
            memory,
            config: Arc::new(RwLock::new(AppConfig::default())),
            traffic: Arc::new(TrafficLog::new(10)),
            rate_limiter: None,
            started_at: chrono::Utc::now(),
        })
    }

    #[test]
    fn get_updates_response_parses_a_text_message() {
        let body = r#"{"ok":true,"result":[{"update_id":1,"message":{"chat":{"id":42},"text":"hello"}}]}"#;
        let parsed: GetUpdatesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.len(), 1);
        assert_eq!(parsed.result[0].message.as_ref().unwrap().chat.id, 42);
        assert_eq!(parsed.result[0].message.as_ref().unwrap().text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn non_command_text_is_not_handled_as_a_slash_command() {
        let state = test_state();
        assert_eq!(handle_slash_command(&state, "hello there").await, None);
    }

    #[tokio::test]
    async fn unknown_slash_command_gets_a_fixed_reply() {
        let state = test_state();
        assert_eq!(handle_slash_command(&state, "/wat").await, Some("Unknown command".to_string()));
    }

    #[tokio::test]
    async fn clear_command_empties_the_queue() {
        let state = test_state();
        let reply = handle_slash_command(&state, "/clear").await;
        assert_eq!(reply, Some("Queue cleared.".to_string()));
    }
}
