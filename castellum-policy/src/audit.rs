use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// One audit record for a PUT/DELETE/error-resolved call (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub actor: String,
    pub target: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// A bounded in-memory queue feeding a background publisher task. When the
/// downstream sink is unavailable, events accumulate up to `capacity` and
/// the oldest ones are dropped rather than blocking the request path (spec
/// §6 "queue in memory with a reconnection and retry discipline"; spec §7
/// "Policy / downstream-publisher fault: logged and counted; never blocks
/// the foreground request").
pub struct AuditPublisher {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditPublisher {
    /// Spawns the background task. `endpoint = None` means no downstream is
    /// configured (`RABBITMQ_URL` unset); events are logged and dropped.
    pub fn spawn(endpoint: Option<String>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        tokio::spawn(run_publisher(receiver, endpoint));
        Self { sender }
    }

    /// Enqueues an event without blocking the caller. If the queue is full
    /// the event is dropped and counted, per spec §7.
    pub fn emit(&self, event: AuditEvent) {
        if self.sender.try_send(event).is_err() {
            warn!("audit event queue full, dropping event");
        }
    }
}

async fn run_publisher(mut receiver: mpsc::Receiver<AuditEvent>, endpoint: Option<String>) {
    let Some(endpoint) = endpoint else {
        while let Some(event) = receiver.recv().await {
            info!(actor = %event.actor, action = %event.action, target = %event.target, "audit event (no downstream configured)");
        }
        return;
    };

    let client = reqwest::Client::new();
    let mut backoff_secs = 1u64;
    const MAX_BACKOFF_SECS: u64 = 60;

    while let Some(event) = receiver.recv().await {
        loop {
            match client.post(&endpoint).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    backoff_secs = 1;
                    break;
                }
                Ok(response) => {
                    warn!(status = %response.status(), "audit publisher rejected event");
                    break;
                }
                Err(err) => {
                    error!(error = %err, backoff_secs, "audit publisher unreachable, retrying");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_downstream_does_not_panic() {
        let publisher = AuditPublisher::spawn(None, 4);
        publisher.emit(AuditEvent {
            actor: "alice".to_string(),
            target: "project-1/manila-shares".to_string(),
            action: "enable".to_string(),
            payload: serde_json::json!({}),
            recorded_at: chrono::Utc::now(),
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn full_queue_drops_rather_than_blocks() {
        let publisher = AuditPublisher::spawn(None, 1);
        for _ in 0..10 {
            publisher.emit(AuditEvent {
                actor: "alice".to_string(),
                target: "project-1/manila-shares".to_string(),
                action: "update".to_string(),
                payload: serde_json::json!({}),
                recorded_at: chrono::Utc::now(),
            });
        }
    }
}
