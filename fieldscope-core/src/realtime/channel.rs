//! Connection task behind a realtime subscription
//!
//! [`subscribe`] spawns one tokio task per (token, field) scope. The task
//! owns the socket; the caller owns a [`RealtimeHandle`] carrying the event
//! receiver and a shutdown signal. Dropping the handle or calling
//! [`RealtimeHandle::close`] is a deliberate teardown: the task sends a
//! close frame and exits without emitting `ConnectionLost`, so switching
//! fields never surfaces a spurious loss notice.
//!
//! Unexpected closes reconnect with exponential backoff when configured,
//! emitting `Reconnecting` per attempt and a single final `ConnectionLost`
//! once attempts are exhausted (or immediately when reconnect is off).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{parse_frame, RealtimeEvent};
use crate::config::{GatewayConfig, RealtimeConfig};

/// Events buffered before backpressure stalls the socket reader.
const EVENT_BUFFER: usize = 256;

/// Handle to a live realtime subscription.
pub struct RealtimeHandle {
    events: mpsc::Receiver<RealtimeEvent>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RealtimeHandle {
    /// Receive the next event. `None` once the channel has shut down.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }

    /// Non-blocking drain for synchronous render loops.
    pub fn try_next_event(&mut self) -> Option<RealtimeEvent> {
        self.events.try_recv().ok()
    }

    /// Tear the subscription down and wait for the task to finish.
    ///
    /// Dropping the handle has the same effect without the wait.
    pub async fn close(self) {
        let RealtimeHandle {
            events,
            shutdown,
            task,
        } = self;
        drop(events);
        let _ = shutdown.send(true);
        let _ = task.await;
    }
}

/// Open the push-notification channel for a (token, field) scope.
pub fn subscribe(
    gateway: &GatewayConfig,
    realtime: &RealtimeConfig,
    token: &str,
    field: &str,
) -> RealtimeHandle {
    let url = gateway.notifications_url(token, field);
    let config = realtime.clone();
    let field = field.to_string();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run(url, field, config, events_tx, shutdown_rx));

    RealtimeHandle {
        events: events_rx,
        shutdown: shutdown_tx,
        task,
    }
}

/// Why one connection attempt ended.
enum Exit {
    /// Shutdown was signalled or the consumer went away
    Deliberate,
    /// The transport failed; `connected` is true when the socket had opened
    Dropped { reason: String, connected: bool },
}

async fn run(
    url: String,
    field: String,
    config: RealtimeConfig,
    events: mpsc::Sender<RealtimeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        match connect_once(&url, &field, &events, &mut shutdown).await {
            Exit::Deliberate => {
                tracing::debug!(field, "Realtime channel closed");
                return;
            }
            Exit::Dropped { reason, connected } => {
                if connected {
                    attempt = 0;
                }

                if !config.reconnect {
                    tracing::warn!(field, reason, "Realtime connection lost, reconnect disabled");
                    let _ = events.send(RealtimeEvent::ConnectionLost { reason }).await;
                    return;
                }

                attempt += 1;
                if config.max_attempts != 0 && attempt > config.max_attempts {
                    tracing::warn!(
                        field,
                        attempts = config.max_attempts,
                        reason,
                        "Realtime reconnect attempts exhausted"
                    );
                    let _ = events.send(RealtimeEvent::ConnectionLost { reason }).await;
                    return;
                }

                let delay = reconnect_delay(&config, attempt);
                tracing::info!(field, attempt, delay_ms = delay.as_millis() as u64, reason,
                    "Realtime connection dropped, reconnecting");
                if events
                    .send(RealtimeEvent::Reconnecting { attempt, delay })
                    .await
                    .is_err()
                {
                    return;
                }

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

/// Drive one connection until it ends, forwarding decoded frames.
async fn connect_once(
    url: &str,
    field: &str,
    events: &mpsc::Sender<RealtimeEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Exit {
    let (stream, _) = match connect_async(url).await {
        Ok(pair) => pair,
        Err(e) => {
            return Exit::Dropped {
                reason: format!("connect failed: {}", e),
                connected: false,
            }
        }
    };

    // Shutdown may have raced the handshake
    if *shutdown.borrow() {
        return Exit::Deliberate;
    }

    let (mut write, mut read) = stream.split();

    if events.send(RealtimeEvent::Connected).await.is_err() {
        let _ = write.send(Message::Close(None)).await;
        return Exit::Deliberate;
    }
    tracing::info!(field, "Realtime channel connected");

    loop {
        tokio::select! {
            // A signal or a dropped handle both mean deliberate teardown
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Exit::Deliberate;
            }
            item = read.next() => {
                match item {
                    None => {
                        return Exit::Dropped {
                            reason: "connection closed".to_string(),
                            connected: true,
                        }
                    }
                    Some(Err(e)) => {
                        return Exit::Dropped {
                            reason: e.to_string(),
                            connected: true,
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_frame(&text) {
                            if events.send(event).await.is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return Exit::Deliberate;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server: {}", f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return Exit::Dropped { reason, connected: true };
                    }
                    // Binary and pong frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Exponential backoff for `attempt` (1-based), capped, with up to 25%
/// pseudo-random jitter.
fn reconnect_delay(config: &RealtimeConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = (config.initial_delay_ms as f64) * config.delay_multiplier.powi(exponent as i32);
    let capped = (base.min(config.max_delay_ms as f64) as u64).max(1);

    let mut hasher = DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    let jitter = hasher.finish() % (capped / 4).max(1);

    Duration::from_millis(capped + jitter)
}
