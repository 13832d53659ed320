//! WebSocket client with automatic reconnection

use super::backoff::Backoff;
use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How a single connection session ended without error
enum SessionEnd {
    /// Server closed the stream; reconnect
    ServerClosed,
    /// Nobody is listening anymore; stop for good
    ReceiverGone,
}

/// Reusable WebSocket client with automatic reconnection and ping/pong handling
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Create a new client with just a URL using default config
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages
    ///
    /// Spawns a background task that owns the connection. Every drop, error
    /// or server close leads to a reconnect after a jittered exponential
    /// backoff; frames missed while disconnected are not replayed. The task
    /// stops when the receiver is dropped or the attempt budget runs out.
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    /// Run the connection loop with automatic reconnection
    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
    ) -> Result<(), WsError> {
        let mut reconnect_attempts = 0;
        let mut backoff = Backoff::new(
            config.initial_reconnect_delay,
            config.max_reconnect_delay,
            config.jitter,
        );

        loop {
            let mut connected = false;
            let outcome = Self::connect_and_stream(&config, &tx, &mut connected).await;

            if connected {
                reconnect_attempts = 0;
                backoff.reset();
            }

            match outcome {
                Ok(SessionEnd::ReceiverGone) => {
                    tracing::debug!("Receiver dropped, stopping WebSocket client");
                    return Ok(());
                }
                Ok(SessionEnd::ServerClosed) => {
                    tracing::info!(url = %config.url, "WebSocket closed by server");
                }
                Err(e) => {
                    tracing::warn!(url = %config.url, error = %e, "WebSocket connection error");
                }
            }

            reconnect_attempts += 1;
            if config.max_reconnect_attempts > 0
                && reconnect_attempts > config.max_reconnect_attempts
            {
                tracing::error!("Max reconnection attempts reached");
                let _ = tx.send(WsMessage::Disconnected).await;
                return Err(WsError::MaxReconnectsExceeded);
            }

            if tx.is_closed() {
                tracing::debug!("Receiver dropped, stopping reconnection");
                return Ok(());
            }

            let delay = backoff.next_delay();
            let _ = tx
                .send(WsMessage::Reconnecting {
                    attempt: reconnect_attempts,
                    delay,
                })
                .await;

            sleep(delay).await;
        }
    }

    /// Connect to WebSocket and stream messages until the session ends
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        connected: &mut bool,
    ) -> Result<SessionEnd, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        *connected = true;

        if let Some(frame) = &config.subscribe {
            write
                .send(Message::Text(frame.clone()))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }

        tracing::info!(url = %config.url, "WebSocket connected");
        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(SessionEnd::ReceiverGone);
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                return Ok(SessionEnd::ReceiverGone);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                return Ok(SessionEnd::ReceiverGone);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Ok(SessionEnd::ServerClosed);
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }

                _ = tx.closed() => {
                    return Ok(SessionEnd::ReceiverGone);
                }
            }
        }
    }
}
