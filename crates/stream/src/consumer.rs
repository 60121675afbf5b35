//! Long-lived SSE consumer with resumable reconnection.
//!
//! `open` spawns one task per stream. The task owns the HTTP connection,
//! the event cursor and the replay filter; callers read events from a
//! bounded channel and watch the state through a `watch` receiver.
//!
//! Delivery rules:
//! - Events are delivered in arrival order, each at most once.
//! - Every reconnect sends `Last-Event-ID` with the last delivered id, and
//!   ids already delivered on this stream are skipped if the server
//!   replays them.
//! - A full channel blocks the reader task (backpressure), it never drops.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::StatusCode;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use im_credentials::SessionState;
use im_domain::config::StreamConfig;
use im_domain::error::{Error, Result};
use im_domain::{AccessToken, StreamEvent};

use crate::backoff::Backoff;
use crate::decode::decode_frame;
use crate::sse::{SseDecoder, SseFrame};
use crate::state::{CloseReason, StreamOutcome, StreamState};
use crate::target::StreamTarget;

pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";
pub const ORG_ID_HEADER: &str = "X-Org-Id";

/// Replayed ids remembered per stream.
const REPLAY_WINDOW: usize = 512;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consumer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EventStreamConsumer {
    http: reqwest::Client,
    target: StreamTarget,
    backoff: Backoff,
    idle_timeout: Duration,
    connect_timeout: Duration,
    capacity: usize,
    session: Option<Arc<SessionState>>,
}

impl EventStreamConsumer {
    pub fn new(target: StreamTarget, config: &StreamConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        // No overall request timeout: the response body is open-ended.
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("stream HTTP client: {e}")))?;

        Ok(Self {
            http,
            target,
            backoff: Backoff::from_config(config),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            connect_timeout,
            capacity: config.channel_capacity.max(1),
            session: None,
        })
    }

    /// Mirror delivered event ids into the session so a later `open`
    /// resumes from the same cursor.
    pub fn with_session(mut self, session: Arc<SessionState>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// Start streaming. `last_event_id` overrides the token's cursor.
    pub fn open(&self, token: AccessToken, last_event_id: Option<String>) -> StreamHandle {
        let (tx, rx) = mpsc::channel(self.capacity);
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);
        let cancel = CancellationToken::new();

        let cursor = last_event_id.or_else(|| token.last_event_id.clone());
        let worker = StreamWorker {
            http: self.http.clone(),
            target: self.target.clone(),
            backoff: self.backoff,
            idle_timeout: self.idle_timeout,
            connect_timeout: self.connect_timeout,
            session: self.session.clone(),
            token,
            last_event_id: cursor,
            delivered_ids: VecDeque::with_capacity(REPLAY_WINDOW),
            delivered: 0,
            retry_hint: None,
            tx,
            state: state_tx,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(worker.run());
        StreamHandle {
            events: rx,
            state: state_rx,
            cancel,
            task,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caller side of an open stream.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Next event; `None` once the stream task has finished and the
    /// channel is drained.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Token that stops the stream when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the stream and wait for the task to exit. Idempotent with
    /// respect to an already finished task.
    pub async fn close(self) -> StreamOutcome {
        let Self {
            events,
            cancel,
            task,
            ..
        } = self;
        cancel.cancel();
        // Unblocks a task waiting on a full channel.
        drop(events);
        join_outcome(task).await
    }

    /// Wait for the task to finish on its own, discarding undelivered
    /// events.
    pub async fn join(self) -> StreamOutcome {
        let Self { events, task, .. } = self;
        drop(events);
        join_outcome(task).await
    }
}

async fn join_outcome(task: JoinHandle<StreamOutcome>) -> StreamOutcome {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "stream task panicked");
            StreamOutcome {
                reason: CloseReason::Cancelled,
                last_event_id: None,
                events_delivered: 0,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum ConnectError {
    /// 401/403: the bearer token is no longer accepted.
    Unauthorized(String),
    Failed(String),
}

enum PumpEnd {
    Cancelled,
    /// Receiver dropped, or cancelled while waiting to deliver.
    ReceiverGone,
    /// Connection lost; `progressed` if at least one event was delivered.
    Dropped { reason: String, progressed: bool },
}

/// What `handle_frame` did with one frame.
enum FrameOutcome {
    Delivered,
    /// Heartbeat, hint-only frame or replayed id.
    Skipped,
    ReceiverGone,
}

struct StreamWorker {
    http: reqwest::Client,
    target: StreamTarget,
    backoff: Backoff,
    idle_timeout: Duration,
    connect_timeout: Duration,
    session: Option<Arc<SessionState>>,
    token: AccessToken,
    last_event_id: Option<String>,
    delivered_ids: VecDeque<String>,
    delivered: u64,
    retry_hint: Option<Duration>,
    tx: mpsc::Sender<StreamEvent>,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
}

impl StreamWorker {
    async fn run(mut self) -> StreamOutcome {
        if self.token.is_expired_at(Utc::now()) {
            tracing::warn!(
                expires_at = %self.token.expires_at,
                "access token expired before stream open"
            );
            self.emit(StreamEvent::token_expired("access token expired; refresh and reopen"))
                .await;
            return self.finish(CloseReason::TokenExpired);
        }

        // Consecutive reconnects without progress.
        let mut attempt: u32 = 0;
        let mut connected_once = false;
        self.set_state(StreamState::Connecting);

        loop {
            tracing::info!(
                url = %self.target.url,
                last_event_id = ?self.last_event_id,
                attempt,
                "connecting to event stream"
            );
            let connected = tokio::select! {
                r = self.connect() => Some(r),
                _ = self.cancel.cancelled() => None,
            };
            let Some(connected) = connected else {
                return self.finish(CloseReason::Cancelled);
            };

            match connected {
                Ok(response) => {
                    connected_once = true;
                    self.set_state(StreamState::Streaming);
                    match self.pump(response).await {
                        PumpEnd::Cancelled => return self.finish(CloseReason::Cancelled),
                        PumpEnd::ReceiverGone => return self.finish_stopped(),
                        PumpEnd::Dropped { reason, progressed } => {
                            if progressed {
                                attempt = 0;
                            }
                            tracing::warn!(
                                %reason,
                                last_event_id = ?self.last_event_id,
                                "event stream dropped"
                            );
                            if !self.emit(StreamEvent::transport(reason)).await {
                                return self.finish_stopped();
                            }
                        }
                    }
                }
                Err(ConnectError::Unauthorized(message)) => {
                    tracing::warn!(%message, "event stream rejected the access token");
                    self.emit(StreamEvent::token_expired(message)).await;
                    return self.finish(CloseReason::TokenExpired);
                }
                Err(ConnectError::Failed(message)) if !connected_once => {
                    tracing::error!(%message, "event stream connect failed");
                    self.emit(StreamEvent::connect_failed(message.clone())).await;
                    return self.finish(CloseReason::ConnectFailed { message });
                }
                Err(ConnectError::Failed(message)) => {
                    tracing::warn!(%message, attempt, "event stream reconnect failed");
                }
            }

            // Reconnect path.
            if self.token.is_expired_at(Utc::now()) {
                self.emit(StreamEvent::token_expired(
                    "access token expired while reconnecting; refresh and reopen",
                ))
                .await;
                return self.finish(CloseReason::TokenExpired);
            }

            attempt += 1;
            if self.backoff.exhausted(attempt) {
                let attempts = self.backoff.max_attempts();
                tracing::error!(attempts, "event stream reconnect attempts exhausted");
                self.emit(StreamEvent::terminated(Error::StreamTerminated { attempts }.to_string()))
                    .await;
                return self.finish(CloseReason::Terminated { attempts });
            }

            self.set_state(StreamState::Reconnecting);
            let delay = self.backoff.delay_with_hint(attempt, self.retry_hint);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt,
                "reconnecting event stream"
            );
            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = self.cancel.cancelled() => true,
            };
            if cancelled {
                return self.finish(CloseReason::Cancelled);
            }
        }
    }

    async fn connect(&self) -> std::result::Result<reqwest::Response, ConnectError> {
        let mut request = self
            .http
            .get(&self.target.url)
            .query(&self.target.query)
            .bearer_auth(&self.token.token)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header(ORG_ID_HEADER, &self.target.org_id);
        if let Some(id) = &self.last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, id);
        }

        let response = match tokio::time::timeout(self.connect_timeout, request.send()).await {
            Err(_) => {
                return Err(ConnectError::Failed(format!(
                    "no response within {} ms",
                    self.connect_timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(ConnectError::Failed(e.to_string())),
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::Unauthorized(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::Failed(format!("HTTP {status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("text/event-stream") {
            tracing::warn!(content_type, "event stream responded with unexpected content type");
        }
        Ok(response)
    }

    async fn pump(&mut self, response: reqwest::Response) -> PumpEnd {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut progressed = false;

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return PumpEnd::Cancelled,
                n = tokio::time::timeout(self.idle_timeout, body.next()) => n,
            };

            let chunk = match next {
                Err(_) => {
                    return PumpEnd::Dropped {
                        reason: format!("no data for {} ms", self.idle_timeout.as_millis()),
                        progressed,
                    }
                }
                Ok(None) => {
                    if decoder.has_partial() {
                        tracing::debug!("discarding partial frame at end of stream");
                    }
                    return PumpEnd::Dropped {
                        reason: "connection closed by server".into(),
                        progressed,
                    };
                }
                Ok(Some(Err(e))) => {
                    return PumpEnd::Dropped {
                        reason: e.to_string(),
                        progressed,
                    }
                }
                Ok(Some(Ok(bytes))) => bytes,
            };

            for frame in decoder.push(&chunk) {
                match self.handle_frame(frame).await {
                    FrameOutcome::Delivered => progressed = true,
                    FrameOutcome::Skipped => {}
                    FrameOutcome::ReceiverGone => return PumpEnd::ReceiverGone,
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: SseFrame) -> FrameOutcome {
        if let Some(ms) = frame.retry {
            self.retry_hint = Some(Duration::from_millis(ms));
        }

        if let Some(id) = frame.id.as_deref() {
            if self.delivered_ids.iter().any(|seen| seen == id) {
                tracing::debug!(id, "skipping replayed event");
                return FrameOutcome::Skipped;
            }
        }

        let outcome = match decode_frame(&frame) {
            Some(event) => {
                tracing::trace!(id = ?frame.id, event = ?frame.event, "event received");
                let sent = tokio::select! {
                    r = self.tx.send(event) => r.is_ok(),
                    _ = self.cancel.cancelled() => false,
                };
                if !sent {
                    return FrameOutcome::ReceiverGone;
                }
                self.delivered += 1;
                FrameOutcome::Delivered
            }
            None => FrameOutcome::Skipped,
        };

        if let Some(id) = frame.id {
            self.remember(id);
        }
        outcome
    }

    fn remember(&mut self, id: String) {
        if let Some(session) = &self.session {
            session.record_event_id(&id);
        }
        if self.delivered_ids.len() == REPLAY_WINDOW {
            self.delivered_ids.pop_front();
        }
        self.delivered_ids.push_back(id.clone());
        self.last_event_id = Some(id);
    }

    /// Deliver a synthetic event. Returns `false` when nobody is listening.
    async fn emit(&self, event: StreamEvent) -> bool {
        tokio::select! {
            r = self.tx.send(event) => r.is_ok(),
            _ = self.cancel.cancelled() => false,
        }
    }

    fn set_state(&self, state: StreamState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "stream state");
        }
    }

    /// Delivery stopped: either `close()` or the receiver went away.
    fn finish_stopped(self) -> StreamOutcome {
        if self.cancel.is_cancelled() {
            self.finish(CloseReason::Cancelled)
        } else {
            self.finish(CloseReason::ReceiverDropped)
        }
    }

    fn finish(self, reason: CloseReason) -> StreamOutcome {
        self.set_state(StreamState::Disconnected);
        tracing::info!(
            ?reason,
            last_event_id = ?self.last_event_id,
            delivered = self.delivered,
            "event stream closed"
        );
        StreamOutcome {
            reason,
            last_event_id: self.last_event_id,
            events_delivered: self.delivered,
        }
    }
}
