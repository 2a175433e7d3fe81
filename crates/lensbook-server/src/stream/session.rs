//! Per-user stream session.
//!
//! A session bridges one user's change-feed subscription to one outbound
//! event stream. Three sources write frames: the connect frame, the heartbeat
//! task, and feed callbacks. All of them go through [`StreamSession::emit`],
//! which holds the session lock for the duplicate check and the enqueue, so
//! frames are never interleaved and never written after close.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use lensbook_core::{ChangeCallback, ChangeFeed, SubscriptionHandle, SubscriptionRequest};
use lensbook_proto::{
    ChangeKind, ChangeRecord, Frame, Notification, NotificationId, RowFilter, UserId,
    NOTIFICATIONS_TABLE,
};

use super::dedup::DedupSet;
use super::event::sse_event;
use super::registry::SessionRegistry;
use super::StreamError;

/// Unique identifier of a stream session.
pub type SessionId = Uuid;

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of frames queued for a client before it counts as stalled.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default number of notification ids remembered for de-duplication.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Tunables for stream sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between heartbeat comments.
    pub heartbeat_interval: Duration,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
    /// Capacity of the de-duplication set.
    pub dedup_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away.
    ClientDisconnected,
    /// The outbound channel was already closed.
    TransportClosed,
    /// The client stopped draining its queue.
    SlowConsumer,
    /// The registry was shut down.
    Shutdown,
    /// The change feed refused the subscription.
    SubscribeFailed,
    /// The last handle was dropped without an explicit close.
    Dropped,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientDisconnected => "client_disconnected",
            CloseReason::TransportClosed => "transport_closed",
            CloseReason::SlowConsumer => "slow_consumer",
            CloseReason::Shutdown => "shutdown",
            CloseReason::SubscribeFailed => "subscribe_failed",
            CloseReason::Dropped => "dropped",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single emission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// The frame was queued for the client.
    Sent,
    /// The notification was already forwarded on this session.
    Duplicate,
    /// The session is closed; nothing was queued.
    Closed,
}

/// Mutable session state, guarded by the session lock.
struct SessionState {
    closed: bool,
    seen: DedupSet,
    outbound: Option<mpsc::Sender<Event>>,
    subscription: Option<SubscriptionHandle>,
    heartbeat: Option<JoinHandle<()>>,
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub user_id: UserId,
    pub opened_at: DateTime<Utc>,
    pub age_secs: u64,
    pub forwarded: u64,
    pub feed_errors: u64,
}

/// One user's live event stream.
pub struct StreamSession {
    id: SessionId,
    user_id: UserId,
    created_at: Instant,
    opened_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    feed: Arc<dyn ChangeFeed>,
    registry: Weak<SessionRegistry>,
    forwarded: AtomicU64,
    feed_errors: AtomicU64,
}

impl StreamSession {
    /// Open a session for an authenticated user.
    ///
    /// The returned stream yields server-sent events. Dropping it closes the
    /// session.
    pub fn open(
        user_id: UserId,
        feed: Arc<dyn ChangeFeed>,
        registry: &Arc<SessionRegistry>,
        config: &SessionConfig,
    ) -> Result<SessionStream, StreamError> {
        let (tx, rx) = mpsc::channel(config.outbound_buffer.max(1));

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: Instant::now(),
            opened_at: Utc::now(),
            state: Mutex::new(SessionState {
                closed: false,
                seen: DedupSet::new(config.dedup_capacity),
                outbound: Some(tx),
                subscription: None,
                heartbeat: None,
            }),
            feed,
            registry: Arc::downgrade(registry),
            forwarded: AtomicU64::new(0),
            feed_errors: AtomicU64::new(0),
        });

        registry.register(&session)?;

        // First frame on the wire, before any feed traffic can arrive.
        session.emit(&Frame::Connected)?;

        let subscription = match session.feed.subscribe(
            SubscriptionRequest::new(NOTIFICATIONS_TABLE)
                .with_kinds(&ChangeKind::ALL)
                .with_filter(RowFilter::eq("userId", user_id.to_string())),
            Self::callback(&session),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                session.close(CloseReason::SubscribeFailed);
                return Err(StreamError::Subscribe(e));
            }
        };
        session.install_subscription(subscription);
        session.install_heartbeat(spawn_heartbeat(&session, config.heartbeat_interval));

        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            "stream session opened"
        );

        Ok(SessionStream { rx, session })
    }

    /// Feed callback holding only a weak reference to the session.
    fn callback(session: &Arc<Self>) -> ChangeCallback {
        let weak = Arc::downgrade(session);
        Arc::new(move |record: &ChangeRecord| {
            if let Some(session) = weak.upgrade() {
                session.handle_change(record);
            }
            Ok(())
        })
    }

    fn install_subscription(&self, handle: SubscriptionHandle) {
        let mut state = self.state.lock();
        if state.closed {
            // Closed while subscribing; release the handle ourselves.
            drop(state);
            if let Err(e) = self.feed.unsubscribe(&handle) {
                debug!(session_id = %self.id, error = %e, "late unsubscribe failed");
            }
            return;
        }
        state.subscription = Some(handle);
    }

    fn install_heartbeat(&self, task: JoinHandle<()>) {
        let mut state = self.state.lock();
        if state.closed {
            task.abort();
            return;
        }
        state.heartbeat = Some(task);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of data frames queued for the client.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Number of change records that could not be turned into frames.
    pub fn feed_errors(&self) -> u64 {
        self.feed_errors.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            user_id: self.user_id,
            opened_at: self.opened_at,
            age_secs: self.created_at.elapsed().as_secs(),
            forwarded: self.forwarded(),
            feed_errors: self.feed_errors(),
        }
    }

    /// Queue a frame for the client.
    ///
    /// Inserted notifications are checked against the de-duplication set
    /// under the same lock as the enqueue. A closed or full outbound queue
    /// closes the session instead of failing the caller.
    pub fn emit(&self, frame: &Frame) -> Result<Emission, StreamError> {
        let event = sse_event(frame).map_err(StreamError::Encode)?;

        let failure = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(Emission::Closed);
            }
            if let Frame::Notification(notification) = frame {
                if !state.seen.insert(notification.id) {
                    trace!(
                        session_id = %self.id,
                        notification_id = %notification.id,
                        "duplicate insert suppressed"
                    );
                    return Ok(Emission::Duplicate);
                }
            }
            let Some(outbound) = state.outbound.as_ref() else {
                return Ok(Emission::Closed);
            };
            match outbound.try_send(event) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => Some(CloseReason::SlowConsumer),
                Err(TrySendError::Closed(_)) => Some(CloseReason::TransportClosed),
            }
        };

        match failure {
            None => {
                if frame.is_data() {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Emission::Sent)
            }
            Some(reason) => {
                self.close(reason);
                Ok(Emission::Closed)
            }
        }
    }

    /// Translate a change record into a frame and emit it.
    pub fn on_change(&self, record: &ChangeRecord) -> Result<Emission, StreamError> {
        let frame = match record.kind {
            ChangeKind::Insert => Frame::Notification(Box::new(self.owned_row(record)?)),
            ChangeKind::Update => Frame::NotificationUpdate(Box::new(self.owned_row(record)?)),
            ChangeKind::Delete => {
                let id = record.old_column("id").map_err(StreamError::Payload)?;
                let notification_id: NotificationId = serde_json::from_value(id.clone())
                    .map_err(|e| StreamError::Payload(e.into()))?;
                Frame::NotificationDelete { notification_id }
            }
        };
        self.emit(&frame)
    }

    fn owned_row(&self, record: &ChangeRecord) -> Result<Notification, StreamError> {
        let notification: Notification = record.decode_new().map_err(StreamError::Payload)?;
        if !notification.is_owned_by(&self.user_id) {
            return Err(StreamError::ForeignRow(notification.id));
        }
        Ok(notification)
    }

    /// Feed callback body. Errors stay inside the session.
    fn handle_change(&self, record: &ChangeRecord) {
        if let Err(e) = self.on_change(record) {
            self.feed_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                session_id = %self.id,
                user_id = %self.user_id,
                kind = ?record.kind,
                error = %e,
                "dropping change record"
            );
        }
    }

    /// Close the session. Returns `false` if it was already closed.
    ///
    /// On return the heartbeat is aborted, the feed subscription is released,
    /// and the outbound queue is closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        let (subscription, heartbeat, outbound) = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            (
                state.subscription.take(),
                state.heartbeat.take(),
                state.outbound.take(),
            )
        };

        if let Some(task) = heartbeat {
            task.abort();
        }
        if let Some(handle) = subscription {
            if let Err(e) = self.feed.unsubscribe(&handle) {
                debug!(session_id = %self.id, error = %e, "unsubscribe failed");
            }
        }
        drop(outbound);

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }

        info!(
            session_id = %self.id,
            user_id = %self.user_id,
            reason = %reason,
            forwarded = self.forwarded(),
            feed_errors = self.feed_errors(),
            age_ms = self.created_at.elapsed().as_millis() as u64,
            "stream session closed"
        );
        true
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close(CloseReason::Dropped);
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("forwarded", &self.forwarded())
            .field("feed_errors", &self.feed_errors())
            .finish_non_exhaustive()
    }
}

fn spawn_heartbeat(session: &Arc<StreamSession>, cadence: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(session);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + cadence;
        let mut ticker = tokio::time::interval_at(start, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(session) = weak.upgrade() else {
                break;
            };
            match session.emit(&Frame::Heartbeat) {
                Ok(Emission::Sent) => {}
                _ => break,
            }
        }
    })
}

/// Outbound side of a session, consumed by the HTTP response body.
///
/// Dropping the stream is the client-abort signal and closes the session.
pub struct SessionStream {
    rx: mpsc::Receiver<Event>,
    session: Arc<StreamSession>,
}

impl SessionStream {
    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// Receive the next event directly, without going through `Stream`.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for SessionStream {
    type Item = Result<Event, std::convert::Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.session.close(CloseReason::ClientDisconnected);
    }
}
