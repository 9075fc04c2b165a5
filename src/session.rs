//! Per-camera live-view session
//!
//! A [`Session`] is one managed connection attempt/lifetime for a single
//! camera. Its controller runs as a dedicated task and owns every state
//! transition:
//!
//! ```text
//! idle -> negotiating -> connected -> reconnecting -+
//!            |   ^                                  |
//!            v   +------- policy-approved retry ----+
//!          failed
//!            |
//!  (any) -> closed            explicit stop / bulk teardown
//! ```
//!
//! Peer events are stamped with the session generation and negotiation
//! attempt; anything from a superseded peer is dropped, so a `connected`
//! event arriving after `closed` can never resurrect a session.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventBus, SessionEvent};
use crate::fallback::ImagePollFallback;
use crate::peer::{MediaPeer, PeerEvent, PeerEventSink, PeerFactory, PeerState, TaggedPeerEvent};
use crate::policy::{FailureKind, RetryDecision, RetryPolicy};
use crate::render::{MediaStream, RenderTarget};
use crate::signaling::{CameraSource, IceCandidate, Signaling};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Negotiating,
    Connected,
    Reconnecting,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Transport a session delivers media over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    WebRtc,
    ImagePoll,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::WebRtc => write!(f, "webrtc"),
            Transport::ImagePoll => write!(f, "image-poll"),
        }
    }
}

/// Shared collaborators a session controller runs against
pub(crate) struct SessionRuntime {
    pub signaling: Arc<dyn Signaling>,
    pub peers: Arc<dyn PeerFactory>,
    pub policy: RetryPolicy,
    pub events: Arc<EventBus>,
    pub fallback: Arc<ImagePollFallback>,
    /// Bounded wait for the first inbound media track
    pub first_track_timeout: Duration,
}

/// One managed live-view connection lifetime for a single camera
pub struct Session {
    instance_id: Uuid,
    camera: CameraSource,
    generation: u64,
    transport: Transport,
    created_at: DateTime<Utc>,
    state_tx: watch::Sender<ConnectionState>,
    retry_count: AtomicU32,
    last_error: parking_lot::RwLock<Option<String>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(camera: CameraSource, generation: u64, transport: Transport) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Arc::new(Self {
            instance_id: Uuid::new_v4(),
            camera,
            generation,
            transport,
            created_at: Utc::now(),
            state_tx,
            retry_count: AtomicU32::new(0),
            last_error: parking_lot::RwLock::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.id
    }

    pub fn camera(&self) -> &CameraSource {
        &self.camera
    }

    /// Registry-issued stamp; peer events from other generations are ignored
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions (UI status captions)
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Reconnect attempts consumed so far; reset on every successful connect
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Last failure reason; cleared on successful (re)connect
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub(crate) fn store_task(&self, handle: JoinHandle<()>) {
        // Called once right after spawn, before the handle is awaited anywhere
        if let Ok(mut task) = self.task.try_lock() {
            *task = Some(handle);
        }
    }

    /// Cancel the controller task and wait for it to finish tearing down.
    ///
    /// Cancellation aborts any in-flight negotiation, pending retry timer,
    /// and the peer handle; the task confirms by driving the session to
    /// `closed` before it exits.
    pub(crate) async fn close_and_wait(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(camera_id = %self.camera.id, "Session task join failed: {}", e);
            }
        }
    }
}

enum NegotiationOutcome {
    /// First inbound track arrived
    Connected(MediaStream),
    /// Stop requested mid-negotiation
    Cancelled,
    Error(FailureKind, String),
}

enum Supervision {
    /// Stop requested
    Stopped,
    /// Peer handle reported the connection lost
    Lost(String),
}

/// Drives one session's state machine on its own task
pub(crate) struct SessionController {
    session: Arc<Session>,
    runtime: Arc<SessionRuntime>,
    render: Weak<dyn RenderTarget>,
    events_tx: mpsc::UnboundedSender<TaggedPeerEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedPeerEvent>,
    /// Current negotiation attempt; stale-stamped events are dropped
    attempt: u32,
}

impl SessionController {
    pub(crate) fn new(
        session: Arc<Session>,
        runtime: Arc<SessionRuntime>,
        render: Weak<dyn RenderTarget>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session,
            runtime,
            render,
            events_tx,
            events_rx,
            attempt: 0,
        }
    }

    /// Sender feeding this controller's event loop (peer sinks clone it)
    pub(crate) fn event_sender(&self) -> mpsc::UnboundedSender<TaggedPeerEvent> {
        self.events_tx.clone()
    }

    pub(crate) async fn run(mut self) {
        match self.session.transport {
            Transport::WebRtc => self.run_webrtc().await,
            Transport::ImagePoll => self.run_image_poll().await,
        }
    }

    /// Degraded transport: no state machine beyond attach and teardown
    async fn run_image_poll(&mut self) {
        let url = self.runtime.fallback.stream_url(self.session.camera_id());
        self.attach(MediaStream::ImagePoll { url });
        self.set_state(ConnectionState::Connected);
        self.publish(SessionEvent::Connected {
            camera_id: self.session.camera_id().to_string(),
        });

        self.session.cancel.cancelled().await;

        self.detach();
        self.set_state(ConnectionState::Closed);
        self.publish(SessionEvent::Closed {
            camera_id: self.session.camera_id().to_string(),
        });
    }

    async fn run_webrtc(&mut self) {
        loop {
            self.attempt += 1;
            self.set_state(ConnectionState::Negotiating);

            let sink = PeerEventSink::new(
                self.session.generation,
                self.attempt,
                self.events_tx.clone(),
            );
            let peer = match self.runtime.peers.create(sink).await {
                Ok(peer) => peer,
                Err(e) => {
                    if self
                        .recover(FailureKind::Media, e.to_string(), ConnectionState::Failed)
                        .await
                    {
                        continue;
                    }
                    return;
                }
            };

            match self.negotiate(peer.as_ref()).await {
                NegotiationOutcome::Connected(stream) => {
                    self.attach(stream);
                    self.session.retry_count.store(0, Ordering::Relaxed);
                    *self.session.last_error.write() = None;
                    self.set_state(ConnectionState::Connected);
                    self.publish(SessionEvent::Connected {
                        camera_id: self.session.camera_id().to_string(),
                    });
                    info!(camera_id = %self.session.camera_id(), "Live view connected");

                    match self.supervise().await {
                        Supervision::Stopped => {
                            self.close_out(Some(peer.as_ref())).await;
                            return;
                        }
                        Supervision::Lost(reason) => {
                            peer.close().await;
                            if self
                                .recover(FailureKind::Media, reason, ConnectionState::Reconnecting)
                                .await
                            {
                                continue;
                            }
                            return;
                        }
                    }
                }
                NegotiationOutcome::Cancelled => {
                    self.close_out(Some(peer.as_ref())).await;
                    return;
                }
                NegotiationOutcome::Error(kind, reason) => {
                    peer.close().await;
                    if self.recover(kind, reason, ConnectionState::Failed).await {
                        continue;
                    }
                    return;
                }
            }
        }
    }

    /// Offer/answer exchange, then a bounded wait for the first track
    async fn negotiate(&mut self, peer: &dyn MediaPeer) -> NegotiationOutcome {
        let offer = match peer.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return NegotiationOutcome::Error(FailureKind::Media, e.to_string()),
        };

        let answer = tokio::select! {
            _ = self.session.cancel.cancelled() => return NegotiationOutcome::Cancelled,
            res = self.runtime.signaling.negotiate(&self.session.camera, &offer) => match res {
                Ok(answer) => answer,
                Err(e) => return NegotiationOutcome::Error(e.kind.into(), e.to_string()),
            },
        };

        if let Err(e) = peer.set_remote_answer(&answer).await {
            return NegotiationOutcome::Error(FailureKind::Media, e.to_string());
        }

        let deadline = tokio::time::sleep(self.runtime.first_track_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.session.cancel.cancelled() => return NegotiationOutcome::Cancelled,
                _ = &mut deadline => {
                    return NegotiationOutcome::Error(
                        FailureKind::Timeout,
                        format!(
                            "no media track within {}s",
                            self.runtime.first_track_timeout.as_secs()
                        ),
                    );
                }
                maybe = self.events_rx.recv() => {
                    let Some(tagged) = maybe else {
                        return NegotiationOutcome::Error(
                            FailureKind::Media,
                            "peer event channel closed".to_string(),
                        );
                    };
                    if !self.is_current(&tagged) {
                        continue;
                    }
                    match tagged.event {
                        PeerEvent::Track(stream) => return NegotiationOutcome::Connected(stream),
                        PeerEvent::LocalCandidate(candidate) => self.forward_candidate(candidate),
                        PeerEvent::StateChanged(PeerState::Failed) => {
                            return NegotiationOutcome::Error(
                                FailureKind::Media,
                                "peer connection failed during negotiation".to_string(),
                            );
                        }
                        // Connected/Disconnected before the first track: the
                        // track event is what completes negotiation
                        PeerEvent::StateChanged(state) => {
                            debug!(camera_id = %self.session.camera_id(), %state, "Peer state during negotiation");
                        }
                    }
                }
            }
        }
    }

    /// Watch a connected session until it is stopped or the peer drops
    async fn supervise(&mut self) -> Supervision {
        loop {
            tokio::select! {
                _ = self.session.cancel.cancelled() => return Supervision::Stopped,
                maybe = self.events_rx.recv() => {
                    let Some(tagged) = maybe else {
                        return Supervision::Lost("peer event channel closed".to_string());
                    };
                    if !self.is_current(&tagged) {
                        continue;
                    }
                    match tagged.event {
                        PeerEvent::LocalCandidate(candidate) => self.forward_candidate(candidate),
                        PeerEvent::Track(stream) => {
                            // Renegotiated or additional track replaces the stream
                            debug!(camera_id = %self.session.camera_id(), "Replacement track received");
                            self.attach(stream);
                        }
                        PeerEvent::StateChanged(PeerState::Connected) => {}
                        PeerEvent::StateChanged(state) => {
                            return Supervision::Lost(format!("peer connection {}", state));
                        }
                    }
                }
            }
        }
    }

    /// Record the failure and consult the policy. Returns `true` when the
    /// session should re-enter negotiation.
    async fn recover(&mut self, kind: FailureKind, reason: String, via: ConnectionState) -> bool {
        let retries = self.session.retry_count.load(Ordering::Relaxed);
        *self.session.last_error.write() = Some(reason.clone());
        self.set_state(via);
        warn!(
            camera_id = %self.session.camera_id(),
            %kind,
            retries,
            "Live view attempt failed: {}",
            reason
        );

        match self.runtime.policy.decide(kind, retries) {
            RetryDecision::Retry { delay } => {
                self.session.retry_count.store(retries + 1, Ordering::Relaxed);
                self.publish(SessionEvent::RetryScheduled {
                    camera_id: self.session.camera_id().to_string(),
                    attempt: retries + 1,
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::select! {
                    _ = self.session.cancel.cancelled() => {
                        // Stop during the retry wait; the failed peer is
                        // already released.
                        self.close_out(None).await;
                        false
                    }
                    _ = tokio::time::sleep(delay) => true,
                }
            }
            RetryDecision::TeardownThenFail => {
                self.runtime
                    .signaling
                    .teardown(self.session.camera_id())
                    .await;
                self.terminal_failure(reason);
                false
            }
            RetryDecision::Fail => {
                self.terminal_failure(reason);
                false
            }
        }
    }

    /// Explicit stop or bulk teardown: release everything, end in `closed`
    async fn close_out(&self, peer: Option<&dyn MediaPeer>) {
        if let Some(peer) = peer {
            peer.close().await;
        }
        self.runtime
            .signaling
            .teardown(self.session.camera_id())
            .await;
        self.detach();
        self.set_state(ConnectionState::Closed);
        self.publish(SessionEvent::Closed {
            camera_id: self.session.camera_id().to_string(),
        });
        info!(camera_id = %self.session.camera_id(), "Live view session closed");
    }

    /// Retries exhausted: surface `failed` and, when configured, the
    /// image-poll feed the UI may switch the tile to. The render binding is
    /// kept so the tile can show its retry affordance over the last frame.
    fn terminal_failure(&self, reason: String) {
        self.set_state(ConnectionState::Failed);
        let fallback_url = self
            .runtime
            .fallback
            .url_if_enabled(self.session.camera_id());
        warn!(camera_id = %self.session.camera_id(), "Live view failed: {}", reason);
        self.publish(SessionEvent::Failed {
            camera_id: self.session.camera_id().to_string(),
            reason,
            fallback_url,
        });
    }

    fn is_current(&self, tagged: &TaggedPeerEvent) -> bool {
        let current =
            tagged.generation == self.session.generation && tagged.attempt == self.attempt;
        if !current {
            debug!(
                camera_id = %self.session.camera_id(),
                generation = tagged.generation,
                attempt = tagged.attempt,
                "Dropping stale peer event"
            );
        }
        current
    }

    /// Best-effort trickle ICE; never blocks the state machine
    fn forward_candidate(&self, candidate: IceCandidate) {
        let signaling = self.runtime.signaling.clone();
        let camera_id = self.session.camera_id().to_string();
        tokio::spawn(async move {
            signaling.send_candidate(&camera_id, &candidate).await;
        });
    }

    fn attach(&self, stream: MediaStream) {
        match self.render.upgrade() {
            Some(target) => {
                debug!(
                    camera_id = %self.session.camera_id(),
                    kind = stream.kind(),
                    "Attaching stream to render target"
                );
                target.attach(stream);
            }
            None => {
                debug!(camera_id = %self.session.camera_id(), "Render target gone; stream dropped");
            }
        }
    }

    fn detach(&self) {
        if let Some(target) = self.render.upgrade() {
            target.detach();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.session.state_tx.send_replace(state);
        self.publish(SessionEvent::StateChanged {
            camera_id: self.session.camera_id().to_string(),
            state,
            at: Utc::now(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        self.runtime.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        runtime_with, spawn_session, wait_for_state, wait_until, MockSignaling,
        ScriptedPeerFactory, StubRenderTarget,
    };
    use crate::config::RetryConfig;
    use crate::signaling::{SdpAnswer, SignalingError};

    #[tokio::test]
    async fn connects_and_attaches_on_first_track() {
        let signaling = Arc::new(MockSignaling::answering());
        let peers = Arc::new(ScriptedPeerFactory::with_auto_track());
        let runtime = runtime_with(signaling.clone(), peers.clone(), RetryConfig::default());
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);

        wait_for_state(&session, ConnectionState::Connected).await;
        assert_eq!(signaling.negotiate_calls(), 1);
        assert_eq!(session.retry_count(), 0);
        assert_eq!(session.last_error(), None);
        assert_eq!(target.attached().len(), 1);

        // Locally discovered candidates are forwarded best-effort
        peers.emit_on_last(PeerEvent::LocalCandidate(IceCandidate::new(
            "candidate:1 1 UDP 2122252543 192.168.1.10 50000 typ host",
        )));
        wait_until(|| signaling.candidates().len() == 1).await;

        session.close_and_wait().await;
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_gets_grace_retry_then_connects() {
        let signaling = Arc::new(MockSignaling::scripted(vec![
            Err(SignalingError::rejected("cam-1", "session already exists")),
            Ok(SdpAnswer::new("v=0")),
        ]));
        let peers = Arc::new(ScriptedPeerFactory::with_auto_track());
        let runtime = runtime_with(signaling.clone(), peers.clone(), RetryConfig::default());
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);

        wait_for_state(&session, ConnectionState::Connected).await;
        assert_eq!(signaling.negotiate_calls(), 2);
        // Counter was consumed by the grace retry, then reset on connect
        assert_eq!(session.retry_count(), 0);

        session.close_and_wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_rejection_tears_down_and_fails() {
        let signaling = Arc::new(MockSignaling::scripted(vec![
            Err(SignalingError::rejected("cam-1", "session already exists")),
            Err(SignalingError::rejected("cam-1", "session already exists")),
        ]));
        let peers = Arc::new(ScriptedPeerFactory::new());
        let runtime = runtime_with(signaling.clone(), peers.clone(), RetryConfig::default());
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);

        // The grace retry is also rejected; the stuck server-side session is
        // then dropped and the local one ends terminally failed
        wait_until(|| signaling.teardown_calls() == 1).await;
        assert_eq!(signaling.negotiate_calls(), 2);
        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(session.last_error().unwrap().contains("session already exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_until_limit_then_fail() {
        let signaling = Arc::new(MockSignaling::scripted(vec![
            Err(SignalingError::network("cam-1", "HTTP 500")),
            Err(SignalingError::network("cam-1", "HTTP 500")),
            Err(SignalingError::network("cam-1", "HTTP 500")),
        ]));
        let peers = Arc::new(ScriptedPeerFactory::new());
        let runtime = runtime_with(
            signaling.clone(),
            peers.clone(),
            RetryConfig {
                max_retries: 2,
                ..Default::default()
            },
        );
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime.clone(), &target);

        // maxRetries=2 allows exactly three attempts
        wait_until(|| {
            signaling.negotiate_calls() == 3 && session.state() == ConnectionState::Failed
        })
        .await;
        assert_eq!(session.retry_count(), 2);
        // Every allocated peer handle was released
        assert!(peers.all_closed());

        // No further retry is ever scheduled
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(signaling.negotiate_calls(), 3);
        assert_eq!(session.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_track_times_out_and_retries() {
        let signaling = Arc::new(MockSignaling::answering());
        let peers = Arc::new(ScriptedPeerFactory::new());
        let runtime = runtime_with(
            signaling.clone(),
            peers.clone(),
            RetryConfig {
                max_retries: 1,
                ..Default::default()
            },
        );
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);

        wait_until(|| {
            signaling.negotiate_calls() == 2 && session.state() == ConnectionState::Failed
        })
        .await;
        assert!(session.last_error().unwrap().contains("no media track"));
    }

    #[tokio::test]
    async fn stale_events_do_not_mutate_session() {
        let signaling = Arc::new(MockSignaling::answering());
        let peers = Arc::new(ScriptedPeerFactory::with_auto_track());
        let runtime = runtime_with(signaling.clone(), peers.clone(), RetryConfig::default());
        let target = Arc::new(StubRenderTarget::default());

        let (session, events_tx) = spawn_session("cam-1", 3, runtime, &target);
        wait_for_state(&session, ConnectionState::Connected).await;

        // Superseded generation: must be dropped
        let stale = PeerEventSink::new(2, 1, events_tx.clone());
        stale.emit(PeerEvent::StateChanged(PeerState::Disconnected));
        // Superseded attempt on the right generation: must also be dropped
        let stale_attempt = PeerEventSink::new(3, 0, events_tx.clone());
        stale_attempt.emit(PeerEvent::Track(MediaStream::ImagePoll {
            url: "test://stale".to_string(),
        }));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(target.attached().len(), 1);

        session.close_and_wait().await;
    }

    #[tokio::test]
    async fn disconnect_while_connected_reconnects() {
        let signaling = Arc::new(MockSignaling::answering());
        let peers = Arc::new(ScriptedPeerFactory::with_auto_track());
        let runtime = runtime_with(
            signaling.clone(),
            peers.clone(),
            RetryConfig {
                initial_backoff_ms: 1,
                ..Default::default()
            },
        );
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);
        wait_for_state(&session, ConnectionState::Connected).await;

        peers.emit_on_last(PeerEvent::StateChanged(PeerState::Disconnected));

        // Second negotiation succeeds and the stream is re-attached
        wait_until(|| {
            signaling.negotiate_calls() == 2
                && session.state() == ConnectionState::Connected
                && target.attached().len() == 2
        })
        .await;

        session.close_and_wait().await;
    }

    #[tokio::test]
    async fn stop_cancels_pending_retry() {
        let signaling = Arc::new(MockSignaling::scripted(vec![Err(
            SignalingError::network("cam-1", "connect refused"),
        )]));
        let peers = Arc::new(ScriptedPeerFactory::new());
        let runtime = runtime_with(
            signaling.clone(),
            peers.clone(),
            RetryConfig {
                // Long enough that the retry timer is certainly pending
                initial_backoff_ms: 60_000,
                ..Default::default()
            },
        );
        let target = Arc::new(StubRenderTarget::default());

        let (session, _tx) = spawn_session("cam-1", 1, runtime, &target);
        wait_for_state(&session, ConnectionState::Failed).await;

        session.close_and_wait().await;
        assert_eq!(session.state(), ConnectionState::Closed);
        // The suppressed retry never re-negotiated
        assert_eq!(signaling.negotiate_calls(), 1);
        assert_eq!(target.detach_count(), 1);
    }

    #[tokio::test]
    async fn image_poll_transport_attaches_feed_url() {
        let signaling = Arc::new(MockSignaling::answering());
        let peers = Arc::new(ScriptedPeerFactory::new());
        let runtime = runtime_with(signaling.clone(), peers.clone(), RetryConfig::default());
        let target = Arc::new(StubRenderTarget::default());

        let camera = CameraSource::new("cam-7");
        let session = Session::new(camera, 1, Transport::ImagePoll);
        let dyn_target: Arc<dyn RenderTarget> = target.clone();
        let render: Weak<dyn RenderTarget> = Arc::downgrade(&dyn_target);
        let controller = SessionController::new(session.clone(), runtime, render);
        session.store_task(tokio::spawn(controller.run()));

        wait_for_state(&session, ConnectionState::Connected).await;
        // Degraded mode never negotiates
        assert_eq!(signaling.negotiate_calls(), 0);
        assert_eq!(target.attached(), vec!["image-poll".to_string()]);

        session.close_and_wait().await;
        assert_eq!(session.state(), ConnectionState::Closed);
    }
}
