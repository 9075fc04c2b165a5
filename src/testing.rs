//! Test doubles shared by the session and registry tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{FallbackConfig, RetryConfig, StreamConfig};
use crate::events::EventBus;
use crate::fallback::ImagePollFallback;
use crate::peer::{MediaPeer, PeerEvent, PeerEventSink, PeerFactory, TaggedPeerEvent};
use crate::policy::RetryPolicy;
use crate::render::{MediaStream, RenderTarget};
use crate::session::{ConnectionState, Session, SessionController, SessionRuntime, Transport};
use crate::signaling::{
    CameraSource, IceCandidate, SdpAnswer, SdpOffer, Signaling, SignalingError,
};

/// Scripted signaling double; answers every offer once the script runs dry
pub(crate) struct MockSignaling {
    script: parking_lot::Mutex<VecDeque<Result<SdpAnswer, SignalingError>>>,
    negotiate_calls: AtomicU32,
    teardown_calls: AtomicU32,
    candidates: parking_lot::Mutex<Vec<IceCandidate>>,
}

impl MockSignaling {
    pub fn answering() -> Self {
        Self::scripted(vec![])
    }

    pub fn scripted(responses: Vec<Result<SdpAnswer, SignalingError>>) -> Self {
        Self {
            script: parking_lot::Mutex::new(responses.into()),
            negotiate_calls: AtomicU32::new(0),
            teardown_calls: AtomicU32::new(0),
            candidates: parking_lot::Mutex::new(vec![]),
        }
    }

    pub fn negotiate_calls(&self) -> u32 {
        self.negotiate_calls.load(Ordering::Relaxed)
    }

    pub fn teardown_calls(&self) -> u32 {
        self.teardown_calls.load(Ordering::Relaxed)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }
}

#[async_trait]
impl Signaling for MockSignaling {
    async fn negotiate(
        &self,
        _camera: &CameraSource,
        _offer: &SdpOffer,
    ) -> Result<SdpAnswer, SignalingError> {
        self.negotiate_calls.fetch_add(1, Ordering::Relaxed);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SdpAnswer::new("v=0")))
    }

    async fn send_candidate(&self, _camera_id: &str, candidate: &IceCandidate) {
        self.candidates.lock().push(candidate.clone());
    }

    async fn teardown(&self, _camera_id: &str) {
        self.teardown_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fake peer handle tracking whether it was released
pub(crate) struct FakePeer {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MediaPeer for FakePeer {
    async fn create_offer(&self) -> crate::error::Result<SdpOffer> {
        Ok(SdpOffer::new("v=0"))
    }

    async fn set_remote_answer(&self, _answer: &SdpAnswer) -> crate::error::Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Factory producing [`FakePeer`]s and capturing their event sinks
pub(crate) struct ScriptedPeerFactory {
    /// Emit a track right after creation (simulates instant media)
    auto_track: bool,
    sinks: parking_lot::Mutex<Vec<PeerEventSink>>,
    closed_flags: parking_lot::Mutex<Vec<Arc<AtomicBool>>>,
}

impl ScriptedPeerFactory {
    pub fn new() -> Self {
        Self {
            auto_track: false,
            sinks: parking_lot::Mutex::new(vec![]),
            closed_flags: parking_lot::Mutex::new(vec![]),
        }
    }

    pub fn with_auto_track() -> Self {
        Self {
            auto_track: true,
            ..Self::new()
        }
    }

    /// Emit an event through the most recently created peer's sink
    pub fn emit_on_last(&self, event: PeerEvent) {
        let sinks = self.sinks.lock();
        sinks.last().expect("no peer created yet").emit(event);
    }

    pub fn created(&self) -> usize {
        self.closed_flags.lock().len()
    }

    pub fn all_closed(&self) -> bool {
        self.closed_flags
            .lock()
            .iter()
            .all(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn open_peers(&self) -> usize {
        self.closed_flags
            .lock()
            .iter()
            .filter(|flag| !flag.load(Ordering::Relaxed))
            .count()
    }
}

#[async_trait]
impl PeerFactory for ScriptedPeerFactory {
    async fn create(&self, sink: PeerEventSink) -> crate::error::Result<Box<dyn MediaPeer>> {
        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags.lock().push(closed.clone());

        if self.auto_track {
            sink.emit(PeerEvent::Track(MediaStream::ImagePoll {
                url: "test://stream".to_string(),
            }));
        }
        self.sinks.lock().push(sink);

        Ok(Box::new(FakePeer { closed }))
    }
}

/// Render target double recording attach/detach traffic
#[derive(Default)]
pub(crate) struct StubRenderTarget {
    attached: parking_lot::Mutex<Vec<String>>,
    detach_count: AtomicU32,
}

impl StubRenderTarget {
    pub fn attached(&self) -> Vec<String> {
        self.attached.lock().clone()
    }

    pub fn detach_count(&self) -> u32 {
        self.detach_count.load(Ordering::Relaxed)
    }
}

impl RenderTarget for StubRenderTarget {
    fn attach(&self, stream: MediaStream) {
        self.attached.lock().push(stream.kind().to_string());
    }

    fn detach(&self) {
        self.detach_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Assemble a runtime from doubles and a retry configuration
pub(crate) fn runtime_with(
    signaling: Arc<dyn Signaling>,
    peers: Arc<dyn PeerFactory>,
    retry: RetryConfig,
) -> Arc<SessionRuntime> {
    Arc::new(SessionRuntime {
        signaling,
        peers,
        policy: RetryPolicy::new(retry),
        events: Arc::new(EventBus::new()),
        fallback: Arc::new(ImagePollFallback::new(
            &StreamConfig::default(),
            &FallbackConfig { enabled: true },
        )),
        first_track_timeout: Duration::from_secs(10),
    })
}

/// Spawn a WebRTC-transport session directly (no registry involved)
pub(crate) fn spawn_session(
    camera_id: &str,
    generation: u64,
    runtime: Arc<SessionRuntime>,
    target: &Arc<StubRenderTarget>,
) -> (Arc<Session>, mpsc::UnboundedSender<TaggedPeerEvent>) {
    let session = Session::new(CameraSource::new(camera_id), generation, Transport::WebRtc);
    let dyn_target: Arc<dyn RenderTarget> = target.clone();
    let render: Weak<dyn RenderTarget> = Arc::downgrade(&dyn_target);
    let controller = SessionController::new(session.clone(), runtime, render);
    let events_tx = controller.event_sender();
    session.store_task(tokio::spawn(controller.run()));
    (session, events_tx)
}

/// Poll until the session reaches `state` (panics after a bounded wait)
pub(crate) async fn wait_for_state(session: &Arc<Session>, state: ConnectionState) {
    wait_until(|| session.state() == state).await;
}

/// Poll a condition with a bounded wait
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
