//! Session registry
//!
//! Process-wide table mapping camera id to the active [`Session`]. The
//! registry is an explicit, injectable object (tests instantiate isolated
//! instances); it guarantees at most one live session per camera id and
//! provides bulk teardown for view unmount/navigation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::fallback::ImagePollFallback;
use crate::peer::{PeerFactory, WebRtcPeerFactory};
use crate::policy::RetryPolicy;
use crate::render::RenderTarget;
use crate::session::{Session, SessionController, SessionRuntime, Transport};
use crate::signaling::{CameraSource, HttpSignalingClient, Signaling};

/// Registry of live-view sessions, one per displayed camera
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Serializes start/stop sequences: a start always observes the prior
    /// session for its camera fully closed
    ops: Mutex<()>,
    /// Issues session generation stamps
    generation: AtomicU64,
    runtime: Arc<SessionRuntime>,
    webrtc_enabled: bool,
}

impl RegistryInner {
    /// Drop the map entry once a session ended on its own (terminal
    /// failure). Generation-checked so a replacement session is never
    /// evicted by its predecessor's death.
    async fn remove_if_current(&self, camera_id: &str, generation: u64) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(camera_id).map(|s| s.generation()) == Some(generation) {
            sessions.remove(camera_id);
            debug!(camera_id, "Session removed after terminal failure");
        }
    }
}

impl SessionRegistry {
    /// Create a registry over explicit collaborators
    pub fn new(
        signaling: Arc<dyn Signaling>,
        peers: Arc<dyn PeerFactory>,
        config: &ViewerConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let runtime = Arc::new(SessionRuntime {
            signaling,
            peers,
            policy: RetryPolicy::new(config.retry.clone()),
            events,
            fallback: Arc::new(ImagePollFallback::new(&config.stream, &config.fallback)),
            first_track_timeout: Duration::from_secs(config.stream.first_track_timeout_secs),
        });

        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                ops: Mutex::new(()),
                generation: AtomicU64::new(0),
                runtime,
                webrtc_enabled: config.webrtc.enabled,
            }),
        }
    }

    /// Create a registry wired to the HTTP media server and the `webrtc`
    /// peer stack described by `config`
    pub fn from_config(config: &ViewerConfig, events: Arc<EventBus>) -> Result<Self> {
        let signaling = Arc::new(HttpSignalingClient::new(&config.stream)?);
        let peers = Arc::new(WebRtcPeerFactory::new(config.webrtc.clone()));
        Ok(Self::new(signaling, peers, config, events))
    }

    /// Event bus sessions publish their lifecycle on
    pub fn events(&self) -> Arc<EventBus> {
        self.inner.runtime.events.clone()
    }

    /// Image-poll fallback source (UI-layer transport selection)
    pub fn fallback(&self) -> Arc<ImagePollFallback> {
        self.inner.runtime.fallback.clone()
    }

    /// Ensure exactly one active session for the camera, closing any prior
    /// session for the same id first, and return the fresh session.
    pub async fn start(
        &self,
        camera: CameraSource,
        render: Weak<dyn RenderTarget>,
    ) -> Arc<Session> {
        let _ops = self.inner.ops.lock().await;
        let camera_id = camera.id.clone();

        // No two live peer handles may coexist for one camera id: the
        // displaced session is fully closed before its replacement starts.
        let prior = self.inner.sessions.write().await.remove(&camera_id);
        if let Some(prior) = prior {
            debug!(%camera_id, "Replacing existing session");
            prior.close_and_wait().await;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let transport = if self.inner.webrtc_enabled {
            Transport::WebRtc
        } else {
            Transport::ImagePoll
        };
        let session = Session::new(camera, generation, transport);

        self.inner
            .sessions
            .write()
            .await
            .insert(camera_id.clone(), session.clone());

        let controller =
            SessionController::new(session.clone(), self.inner.runtime.clone(), render);
        let inner = Arc::downgrade(&self.inner);
        let task_camera_id = camera_id.clone();
        let handle = tokio::spawn(async move {
            controller.run().await;
            if let Some(inner) = inner.upgrade() {
                inner
                    .remove_if_current(&task_camera_id, generation)
                    .await;
            }
        });
        session.store_task(handle);

        info!(%camera_id, generation, %transport, "Live view session started");
        session
    }

    /// Close and remove the camera's session; no-op when absent
    pub async fn stop(&self, camera_id: &str) {
        let _ops = self.inner.ops.lock().await;
        let prior = self.inner.sessions.write().await.remove(camera_id);
        match prior {
            Some(session) => session.close_and_wait().await,
            None => debug!(camera_id, "Stop for inactive camera ignored"),
        }
    }

    /// Close and remove every session (view teardown / navigation away)
    pub async fn stop_all(&self) {
        let _ops = self.inner.ops.lock().await;
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        let count = drained.len();
        let mut closing: FuturesUnordered<_> =
            drained.iter().map(|session| session.close_and_wait()).collect();
        while closing.next().await.is_some() {}

        if count > 0 {
            info!(count, "All live view sessions closed");
        }
    }

    /// Whether the camera currently has an active session (play/stop icons)
    pub async fn is_active(&self, camera_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(camera_id)
    }

    /// Observability handle for the camera's session, if active
    pub async fn session(&self, camera_id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().await.get(camera_id).cloned()
    }

    /// Number of active sessions
    pub async fn active_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}
