//! Peer handle abstraction
//!
//! The session controller drives peer connections through the [`MediaPeer`]
//! and [`PeerFactory`] seams; the production implementation wraps the
//! `webrtc` crate with receive-only transceivers. Peer callbacks are bridged
//! onto an event channel, stamped with the generation and attempt they
//! belong to, so a superseded peer can never mutate a newer session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::config::WebRtcConfig;
use crate::error::{Result, ViewerError};
use crate::render::MediaStream;
use crate::signaling::{IceCandidate, SdpAnswer, SdpOffer};

/// Peer-reported connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerState::Connected => write!(f, "connected"),
            PeerState::Disconnected => write!(f, "disconnected"),
            PeerState::Failed => write!(f, "failed"),
            PeerState::Closed => write!(f, "closed"),
        }
    }
}

/// Event emitted by a peer handle
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// An inbound media track arrived
    Track(MediaStream),
    /// A local ICE candidate was discovered
    LocalCandidate(IceCandidate),
    /// The underlying connection changed state
    StateChanged(PeerState),
}

/// A peer event stamped with the session generation and negotiation attempt
/// it was produced for
#[derive(Debug, Clone)]
pub struct TaggedPeerEvent {
    pub generation: u64,
    pub attempt: u32,
    pub event: PeerEvent,
}

/// Stamping sender handed to a peer handle at creation
///
/// Replaces callbacks closing over session state: the sink is the only way
/// a peer reaches the session, and every event carries its origin stamps.
#[derive(Clone)]
pub struct PeerEventSink {
    generation: u64,
    attempt: u32,
    tx: mpsc::UnboundedSender<TaggedPeerEvent>,
}

impl PeerEventSink {
    pub fn new(generation: u64, attempt: u32, tx: mpsc::UnboundedSender<TaggedPeerEvent>) -> Self {
        Self {
            generation,
            attempt,
            tx,
        }
    }

    /// Emit an event; dropped silently once the session stopped listening.
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(TaggedPeerEvent {
            generation: self.generation,
            attempt: self.attempt,
            event,
        });
    }
}

/// One negotiated (or negotiating) media channel
///
/// Opaque to the session controller beyond offer/answer plumbing and close;
/// everything else arrives through the event sink.
#[async_trait]
pub trait MediaPeer: Send + Sync {
    /// Create the local offer and apply it as the local description.
    async fn create_offer(&self) -> Result<SdpOffer>;

    /// Apply the remote answer.
    async fn set_remote_answer(&self, answer: &SdpAnswer) -> Result<()>;

    /// Close the channel, aborting ICE gathering.
    async fn close(&self);
}

/// Allocates peer handles for negotiation attempts
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, sink: PeerEventSink) -> Result<Box<dyn MediaPeer>>;
}

/// `webrtc`-crate peer handle (receive-only)
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaPeer for WebRtcPeer {
    async fn create_offer(&self) -> Result<SdpOffer> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| ViewerError::Peer(format!("Failed to create offer: {}", e)))?;

        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| ViewerError::Peer(format!("Failed to set local description: {}", e)))?;

        Ok(SdpOffer::new(sdp))
    }

    async fn set_remote_answer(&self, answer: &SdpAnswer) -> Result<()> {
        let desc = RTCSessionDescription::answer(answer.sdp.clone())
            .map_err(|e| ViewerError::Peer(format!("Invalid SDP answer: {}", e)))?;

        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| ViewerError::Peer(format!("Failed to set remote description: {}", e)))?;

        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

/// Factory producing `webrtc`-crate peers configured from [`WebRtcConfig`]
pub struct WebRtcPeerFactory {
    config: WebRtcConfig,
}

impl WebRtcPeerFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = vec![];

        for stun_url in &self.config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &self.config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        ice_servers
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self, sink: PeerEventSink) -> Result<Box<dyn MediaPeer>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| ViewerError::Peer(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| ViewerError::Peer(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| ViewerError::Peer(format!("Failed to create peer connection: {}", e)))?;
        let pc = Arc::new(pc);

        // Inbound track handler
        let track_sink = sink.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sink = track_sink.clone();
            debug!(
                track_id = %track.id(),
                kind = ?track.kind(),
                "Remote track received"
            );
            Box::pin(async move {
                sink.emit(PeerEvent::Track(MediaStream::WebRtc(track)));
            })
        }));

        // Local ICE candidate handler
        let candidate_sink = sink.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = candidate_sink.clone();
            Box::pin(async move {
                let Some(c) = candidate else { return };
                match c.to_json() {
                    Ok(init) => {
                        sink.emit(PeerEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        // Connection state handler
        let state_sink = sink.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let sink = state_sink.clone();
            Box::pin(async move {
                let state = match s {
                    RTCPeerConnectionState::Connected => PeerState::Connected,
                    RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
                    RTCPeerConnectionState::Failed => PeerState::Failed,
                    RTCPeerConnectionState::Closed => PeerState::Closed,
                    _ => return,
                };
                sink.emit(PeerEvent::StateChanged(state));
            })
        }));

        // Receive-only: the media server sends, we consume
        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                ViewerError::Peer(format!("Failed to add {:?} transceiver: {}", kind, e))
            })?;
        }

        Ok(Box::new(WebRtcPeer { pc }))
    }
}
