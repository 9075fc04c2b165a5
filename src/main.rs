use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vms_viewer::api::ApiClient;
use vms_viewer::config::{ConfigStore, ViewerConfig};
use vms_viewer::events::{EventBus, SessionEvent};
use vms_viewer::peer::WebRtcPeerFactory;
use vms_viewer::registry::SessionRegistry;
use vms_viewer::render::{MediaStream, RenderTarget};
use vms_viewer::signaling::HttpSignalingClient;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// vms-viewer command line arguments
#[derive(Parser, Debug)]
#[command(name = "vms-viewer")]
#[command(version, about = "Headless live-view client for the VMS media server", long_about = None)]
struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", default_value = "vms-viewer.json")]
    config: PathBuf,

    /// API server base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Media server base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    stream_url: Option<String>,

    /// Camera ids to view (default: every enabled camera)
    #[arg(short = 'C', long = "camera", value_name = "ID")]
    cameras: Vec<String>,

    /// Force the image-poll transport instead of WebRTC
    #[arg(long)]
    image_poll: bool,

    /// Stop automatically after this many seconds (default: run until ctrl-c)
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Headless render target: logs the handoff and drains WebRTC tracks so the
/// stream keeps flowing
struct ConsoleTile {
    name: String,
}

impl RenderTarget for ConsoleTile {
    fn attach(&self, stream: MediaStream) {
        tracing::info!(camera = %self.name, kind = stream.kind(), "Stream attached");

        if let MediaStream::WebRtc(track) = stream {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut packets: u64 = 0;
                while let Ok((_rtp, _attrs)) = track.read_rtp().await {
                    packets += 1;
                    if packets % 500 == 0 {
                        tracing::debug!(camera = %name, packets, "Receiving media");
                    }
                }
                tracing::debug!(camera = %name, packets, "Track ended");
            });
        }
    }

    fn detach(&self) {
        tracing::info!(camera = %self.name, "Stream detached");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting vms-viewer v{}", env!("CARGO_PKG_VERSION"));

    let config_store = ConfigStore::open(&args.config).await?;
    let mut config = (*config_store.get()).clone();
    apply_overrides(&mut config, &args);

    // Bearer token from the API collaborator, when credentials are configured
    let api = ApiClient::new(&config.api)?;
    if let (Some(email), Some(password)) = (config.api.email.clone(), config.api.password.clone())
    {
        api.login(&email, &password).await?;
    }

    let cameras = api.list_cameras().await?;
    let selected: Vec<_> = cameras
        .into_iter()
        .filter(|camera| camera.enabled)
        .filter(|camera| args.cameras.is_empty() || args.cameras.contains(&camera.id))
        .collect();

    if selected.is_empty() {
        anyhow::bail!("no enabled cameras matched the selection");
    }
    tracing::info!(count = selected.len(), "Viewing cameras");

    let signaling = Arc::new(HttpSignalingClient::new(&config.stream)?);
    signaling.set_bearer_token(api.bearer_token());
    let peers = Arc::new(WebRtcPeerFactory::new(config.webrtc.clone()));
    let events = Arc::new(EventBus::new());
    let registry = SessionRegistry::new(signaling, peers, &config, events.clone());

    spawn_event_logger(events.clone());

    // Tiles are owned here; sessions only hold weak references to them
    let mut tiles = Vec::new();
    for camera in &selected {
        let tile = Arc::new(ConsoleTile {
            name: camera.name.clone(),
        });
        let dyn_tile: Arc<dyn RenderTarget> = tile.clone();
        let render: std::sync::Weak<dyn RenderTarget> = Arc::downgrade(&dyn_tile);
        registry.start(camera.source(), render).await;
        tiles.push(tile);
    }

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
                _ = tokio::time::sleep(std::time::Duration::from_secs(secs)) => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupted");
        }
    }

    registry.stop_all().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut ViewerConfig, args: &CliArgs) {
    if let Some(ref api_url) = args.api_url {
        config.api.base_url = api_url.clone();
    }
    if let Some(ref stream_url) = args.stream_url {
        config.stream.base_url = stream_url.clone();
    }
    if args.image_poll {
        config.webrtc.enabled = false;
    }
}

fn spawn_event_logger(events: Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                SessionEvent::StateChanged {
                    camera_id, state, ..
                } => tracing::debug!(%camera_id, %state, "Session state"),
                SessionEvent::Connected { camera_id } => {
                    tracing::info!(%camera_id, "Connected");
                }
                SessionEvent::RetryScheduled {
                    camera_id,
                    attempt,
                    delay_ms,
                } => tracing::info!(%camera_id, attempt, delay_ms, "Retry scheduled"),
                SessionEvent::Failed {
                    camera_id,
                    reason,
                    fallback_url,
                } => match fallback_url {
                    Some(url) => {
                        tracing::warn!(%camera_id, %reason, %url, "Failed; image-poll feed available")
                    }
                    None => tracing::warn!(%camera_id, %reason, "Failed"),
                },
                SessionEvent::Closed { camera_id } => {
                    tracing::info!(%camera_id, "Closed");
                }
            }
        }
    });
}

fn init_logging(log_level: LogLevel, verbose: u8) {
    let level = match verbose {
        0 => log_level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let directive = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "vms_viewer=debug,info",
        LogLevel::Trace => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
