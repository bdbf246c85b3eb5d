// Ball Tracker command line runner.
// Replays stored frames through the full tracking stack and talks to the
// companion server.

use anyhow::{Context, bail};
use ball_tracker::config_fetcher::ThresholdSource;
use ball_tracker::endpoint::ping;
use ball_tracker::{
    ConfigFetcher, Control, DirectorySource, EndpointStore, HttpThresholdSource, HttpUploader,
    MjpegSink, OverlayPacket, RecorderEvent, RecordingController, SharedThresholds, TrackerConfig,
    TrackingMode, TrackingPipeline, TrackingSession, UploadTarget,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const OVERLAY_BUS_CAPACITY: usize = 32;

#[derive(Parser)]
#[command(name = "ball_tracker")]
#[command(about = "Color-threshold ball tracker that records and uploads highlight clips", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Companion server host, overrides the configuration file
    #[arg(long, global = true)]
    server: Option<String>,

    /// Log filter (error, warn, info, debug, trace or a full filter directive)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracker over a directory of stored frames
    Replay {
        /// Directory of still images, replayed in file name order
        #[arg(long)]
        frames: PathBuf,

        /// Capture rate the frames were taken at
        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        #[arg(long, value_enum, default_value_t = ModeArg::Game)]
        mode: ModeArg,

        /// Write every analyzed overlay as a PNG into this directory
        #[arg(long)]
        overlay_dir: Option<PathBuf>,
    },

    /// Check whether the companion server answers
    Ping,

    /// Fetch the current thresholds once and print them
    Fetch,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Detection drives recording and upload
    Game,
    /// Overlay only, never records
    Preview,
}

impl From<ModeArg> for TrackingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Game => TrackingMode::Game,
            ModeArg::Preview => TrackingMode::Preview,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Logging ---
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log filter '{}'", cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // --- 2. Configuration ---
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(server) = cli.server {
        config.server.host = Some(server);
    }
    debug!(?config, "configuration loaded");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("building HTTP client")?;
    let endpoint = EndpointStore::new(config.server.host.clone(), config.server.port);

    match cli.command {
        Commands::Replay {
            frames,
            fps,
            mode,
            overlay_dir,
        } => replay(config, client, endpoint, frames, fps, mode.into(), overlay_dir).await,
        Commands::Ping => {
            require_server(&endpoint)?;
            if ping(&client, &endpoint).await {
                println!("server reachable");
                Ok(())
            } else {
                bail!("server did not answer /ping")
            }
        }
        Commands::Fetch => {
            require_server(&endpoint)?;
            let thresholds = HttpThresholdSource::new(client, endpoint)
                .fetch()
                .await
                .context("fetching thresholds")?;
            println!("{}", serde_json::to_string_pretty(&thresholds)?);
            Ok(())
        }
    }
}

fn require_server(endpoint: &EndpointStore) -> anyhow::Result<()> {
    if endpoint.host().is_none() {
        bail!("no server configured, pass --server or set [server].host");
    }
    Ok(())
}

async fn replay(
    config: TrackerConfig,
    client: reqwest::Client,
    endpoint: EndpointStore,
    frames: PathBuf,
    fps: f64,
    mode: TrackingMode,
    overlay_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    // --- 3. Remote Side ---
    let thresholds = SharedThresholds::new(config.thresholds);
    let source = Arc::new(HttpThresholdSource::new(client.clone(), endpoint.clone()));
    let mut fetcher = ConfigFetcher::new(source, thresholds.clone()).with_interval(config.fetch_interval());
    // Try once up front so the first frames are not analyzed against stale bounds.
    if fetcher.fetch_once().await.is_err() {
        warn!(thresholds = ?config.thresholds, "starting with configured thresholds");
    }
    fetcher.start_fetching();
    let uploader: Arc<dyn UploadTarget> = Arc::new(HttpUploader::new(client, endpoint));

    // --- 4. Engine ---
    let (recorder, events) = RecordingController::new(
        MjpegSink::new(config.recording.jpeg_quality),
        Arc::clone(&uploader),
        config.recording.clip_dir.clone(),
    );
    let mut pipeline = TrackingPipeline::new(config.pipeline_config(), recorder, thresholds);
    pipeline.set_tracking(Some(mode));

    let frame_source = DirectorySource::open(&frames, fps)
        .with_context(|| format!("opening frame directory {}", frames.display()))?;
    if frame_source.is_empty() {
        bail!("no frames found in {}", frames.display());
    }
    info!(frames = frame_source.len(), ?mode, "replay starting");

    // --- 5. Observers ---
    let event_log = tokio::spawn(log_events(events));
    let (bus, overlays) = broadcast::channel(OVERLAY_BUS_CAPACITY);
    let overlay_writer = overlay_dir.map(|dir| tokio::spawn(write_overlays(overlays, dir)));

    // --- 6. Run ---
    let session = TrackingSession::spawn(frame_source, pipeline, uploader, bus);
    let control = session.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            let _ = control.send(Control::Shutdown);
        }
    });

    let outcome = session.join().await.context("tracking worker failed")?;
    fetcher.stop_fetching().await;

    for upload in outcome.uploads {
        match upload.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "upload did not complete"),
            Err(e) => error!(error = %e, "upload task failed"),
        }
    }
    // Dropping the pipeline closes the event channel.
    drop(outcome.pipeline);
    event_log.await.context("event log task failed")?;

    if let Some(writer) = overlay_writer {
        let written = writer.await.context("overlay writer task failed")??;
        info!(written, "overlays written");
    }
    info!(frames = outcome.frames_seen, "replay finished");
    Ok(())
}

async fn log_events(mut events: mpsc::UnboundedReceiver<RecorderEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RecorderEvent::RecordingStarted { session_id, path } => {
                info!(session = session_id, path = %path.display(), "clip started")
            }
            RecorderEvent::RecordingStopped(artifact) => {
                info!(session = artifact.session_id, frames = artifact.frames, "clip finished")
            }
            RecorderEvent::PreviewRestored => debug!("preview restored"),
            RecorderEvent::RecordingAborted { session_id } => {
                warn!(session = session_id, "clip discarded")
            }
            RecorderEvent::UploadSucceeded(artifact) => {
                info!(file = %artifact.file_name(), "clip uploaded")
            }
            RecorderEvent::UploadFailed { artifact, reason } => {
                error!(file = %artifact.file_name(), %reason, "clip upload failed")
            }
        }
    }
}

async fn write_overlays(
    mut overlays: broadcast::Receiver<OverlayPacket>,
    dir: PathBuf,
) -> anyhow::Result<u64> {
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating overlay directory {}", dir.display()))?;

    let mut written = 0;
    loop {
        match overlays.recv().await {
            Ok(packet) => {
                let path = dir.join(format!("overlay_{:06}.png", packet.frame_index));
                let image = Arc::clone(&packet.overlay);
                tokio::task::spawn_blocking(move || image.save(&path))
                    .await?
                    .context("saving overlay")?;
                written += 1;
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "overlay writer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
    Ok(written)
}
