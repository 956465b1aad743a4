use anyhow::{Context, Result};
use camfeed::capture::{DeviceFactory, SyntheticFactory, WebcamFactory};
use camfeed::config::{Discovery, MultiplexMode, RegistryConfig, StreamConfig, DEFAULT_PROBE_MAX};
use camfeed::persistence::SnapshotStore;
use camfeed::processor::{self, FrameProcessor};
use camfeed::{server, CameraId, CameraService};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to serve on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// JPEG quality for streams and snapshots (1-100)
    #[arg(long, default_value_t = 80)]
    jpeg_quality: u8,

    /// Directory where snapshots and their index are stored
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Serve synthetic feeds that all share one simulated device
    #[arg(long)]
    simulate: bool,

    /// Frame rate of the synthetic device
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Share one physical device between all camera ids
    #[arg(long)]
    shared: bool,

    /// Physical device index used when sharing
    #[arg(long, default_value_t = 0)]
    shared_index: u32,

    /// Fixed list of camera ids to advertise instead of probing
    #[arg(long, value_delimiter = ',')]
    catalog: Option<Vec<CameraId>>,

    /// Probe device indices below this bound
    #[arg(long, default_value_t = DEFAULT_PROBE_MAX)]
    probe_max: u32,

    /// Path to background matte model (ONNX file)
    /// If not provided, frames are served unmodified
    #[arg(long)]
    model: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn registry_config(&self) -> RegistryConfig {
        let mut config = if self.simulate {
            RegistryConfig::simulated()
        } else {
            RegistryConfig::exclusive()
        };

        if self.shared {
            config.mode = MultiplexMode::SharedSingle;
        }
        config.shared_index = self.shared_index;

        if let Some(ids) = &self.catalog {
            config.discovery = Discovery::Catalog(ids.clone());
        } else if !self.simulate {
            config.discovery = Discovery::Probe {
                max_index: self.probe_max,
            };
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("camfeed starting");

    let registry_config = args.registry_config();
    tracing::info!(
        "Mode: {}, discovery: {:?}",
        registry_config.mode.as_str(),
        registry_config.discovery
    );
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);

    let factory: Arc<dyn DeviceFactory> = if args.simulate {
        tracing::info!("Simulation mode: synthetic device at {} fps", args.fps);
        Arc::new(SyntheticFactory::new(
            args.capture_width,
            args.capture_height,
            args.fps,
        ))
    } else {
        Arc::new(WebcamFactory::new(args.capture_width, args.capture_height))
    };

    let processor: Option<Arc<dyn FrameProcessor>> = if let Some(model_path) = &args.model {
        tracing::info!("Background matte enabled, model {}", model_path.display());
        Some(processor::create_default_processor(model_path))
    } else {
        tracing::info!("Running in passthrough mode (no frame processor)");
        None
    };

    let store = SnapshotStore::open(&args.snapshot_dir).with_context(|| {
        format!(
            "Failed to open snapshot store at {}",
            args.snapshot_dir.display()
        )
    })?;

    let service = Arc::new(CameraService::new(
        registry_config,
        StreamConfig {
            jpeg_quality: args.jpeg_quality,
        },
        factory,
        processor,
        Arc::new(store),
    ));

    server::serve(service, args.bind)
        .await
        .context("HTTP server failed")?;

    tracing::info!("camfeed stopped");
    Ok(())
}
