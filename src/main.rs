//! `photoframe` - rotate Firebase photos with a clock on an e-paper panel.
//!
//! ```bash
//! FIREBASE_ACCESS_TOKEN=$(gcloud auth print-access-token) \
//!     photoframe --config /etc/photoframe.yaml
//! ```
//!
//! Exits 0 on Ctrl-C (after clearing the panel), non-zero if startup fails.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eink_photoframe::{
    prepare_images, ClockFonts, DisplayDevice, DisplayRotator, FileDisplay, FirebaseClient,
    FrameComposer, FrameConfig, ImageCache, NowShowingPublisher, Scheduler, SettingsSource,
};

/// E-paper photo frame with clock overlay
#[derive(Parser)]
#[command(name = "photoframe")]
#[command(version)]
#[command(about = "Rotate remote photos with a clock overlay on an e-paper panel")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "photoframe.yaml")]
    config: PathBuf,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "eink_photoframe=trace"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = FrameConfig::load(&cli.config)?;

    let fonts = ClockFonts::load(&config.font_path)?
        .with_sizes(config.fonts.clock_px, config.fonts.overlay_px);

    let mut panel = FileDisplay::new(
        &config.display.output,
        config.display.format,
        config.display.width,
        config.display.height,
    );
    panel
        .init()
        .and_then(|()| panel.clear())
        .context("failed to initialize display")?;

    let firebase = FirebaseClient::new(&config.firebase, config.fetch_timeout())?;
    let cache = ImageCache::open(&config.cache_dir)?;
    let images = prepare_images(&firebase, &cache, &config.firebase.folder).await?;

    let (publisher, _worker) = NowShowingPublisher::spawn(
        firebase.clone(),
        firebase.clone(),
        NowShowingPublisher::QUEUE_CAPACITY,
    );
    let composer = FrameComposer::new(config.display.width, config.display.height, fonts);
    let mut rotator = DisplayRotator::new(
        panel,
        SettingsSource::new(firebase),
        composer,
        images,
        publisher,
    )?;

    Scheduler::new(config.photo_interval(), config.clock_interval())
        .run(&mut rotator, shutdown_signal())
        .await;

    tracing::info!("Exiting");
    Ok(())
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
