//! catwatchd - cat detection daemon
//!
//! This daemon:
//! 1. Polls the configured camera every few seconds
//! 2. Skips frames without motion against the previous frame
//! 3. Runs the detector on moving frames and looks for a cat
//! 4. Stamps and saves a snapshot, then sends it to Telegram (once per cooldown)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use catwatch::config::STUB_MODEL;
use catwatch::{
    open_source, CatwatchConfig, DetectorBackend, Hardware, LogNotifier, Notifier, StubBackend,
    TelegramConfig, TelegramNotifier, Watcher,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch a camera for cats and send a timestamped photo to Telegram"
)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "CATWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device, overriding the config (`/dev/videoN`, `http://...`, `stub://...`).
    #[arg(long)]
    device: Option<String>,

    /// Log notifications instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CatwatchConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }

    let source = open_source(&cfg.camera)?;
    let detector = build_detector(&cfg)?;
    let notifier = build_notifier(&cfg, args.dry_run)?;
    let hardware = Hardware::new(source, detector).shared();
    let mut watcher = Watcher::from_config(&cfg, hardware, notifier);

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C / SIGTERM handler")?;

    log::info!(
        "catwatchd running (poll every {}s, cooldown {}s). Ctrl-C or SIGTERM to stop.",
        cfg.timing.poll_interval.as_secs(),
        cfg.timing.cooldown.as_secs()
    );
    watcher.run(&shutdown)?;
    log::info!("shutdown complete");
    Ok(())
}

fn build_detector(cfg: &CatwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    if cfg.detector.model == STUB_MODEL {
        log::warn!("detector model is 'stub'; nothing will ever be detected");
        return Ok(Box::new(StubBackend::new()));
    }
    load_model(cfg)
}

#[cfg(feature = "backend-tract")]
fn load_model(cfg: &CatwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    let backend = catwatch::TractBackend::new(&cfg.detector.model, cfg.detector.yolo)
        .with_context(|| format!("load detector model {}", cfg.detector.model))?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(cfg: &CatwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow::anyhow!(
        "detector model '{}' requires the backend-tract feature (or set model to \"stub\")",
        cfg.detector.model
    ))
}

fn build_notifier(cfg: &CatwatchConfig, dry_run: bool) -> Result<Box<dyn Notifier>> {
    match (&cfg.telegram, dry_run) {
        (Some(telegram), false) => {
            let notifier = TelegramNotifier::new(TelegramConfig {
                api_base: telegram.api_base.clone(),
                bot_token: telegram.bot_token.clone(),
                chat_id: telegram.chat_id.clone(),
            })?;
            Ok(Box::new(notifier))
        }
        (_, true) => {
            log::info!("dry run: notifications are logged, not sent");
            Ok(Box::new(LogNotifier::new()))
        }
        (None, false) => {
            log::warn!("no telegram bot token configured; notifications are logged only");
            Ok(Box::new(LogNotifier::new()))
        }
    }
}
