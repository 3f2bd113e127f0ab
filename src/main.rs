//! enDAQ Configuration - Main Entry Point
//!
//! Lists attached recorders and opens the configuration dialog for them.
//! Given a path, configures that one recorder and exits.

use anyhow::Context;
use clap::Parser;
use endaq_config::{
    app::{ConfigApp, APP_TITLE},
    config::{log_dir, AppSettings, AppState},
    device::{
        DeviceEnumerator, DeviceScanner, DirectoryEnumerator, DirectoryRecorder, MockEnumerator,
        MockRecorder, Recorder, SharedRecorder,
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "endaq-config", version, about = "Configure enDAQ data recorders")]
struct Cli {
    /// Show advanced fields, tabs and device list columns
    #[arg(long)]
    advanced: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Use simulated recorders instead of attached ones
    #[arg(long)]
    demo: bool,

    /// Configure the recorder at this path, then exit
    path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.debug);

    tracing::info!("Starting {}", APP_TITLE);

    let app_state = AppState::load_or_default();
    let settings = AppSettings::load_or_default();
    let advanced = cli.advanced;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 560.0])
            .with_min_inner_size([640.0, 400.0])
            .with_title(APP_TITLE),
        ..Default::default()
    };

    let result = if let Some(path) = cli.path {
        let recorder: SharedRecorder = if cli.demo {
            Arc::new(MockRecorder::demo("S3-D16", "10001", "Bridge Deck"))
        } else {
            let recorder = DirectoryRecorder::open(&path)
                .with_context(|| format!("No recorder found at {}", path.display()))?;
            Arc::new(recorder)
        };
        tracing::info!("Configuring {}", recorder.info().display_name());

        eframe::run_native(
            APP_TITLE,
            native_options,
            Box::new(move |cc| {
                Ok(Box::new(ConfigApp::for_device(
                    cc, recorder, app_state, settings, advanced,
                )))
            }),
        )
    } else {
        let enumerator: Box<dyn DeviceEnumerator> = if cli.demo {
            Box::new(MockEnumerator::demo())
        } else {
            let mut roots = DirectoryEnumerator::default_roots();
            roots.extend(settings.extra_roots.iter().cloned());
            Box::new(DirectoryEnumerator::new(roots))
        };
        let (scanner, handle) = DeviceScanner::new(enumerator, settings.scan_config());
        let scan_thread = scanner.spawn().context("Failed to start device scanner")?;

        let result = eframe::run_native(
            APP_TITLE,
            native_options,
            Box::new(move |cc| {
                Ok(Box::new(ConfigApp::new(
                    cc, handle, app_state, settings, advanced,
                )))
            }),
        );

        // The handle is dropped with the app, which stops the scanner
        tracing::info!("Shutting down...");
        if scan_thread.join().is_err() {
            tracing::warn!("Device scanner panicked");
        }
        result
    };

    result.map_err(|e| anyhow::anyhow!("UI error: {}", e))
}

/// Console logging plus a daily log file in the app data directory
///
/// The returned guard flushes the file writer; keep it alive until exit.
fn init_logging(debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = if debug {
        "info,endaq_config=debug"
    } else {
        "info,endaq_config=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file = log_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        Some(tracing_appender::non_blocking(
            tracing_appender::rolling::daily(dir, "endaq-config.log"),
        ))
    });

    match file {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}
