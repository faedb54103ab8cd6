mod api;
mod app;
mod config;
mod content;
mod error;
mod session;
mod upload;

use anyhow::Context;
use app::LabResultsApp;
use config::AppConfig;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!("Starting with API at {}", config.api_base_url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("lab-results-worker")
        .build()
        .context("Failed to start async runtime")?;
    let handle = runtime.handle().clone();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([720.0, 760.0])
            .with_min_inner_size([480.0, 520.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Lab Results Uploader",
        options,
        Box::new(move |cc| -> Box<dyn eframe::App> {
            match LabResultsApp::new(cc, &config, handle) {
                Ok(app) => Box::new(app),
                Err(e) => {
                    tracing::error!("Failed to initialize: {}", e);
                    Box::new(StartupFailure(e.to_string()))
                }
            }
        }),
    )
    .map_err(|e| anyhow::anyhow!("Window failed: {}", e))?;

    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    info!("Shut down");
    Ok(())
}

/// Shown in place of the app when it could not be built.
struct StartupFailure(String);

impl eframe::App for StartupFailure {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        eframe::egui::CentralPanel::default().show(ctx, |ui| {
            ui.colored_label(eframe::egui::Color32::from_rgb(220, 50, 50), &self.0);
        });
    }
}
