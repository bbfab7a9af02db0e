//! inkstream-server — entry point.
//!
//! ```text
//! inkstream-server                  Run with ./inkstream.toml (or defaults)
//! inkstream-server --config <path>  Load a custom config TOML
//! inkstream-server --gen-config     Write the default config to stdout
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkstream_core::{DeviceProfile, EventBus, FramebufferReader, InputScanner};
use inkstream_server::config::ServerConfig;
use inkstream_server::service::{self, AppState};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "inkstream-server", about = "Live framebuffer streaming for e-ink tablets")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "inkstream.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ServerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("inkstream-server v{}", env!("CARGO_PKG_VERSION"));

    // Device profile, then the framebuffer. Failures here are fatal:
    // without pixels there is nothing to serve.
    let model = config.device.model()?;
    let profile = DeviceProfile::detect(model, Path::new(&config.device.version_file));
    info!(
        width = profile.width,
        height = profile.height,
        bytes_per_pixel = profile.bytes_per_pixel,
        flipped = profile.texture_flipped,
        "device profile selected"
    );
    let reader = Arc::new(FramebufferReader::open(model, &profile)?);

    // Input fan-out.
    let bus = Arc::new(EventBus::new());
    let scanner = InputScanner::start(Arc::clone(&bus), &config.input.scanner_config())?;

    let state = AppState::new(reader, bus, &config);

    let listener = tokio::net::TcpListener::bind(&config.http.bind).await?;
    info!("listening on {}", listener.local_addr()?);
    info!("max concurrent streams: {}", config.http.max_streams);

    axum::serve(listener, service::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received — shutting down");
        })
        .await?;

    scanner.join().await;
    Ok(())
}
