//! SessionPulse CLI
//!
//! Opens the target page in a browser and keeps the session alive until
//! interrupted.

use anyhow::Result;
use clap::Parser;
use sessionpulse::session::{KeepaliveSession, SessionConfig};
use sessionpulse::settings::{SafetyProfile, SettingsPatch};

/// SessionPulse keepalive runner
#[derive(Parser, Debug)]
#[command(name = "sessionpulse")]
#[command(version)]
#[command(about = "Keeps a web session alive by simulating low-level user activity")]
struct Args {
    /// Target page URL
    url: String,

    /// Safety profile: low, medium, high, or custom
    #[arg(short, long)]
    profile: Option<SafetyProfile>,

    /// Tick interval in seconds for the custom profile
    #[arg(long)]
    interval: Option<u64>,

    /// Disable background mode (no synthetic actions while hidden)
    #[arg(long)]
    no_background: bool,

    /// Disable the socket monitor (no reload on abnormal socket close)
    #[arg(long)]
    no_socket_monitor: bool,

    /// Run the browser headless
    #[arg(long)]
    headless: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn settings_patch(&self) -> SettingsPatch {
        SettingsPatch {
            safety_profile: self.profile,
            background_mode_enabled: self.no_background.then_some(false),
            socket_monitor_enabled: self.no_socket_monitor.then_some(false),
            debug_logging_enabled: self.verbose.then_some(true),
            custom_tick_interval_secs: self.interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        "SessionPulse {} starting for {}",
        sessionpulse::VERSION,
        args.url
    );

    let mut config = SessionConfig::builder(&args.url)
        .headless(args.headless)
        .settings_patch(args.settings_patch());
    if let Some(ref path) = args.chrome_path {
        config = config.chrome_path(path);
    }

    let session = KeepaliveSession::launch(config.build()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, closing session");
    session.close().await?;

    Ok(())
}
