mod core;
mod poller;
mod sink;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use amp_proto::config::{format_duration, parse_duration, Config};
use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{DaemonCore, DaemonEvent};
use crate::poller::{ProcStatusFile, StatusPoller};
use crate::sink::AmpDevice;

const DEFAULT_LOG_FILTER: &str = "info,amp_daemon=debug,amp_proto=debug";

/// Long flags that older ampd setups pass with a single dash.
const SINGLE_DASH_FLAGS: &[&str] = &[
    "config",
    "off-delay",
    "dev",
    "alsa-proc",
    "tick",
    "log-file",
];

/// Powers an amplifier on while the ALSA playback substream is running.
#[derive(Debug, Parser)]
#[command(name = "ampd", version)]
struct Cli {
    /// Config file (default: ~/.config/ampd/config.toml, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay before turning the amp off, e.g. 30s or 1m30s
    #[arg(long = "off-delay", value_parser = parse_duration)]
    off_delay: Option<Duration>,

    /// Device to send amp control commands to
    #[arg(long)]
    dev: Option<PathBuf>,

    /// /proc path to the ALSA status file
    #[arg(long = "alsa-proc")]
    alsa_proc: Option<PathBuf>,

    /// Status poll interval
    #[arg(long, value_parser = parse_duration)]
    tick: Option<Duration>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Parse argv, accepting `-off-delay 5s` and `-dev=/dev/amp` style flags.
    fn parse_args<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::try_parse_from(args.into_iter().map(double_dash_long_flag))
    }

    /// Config file values with command-line overrides applied.
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(off_delay) = self.off_delay {
            config.control.off_delay = off_delay;
        }
        if let Some(dev) = &self.dev {
            config.amp.device = dev.clone();
        }
        if let Some(alsa_proc) = &self.alsa_proc {
            config.status.path = alsa_proc.clone();
        }
        if let Some(tick) = self.tick {
            config.status.tick_interval = tick;
        }
        anyhow::ensure!(
            !config.status.tick_interval.is_zero(),
            "tick interval must be greater than zero"
        );
        Ok(config)
    }
}

fn double_dash_long_flag(arg: OsString) -> OsString {
    let Some(text) = arg.to_str() else {
        return arg;
    };
    let Some(flag) = text.strip_prefix('-').filter(|f| !f.starts_with('-')) else {
        return arg;
    };
    let name = flag.split_once('=').map_or(flag, |(name, _)| name);
    if SINGLE_DASH_FLAGS.contains(&name) {
        OsString::from(format!("-{}", text))
    } else {
        arg
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file)
                        .with_ansi(false),
                )
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

/// Forward SIGINT / SIGTERM into the core loop.
fn spawn_signal_listener(event_tx: mpsc::Sender<DaemonEvent>) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            warn!("Failed to listen for shutdown signals: {}", e);
            return;
        }
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());
    init_logging(cli.log_file.as_deref())?;

    let config = cli.resolve_config()?;
    info!(
        "Config: device={} status={} tick={} off_delay={} read_errors={:?}",
        config.amp.device.display(),
        config.status.path.display(),
        format_duration(config.status.tick_interval),
        format_duration(config.control.off_delay),
        config.status.read_errors,
    );

    let device = AmpDevice::open(&config.amp.device)?;

    // Event channel: all inputs funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(64);

    let mut daemon_core = DaemonCore::new(device, config.control.off_delay, event_tx.clone());

    let poller = StatusPoller::new(
        ProcStatusFile::new(config.status.path.clone()),
        config.status.markers.clone(),
        config.status.tick_interval,
        config.status.read_errors,
    );
    let _poller_handle = poller.spawn(event_tx.clone());
    spawn_signal_listener(event_tx);

    info!("AMP control running...");
    let result = daemon_core.run(event_rx).await;
    info!("AMP control stopped, amp state {:?}", daemon_core.state());

    let device = daemon_core.into_sink();
    let path = device.path().to_path_buf();
    if let Err(e) = device.close() {
        warn!("Failed to close amp control device {}: {}", path.display(), e);
    }

    result
}
