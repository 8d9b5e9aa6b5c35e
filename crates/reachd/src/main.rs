// # reachd - Reachability Daemon
//
// Thin integration layer: all reachability logic lives in reach-core and
// the flag source crates.
//
// The reachd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Registering flag sources
// 3. Starting one broadcast monitor per target on a shared bus
// 4. Logging every status change until SIGINT/SIGTERM
//
// ## Configuration
//
// - `REACH_SOURCE_TYPE`: Flag source (netlink, manual). Default: netlink
// - `REACH_REFRESH_INTERVAL_MS`: Netlink re-evaluation interval between
//   routing events. Default: 30000
// - `REACH_MANUAL_FLAGS`: Raw flag word for the manual source, decimal or
//   `0x` hex. Default: 0
// - `REACH_TARGETS`: Comma-separated targets (`any`, `local`, addresses,
//   host names). Default: any
// - `REACH_ALWAYS_DELIVER`: Log flag changes that keep the status. Default: false
// - `REACH_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// ## Example
//
// ```bash
// export REACH_TARGETS=any,local,example.com,2001:4860:4860::8888
// export REACH_REFRESH_INTERVAL_MS=10000
//
// reachd
// ```

use anyhow::{Context, Result};
use reach_core::{
    MonitorConfig, NotificationBus, ReachConfig, ReachabilityMonitor, SourceConfig,
    SourceRegistry, TargetConfig,
};
use std::env;
use std::process::ExitCode;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ReachExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ReachExitCode> for ExitCode {
    fn from(code: ReachExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    source_type: String,
    refresh_interval_ms: Option<u64>,
    manual_flags: Option<u32>,
    targets: Vec<String>,
    always_deliver: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            source_type: env::var("REACH_SOURCE_TYPE").unwrap_or_else(|_| "netlink".to_string()),
            refresh_interval_ms: parse_var("REACH_REFRESH_INTERVAL_MS")?,
            manual_flags: match env::var("REACH_MANUAL_FLAGS") {
                Ok(value) => Some(
                    parse_flag_word(&value)
                        .with_context(|| format!("REACH_MANUAL_FLAGS has an invalid value: {:?}", value))?,
                ),
                Err(_) => None,
            },
            targets: env::var("REACH_TARGETS")
                .unwrap_or_else(|_| "any".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            always_deliver: parse_var("REACH_ALWAYS_DELIVER")?.unwrap_or(false),
            log_level: env::var("REACH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.source_type.as_str() {
            "netlink" | "manual" => {}
            _ => anyhow::bail!(
                "REACH_SOURCE_TYPE '{}' is not supported. \
                Supported types: netlink, manual",
                self.source_type
            ),
        }

        if let Some(interval) = self.refresh_interval_ms
            && !(100..=600_000).contains(&interval)
        {
            anyhow::bail!(
                "REACH_REFRESH_INTERVAL_MS must be between 100 and 600000. Got: {}",
                interval
            );
        }

        if self.manual_flags.is_some() && self.source_type != "manual" {
            anyhow::bail!("REACH_MANUAL_FLAGS is only valid with REACH_SOURCE_TYPE=manual");
        }

        if self.targets.is_empty() {
            anyhow::bail!(
                "REACH_TARGETS must contain at least one target. \
                Set it via: export REACH_TARGETS=any,example.com"
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "REACH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.reach_config().validate()?;
        Ok(())
    }

    /// Library configuration equivalent to these settings
    fn reach_config(&self) -> ReachConfig {
        let source = match self.source_type.as_str() {
            "manual" => SourceConfig::Manual {
                flags: self.manual_flags.unwrap_or(0),
            },
            _ => match self.refresh_interval_ms {
                Some(refresh_interval_ms) => SourceConfig::Netlink { refresh_interval_ms },
                None => SourceConfig::default(),
            },
        };

        ReachConfig {
            source,
            targets: self.targets.iter().map(TargetConfig::new).collect(),
            monitor: MonitorConfig::default().with_always_deliver(self.always_deliver),
        }
    }
}

/// Read an optional variable, rejecting values that don't parse
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Parse a flag word written in decimal or with a `0x` prefix
fn parse_flag_word(text: &str) -> Result<u32, std::num::ParseIntError> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ReachExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ReachExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ReachExitCode::ConfigError.into();
    }

    info!("Starting reachd daemon");
    info!("Configuration loaded: {} target(s)", config.targets.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ReachExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.reach_config()).await {
            error!("Daemon error: {:#}", e);
            ReachExitCode::RuntimeError
        } else {
            ReachExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: ReachConfig) -> Result<()> {
    let registry = SourceRegistry::with_builtin();

    #[cfg(feature = "netlink")]
    {
        info!("Registering netlink flag source");
        reach_source_netlink::register(&registry);
    }

    let source = registry
        .create_source(&config.source)
        .context("Failed to create flag source")?;
    info!("Flag source: {}", source.source_name());
    if !source.supports_wwan_classification() {
        warn!("Flag source cannot tell WWAN from WiFi; all reachable targets report WiFi");
    }

    let bus = NotificationBus::new(config.monitor.bus_capacity);
    let mut notifications = bus.stream_all();
    let logger = tokio::spawn(async move {
        while let Some(item) = notifications.next().await {
            match item {
                Ok(n) => info!(
                    monitor = %n.monitor,
                    target = %n.target,
                    flags = %n.flags.unwrap_or_default(),
                    "{} is {}",
                    n.target,
                    n.status
                ),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!("Status logger fell behind, {} notification(s) dropped", missed)
                }
            }
        }
    });

    let mut monitors = Vec::new();
    for target in config.enabled_targets()? {
        let monitor = ReachabilityMonitor::builder(target, source.clone())
            .bus(bus.clone())
            .config(config.monitor.clone())
            .build()?;
        monitor
            .start_monitoring_with_broadcast()
            .with_context(|| format!("Failed to watch {}", monitor.target()))?;
        monitors.push(monitor);
    }

    info!("Watching {} target(s)", monitors.len());

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    for monitor in &monitors {
        monitor.stop_monitoring();
    }
    drop(monitors);
    logger.abort();

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
