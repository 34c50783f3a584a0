use clap::Parser;
use lib_realtime::{ConfigError, RealtimeConfig, SubscriptionKey};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rt-watch.json";

#[derive(Parser, Debug, Clone, Default)]
#[clap(about = "Watch live updates from the scheduling service", version)]
pub struct Args {
    #[clap(required = true, value_name = "COLLECTION/ENTITY", help = "Subscriptions to follow, e.g. time_slots/CSE101 schedules/S1.")]
    pub keys: Vec<SubscriptionKey>,

    #[clap(long, env = "RT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RT_ENDPOINT", help = "Base WebSocket URL of the service, e.g. ws://localhost:8000.")]
    pub endpoint: Option<String>,

    #[clap(long, env = "RT_CLIENT_ID", help = "Preferred client identifier.")]
    pub client_id: Option<String>,

    #[clap(long, env = "RT_RECONNECT_BASE_DELAY_MS", help = "Delay in milliseconds before the first reconnect attempt.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "RT_RECONNECT_MULTIPLIER", help = "Growth factor of the reconnect delay.")]
    pub reconnect_multiplier: Option<f64>,

    #[clap(long, env = "RT_MAX_RECONNECT_ATTEMPTS", help = "Reconnect attempts before giving up.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "RT_KEEPALIVE_INTERVAL_MS", help = "Keepalive ping interval in milliseconds.")]
    pub keepalive_interval_ms: Option<u64>,

    #[clap(long, env = "RT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RT_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, help = "Print the raw JSON of every update.")]
    pub raw: bool,
}

/// Everything `rt-watch` needs after defaults, file and CLI/env are merged.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub realtime: RealtimeConfig,
    pub keys: Vec<SubscriptionKey>,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub raw: bool,
}

/// Layers defaults, then the config file, then CLI arguments and environment.
///
/// An explicit `--config-path` must exist; the default file is optional.
pub fn resolve(args: Args) -> Result<WatchSettings, ConfigError> {
    let mut realtime = match &args.config_path {
        Some(path) => RealtimeConfig::load(path)?,
        None => load_default_file(Path::new(DEFAULT_CONFIG_FILE))?,
    };

    if let Some(endpoint) = args.endpoint {
        realtime.endpoint = endpoint;
    }
    if let Some(client_id) = args.client_id {
        realtime.client_id = Some(client_id);
    }
    if let Some(ms) = args.reconnect_base_delay_ms {
        realtime.reconnect_base_delay_ms = ms;
    }
    if let Some(m) = args.reconnect_multiplier {
        realtime.reconnect_multiplier = m;
    }
    if let Some(n) = args.max_reconnect_attempts {
        realtime.max_reconnect_attempts = n;
    }
    if let Some(ms) = args.keepalive_interval_ms {
        realtime.keepalive_interval_ms = ms;
    }
    realtime.validate()?;

    Ok(WatchSettings {
        realtime,
        keys: args.keys,
        log_dir: args.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_level: args.log_level.unwrap_or_else(|| "info".to_string()),
        raw: args.raw,
    })
}

fn load_default_file(path: &Path) -> Result<RealtimeConfig, ConfigError> {
    if path.exists() {
        RealtimeConfig::load(path)
    } else {
        Ok(RealtimeConfig::default())
    }
}
