//! Server configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use lensbook_core::StorageConfig;

use crate::stream::registry::DEFAULT_MAX_SESSIONS;
use crate::stream::session::{
    SessionConfig, DEFAULT_DEDUP_CAPACITY, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_OUTBOUND_BUFFER,
};

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Default storage directory.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// Default capacity of the CDC channel between the store and the feed.
pub const DEFAULT_CDC_BUFFER: usize = 1024;

/// Notification server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub listen_address: String,

    /// Path to the database storage directory.
    pub data_path: PathBuf,

    /// Stream session tunables.
    pub session: SessionConfig,

    /// Maximum number of concurrently open stream sessions.
    pub max_sessions: usize,

    /// Capacity of the CDC channel.
    pub cdc_buffer: usize,

    /// JSON file of users to load into the directory at startup.
    pub users_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Create a new server configuration with the given data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            data_path: data_path.into(),
            session: SessionConfig::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            cdc_buffer: DEFAULT_CDC_BUFFER,
            users_file: None,
        }
    }

    /// Set the listen address.
    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    /// Set the heartbeat cadence.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.session.heartbeat_interval = interval;
        self
    }

    /// Set the per-session outbound queue capacity.
    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.session.outbound_buffer = frames.max(1);
        self
    }

    /// Set the de-duplication set capacity.
    pub fn with_dedup_capacity(mut self, ids: usize) -> Self {
        self.session.dedup_capacity = ids.max(1);
        self
    }

    /// Set the session limit.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the CDC channel capacity.
    pub fn with_cdc_buffer(mut self, buffer: usize) -> Self {
        self.cdc_buffer = buffer.max(1);
        self
    }

    /// Load users from a JSON file at startup.
    pub fn with_users_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.users_file = Some(path.into());
        self
    }

    /// Storage settings derived from this configuration.
    pub fn storage(&self) -> StorageConfig {
        StorageConfig::new(self.data_path.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "lensbook-server")]
#[command(version, about = "Lensbook real-time notification server", long_about = None)]
pub struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Path to the database storage directory.
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Seconds between stream heartbeats.
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_INTERVAL.as_secs())]
    pub heartbeat_secs: u64,

    /// Frames queued per stream before the client counts as stalled.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,

    /// Notification ids remembered per stream for de-duplication.
    #[arg(long, default_value_t = DEFAULT_DEDUP_CAPACITY)]
    pub dedup_capacity: usize,

    /// Maximum concurrent stream sessions.
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Capacity of the change-capture channel.
    #[arg(long, default_value_t = DEFAULT_CDC_BUFFER)]
    pub cdc_buffer: usize,

    /// JSON array of users to load into the directory at startup.
    #[arg(long)]
    pub users_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::new(self.data_path)
            .with_listen_address(self.listen)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_secs.max(1)))
            .with_outbound_buffer(self.outbound_buffer)
            .with_dedup_capacity(self.dedup_capacity)
            .with_max_sessions(self.max_sessions)
            .with_cdc_buffer(self.cdc_buffer);

        if let Some(path) = self.users_file {
            config = config.with_users_file(path);
        }
        config
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        args.into_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
        assert_eq!(config.data_path, PathBuf::from("./data"));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.session.outbound_buffer, 256);
        assert_eq!(config.session.dedup_capacity, 10_000);
        assert_eq!(config.max_sessions, 10_000);
        assert_eq!(config.cdc_buffer, 1024);
        assert!(config.users_file.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ServerConfig::new("/tmp/lensbook")
            .with_listen_address("127.0.0.1:9999")
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_outbound_buffer(0)
            .with_max_sessions(3);

        assert_eq!(config.listen_address, "127.0.0.1:9999");
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.session.outbound_buffer, 1);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.storage().path, PathBuf::from("/tmp/lensbook"));
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "lensbook-server",
            "--listen",
            "127.0.0.1:3001",
            "--heartbeat-secs",
            "10",
            "--dedup-capacity",
            "50",
            "--users-file",
            "users.json",
        ]);
        let config: ServerConfig = args.into();

        assert_eq!(config.listen_address, "127.0.0.1:3001");
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.session.dedup_capacity, 50);
        assert_eq!(config.users_file, Some(PathBuf::from("users.json")));
    }
}
