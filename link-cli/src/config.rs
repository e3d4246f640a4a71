//! Configuration loading for m720-link.
//!
//! Configuration is loaded from a TOML file (default: `link-test.toml`) and
//! converted once into the runtime objects the run needs.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use link_client::{
    collect::clamp_pool_size, ChannelKind, ChannelSettings, CollectorHost, Endpoint,
    ModuleCredentials, RelayConfig, ShutdownSettings,
};
use link_core::{Directory, DirectoryError};
use link_types::Device;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Run defaults.
    #[serde(default)]
    pub run: RunConfig,
    /// Reachability probing.
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Remote shell timing.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Switch logins.
    pub switches: SwitchesConfig,
    /// Module logins.
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Power relay.
    #[serde(default)]
    pub relay: RelaySection,
    /// Interface-bank shutdown.
    #[serde(default)]
    pub shutdown: ShutdownSection,
    /// Host the modules copy their clock files to.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Worker pool.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Devices under test.
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Run defaults; the duration and output directory can be overridden on the
/// command line.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Total test duration in minutes (default: 60).
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    /// Directory for result and clock files (default: current directory).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Far switch name used in result file names (default: "switch").
    #[serde(default = "default_switch_name")]
    pub switch_name: String,
}

/// Probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Echo requests per address (default: 10).
    #[serde(default = "default_probe_count")]
    pub count: u32,
}

/// Remote shell timing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Wait for each command's output in milliseconds (default: 2000).
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    /// Wait for the login banner in milliseconds (default: 200).
    #[serde(default = "default_handshake_wait_ms")]
    pub handshake_wait_ms: u64,
    /// Wait for a session to produce any output in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Far and near switch logins.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchesConfig {
    /// Switch facing module port B.
    pub far: SwitchConfig,
    /// Switch facing module port A.
    pub near: Option<SwitchConfig>,
}

/// One switch login.
#[derive(Clone, Deserialize)]
pub struct SwitchConfig {
    /// Management address or host name.
    pub host: String,
    /// Login name.
    pub login: String,
    /// Login password.
    pub password: String,
    /// Privileged-mode secret, if the CLI asks for one.
    #[serde(default)]
    pub enable_secret: Option<String>,
}

impl std::fmt::Debug for SwitchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchConfig")
            .field("host", &self.host)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Module shell login.
#[derive(Clone, Default, Deserialize)]
pub struct ModulesConfig {
    /// Login name.
    #[serde(default)]
    pub login: String,
    /// Login password.
    #[serde(default)]
    pub password: String,
    /// Root password for `su`.
    #[serde(default)]
    pub root_password: Option<String>,
}

impl std::fmt::Debug for ModulesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModulesConfig")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Power relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Relay controller URL, credentials included.
    #[serde(default = "default_relay_url")]
    pub base_url: String,
    /// Relay output feeding the far switch (default: 1).
    #[serde(default = "default_far_relay")]
    pub far_relay: u8,
    /// Relay output feeding the near switch (default: 2).
    #[serde(default = "default_near_relay")]
    pub near_relay: u8,
    /// Power-off time in seconds (default: 15).
    #[serde(default = "default_off_secs")]
    pub off_secs: u64,
    /// Wait after power returns in seconds (default: 160).
    #[serde(default = "default_boot_settle_secs")]
    pub boot_settle_secs: u64,
    /// HTTP request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Interface-bank shutdown configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSection {
    /// Far switch interface range (default: "1/0/1-28").
    #[serde(default = "default_interface_range")]
    pub interface_range: String,
    /// Wait after re-enabling the interfaces in seconds (default: 60).
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

/// Collector host configuration.
#[derive(Clone, Default, Deserialize)]
pub struct CollectorConfig {
    /// Login on the collector host.
    #[serde(default)]
    pub login: String,
    /// Password on the collector host.
    #[serde(default)]
    pub password: String,
    /// Address the modules can reach the collector host at.
    #[serde(default)]
    pub host: String,
    /// Target directory; defaults to the run's output directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl std::fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("login", &self.login)
            .field("host", &self.host)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    /// Pool size, clamped to 2..=5; defaults to the variant's.
    pub size: Option<usize>,
}

// Default value functions
fn default_duration_minutes() -> u32 {
    60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_switch_name() -> String {
    "switch".to_string()
}

fn default_probe_count() -> u32 {
    10
}

fn default_command_delay_ms() -> u64 {
    2000
}

fn default_handshake_wait_ms() -> u64 {
    200
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_relay_url() -> String {
    "http://127.0.0.1:80".to_string()
}

fn default_far_relay() -> u8 {
    1
}

fn default_near_relay() -> u8 {
    2
}

fn default_off_secs() -> u64 {
    15
}

fn default_boot_settle_secs() -> u64 {
    160
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_interface_range() -> String {
    "1/0/1-28".to_string()
}

fn default_settle_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_duration_minutes(),
            output_dir: default_output_dir(),
            switch_name: default_switch_name(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: default_probe_count(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_delay_ms: default_command_delay_ms(),
            handshake_wait_ms: default_handshake_wait_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            base_url: default_relay_url(),
            far_relay: default_far_relay(),
            near_relay: default_near_relay(),
            off_secs: default_off_secs(),
            boot_settle_secs: default_boot_settle_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            interface_range: default_interface_range(),
            settle_secs: default_settle_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Device directory over every configured device.
    pub fn directory(&self) -> Result<Directory, DirectoryError> {
        Directory::new(self.devices.clone())
    }

    /// Session timing.
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            command_delay: Duration::from_millis(self.channel.command_delay_ms),
            handshake_wait: Duration::from_millis(self.channel.handshake_wait_ms),
            connect_timeout: Duration::from_secs(self.channel.connect_timeout_secs),
        }
    }

    /// The far switch endpoint.
    pub fn far_switch(&self) -> Endpoint {
        self.switches.far.endpoint()
    }

    /// The near switch endpoint, if configured.
    pub fn near_switch(&self) -> Option<Endpoint> {
        self.switches.near.as_ref().map(SwitchConfig::endpoint)
    }

    /// Relay settings.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            base_url: self.relay.base_url.clone(),
            far_relay: self.relay.far_relay,
            near_relay: self.relay.near_relay,
            off_duration: Duration::from_secs(self.relay.off_secs),
            boot_settle: Duration::from_secs(self.relay.boot_settle_secs),
            request_timeout: Duration::from_secs(self.relay.request_timeout_secs),
        }
    }

    /// Interface-bank shutdown settings.
    pub fn shutdown_settings(&self) -> ShutdownSettings {
        ShutdownSettings {
            interface_range: self.shutdown.interface_range.clone(),
            settle: Duration::from_secs(self.shutdown.settle_secs),
        }
    }

    /// Module shell credentials.
    pub fn module_credentials(&self) -> ModuleCredentials {
        ModuleCredentials {
            login: self.modules.login.clone(),
            password: self.modules.password.clone(),
            root_password: self.modules.root_password.clone(),
        }
    }

    /// Collector host; files land in `output_dir` unless a path is set.
    ///
    /// `output_dir` must be absolute: the modules resolve a relative path
    /// against the collector login's home directory.
    pub fn collector_host(&self, output_dir: &Path) -> CollectorHost {
        let path = self.collector.path.as_deref().unwrap_or(output_dir);
        CollectorHost {
            login: self.collector.login.clone(),
            password: self.collector.password.clone(),
            host: self.collector.host.clone(),
            path: path.display().to_string(),
        }
    }

    /// Configured pool size, clamped.
    pub fn pool_size(&self) -> Option<usize> {
        self.pool.size.map(clamp_pool_size)
    }
}

impl SwitchConfig {
    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            elevation_secret: self.enable_secret.clone(),
            kind: ChannelKind::SwitchCli,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_types::{DeviceFamily, ModuleKind, SerialNumber};

    const MINIMAL: &str = r#"
[switches.far]
host = "192.168.90.10"
login = "admin"
password = "admin"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.run.duration_minutes, 60);
        assert_eq!(config.run.output_dir, PathBuf::from("."));
        assert_eq!(config.probe.count, 10);
        assert_eq!(config.channel_settings(), ChannelSettings::default());
        assert_eq!(config.shutdown_settings(), ShutdownSettings::default());
        assert_eq!(config.relay_config().off_duration, Duration::from_secs(15));
        assert_eq!(config.relay_config().boot_settle, Duration::from_secs(160));
        assert!(config.near_switch().is_none());
        assert!(config.devices.is_empty());
        assert_eq!(config.pool_size(), None);
    }

    #[test]
    fn sample_config_parses() {
        let config: Config = toml::from_str(include_str!("../../link-test.toml")).unwrap();
        let directory = config.directory().unwrap();
        assert!(!directory.for_kind(ModuleKind::Optic).is_empty());
        assert!(!directory.for_kind(ModuleKind::Copper).is_empty());
        assert!(config.near_switch().is_some());
    }

    #[test]
    fn devices_and_switches_convert() {
        let toml = r#"
[run]
duration_minutes = 120
switch_name = "24fx_copper"

[switches.far]
host = "sw-far"
login = "admin"
password = "secret"
enable_secret = "en"

[switches.near]
host = "sw-near"
login = "admin"
password = "secret"

[[devices]]
serial = 591
ip = "192.168.90.181"
far_port = "1/0/1"
near_port = "1/0/1"
family = "copper"

[[devices]]
serial = 30
ip = "192.168.90.182"
far_port = "1/0/2"
family = "fiber_alt"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.run.duration_minutes, 120);

        let far = config.far_switch();
        assert_eq!(far.host, "sw-far");
        assert_eq!(far.elevation_secret.as_deref(), Some("en"));
        assert_eq!(far.kind, ChannelKind::SwitchCli);
        assert_eq!(config.near_switch().unwrap().host, "sw-near");

        let directory = config.directory().unwrap();
        assert_eq!(directory.len(), 2);
        let alt = directory.get(SerialNumber::new(30)).unwrap();
        assert_eq!(alt.family, DeviceFamily::FiberAlt);
        assert!(alt.near_port.is_none());
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let toml = format!(
            "{MINIMAL}{}",
            r#"
[[devices]]
serial = 591
ip = "10.0.0.1"
far_port = "1/0/1"
family = "copper"

[[devices]]
serial = 591
ip = "10.0.0.2"
far_port = "1/0/2"
family = "copper"
"#
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.directory().is_err());
    }

    #[test]
    fn collector_path_defaults_to_output_dir() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        let out = Path::new("/srv/link");
        assert_eq!(config.collector_host(out).path, "/srv/link");

        config.collector.path = Some(PathBuf::from("/home/lab/results"));
        assert_eq!(config.collector_host(out).path, "/home/lab/results");
    }

    #[test]
    fn pool_size_is_clamped() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.pool.size = Some(12);
        assert_eq!(config.pool_size(), Some(5));
        config.pool.size = Some(0);
        assert_eq!(config.pool_size(), Some(2));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::from_file(Path::new("/nonexistent/link-test.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link-test.toml");
        std::fs::write(&path, "[switches.far]\nhost = 1\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("link-test.toml"));
    }
}
