use crate::error::{Result, SynergyError};
use crate::types::CompositeMapping;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default myLink Synergy API port
pub const DEFAULT_PORT: u16 = 44100;

const DEFAULT_MAX_CONNECTIONS: usize = 4;
const DEFAULT_KEEPALIVE_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DELAY_MS: u64 = 500;

/// Settings for [`SynergyClient`](crate::SynergyClient)
///
/// # Example
///
/// ```
/// use mylink_synergy::SynergyConfig;
///
/// let config = SynergyConfig::from_json_str(
///     r#"{"host": "192.168.1.50", "system_id": "MySystem", "max_connections": 2}"#,
/// ).unwrap();
/// assert_eq!(config.port, 44100);
/// assert_eq!(config.max_connections, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// System ID from the myLink app, sent as `params.auth`
    pub system_id: String,

    /// Upper bound on simultaneously open sockets
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// TCP keep-alive idle time for new sockets; `None` leaves the OS default
    #[serde(default = "default_keepalive", with = "opt_millis")]
    pub keepalive: Option<Duration>,

    /// How long to wait for a matching reply; `None` waits indefinitely
    #[serde(default = "default_request_timeout", with = "opt_millis")]
    pub request_timeout: Option<Duration>,

    /// Return sockets to the pool after a reply instead of closing them
    #[serde(default = "default_true")]
    pub reuse_connections: bool,

    /// Require the whole target ID to match `PREFIX.NUMBER`
    #[serde(default)]
    pub strict_target_ids: bool,
}

/// Settings for [`CommandScheduler`](crate::CommandScheduler)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Debounce window
    #[serde(default = "default_delay", with = "millis")]
    pub delay: Duration,

    #[serde(default)]
    pub reduction: ReductionMode,

    #[serde(default)]
    pub composites: CompositeMapping,
}

/// How far composite reduction goes within one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMode {
    /// One scan of the mapping; nested composites only collapse when their
    /// children were requested directly
    #[default]
    SinglePass,
    /// Repeat the scan until nothing more collapses
    FixedPoint,
}

impl SynergyConfig {
    pub fn new(host: impl Into<String>, system_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            system_id: system_id.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            keepalive: default_keepalive(),
            request_timeout: default_request_timeout(),
            reuse_connections: true,
            strict_target_ids: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reuse_connections(mut self, reuse: bool) -> Self {
        self.reuse_connections = reuse;
        self
    }

    pub fn with_strict_target_ids(mut self, strict: bool) -> Self {
        self.strict_target_ids = strict;
        self
    }

    /// `host:port` string used to connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(SynergyError::Config("host must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(SynergyError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn new(composites: CompositeMapping) -> Self {
        Self {
            composites,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_reduction(mut self, reduction: ReductionMode) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay: default_delay(),
            reduction: ReductionMode::default(),
            composites: CompositeMapping::default(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_keepalive() -> Option<Duration> {
    Some(Duration::from_millis(DEFAULT_KEEPALIVE_MS))
}

fn default_request_timeout() -> Option<Duration> {
    Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
}

fn default_delay() -> Duration {
    Duration::from_millis(DEFAULT_DELAY_MS)
}

fn default_true() -> bool {
    true
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
