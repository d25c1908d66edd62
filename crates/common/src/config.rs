use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default size of a file content chunk
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Client side tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attempts per commit or lookup before giving up on
    ///  conflicts, timeouts and unreachable services
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
    /// Upper bound on any single store, registry, pointer or inbox call
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Size new files are chunked at
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            retry_backoff: Duration::from_millis(20),
            request_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Parse a config from TOML, filling unset fields from the defaults
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
