//! Collector configuration, following the teacher's builder-struct pattern
//! (`common/configuration/config_builder.rs`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod defaults {
    use std::time::Duration;

    pub const PARALLELISM_PER_DOMAIN: usize = 4;
    pub const MAX_DEPTH: u32 = 3;
    pub const TASK_INTERVAL: Duration = Duration::from_secs(1);
    pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(10 * 60);
    pub const QUEUE_CAPACITY: usize = 100;
    pub const REDIS_ADDR: &str = "127.0.0.1:6379";
    pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);
    pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
    pub const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(60);
    pub const MAX_IDLE_CONNS: usize = 100;
    pub const MAX_IDLE_CONNS_PER_HOST: usize = 10;
}

/// Collector-wide configuration. Per-domain overrides of `parallelism`/`interval`/
/// `max_depth` are applied through `Scheduler::set_process` and `DomainBrowser`
/// construction, not through this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub persistent: bool,
    pub redis_addr: String,
    pub parallelism_per_domain: usize,
    pub max_depth: u32,
    #[serde(with = "duration_secs")]
    pub task_interval: Duration,
    #[serde(with = "duration_secs")]
    pub max_fetch_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl CollectorConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    persistent: bool,
    redis_addr: String,
    parallelism_per_domain: usize,
    max_depth: u32,
    task_interval: Duration,
    max_fetch_timeout: Duration,
    queue_capacity: usize,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            persistent: false,
            redis_addr: defaults::REDIS_ADDR.to_string(),
            parallelism_per_domain: defaults::PARALLELISM_PER_DOMAIN,
            max_depth: defaults::MAX_DEPTH,
            task_interval: defaults::TASK_INTERVAL,
            max_fetch_timeout: defaults::MAX_FETCH_TIMEOUT,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_redis_addr(mut self, addr: impl Into<String>) -> Self {
        self.redis_addr = addr.into();
        self
    }

    pub fn with_parallelism_per_domain(mut self, n: usize) -> Self {
        self.parallelism_per_domain = n;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_task_interval(mut self, interval: Duration) -> Self {
        self.task_interval = interval;
        self
    }

    pub fn with_max_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.max_fetch_timeout = timeout.min(defaults::MAX_FETCH_TIMEOUT);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> CollectorConfig {
        CollectorConfig {
            persistent: self.persistent,
            redis_addr: self.redis_addr,
            parallelism_per_domain: self.parallelism_per_domain,
            max_depth: self.max_depth,
            task_interval: self.task_interval,
            max_fetch_timeout: self.max_fetch_timeout,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
