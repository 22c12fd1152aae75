//! Benchmark configuration.
//!
//! `BenchConfig` mirrors the persisted JSON document field for field.
//! Durations serialize as human strings (`"30s"`, `"5m"`); unknown fields
//! are rejected at parse time; everything else is checked by
//! [`BenchConfig::validate`], which reports every offending field instead
//! of stopping at the first.

use std::{fmt, net::IpAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::constants;

/// Result type alias for configuration operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Configuration error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// Reading or writing the persisted file failed.
    #[snafu(display("config file {}: {source}", path.display()))]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The JSON document did not parse (includes unknown fields).
    #[snafu(display("config parse error: {source}"))]
    Parse {
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// One or more fields failed validation.
    #[snafu(display("invalid config: {}", issues.join("; ")))]
    Validation {
        /// Per-field problems, `field: reason` each.
        issues: Vec<String>,
    },
}

/// Which part of the run a metric row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// The leading warmup step.
    Warmup,
    /// The ramp of main steps.
    Main,
}

impl RunPhase {
    /// The string recorded in the `run_phase` metric column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Warmup => "warmup",
            RunPhase::Main => "main",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which service of the target cluster the benchmark exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Plain KV reads and writes.
    KvStore,
    /// Distributed locks backed by lease sessions.
    LockService,
}

impl Scenario {
    /// The identifier used in the persisted JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::KvStore => "kv-store",
            Scenario::LockService => "lock-service",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation composition of the generated load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadType {
    /// 95% reads, 5% writes.
    ReadHeavy,
    /// 50% reads, 50% writes.
    UpdateHeavy,
    /// 100% reads.
    ReadOnly,
    /// Acquire and immediately release a lock.
    LockOnly,
    /// Acquire, read the guarded key, release.
    LockMixedRead,
    /// Acquire, write the guarded key, release.
    LockMixedWrite,
    /// Lock-only over a narrow sliding window of lock names.
    LockContention,
}

impl WorkloadType {
    /// The identifier used in the persisted JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadType::ReadHeavy => "read-heavy",
            WorkloadType::UpdateHeavy => "update-heavy",
            WorkloadType::ReadOnly => "read-only",
            WorkloadType::LockOnly => "lock-only",
            WorkloadType::LockMixedRead => "lock-mixed-read",
            WorkloadType::LockMixedWrite => "lock-mixed-write",
            WorkloadType::LockContention => "lock-contention",
        }
    }

    /// The scenario this workload belongs to.
    #[must_use]
    pub fn scenario(self) -> Scenario {
        match self {
            WorkloadType::ReadHeavy | WorkloadType::UpdateHeavy | WorkloadType::ReadOnly => {
                Scenario::KvStore
            }
            WorkloadType::LockOnly
            | WorkloadType::LockMixedRead
            | WorkloadType::LockMixedWrite
            | WorkloadType::LockContention => Scenario::LockService,
        }
    }

    /// Read share in percent for KV workloads; `None` for lock workloads.
    #[must_use]
    pub fn read_percent(self) -> Option<f64> {
        match self {
            WorkloadType::ReadHeavy => Some(95.0),
            WorkloadType::UpdateHeavy => Some(50.0),
            WorkloadType::ReadOnly => Some(100.0),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The benchmark configuration, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Master RNG seed; every derived stream hangs off this value.
    pub seed: i64,
    /// Number of keys generated and loaded before the first step.
    pub num_keys: usize,
    /// Total key length in bytes, prefix plus padding.
    pub key_size: usize,
    /// Value length in bytes.
    pub value_size: usize,
    /// Target cluster endpoints, `ip:port` with optional http(s) scheme.
    pub endpoints: Vec<String>,
    /// Length of the leading warmup step.
    #[serde(with = "humantime_serde")]
    pub warmup_duration: Duration,
    /// Length of each main step.
    #[serde(with = "humantime_serde")]
    pub step_duration: Duration,
    /// Total budget for the ramp of main steps.
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
    /// Worker count of the first step.
    pub initial_clients: usize,
    /// Workers added per growth increment.
    pub client_step_size: usize,
    /// Hard cap on the worker count.
    pub max_clients: usize,
    /// Per-operation deadline.
    #[serde(with = "humantime_serde")]
    pub max_wait_time: Duration,
    /// Per-operation composition; must agree with `scenario`.
    pub workload_type: WorkloadType,
    /// Which target service is exercised.
    pub scenario: Scenario,
    /// Latency bound whose violation marks the run as saturated.
    #[serde(with = "humantime_serde")]
    pub sla_latency: Duration,
    /// Percentile the SLA bound applies to. Observational only.
    #[serde(default = "default_sla_percentile")]
    pub sla_percentile: f64,
    /// Destination of the per-request metric rows.
    pub metrics_file: PathBuf,
}

fn default_sla_percentile() -> f64 {
    0.99
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            seed: constants::DEFAULT_SEED,
            num_keys: constants::DEFAULT_NUM_KEYS,
            key_size: 16,
            value_size: 128,
            endpoints: Vec::new(),
            warmup_duration: Duration::from_secs(5 * 60),
            step_duration: Duration::from_secs(60),
            total_duration: Duration::from_secs(30 * 60),
            initial_clients: 5,
            client_step_size: 5,
            max_clients: 100,
            max_wait_time: Duration::from_millis(500),
            workload_type: WorkloadType::ReadHeavy,
            scenario: Scenario::KvStore,
            sla_latency: Duration::from_millis(100),
            sla_percentile: 0.99,
            metrics_file: PathBuf::from("metrics.csv"),
        }
    }
}

impl BenchConfig {
    /// Parses and validates a configuration from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let config: BenchConfig = serde_json::from_slice(bytes).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    pub fn read_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path).context(IoSnafu { path })?;
        Self::from_slice(&bytes)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn write_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let data = serde_json::to_vec_pretty(self).context(ParseSnafu)?;
        std::fs::write(&path, data).context(IoSnafu { path })
    }

    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.seed <= 0 {
            issues.push("seed: must be positive".to_owned());
        }
        if self.num_keys == 0 {
            issues.push("num_keys: must be positive".to_owned());
        }
        if self.key_size < constants::MIN_KEY_SIZE {
            issues.push(format!(
                "key_size: must be at least {}",
                constants::MIN_KEY_SIZE
            ));
        }
        if self.value_size == 0 {
            issues.push("value_size: must be positive".to_owned());
        }
        if self.endpoints.is_empty() {
            issues.push("endpoints: at least one endpoint is required".to_owned());
        }
        for endpoint in &self.endpoints {
            if let Err(reason) = validate_endpoint(endpoint) {
                issues.push(format!("endpoints: '{endpoint}' {reason}"));
            }
        }
        for (name, duration) in [
            ("warmup_duration", self.warmup_duration),
            ("step_duration", self.step_duration),
            ("total_duration", self.total_duration),
            ("max_wait_time", self.max_wait_time),
            ("sla_latency", self.sla_latency),
        ] {
            if duration.is_zero() {
                issues.push(format!("{name}: must be positive"));
            }
        }
        if self.initial_clients == 0 {
            issues.push("initial_clients: must be positive".to_owned());
        }
        if self.client_step_size == 0 {
            issues.push("client_step_size: must be positive".to_owned());
        }
        if self.max_clients == 0 {
            issues.push("max_clients: must be positive".to_owned());
        }
        if self.initial_clients > self.max_clients {
            issues.push("initial_clients: must not exceed max_clients".to_owned());
        }
        if self.workload_type.scenario() != self.scenario {
            issues.push(format!(
                "workload_type: '{}' does not belong to scenario '{}'",
                self.workload_type, self.scenario
            ));
        }
        if !(self.sla_percentile > 0.0 && self.sla_percentile <= 1.0) {
            issues.push("sla_percentile: must be in (0, 1]".to_owned());
        }
        if self.metrics_file.as_os_str().is_empty() {
            issues.push("metrics_file: must be a valid file path".to_owned());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            ValidationSnafu { issues }.fail()
        }
    }
}

/// Accepts `ip:port`, `http://ip:port` and `https://ip:port`.
fn validate_endpoint(endpoint: &str) -> std::result::Result<(), &'static str> {
    let rest = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint);

    let Some((host, port)) = rest.rsplit_once(':') else {
        return Err("is missing a port");
    };

    match port.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => {}
        _ => return Err("has an invalid port"),
    }

    // net.SplitHostPort-style bracket handling for IPv6 literals.
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.parse::<IpAddr>().is_err() {
        return Err("has an invalid host address");
    }

    Ok(())
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
