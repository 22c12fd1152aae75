//! Defaults shared by the controller and the runner.

/// Directory under `$HOME` where `benchctl` keeps its state.
pub const DEFAULT_CONFIG_DIR: &str = ".benchctl";

/// Persisted configuration file name inside the config directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// File the runner writes the generated keys to, in sorted order.
pub const DEFAULT_KEY_FILE: &str = "keys.txt";

/// Master seed used when no configuration exists yet.
pub const DEFAULT_SEED: i64 = 0x207B_0960_61CD_A310;

/// Default size of the generated key space.
pub const DEFAULT_NUM_KEYS: usize = 1_000_000;

/// Canonical keys are `/<domain>/<region>/<shard>` plus padding; the
/// prefix alone is 12 bytes, so no key can be shorter.
pub const MIN_KEY_SIZE: usize = 12;

/// Port the runner's control-stream server listens on.
pub const DEFAULT_GRPC_SERVER_PORT: u16 = 50051;

/// Rows buffered by the metrics sink before a synchronous flush.
pub const DEFAULT_METRICS_BATCH_SIZE: usize = 1000;
