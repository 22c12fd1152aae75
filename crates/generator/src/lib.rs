//! Deterministic synthetic data generation.
//!
//! The generator maps a master seed to a reproducible set of keys and
//! values: the master RNG drives key production on the single-threaded
//! setup path, and every worker derives its own independent stream from
//! `(seed, worker_id)`. Two runs with the same seed produce byte-identical
//! data, which is what makes whole benchmarks reproducible.
//!
//! Canonical keys have the shape `/<domain>/<region>/<shard><padding>`:
//! a three-letter domain, a three-letter region code, a zero-padded
//! three-digit shard, and alphanumeric padding up to the configured key
//! size. The fixed prefix is 12 bytes, the minimum key size.

#![deny(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use snafu::{ensure, Snafu};

/// Result type alias for generator operations.
pub type Result<T, E = GeneratorError> = std::result::Result<T, E>;

/// Data generation error.
#[derive(Debug, Snafu)]
pub enum GeneratorError {
    /// The requested key size cannot hold the canonical prefix.
    #[snafu(display("key_size {key_size} is below the minimum of {MIN_KEY_SIZE}"))]
    KeySizeTooSmall {
        /// Requested size.
        key_size: usize,
    },
}

/// Length of the fixed `/<domain>/<region>/<shard>` prefix.
pub const MIN_KEY_SIZE: usize = 12;

/// Prefix that turns a key into its lock name.
pub const LOCK_PREFIX: &str = "/lock";

/// Key domains, three lowercase letters each.
pub const DOMAINS: [&str; 8] = ["usr", "ord", "prd", "inv", "sys", "app", "etc", "var"];

/// Region codes, three lowercase letters each.
pub const REGIONS: [&str; 8] = ["use", "usw", "euw", "euc", "aps", "apn", "sae", "mea"];

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Returns the lock name guarding `key`.
#[must_use]
pub fn lock_name(key: &str) -> String {
    format!("{LOCK_PREFIX}{key}")
}

/// Recovers the key a lock name guards.
#[must_use]
pub fn lock_key(name: &str) -> &str {
    name.strip_prefix(LOCK_PREFIX).unwrap_or(name)
}

/// Deterministic key/value generator owning the master RNG.
#[derive(Debug)]
pub struct Generator {
    rng: ChaCha8Rng,
}

impl Generator {
    /// Creates a generator whose master RNG is seeded with `seed`.
    #[must_use]
    pub fn new(seed: i64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed as u64),
        }
    }

    /// Derives the independent RNG stream for worker `id`.
    ///
    /// The derivation is `seed + id`, so the same `(seed, id)` pair always
    /// replays the same sequence regardless of scheduling.
    #[must_use]
    pub fn new_rand(seed: i64, id: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64((seed as u64).wrapping_add(id))
    }

    /// Draws `n` alphanumeric bytes from the master RNG.
    pub fn generate_value(&mut self, n: usize) -> Vec<u8> {
        Self::value_with(n, &mut self.rng)
    }

    /// Draws `n` alphanumeric bytes from the supplied RNG.
    pub fn value_with(n: usize, rng: &mut impl Rng) -> Vec<u8> {
        (0..n)
            .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())])
            .collect()
    }

    /// Produces exactly `count` distinct keys of `key_size` bytes mapped to
    /// `value_size`-byte values.
    ///
    /// Entries are materialized, sorted by key, and only then inserted, so
    /// iterating the returned map observes ascending keys. A key collision
    /// re-rolls only the padding within the same `(domain, region, shard)`
    /// bucket; the padding space must be large enough for `count`, which is
    /// not verified here.
    pub fn generate_data(
        &mut self,
        count: usize,
        key_size: usize,
        value_size: usize,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        ensure!(key_size >= MIN_KEY_SIZE, KeySizeTooSmallSnafu { key_size });

        let padding_len = key_size - MIN_KEY_SIZE;
        let mut used = HashSet::with_capacity(count);
        let mut entries = Vec::with_capacity(count);

        for _ in 0..count {
            let domain = DOMAINS[self.rng.gen_range(0..DOMAINS.len())];
            let region = REGIONS[self.rng.gen_range(0..REGIONS.len())];
            let shard = self.rng.gen_range(0..1000u32);
            let prefix = format!("/{domain}/{region}/{shard:03}");

            let key = loop {
                let mut key = String::with_capacity(key_size);
                key.push_str(&prefix);
                for _ in 0..padding_len {
                    key.push(ALPHANUMERIC[self.rng.gen_range(0..ALPHANUMERIC.len())] as char);
                }
                if used.insert(key.clone()) {
                    break key;
                }
            };

            let value = Self::value_with(value_size, &mut self.rng);
            entries.push((key, value));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(entries.into_iter().collect())
    }
}
