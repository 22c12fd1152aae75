//! `benchctl config` subcommands and the persisted config store.
//!
//! The configuration lives at `$HOME/.benchctl/config.json`. Field access
//! for `set`/`get`/`list` goes through a `serde_json::Value` round-trip:
//! the field is addressed by its JSON name, retyped from the current
//! value's JSON type, and the document is re-deserialized and re-validated
//! before anything is written back.

use std::path::PathBuf;

use kvbench_types::{constants, BenchConfig, ConfigError};
use snafu::ResultExt;

use crate::error::{
    ConfigSnafu, ControlError, InvalidAssignmentSnafu, IoSnafu, MissingConfigSnafu, NoHomeSnafu,
    Result, UnknownFieldSnafu,
};

/// Persisted configuration store under the benchctl home directory.
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Locates the store under `$HOME`.
    pub fn from_env() -> Result<Self> {
        let home = std::env::var_os("HOME").ok_or_else(|| NoHomeSnafu.build())?;
        Ok(Self::at(PathBuf::from(home).join(constants::DEFAULT_CONFIG_DIR)))
    }

    /// Opens a store rooted at an explicit directory.
    #[must_use]
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path of the persisted configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(constants::DEFAULT_CONFIG_FILE)
    }

    /// Reads the persisted configuration without validating it; defaults
    /// are intentionally incomplete (no endpoints) until the user fills
    /// them in.
    pub fn load(&self) -> Result<BenchConfig> {
        let path = self.config_path();
        if !path.exists() {
            return MissingConfigSnafu.fail();
        }
        let bytes = std::fs::read(&path).context(IoSnafu { path: path.clone() })?;
        serde_json::from_slice(&bytes).map_err(|source| ControlError::Config {
            source: ConfigError::Parse { source },
        })
    }

    /// Writes the configuration, creating the directory if needed.
    pub fn save(&self, config: &BenchConfig) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context(IoSnafu {
            path: self.dir.clone(),
        })?;
        config.write_file(self.config_path()).context(ConfigSnafu)
    }
}

/// `config init`: writes the default configuration unless one exists.
pub fn init(store: &ConfigStore) -> Result<()> {
    if store.config_path().exists() {
        println!("Config already exists at {}", store.config_path().display());
        return Ok(());
    }
    store.save(&BenchConfig::default())?;
    println!("Initialized config at {}", store.config_path().display());
    Ok(())
}

/// `config reset`: overwrites with the defaults.
pub fn reset(store: &ConfigStore) -> Result<()> {
    store.save(&BenchConfig::default())?;
    println!("Config reset to defaults");
    Ok(())
}

/// `config view`: prints the configuration as pretty JSON.
pub fn view(store: &ConfigStore) -> Result<()> {
    let config = store.load()?;
    let value = to_document(&config)?;
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    Ok(())
}

/// `config list`: prints every field with its type and current value.
pub fn list(store: &ConfigStore) -> Result<()> {
    let config = store.load()?;
    let value = to_document(&config)?;
    let Some(object) = value.as_object() else {
        return Ok(());
    };
    println!("{:<20} {:<10} CURRENT VALUE", "FIELD", "TYPE");
    println!("{}", "-".repeat(60));
    for (field, current) in object {
        let kind = match current {
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "list",
            serde_json::Value::Bool(_) => "bool",
            _ => "other",
        };
        println!("{field:<20} {kind:<10} {current}");
    }
    Ok(())
}

/// `config get <field>`: prints one field.
pub fn get(store: &ConfigStore, field: &str) -> Result<()> {
    let config = store.load()?;
    let value = to_document(&config)?;
    match value.get(field) {
        Some(serde_json::Value::String(s)) => println!("{s}"),
        Some(other) => println!("{other}"),
        None => return UnknownFieldSnafu { field }.fail(),
    }
    Ok(())
}

/// `config set <field>=<value>`: retypes, validates, persists.
pub fn set(store: &ConfigStore, assignment: &str) -> Result<()> {
    let (field, raw) = assignment
        .split_once('=')
        .ok_or_else(|| InvalidAssignmentSnafu.build())?;
    let config = store.load()?;
    let updated = set_field(&config, field, raw)?;
    store.save(&updated)?;
    println!("{field} set");
    Ok(())
}

/// `config load-file <path>`: validates and adopts an external file.
pub fn load_file(store: &ConfigStore, path: &PathBuf) -> Result<()> {
    let config = BenchConfig::read_file(path).context(ConfigSnafu)?;
    store.save(&config)?;
    println!("Config loaded from {}", path.display());
    Ok(())
}

fn to_document(config: &BenchConfig) -> Result<serde_json::Value> {
    serde_json::to_value(config).map_err(|source| ControlError::Config {
        source: ConfigError::Parse { source },
    })
}

/// Applies one `field=value` assignment through the JSON document.
pub fn set_field(config: &BenchConfig, field: &str, raw: &str) -> Result<BenchConfig> {
    let mut document = to_document(config)?;
    let Some(object) = document.as_object_mut() else {
        return UnknownFieldSnafu { field }.fail();
    };
    let Some(slot) = object.get_mut(field) else {
        return UnknownFieldSnafu { field }.fail();
    };

    *slot = match slot {
        serde_json::Value::Number(_) => {
            let number: serde_json::Number =
                raw.parse().map_err(|_| ControlError::InvalidValue {
                    field: field.to_owned(),
                    message: format!("'{raw}' is not a number"),
                })?;
            serde_json::Value::Number(number)
        }
        serde_json::Value::String(_) => serde_json::Value::String(raw.to_owned()),
        serde_json::Value::Array(_) => serde_json::Value::Array(
            raw.split(',')
                .map(|item| serde_json::Value::String(item.trim().to_owned()))
                .collect(),
        ),
        _ => {
            return Err(ControlError::InvalidValue {
                field: field.to_owned(),
                message: "unsupported field type".to_owned(),
            })
        }
    };

    let updated: BenchConfig = serde_json::from_value(document).map_err(|source| {
        ControlError::InvalidValue {
            field: field.to_owned(),
            message: source.to_string(),
        }
    })?;
    updated.validate().context(ConfigSnafu)?;
    Ok(updated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn valid_config() -> BenchConfig {
        BenchConfig {
            endpoints: vec!["127.0.0.1:2379".to_owned()],
            ..BenchConfig::default()
        }
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join(".benchctl"));

        assert!(matches!(store.load(), Err(ControlError::MissingConfig)));

        store.save(&valid_config()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.endpoints, vec!["127.0.0.1:2379".to_owned()]);
    }

    #[test]
    fn test_init_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join(".benchctl"));
        init(&store).unwrap();

        let mut config = store.load().unwrap();
        config.seed = 7;
        store.save(&config).unwrap();

        init(&store).unwrap();
        assert_eq!(store.load().unwrap().seed, 7);
    }

    #[test]
    fn test_set_integer_field() {
        let updated = set_field(&valid_config(), "seed", "12345").unwrap();
        assert_eq!(updated.seed, 12345);
    }

    #[test]
    fn test_set_duration_field_uses_human_strings() {
        let updated = set_field(&valid_config(), "step_duration", "45s").unwrap();
        assert_eq!(updated.step_duration, Duration::from_secs(45));

        let err = set_field(&valid_config(), "step_duration", "not-a-duration").unwrap_err();
        assert!(matches!(err, ControlError::InvalidValue { .. }));
    }

    #[test]
    fn test_set_endpoint_list_splits_on_commas() {
        let updated = set_field(
            &valid_config(),
            "endpoints",
            "10.0.0.1:2379, 10.0.0.2:2379",
        )
        .unwrap();
        assert_eq!(updated.endpoints.len(), 2);
        assert_eq!(updated.endpoints[1], "10.0.0.2:2379");
    }

    #[test]
    fn test_set_rejects_unknown_field() {
        let err = set_field(&valid_config(), "no_such_field", "1").unwrap_err();
        assert!(matches!(err, ControlError::UnknownField { .. }));
    }

    #[test]
    fn test_set_revalidates_the_document() {
        // max_clients below initial_clients fails cross-field validation.
        let err = set_field(&valid_config(), "max_clients", "1").unwrap_err();
        assert!(matches!(err, ControlError::Config { .. }));
    }

    #[test]
    fn test_set_workload_type_checked_against_scenario() {
        let err = set_field(&valid_config(), "workload_type", "lock-only").unwrap_err();
        assert!(matches!(err, ControlError::Config { .. }));

        let with_scenario = set_field(&valid_config(), "scenario", "lock-service");
        // Changing the scenario alone also breaks agreement.
        assert!(with_scenario.is_err());
    }
}
