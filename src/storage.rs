use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StorageError;
use crate::fx::{self, RateTable};
use crate::models::Relations;

const STORE_VERSION: u32 = 1;
const DATA_ENV: &str = "FREELANCE_LEDGER_DATA";
const RATE_CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(flatten)]
    relations: Relations,
}

#[derive(Debug, Serialize, Deserialize)]
struct RateCacheFile {
    version: u32,
    #[serde(default)]
    rates: RateTable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_cache_file: Option<PathBuf>,
}

/// Resolved settings with every default applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_file: PathBuf,
    pub fx_endpoint: String,
    pub fx_timeout: Duration,
    pub fx_ttl: Duration,
    pub default_currency: String,
    /// `None` when there is no home directory to keep rates in.
    pub rate_cache_file: Option<PathBuf>,
}

impl Settings {
    /// Precedence for the store path: explicit override, then the
    /// environment, then the config file, then the home directory default.
    pub fn resolve(config: Config, data_override: Option<PathBuf>) -> Result<Self, StorageError> {
        let from_env = env::var(DATA_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let data_file = match data_override.or(from_env).or(config.data_file) {
            Some(path) => path,
            None => default_data_path().ok_or(StorageError::HomeNotFound)?,
        };

        Ok(Self {
            data_file,
            fx_endpoint: config
                .fx_endpoint
                .unwrap_or_else(|| fx::DEFAULT_ENDPOINT.to_string()),
            fx_timeout: config
                .fx_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(fx::DEFAULT_TIMEOUT),
            fx_ttl: config
                .fx_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(fx::DEFAULT_TTL),
            default_currency: config.default_currency.unwrap_or_else(|| "EUR".to_string()),
            rate_cache_file: config.rate_cache_file.or_else(default_rate_cache_path),
        })
    }
}

fn config_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".freelance-ledger.json");
    Some(path)
}

fn default_data_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".freelance-ledger-data.json");
    Some(path)
}

fn default_rate_cache_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".freelance-ledger-rates.json");
    Some(path)
}

/// Missing or unreadable config falls back to defaults.
pub fn read_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let Ok(contents) = fs::read_to_string(&path) else {
        return Config::default();
    };
    serde_json::from_str(&contents).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed config file");
        Config::default()
    })
}

/// Loads the whole store. A missing file is an empty store.
pub fn load_relations(path: &Path) -> Result<Relations, StorageError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No store yet, starting empty");
            return Ok(Relations::default());
        }
        Err(err) => return Err(err.into()),
    };

    let store: StoreFile = serde_json::from_str(&contents)?;
    if store.version != STORE_VERSION {
        return Err(StorageError::UnsupportedVersion(store.version));
    }
    tracing::debug!(
        path = %path.display(),
        clients = store.relations.clients.len(),
        tasks = store.relations.tasks.len(),
        entries = store.relations.entries.len(),
        "Loaded store"
    );
    Ok(store.relations)
}

/// Writes the whole store through a sibling temp file and a rename, so a
/// reader never sees a half-written document. Concurrent writers are not
/// coordinated: the last save wins.
pub fn save_relations(path: &Path, relations: &Relations) -> Result<(), StorageError> {
    let store = StoreFile {
        version: STORE_VERSION,
        relations: relations.clone(),
    };
    let json = serde_json::to_string_pretty(&store)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, json)?;
    fs::rename(&temp, path)?;
    tracing::debug!(path = %path.display(), "Saved store");
    Ok(())
}

/// Rates saved by earlier runs. Anything unreadable starts an empty cache.
pub fn read_rate_cache(path: &Path) -> RateTable {
    let Ok(contents) = fs::read_to_string(path) else {
        return RateTable::new();
    };
    match serde_json::from_str::<RateCacheFile>(&contents) {
        Ok(cache) if cache.version == RATE_CACHE_VERSION => cache.rates,
        Ok(cache) => {
            tracing::debug!(version = cache.version, "Discarding rate cache from another version");
            RateTable::new()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed rate cache");
            RateTable::new()
        }
    }
}

pub fn write_rate_cache(path: &Path, rates: &RateTable) -> Result<(), StorageError> {
    let cache = RateCacheFile {
        version: RATE_CACHE_VERSION,
        rates: rates.clone(),
    };
    let json = serde_json::to_string_pretty(&cache)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}

pub fn hash_credential(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|byte| format!("{:02x}", byte)).collect()
}
