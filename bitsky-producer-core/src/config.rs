//! Producer configuration resolution.
//!
//! Layering: caller overrides → process environment → defaults. The serial
//! id is special: when nothing supplies one, a fresh UUID is derived and
//! persisted to `preferences.json` under the public directory so the same
//! install keeps its identity across restarts. If persistence fails the id
//! degrades to process-scoped memory.

use crate::error::ProducerError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

pub const ENV_BASE_URL: &str = "BITSKY_BASE_URL";
pub const ENV_SECURITY_KEY: &str = "BITSKY_SECURITY_KEY";
pub const ENV_GLOBAL_ID: &str = "GLOBAL_ID";
pub const ENV_SERIAL_ID: &str = "PRODUCER_SERIAL_ID";

/// File under the public directory holding per-install state.
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Serial id retained when the preferences file cannot be written.
/// Process-scoped: every resolver in this process sees the same fallback.
static FALLBACK_SERIAL: OnceLock<String> = OnceLock::new();

/// Caller-supplied configuration overrides. Highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub security_key: Option<String>,
    pub global_id: Option<String>,
    pub serial_id: Option<String>,
    /// Directory holding `preferences.json`. Defaults to `./public`.
    pub public_dir: Option<PathBuf>,
}

/// The configuration snapshot the control loop runs on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    pub base_url: Option<String>,
    pub security_key: Option<String>,
    pub global_id: Option<String>,
    pub serial_id: String,
}

/// Resolves [`ResolvedConfig`] snapshots from overrides and environment.
#[derive(Debug)]
pub struct ConfigResolver {
    overrides: ConfigOverrides,
}

impl ConfigResolver {
    pub fn new(overrides: ConfigOverrides) -> Self {
        Self { overrides }
    }

    /// Replace the caller-override snapshot.
    pub fn set_overrides(&mut self, overrides: ConfigOverrides) {
        self.overrides = overrides;
    }

    pub fn overrides(&self) -> &ConfigOverrides {
        &self.overrides
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> ResolvedConfig {
        self.resolve_with_env(|key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment provider.
    ///
    /// Exists so tests stay deterministic without mutating the process-wide
    /// environment.
    pub fn resolve_with_env<F>(&self, mut env: F) -> ResolvedConfig
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = self
            .overrides
            .base_url
            .clone()
            .or_else(|| env(ENV_BASE_URL))
            .filter(|s| !s.trim().is_empty());
        let security_key = self
            .overrides
            .security_key
            .clone()
            .or_else(|| env(ENV_SECURITY_KEY))
            .filter(|s| !s.trim().is_empty());
        let global_id = self
            .overrides
            .global_id
            .clone()
            .or_else(|| env(ENV_GLOBAL_ID))
            .filter(|s| !s.trim().is_empty());

        if base_url.is_none() {
            tracing::warn!("{} is not configured; the producer will idle", ENV_BASE_URL);
        }
        if global_id.is_none() {
            tracing::warn!("{} is not configured; the producer will idle", ENV_GLOBAL_ID);
        }

        let serial_id = self
            .overrides
            .serial_id
            .clone()
            .or_else(|| env(ENV_SERIAL_ID))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.load_or_create_serial());

        ResolvedConfig {
            base_url,
            security_key,
            global_id,
            serial_id,
        }
    }

    fn public_dir(&self) -> PathBuf {
        self.overrides
            .public_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./public"))
    }

    /// Serial id from the preferences file, or a freshly persisted one.
    fn load_or_create_serial(&self) -> String {
        let dir = self.public_dir();
        match read_serial(&dir) {
            Ok(Some(serial)) => return serial,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("failed to read {}: {}", PREFERENCES_FILE, err);
            }
        }

        let serial = Uuid::new_v4().to_string();
        match persist_serial(&dir, &serial) {
            Ok(()) => serial,
            Err(err) => {
                tracing::warn!(
                    "failed to persist {} to {}: {}; keeping the serial id in memory",
                    ENV_SERIAL_ID,
                    dir.display(),
                    err
                );
                FALLBACK_SERIAL.get_or_init(|| serial).clone()
            }
        }
    }
}

fn preferences_path(dir: &Path) -> PathBuf {
    dir.join(PREFERENCES_FILE)
}

fn read_serial(dir: &Path) -> Result<Option<String>, ProducerError> {
    let path = preferences_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let prefs: Map<String, Value> = serde_json::from_str(&content)?;
    Ok(prefs
        .get(ENV_SERIAL_ID)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Write the serial id, preserving any other keys already in the file.
fn persist_serial(dir: &Path, serial: &str) -> Result<(), ProducerError> {
    std::fs::create_dir_all(dir)?;
    let path = preferences_path(dir);
    let mut prefs: Map<String, Value> = match std::fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => Map::new(),
    };
    prefs.insert(
        ENV_SERIAL_ID.to_string(),
        Value::String(serial.to_string()),
    );
    let content = serde_json::to_string_pretty(&Value::Object(prefs))?;
    std::fs::write(&path, content)?;
    Ok(())
}
