// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockError, Result};
use crate::locking::timeout::LockTimeoutValue;
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 5;

pub const ENV_PREFIX: &str = "PATHMUTEX";
pub const HOME_ENV_VAR: &str = "PATHMUTEX_HOME";
pub const DEADLINE_ENV_VAR: &str = "PATHMUTEX_LOCKING__DEADLINE";

/// Which backend the controller should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LockingMode {
    /// Platform default: advisory file locks on Unix, named semaphores on
    /// Windows.
    #[default]
    Auto,
    Semaphore,
    Advisory,
    /// Threads of this process only.
    #[serde(alias = "in_process")]
    InProcess,
}

impl fmt::Display for LockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockingMode::Auto => "auto",
            LockingMode::Semaphore => "semaphore",
            LockingMode::Advisory => "advisory",
            LockingMode::InProcess => "in-process",
        };
        f.write_str(label)
    }
}

impl FromStr for LockingMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(LockingMode::Auto),
            "semaphore" => Ok(LockingMode::Semaphore),
            "advisory" => Ok(LockingMode::Advisory),
            "in-process" | "in_process" => Ok(LockingMode::InProcess),
            other => Err(format!(
                "unknown locking mode '{other}' (expected auto, semaphore, advisory or in-process)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    pub mode: LockingMode,
    /// Seconds one attempt waits before the semaphore is reopened.
    pub wait_timeout_secs: u64,
    /// Overall bound on a single call.
    pub deadline: LockTimeoutValue,
    /// Directory for advisory lock files.
    pub lock_dir: Option<PathBuf>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            mode: LockingMode::Auto,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            deadline: LockTimeoutValue::Infinite,
            lock_dir: None,
        }
    }
}

impl LockingConfig {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(default_lock_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_secs == 0 {
            return Err(LockError::InvalidConfig(
                "locking.wait_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_lock_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("pathmutex")
        .join("locks")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMutexConfig {
    pub locking: LockingConfig,
}

impl PathMutexConfig {
    /// Layers `config.toml` in `home` and `PATHMUTEX_*` environment variables
    /// over the defaults.
    pub fn load(home: &Path) -> Result<Self> {
        Self::load_with_env(home, None)
    }

    /// Like [`load`](Self::load), reading environment overrides from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(home: &Path, env: Option<Map<String, String>>) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            log::debug!("Loading config from {config_path:?}");
        } else {
            log::debug!("Config file not found at {config_path:?}, using defaults");
        }

        let settings = Config::builder()
            .add_source(
                File::from(config_path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| LockError::ConfigError(format!("Failed to read configuration: {e}")))?;

        let config: PathMutexConfig = settings
            .try_deserialize()
            .map_err(|e| LockError::ConfigError(format!("Failed to parse configuration: {e}")))?;

        config.locking.validate()?;
        Ok(config)
    }
}

/// Directory holding `config.toml`: `PATHMUTEX_HOME`, else the platform
/// config directory.
pub fn config_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    dirs::config_dir()
        .map(|dir| dir.join("pathmutex"))
        .ok_or_else(|| {
            LockError::ConfigError(format!(
                "Unable to determine a config directory; set {HOME_ENV_VAR}"
            ))
        })
}

pub fn new_pathmutex_config() -> Result<PathMutexConfig> {
    PathMutexConfig::load(&config_home()?)
}
