// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const DEBUG: &str = "debug";
#[allow(dead_code)]
pub const TEST: &str = "test";

const DEFAULT_REAL_TREE: &str = "0";
const DEFAULT_MAX_REQUEST_TIME: Duration = Duration::from_secs(60);
const DEFAULT_QUEUE: usize = 1024;
const DEFAULT_GROUP_CAPACITY: usize = 100_000;
const DEFAULT_ACCOUNT_PREFIX: &str = "default";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Folders {
    #[serde(rename = "folders")]
    pub folders: FoldersBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoldersBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub trees: Option<Trees>,
    pub lock: Option<Lock>,
    pub executor: Option<Executor>,
    pub cache: Option<Cache>,
    pub warmup: Option<Warmup>,
}

impl Default for FoldersBox {
    fn default() -> Self {
        Self {
            env: DEV.to_string(),
            logs: None,
            trees: None,
            lock: None,
            executor: None,
            cache: None,
            warmup: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Trees {
    pub real: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Lock {
    /// Maximum request processing time; lock waits are bounded by twice this value.
    #[serde(rename = "max_request_time", default, with = "humantime_serde")]
    pub max_request_time: Option<Duration>,
    /// Explicit lock wait, overrides the derived one.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Executor {
    /// Worker threads, 0 means one per CPU.
    pub workers: Option<usize>,
    pub queue: Option<usize>,
    #[serde(rename = "await_timeout", default, with = "humantime_serde")]
    pub await_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Cache {
    #[serde(rename = "group_capacity")]
    pub group_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Warmup {
    pub enabled: bool,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(rename = "account_prefix")]
    pub account_prefix: Option<String>,
}

impl Warmup {
    pub fn account_prefix(&self) -> &str {
        self.account_prefix
            .as_deref()
            .unwrap_or(DEFAULT_ACCOUNT_PREFIX)
    }

    /// Root folder ids of the configured accounts.
    pub fn account_roots(&self) -> Vec<String> {
        self.accounts
            .iter()
            .map(|account| format!("{}{}", self.account_prefix(), account))
            .collect()
    }
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn real_tree_id(&self) -> &str;
    fn lock_timeout(&self) -> Duration;
    fn executor_workers(&self) -> usize;
    fn executor_queue(&self) -> usize;
    fn executor_await_timeout(&self) -> Duration;
    fn group_capacity(&self) -> usize;
    fn warmup(&self) -> Option<&Warmup>;
}

// Config type alias for convenience
pub type Config = Folders;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.folders.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.folders.env == PROD
    }

    fn is_test(&self) -> bool {
        self.folders.env == TEST
    }

    fn real_tree_id(&self) -> &str {
        self.folders
            .trees
            .as_ref()
            .map(|t| t.real.as_str())
            .unwrap_or(DEFAULT_REAL_TREE)
    }

    fn lock_timeout(&self) -> Duration {
        let lock = self.folders.lock.as_ref();
        if let Some(explicit) = lock.and_then(|l| l.timeout) {
            return explicit;
        }
        lock.and_then(|l| l.max_request_time)
            .unwrap_or(DEFAULT_MAX_REQUEST_TIME)
            * 2
    }

    fn executor_workers(&self) -> usize {
        match self.folders.executor.as_ref().and_then(|e| e.workers) {
            Some(0) | None => num_cpus::get(),
            Some(n) => n,
        }
    }

    fn executor_queue(&self) -> usize {
        self.folders
            .executor
            .as_ref()
            .and_then(|e| e.queue)
            .unwrap_or(DEFAULT_QUEUE)
    }

    fn executor_await_timeout(&self) -> Duration {
        self.folders
            .executor
            .as_ref()
            .and_then(|e| e.await_timeout)
            .unwrap_or_else(|| self.lock_timeout())
    }

    fn group_capacity(&self) -> usize {
        self.folders
            .cache
            .as_ref()
            .and_then(|c| c.group_capacity)
            .unwrap_or(DEFAULT_GROUP_CAPACITY)
    }

    fn warmup(&self) -> Option<&Warmup> {
        self.folders.warmup.as_ref().filter(|w| w.enabled)
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        // Read file
        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let cfg = Self::parse(&data).with_context(|| format!("unmarshal yaml from {:?}", abs_path))?;
        Ok(cfg)
    }

    /// Parses and validates a YAML document.
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Folders = serde_yaml::from_str(data)?;

        if cfg.real_tree_id().is_empty() {
            anyhow::bail!("trees.real must not be empty");
        }
        if cfg.executor_queue() == 0 {
            anyhow::bail!("executor.queue must be greater than zero");
        }
        if cfg.lock_timeout().is_zero() {
            anyhow::bail!("lock timeout must be greater than zero");
        }
        if let Some(warmup) = cfg.warmup() {
            if warmup.accounts.iter().any(|a| a.is_empty()) {
                anyhow::bail!("warmup.accounts must not contain empty ids");
            }
        }

        Ok(cfg)
    }
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
