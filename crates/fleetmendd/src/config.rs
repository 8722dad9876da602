//! Daemon configuration, loaded from `fleetmend.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working single-node setup. Durations are written the same way as
//! condition timeouts: `"90s"`, `"5m"`, `"1h30m"`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

use fleetmend_controller::{DEFAULT_BUDGET_COOLDOWN, DEFAULT_NAMESPACE, ReconcilerConfig};
use fleetmend_health::parse_duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Namespace of the unhealthy conditions config resource.
    pub namespace: String,
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub reconciler: ReconcilerSection,
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerSection {
    #[serde(deserialize_with = "duration_str")]
    pub budget_cooldown: Duration,
    pub budget_max_attempts: u32,
    pub fallback_on_malformed_conditions: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of reconciles running at once.
    pub workers: usize,
    #[serde(deserialize_with = "duration_str")]
    pub resync_interval: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub error_backoff_base: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub error_backoff_max: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data_dir: PathBuf::from("/var/lib/fleetmend"),
            api: ApiConfig::default(),
            reconciler: ReconcilerSection::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8480".to_string(),
        }
    }
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        let defaults = ReconcilerConfig::default();
        Self {
            budget_cooldown: DEFAULT_BUDGET_COOLDOWN,
            budget_max_attempts: defaults.budget_max_attempts,
            fallback_on_malformed_conditions: defaults.fallback_on_malformed_conditions,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            resync_interval: Duration::from_secs(600),
            error_backoff_base: Duration::from_secs(1),
            error_backoff_max: Duration::from_secs(60),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.dispatcher.workers == 0 {
            anyhow::bail!("dispatcher.workers must be at least 1");
        }
        if self.dispatcher.resync_interval.is_zero() {
            anyhow::bail!("dispatcher.resync_interval must be non-zero");
        }
        if self.dispatcher.error_backoff_base > self.dispatcher.error_backoff_max {
            anyhow::bail!("dispatcher.error_backoff_base exceeds error_backoff_max");
        }
        Ok(())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            namespace: self.namespace.clone(),
            budget_cooldown: self.reconciler.budget_cooldown,
            budget_max_attempts: self.reconciler.budget_max_attempts,
            fallback_on_malformed_conditions: self.reconciler.fallback_on_malformed_conditions,
        }
    }

    /// Path of the redb database inside `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("fleetmend.redb")
    }
}

fn duration_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.namespace, "fleet-system");
        assert_eq!(config.api.listen, "0.0.0.0:8480");
        assert_eq!(config.reconciler.budget_cooldown, Duration::from_secs(60));
        assert_eq!(config.reconciler.budget_max_attempts, 5);
        assert!(config.reconciler.fallback_on_malformed_conditions);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.dispatcher.resync_interval, Duration::from_secs(600));
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/fleetmend/fleetmend.redb"));
    }

    #[test]
    fn full_file() {
        let raw = r#"
namespace = "infra"
data_dir = "/tmp/fm"

[api]
listen = "127.0.0.1:9000"

[reconciler]
budget_cooldown = "2m"
budget_max_attempts = 3
fallback_on_malformed_conditions = false

[dispatcher]
workers = 8
resync_interval = "1h30m"
error_backoff_base = "500ms"
error_backoff_max = "30s"
"#;
        let config = DaemonConfig::parse(raw).unwrap();
        assert_eq!(config.api.listen, "127.0.0.1:9000");
        assert_eq!(config.dispatcher.workers, 8);
        assert_eq!(config.dispatcher.resync_interval, Duration::from_secs(5400));
        assert_eq!(config.dispatcher.error_backoff_base, Duration::from_millis(500));

        let rc = config.reconciler_config();
        assert_eq!(rc.namespace, "infra");
        assert_eq!(rc.budget_cooldown, Duration::from_secs(120));
        assert_eq!(rc.budget_max_attempts, 3);
        assert!(!rc.fallback_on_malformed_conditions);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = DaemonConfig::parse("[dispatcher]\nworkers = 2\n").unwrap();
        assert_eq!(config.dispatcher.workers, 2);
        assert_eq!(config.dispatcher.error_backoff_max, Duration::from_secs(60));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = DaemonConfig::parse("[reconciler]\nbudget_cooldown = \"soon\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid duration"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(DaemonConfig::parse("[dispatcher]\nworkers = 0\n").is_err());
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetmend.toml");
        std::fs::write(&path, "namespace = \"ops\"\n").unwrap();
        assert_eq!(DaemonConfig::from_file(&path).unwrap().namespace, "ops");
        assert!(DaemonConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
