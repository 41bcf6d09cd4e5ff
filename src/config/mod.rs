use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the manager settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/keeper.toml";

/// Manager-wide settings. Every section falls back to defaults, so an empty
/// or missing file is a valid configuration.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ManagerConfig {
    pub defaults: DefaultsConfig,
    pub auto_shutdown: AutoShutdownConfig,
    pub backups: BackupsConfig,
    pub paths: PathsConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DefaultsConfig {
    pub java_path: String,
    pub ram_min: String,
    pub ram_max: String,
    /// Appended after the GC flags, before `-jar`
    pub extra_jvm_args: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            java_path: "java".to_string(),
            ram_min: "4G".to_string(),
            ram_max: "10G".to_string(),
            extra_jvm_args: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AutoShutdownConfig {
    pub enabled: bool,
    pub empty_minutes: u32,
    pub warning_minutes: Vec<u32>,
}

impl Default for AutoShutdownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            empty_minutes: 30,
            warning_minutes: vec![10, 5, 1],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackupsConfig {
    pub auto_enabled: bool,
    pub interval_hours: u32,
    pub keep_count: usize,
    pub backup_on_stop: bool,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            auto_enabled: true,
            interval_hours: 3,
            keep_count: 2,
            backup_on_stop: true,
        }
    }
}

impl BackupsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_hours.max(1)) * 3600)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub servers_dir: PathBuf,
    pub backups_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            servers_dir: PathBuf::from("./servers"),
            backups_dir: PathBuf::from("./backups"),
        }
    }
}

/// All values in seconds.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub stop_secs: u64,
    pub ready_secs: u64,
    pub rcon_connect_secs: u64,
    pub rcon_command_secs: u64,
    /// Delay between the ready line and the first RCON connect
    pub rcon_connect_delay_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            stop_secs: 30,
            ready_secs: 120,
            rcon_connect_secs: 5,
            rcon_command_secs: 10,
            rcon_connect_delay_secs: 2,
        }
    }
}

impl TimeoutsConfig {
    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_secs)
    }

    pub fn rcon_connect(&self) -> Duration {
        Duration::from_secs(self.rcon_connect_secs)
    }

    pub fn rcon_command(&self) -> Duration {
        Duration::from_secs(self.rcon_command_secs)
    }

    pub fn rcon_connect_delay(&self) -> Duration {
        Duration::from_secs(self.rcon_connect_delay_secs)
    }
}

impl ManagerConfig {
    /// Load from `MC_KEEPER_CONFIG` or the default path. A missing file
    /// yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("MC_KEEPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        Self::from_toml(&s)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Idle minutes before shutdown, 0 when auto-shutdown is disabled.
    pub fn effective_empty_minutes(&self) -> u32 {
        if self.auto_shutdown.enabled {
            self.auto_shutdown.empty_minutes
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.defaults.java_path, "java");
        assert_eq!(cfg.auto_shutdown.empty_minutes, 30);
        assert_eq!(cfg.auto_shutdown.warning_minutes, vec![10, 5, 1]);
        assert_eq!(cfg.backups.keep_count, 2);
        assert_eq!(cfg.timeouts.ready(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ManagerConfig::from_toml(
            r#"
            [auto_shutdown]
            empty_minutes = 15

            [backups]
            keep_count = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.auto_shutdown.empty_minutes, 15);
        assert!(cfg.auto_shutdown.enabled);
        assert_eq!(cfg.backups.keep_count, 5);
        assert!(cfg.backups.backup_on_stop);
        assert_eq!(cfg.defaults.ram_max, "10G");
    }

    #[test]
    fn test_disabled_auto_shutdown_has_zero_minutes() {
        let cfg = ManagerConfig::from_toml("[auto_shutdown]\nenabled = false\n").unwrap();
        assert_eq!(cfg.effective_empty_minutes(), 0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = ManagerConfig::load_from(Path::new("/nonexistent/keeper.toml")).unwrap();
        assert_eq!(cfg.paths.backups_dir, PathBuf::from("./backups"));
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(ManagerConfig::from_toml("[backups\nkeep_count = ").is_err());
    }
}
