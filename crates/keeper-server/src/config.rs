use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default environment variable holding the hex master key.
pub const DEFAULT_MASTER_KEY_ENV: &str = "KEEPER_MASTER_KEY";

/// `keeperd` configuration file (`config.toml`).
///
/// Every section is optional; a missing file means "all defaults".
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub store: StoreSection,
    pub master_key: MasterKeySection,
    pub rotation: RotationSection,
    pub log: LogSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite database path; defaults to `$XDG_DATA_HOME/keeper/keeper.db`
    pub path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterKeySection {
    pub source: MasterKeySource,
    /// Environment variable read by the `env` source
    pub env: String,
    /// Keyfile read by the `keyfile` source (plain hex or age-encrypted)
    pub keyfile: Option<String>,
    /// Hex-encoded Argon2id salt for the `passphrase` source (at least 16 bytes)
    pub salt: Option<String>,
}

impl Default for MasterKeySection {
    fn default() -> Self {
        Self {
            source: MasterKeySource::Env,
            env: DEFAULT_MASTER_KEY_ENV.to_string(),
            keyfile: None,
            salt: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MasterKeySource {
    Env,
    Keyfile,
    Passphrase,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSection {
    pub interval_days: u32,
    /// How often `watch` re-checks the active version
    pub check_interval_seconds: u64,
}

impl RotationSection {
    /// Reject values that would rotate on every command, busy-loop `watch`,
    /// or overflow the deadline arithmetic.
    pub fn validate(&self) -> Result<(), String> {
        let max_days = keeper_core::bootstrap::MAX_ROTATION_DAYS;
        if self.interval_days == 0 || i64::from(self.interval_days) > max_days {
            return Err(format!(
                "rotation.interval_days must be between 1 and {}, got {}",
                max_days, self.interval_days
            ));
        }
        if self.check_interval_seconds == 0 {
            return Err("rotation.check_interval_seconds must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            interval_days: keeper_core::bootstrap::DEFAULT_ROTATION_DAYS as u32,
            check_interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_store_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("keeper.db"))
}

/// Read the config file, falling back to defaults if it does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<KeeperConfig> {
    if !path.exists() {
        return Ok(KeeperConfig::default());
    }
    read_config(path)
}

pub fn read_config(path: &Path) -> anyhow::Result<KeeperConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    let config = parse_config(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))?;
    config
        .rotation
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<KeeperConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("keeper"));
        }
    }
    Ok(home_dir()?.join(".config").join("keeper"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("keeper"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("keeper"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.store.path.is_none());
        assert_eq!(config.master_key.source, MasterKeySource::Env);
        assert_eq!(config.master_key.env, DEFAULT_MASTER_KEY_ENV);
        assert_eq!(config.rotation.interval_days, 30);
        assert_eq!(config.rotation.check_interval_seconds, 3600);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = parse_config(
            r#"
            [master_key]
            source = "keyfile"
            keyfile = "/etc/keeper/master.key"

            [rotation]
            interval_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.master_key.source, MasterKeySource::Keyfile);
        assert_eq!(config.master_key.keyfile.as_deref(), Some("/etc/keeper/master.key"));
        assert_eq!(config.master_key.env, DEFAULT_MASTER_KEY_ENV);
        assert_eq!(config.rotation.interval_days, 7);
        assert_eq!(config.rotation.check_interval_seconds, 3600);
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let result = parse_config("[master_key]\nsource = \"vault\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_read_config_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rotation]\ninterval_days = \"soon\"\n").unwrap();

        let err = read_config(&path).unwrap_err().to_string();
        assert!(err.contains("config.toml"));
    }

    fn read_rotation(section: &str) -> anyhow::Result<KeeperConfig> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, format!("[rotation]\n{}\n", section)).unwrap();
        load_config(&path)
    }

    #[test]
    fn test_zero_interval_days_is_rejected() {
        let err = read_rotation("interval_days = 0").unwrap_err().to_string();
        assert!(err.contains("config.toml"));
        assert!(err.contains("rotation.interval_days"));
    }

    #[test]
    fn test_overflowing_interval_days_is_rejected() {
        let err = read_rotation("interval_days = 100000000").unwrap_err().to_string();
        assert!(err.contains("rotation.interval_days"));
    }

    #[test]
    fn test_zero_check_interval_is_rejected() {
        let err = read_rotation("check_interval_seconds = 0").unwrap_err().to_string();
        assert!(err.contains("config.toml"));
        assert!(err.contains("rotation.check_interval_seconds"));
    }

    #[test]
    fn test_interval_bounds_are_accepted() {
        let config = read_rotation("interval_days = 1\ncheck_interval_seconds = 1").unwrap();
        assert_eq!(config.rotation.interval_days, 1);

        let config = read_rotation("interval_days = 36500").unwrap();
        assert_eq!(config.rotation.interval_days, 36_500);
    }
}
