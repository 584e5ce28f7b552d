//! Session configuration.
//!
//! Loaded from an optional TOML file; every field has a default matching the
//! behaviour of a plain `diskimgtool` run.

use diskimg_error::{ImgError, ImgResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a mount is released during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnmountPolicy {
    /// Plain `umount` attempts before giving up.
    pub attempts: u32,
    /// Pause between failed attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Issue one `umount -l` once all plain attempts failed.
    pub lazy_fallback: bool,
}

impl Default for UnmountPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_ms: 1000,
            lazy_fallback: true,
        }
    }
}

impl UnmountPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the temporary mount root is created; the current directory when unset.
    pub workdir_parent: Option<PathBuf>,
    pub root_partition: u32,
    pub boot_partition: u32,
    pub unmount: UnmountPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir_parent: None,
            root_partition: 2,
            boot_partition: 1,
            unmount: UnmountPolicy::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> ImgResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ImgError::io(path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ImgError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ImgResult<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ImgError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ImgResult<()> {
        if self.unmount.attempts == 0 {
            return Err(ImgError::Config(
                "unmount.attempts must be at least 1".to_string(),
            ));
        }
        if self.root_partition == 0 || self.boot_partition == 0 {
            return Err(ImgError::Config(
                "partition numbers start at 1".to_string(),
            ));
        }
        if self.root_partition == self.boot_partition {
            return Err(ImgError::Config(format!(
                "root and boot partition are both {}",
                self.root_partition
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plain_run() {
        let config = Config::default();
        assert_eq!(config.root_partition, 2);
        assert_eq!(config.boot_partition, 1);
        assert_eq!(config.unmount.attempts, 5);
        assert_eq!(config.unmount.backoff(), Duration::from_secs(1));
        assert!(config.unmount.lazy_fallback);
        assert!(config.workdir_parent.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn partial_unmount_table_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
workdir_parent = "/var/tmp"

[unmount]
attempts = 3
"#,
        )
        .unwrap();
        assert_eq!(config.workdir_parent, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.unmount.attempts, 3);
        assert_eq!(config.unmount.backoff_ms, 1000);
        assert!(config.unmount.lazy_fallback);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = Config::from_toml_str("[unmount]\nattempts = 0\n").unwrap_err();
        assert!(matches!(err, ImgError::Config(_)));
    }

    #[test]
    fn rejects_same_root_and_boot_partition() {
        let err = Config::from_toml_str("root_partition = 1\n").unwrap_err();
        assert!(err.to_string().contains("both 1"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::from_toml_str("retries = 3\n").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ImgError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskimgtool.toml");
        fs::write(&path, "[unmount]\nlazy_fallback = false\nbackoff_ms = 10\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(!config.unmount.lazy_fallback);
        assert_eq!(config.unmount.backoff(), Duration::from_millis(10));
    }
}
