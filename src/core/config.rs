//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, StpError};

/// Full pruner configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub prune: PruneConfig,
    pub paths: PathsConfig,
}

/// Prune behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PruneConfig {
    /// Root directory whose entries are pruned. The root itself is never removed.
    pub root: PathBuf,
    /// Age threshold as a human duration string (e.g. "3weeks", "2months", "45d").
    pub max_age: String,
    /// Worker threads for subtree evaluation. 0 means one per root child.
    pub parallelism: usize,
    /// Evaluate and report without removing anything.
    pub dry_run: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_age: "3weeks".to_string(),
            parallelism: 0,
            dry_run: false,
        }
    }
}

/// Filesystem locations used by the tool itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            config_file: home.join(".config").join("stp").join("config.toml"),
            activity_log: home
                .join(".local")
                .join("share")
                .join("stp")
                .join("activity.jsonl"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
}

fn default_root() -> PathBuf {
    home_dir().join("tmp")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| StpError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(StpError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// The effective age threshold as a concrete duration.
    pub fn max_age(&self) -> Result<Duration> {
        parse_age(&self.prune.max_age)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(raw) = env_nonempty("STP_ROOT") {
            self.prune.root = PathBuf::from(raw);
        }
        if let Some(raw) = env_nonempty("STP_MAX_AGE") {
            self.prune.max_age = raw;
        }
        if let Some(raw) = env_nonempty("STP_PARALLELISM")
            && let Ok(n) = raw.trim().parse()
        {
            self.prune.parallelism = n;
        }
        if let Some(raw) = env_nonempty("STP_DRY_RUN") {
            self.prune.dry_run = matches!(raw.trim(), "1" | "true" | "yes");
        }
    }

    fn validate(&self) -> Result<()> {
        if self.prune.root.as_os_str().is_empty() {
            return Err(StpError::InvalidConfig {
                details: "prune.root must not be empty".to_string(),
            });
        }
        // Fail early on an unparseable age rather than at evaluation time.
        parse_age(&self.prune.max_age)?;
        Ok(())
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

/// Parse a human age string (`"3weeks"`, `"2 months"`, `"45d"`, `"12h"`)
/// into a concrete duration.
///
/// A bare number defaults to days. Months are 30 days, years 365.
pub fn parse_age(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(StpError::InvalidConfig {
            details: "empty age string".to_string(),
        });
    }
    let (digits, suffix) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let n: u64 = digits.parse().map_err(|_| StpError::InvalidConfig {
        details: format!("invalid age value: {s}"),
    })?;
    let multiplier = match suffix.trim() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3600,
        "" | "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 7 * 86_400,
        "month" | "months" => 30 * 86_400,
        "y" | "year" | "years" => 365 * 86_400,
        other => {
            return Err(StpError::InvalidConfig {
                details: format!("unknown age suffix: {other}"),
            });
        }
    };
    let secs = n.checked_mul(multiplier).ok_or_else(|| StpError::InvalidConfig {
        details: format!("age out of range: {s}"),
    })?;
    Ok(Duration::from_secs(secs))
}
