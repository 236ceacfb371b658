use crate::error::{PhaseError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout")]
    pub timeout_ms: u64,
}

fn default_lock_timeout() -> u64 {
    2000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// DetectionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_sampled_files")]
    pub max_sampled_files: usize,
    #[serde(default = "default_max_sample_bytes")]
    pub max_sample_bytes: usize,
    #[serde(default = "default_max_walk_entries")]
    pub max_walk_entries: usize,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_max_sampled_files() -> usize {
    3
}

fn default_max_sample_bytes() -> usize {
    64 * 1024
}

fn default_max_walk_entries() -> usize {
    5000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_sampled_files: default_max_sampled_files(),
            max_sample_bytes: default_max_sample_bytes(),
            max_walk_entries: default_max_walk_entries(),
        }
    }
}

// ---------------------------------------------------------------------------
// RulesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Project-relative directories holding pre-existing rule files. They load
    /// after the stack's rules and before `.phase/rules`.
    #[serde(default = "default_legacy_dirs")]
    pub legacy_dirs: Vec<PathBuf>,
}

fn default_legacy_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(".cursor/rules")]
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            legacy_dirs: default_legacy_dirs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            registry: None,
            lock: LockConfig::default(),
            detection: DetectionConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PhaseError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`] but treats a missing file as the defaults, so
    /// `detect` and `stack` commands work before `setup` has run.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(PhaseError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Pick the registry directory: explicit override, then `registry:` from
    /// config (relative paths resolve against the project root), then a
    /// project-local `.phase/stacks`, then `~/.phase/stacks`.
    pub fn registry_dir(&self, root: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(p) = explicit {
            return Ok(p.to_path_buf());
        }
        if let Some(p) = &self.registry {
            return Ok(if p.is_absolute() { p.clone() } else { root.join(p) });
        }
        let local = paths::local_registry_dir(root);
        if local.is_dir() {
            return Ok(local);
        }
        paths::user_registry_dir()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// [`Config::validate`], failing on error-level findings. Returns the
    /// remaining warnings for the caller to log.
    pub fn check(&self) -> Result<Vec<ConfigWarning>> {
        let (errors, warnings): (Vec<_>, Vec<_>) = self
            .validate()
            .into_iter()
            .partition(|w| w.level == WarnLevel::Error);
        if !errors.is_empty() {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(PhaseError::InvalidConfig(messages.join("; ")));
        }
        Ok(warnings)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let threshold = self.detection.min_confidence;
        if !(0.0..=1.0).contains(&threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "detection.min_confidence={threshold} is outside [0, 1]"
                ),
            });
        } else if threshold == 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "detection.min_confidence=0 lets any stack match".to_string(),
            });
        }

        if self.detection.max_sampled_files == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "detection.max_sampled_files=0 disables source sampling".to_string(),
            });
        }

        if self.detection.max_sample_bytes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "detection.max_sample_bytes=0 reads nothing from sampled files"
                    .to_string(),
            });
        }

        if self.lock.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lock.timeout_ms=0 fails on any contention".to_string(),
            });
        }

        for dir in &self.rules.legacy_dirs {
            if dir.is_absolute() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "rules.legacy_dirs entry '{}' is absolute; it should be project-relative",
                        dir.display()
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
