//! Engine configuration.

use crate::error::{EngineError, EngineResult};
use crate::logging;
use crate::platform::{self, Platform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prevent the default action of handled key events.
    #[serde(default)]
    pub prevent_default: bool,
    /// Stop propagation of handled key events.
    #[serde(default)]
    pub stop_propagation: bool,
    /// Locale override, e.g. `de-DE`.
    #[serde(default)]
    pub locale: Option<String>,
    /// Platform override.
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Accelerator label rendering.
    #[serde(default)]
    pub accelerator: AcceleratorConfig,
    /// Keyboard layout detection.
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    logging::DEFAULT_FILTER.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prevent_default: false,
            stop_propagation: false,
            locale: None,
            platform: None,
            accelerator: AcceleratorConfig::default(),
            layout: LayoutConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default location.
    pub fn load_default() -> EngineResult<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Get default config path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "keybind-engine").map(|d| d.config_dir().join("config.toml"))
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured platform, or the host's.
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }

    /// Configured locale, or the environment's.
    pub fn locale(&self) -> Option<String> {
        self.locale.clone().or_else(platform::environment_locale)
    }
}

/// How accelerator labels are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorStyle {
    /// `Ctrl+Shift+K`
    #[default]
    Text,
    /// `⌃⇧K`
    Symbolic,
}

/// Accelerator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// Label style.
    #[serde(default)]
    pub style: AcceleratorStyle,
    /// Separator between modifiers and key.
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    "+".to_string()
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            style: AcceleratorStyle::default(),
            separator: default_separator(),
        }
    }
}

/// Keyboard layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Built-in layouts registered as candidates at startup.
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Whether detection state is saved between runs.
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Layout pinned at startup, skipping detection.
    #[serde(default)]
    pub user_choice: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            persist: true,
            user_choice: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.prevent_default);
        assert_eq!(config.accelerator.separator, "+");
        assert!(config.layout.persist);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            prevent_default = true
            platform = "mac"

            [accelerator]
            style = "symbolic"

            [layout]
            candidates = ["de-German-mac"]
            "#,
        )
        .unwrap();
        assert!(config.prevent_default);
        assert_eq!(config.platform(), Platform::Mac);
        assert_eq!(config.accelerator.style, AcceleratorStyle::Symbolic);
        assert_eq!(config.accelerator.separator, "+");
        assert_eq!(config.layout.candidates, vec!["de-German-mac"]);
        assert!(config.layout.persist);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = EngineConfig {
            locale: Some("fr-FR".into()),
            layout: LayoutConfig {
                user_choice: Some("fr-French-pc".into()),
                ..LayoutConfig::default()
            },
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_borrowed_path() {
        let dir = tempfile::tempdir().unwrap();
        let root: &Path = dir.path();
        assert!(matches!(EngineConfig::load(root), Err(EngineError::Io(_))));

        let file = root.join("config.toml");
        let config = EngineConfig {
            prevent_default: true,
            ..EngineConfig::default()
        };
        config.save(file.as_path()).unwrap();
        assert_eq!(EngineConfig::load(file.as_path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "prevent_default = 3").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(EngineError::Toml(_))));
    }
}
