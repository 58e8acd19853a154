use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

/// One managed tool: how to find it and how to install it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Display name used in messages
    pub name: String,
    /// Interchangeable command names; the tool is present if any resolves
    pub aliases: Vec<String>,
    /// Bundled installer script (`~` is expanded)
    pub installer: String,
}

impl ToolSpec {
    pub fn installer_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.installer).as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub tool_a: ToolSpec,
    pub tool_b: ToolSpec,
    /// Interpreter used to run installer scripts (default: bash, or PowerShell on Windows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// YAML file of `key: template` message overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_file: Option<String>,
}

fn script_extension() -> &'static str {
    if cfg!(windows) {
        "ps1"
    } else {
        "sh"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let ext = script_extension();
        Self {
            tool_a: ToolSpec {
                name: "tool-a".to_string(),
                aliases: vec!["tool-a".to_string(), "tool-a-cli".to_string()],
                installer: format!("~/.config/envboot/scripts/install-tool-a.{}", ext),
            },
            tool_b: ToolSpec {
                name: "tool-b".to_string(),
                aliases: vec!["tool-b".to_string()],
                installer: format!("~/.config/envboot/scripts/install-tool-b.{}", ext),
            },
            interpreter: None,
            locale_file: None,
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("envboot"))
            .ok_or_else(|| BootstrapError::Config("Could not determine config directory".to_string()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// and a missing file means defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(BootstrapError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None => {
                let path = Self::config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| BootstrapError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply `ENVBOOT_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(installer) = lookup("ENVBOOT_TOOL_A_INSTALLER") {
            self.tool_a.installer = installer;
        }
        if let Some(installer) = lookup("ENVBOOT_TOOL_B_INSTALLER") {
            self.tool_b.installer = installer;
        }
        if let Some(interpreter) = lookup("ENVBOOT_INTERPRETER") {
            self.interpreter = Some(interpreter);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, tool) in [("tool_a", &self.tool_a), ("tool_b", &self.tool_b)] {
            if tool.name.trim().is_empty() {
                return Err(BootstrapError::Config(format!("{}.name must not be empty", field)));
            }
            if tool.aliases.iter().all(|alias| alias.trim().is_empty()) {
                return Err(BootstrapError::Config(format!(
                    "{}.aliases must contain at least one command name",
                    field
                )));
            }
            if tool.installer.trim().is_empty() {
                return Err(BootstrapError::Config(format!(
                    "{}.installer must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn locale_path(&self) -> Option<PathBuf> {
        self.locale_file
            .as_ref()
            .map(|file| PathBuf::from(shellexpand::tilde(file).as_ref()))
    }
}
