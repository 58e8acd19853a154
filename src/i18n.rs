//! Message lookup for human-readable text.
//!
//! Every string the bootstrap service shows to a person goes through
//! [`Translate`]. The built-in [`Catalog`] ships English text and can be
//! overlaid with a YAML file of `key: template` pairs.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{BootstrapError, Result};

/// Looks up message templates by key.
///
/// Never fails: an unknown key is returned unchanged.
pub trait Translate: Send + Sync {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String;
}

const ENGLISH: &[(&str, &str)] = &[
    ("log.check.start", "Checking environment..."),
    ("log.check.present", "{tool} is installed"),
    ("log.check.missing", "{tool} is not installed"),
    ("log.check.allPresent", "All required tools are installed, nothing to do"),
    ("log.install.needed", "Missing tools: {tools}"),
    ("log.install.start", "Installing {tool}, this may take a few minutes..."),
    ("log.install.finished", "{tool} installer finished"),
    ("log.recheck.start", "Verifying installation..."),
    ("log.ready", "Environment is ready"),
    ("log.failed", "Environment setup failed: {message}"),
    ("log.suggestion", "Suggestion: {suggestion}"),
    ("error.installerExit", "{tool} installer exited with code {code}"),
    ("error.spawn", "Failed to start {tool} installer: {error}"),
    (
        "error.recheck",
        "The install script reported completion, but {tools} still cannot be found",
    ),
    ("error.unexpected", "Unexpected error during setup: {error}"),
    (
        "suggestion.network",
        "Network problem detected. Check your internet connection, DNS and proxy settings, then retry.",
    ),
    (
        "suggestion.certificate",
        "TLS certificate problem detected. If you are behind a corporate proxy, install its root certificate or configure the proxy, then retry.",
    ),
    (
        "suggestion.permission.windows",
        "Permission denied. Run the application as Administrator or allow it through your antivirus, then retry.",
    ),
    (
        "suggestion.permission.unix",
        "Permission denied. Check ownership of the install directory or fix your package manager prefix permissions, then retry.",
    ),
    (
        "suggestion.spawn.windows",
        "Could not start the installer. Make sure PowerShell is available and not blocked by your firewall or execution policy.",
    ),
    (
        "suggestion.spawn.unix",
        "Could not start the installer. Make sure bash is available and that your network and proxy settings allow downloads.",
    ),
    (
        "suggestion.recheck",
        "Security software may have blocked or removed the installed files. Check your antivirus quarantine, then retry.",
    ),
];

/// Key to template table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    messages: HashMap<String, String>,
}

impl Catalog {
    /// Built-in English messages
    pub fn english() -> Self {
        let messages = ENGLISH
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { messages }
    }

    /// Overlay templates on top of the existing ones
    pub fn merge(&mut self, overrides: HashMap<String, String>) {
        self.messages.extend(overrides);
    }

    /// Load English messages overlaid with a YAML file of `key: template` pairs
    pub fn load_with_overrides(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, String> = serde_yaml::from_str(&content).map_err(|e| {
            BootstrapError::Config(format!("Invalid locale file {}: {}", path.display(), e))
        })?;

        let mut catalog = Self::english();
        catalog.merge(overrides);
        Ok(catalog)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }
}

impl Translate for Catalog {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        let Some(template) = self.messages.get(key) else {
            return key.to_string();
        };

        params
            .iter()
            .fold(template.clone(), |text, (name, value)| {
                text.replace(&format!("{{{}}}", name), value)
            })
    }
}
