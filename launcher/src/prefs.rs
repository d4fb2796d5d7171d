use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::consts::DEFAULT_SETTLE_DELAY_MS;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub legal_notice_accepted: bool,

    #[serde(default)]
    pub splash_disabled: bool,

    /// Also forward parameters when the running instance uses a named
    /// configuration. Off by default: only the default configuration forwards.
    #[serde(default)]
    pub forward_named_configurations: bool,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    // Written by early builds before the field was renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_legal: Option<bool>,
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            legal_notice_accepted: false,
            splash_disabled: false,
            forward_named_configurations: false,
            settle_delay_ms: default_settle_delay_ms(),
            accepted_legal: None,
        }
    }
}

/// Preference storage for one configuration's profile.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_configuration(configuration_name: &str) -> Self {
        Self::new(crate::paths::preferences_path(configuration_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults.
    pub fn load(&self) -> anyhow::Result<Preferences> {
        let s = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Preferences::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read preferences {}", self.path.display()))
            }
        };
        let mut prefs: Preferences = toml::from_str(&s)
            .with_context(|| format!("parse preferences {}", self.path.display()))?;

        if let Some(accepted) = prefs.accepted_legal.take() {
            prefs.legal_notice_accepted |= accepted;
        }
        Ok(prefs)
    }

    pub fn save(&self, prefs: &Preferences) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("mkdir {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(prefs).context("serialize preferences")?;
        std::fs::write(&self.path, s)
            .with_context(|| format!("write preferences {}", self.path.display()))?;
        Ok(())
    }

    pub fn has_accepted_legal_notice(&self) -> bool {
        match self.load() {
            Ok(p) => p.legal_notice_accepted,
            Err(e) => {
                log::warn!("prefs: treating legal notice as not accepted: {e:#}");
                false
            }
        }
    }

    /// An unreadable file is moved aside to `*.broken` and replaced by
    /// defaults, so an acceptance given at the prompt is never lost.
    pub fn set_accepted_legal_notice(&self) -> anyhow::Result<()> {
        let mut prefs = match self.load() {
            Ok(p) => p,
            Err(e) => {
                let backup = self.path.with_extension("toml.broken");
                log::warn!(
                    "prefs: {e:#}; starting over, old file kept as {}",
                    backup.display()
                );
                if let Err(e) = std::fs::rename(&self.path, &backup) {
                    log::warn!("prefs: keep {} failed: {e}", backup.display());
                }
                Preferences::default()
            }
        };
        prefs.legal_notice_accepted = true;
        self.save(&prefs)
    }
}
