//! User preferences persisted between runs.
//!
//! Stored as JSON in the user's config directory
//! (e.g. `~/.config/photo-pass/settings.json` on Linux). A missing or
//! unreadable file silently yields the defaults.

use crate::config::Backend;
use crate::encoder::FormatKind;
use crate::error::Result;
use crate::presets::Preset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preferred download format.
    pub format: FormatKind,
    /// Preset applied most recently, offered as the default next time.
    pub last_preset: Option<Preset>,
    /// Overrides `PHOTO_PASS_BACKEND` when set.
    pub backend: Option<Backend>,
}

impl Settings {
    /// Returns the path to the settings file, creating its directory.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "photo-pass", "photo-pass").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Persists settings to the default location.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => {
                log::warn!("No config directory available; settings not saved");
                Ok(())
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
