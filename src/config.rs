use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::storage::{SETTINGS_KEY, Storage, THEME_KEY};

/// Inference settings, persisted as one storage entry. Field names
/// match the original persisted format (`maxTokens` camelCase).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub temperature: f64,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: "kanish-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl Settings {
    /// Loads persisted settings, falling back to defaults when the
    /// entry is missing or malformed.
    pub fn load(storage: &Storage) -> Self {
        let Some(raw) = storage.get(SETTINGS_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<Settings>(&raw) {
            Ok(mut settings) => {
                settings.temperature = settings.temperature.clamp(0.0, 1.0);
                settings
            }
            Err(e) => {
                warn!("discarding malformed settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.set(SETTINGS_KEY, &serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    /// Loads the persisted preference, falling back to the terminal's
    /// background hint when unset.
    pub fn load(storage: &Storage) -> Self {
        match storage.get(THEME_KEY).as_deref() {
            Some("dark") => Theme::Dark,
            Some("light") => Theme::Light,
            _ => Self::detect(),
        }
    }

    /// COLORFGBG is the closest thing a terminal has to a dark/light
    /// preference signal: "<fg>;<bg>" with background colors 0-6 being
    /// dark. Terminals that don't set it get the dark default.
    fn detect() -> Self {
        match std::env::var("COLORFGBG") {
            Ok(value) => match value.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()) {
                Some(bg) if bg > 6 => Theme::Light,
                _ => Theme::Dark,
            },
            Err(_) => Theme::Dark,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn save(self, storage: &Storage) -> Result<()> {
        storage.set(THEME_KEY, self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        let settings = Settings::load(&storage);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.model, "kanish-mini");
        assert_eq!(settings.max_tokens, 1024);
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        let settings = Settings {
            model: "llama2".to_string(),
            temperature: 0.3,
            max_tokens: 2048,
        };
        settings.save(&storage).unwrap();
        assert_eq!(Settings::load(&storage), settings);
    }

    #[test]
    fn settings_fall_back_on_malformed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        storage.set(SETTINGS_KEY, "]]not json[[").unwrap();
        assert_eq!(Settings::load(&storage), Settings::default());
    }

    #[test]
    fn temperature_is_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        storage
            .set(SETTINGS_KEY, r#"{"model":"m","temperature":7.0,"maxTokens":512}"#)
            .unwrap();
        let settings = Settings::load(&storage);
        assert_eq!(settings.temperature, 1.0);
    }

    #[test]
    fn theme_round_trip_and_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        Theme::Light.save(&storage).unwrap();
        assert_eq!(Theme::load(&storage), Theme::Light);
        assert_eq!(Theme::Light.toggle(), Theme::Dark);
    }
}
