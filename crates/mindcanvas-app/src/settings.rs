use crate::ControllerError;
use mindcanvas_core::Vec2;
use mindcanvas_graph::CanvasOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mindcanvas";
const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "canvases.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Name shown to collaborators.
    pub user_name: String,
    /// Maximum undo depth; `None` keeps every step.
    pub history_limit: Option<usize>,
    pub storage_quota_bytes: Option<u64>,
    pub fit_padding: f32,
    pub max_fit_zoom: f32,
    pub zoom_step: f32,
    /// Canvas database; defaults to the per-user config directory.
    pub storage_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            user_name: "Anonymous".to_string(),
            history_limit: None,
            storage_quota_bytes: Some(5 * 1024 * 1024),
            fit_padding: 50.0,
            max_fit_zoom: 1.0,
            zoom_step: 1.2,
            storage_path: None,
        }
    }
}

impl AppSettings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load from the default location, falling back to defaults on any problem.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        tracing::info!("Loading settings from {:?}", path);
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Failed to load settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ControllerError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            tracing::error!("Failed to save settings to {:?}: {}", path, e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ControllerError> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn resolved_storage_path(&self) -> Option<PathBuf> {
        self.storage_path
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR).join(DATABASE_FILE)))
    }

    pub fn canvas_options(&self, viewport: Vec2) -> CanvasOptions {
        let defaults = CanvasOptions::default();
        CanvasOptions {
            history_limit: self.history_limit,
            fit_padding: if self.fit_padding.is_finite() {
                self.fit_padding.max(0.0)
            } else {
                defaults.fit_padding
            },
            max_fit_zoom: if self.max_fit_zoom.is_finite() && self.max_fit_zoom > 0.0 {
                self.max_fit_zoom
            } else {
                defaults.max_fit_zoom
            },
            zoom_step: if self.zoom_step.is_finite() && self.zoom_step > 1.0 {
                self.zoom_step
            } else {
                defaults.zoom_step
            },
            viewport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "user_name": "ana", "history_limit": 50 }"#).unwrap();

        let settings = AppSettings::load_from(&path).unwrap();

        assert_eq!(settings.user_name, "ana");
        assert_eq!(settings.history_limit, Some(50));
        assert_eq!(settings.zoom_step, 1.2);
        assert_eq!(settings.storage_quota_bytes, Some(5 * 1024 * 1024));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            user_name: "ben".to_string(),
            storage_path: Some(dir.path().join("db.sqlite")),
            ..Default::default()
        };

        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path).unwrap(), settings);
        assert_eq!(
            settings.resolved_storage_path(),
            Some(dir.path().join("db.sqlite"))
        );
    }

    #[test]
    fn test_canvas_options_sanitizes_values() {
        let settings = AppSettings {
            zoom_step: 0.5,
            max_fit_zoom: f32::NAN,
            fit_padding: -10.0,
            ..Default::default()
        };
        let options = settings.canvas_options(Vec2::new(800.0, 600.0));
        assert_eq!(options.zoom_step, CanvasOptions::default().zoom_step);
        assert_eq!(options.max_fit_zoom, 1.0);
        assert_eq!(options.fit_padding, 0.0);
        assert_eq!(options.viewport, Vec2::new(800.0, 600.0));
    }
}
