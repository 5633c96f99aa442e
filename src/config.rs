use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::calibration::CalibrationSettings;
use crate::simulation::SubjectProfile;
use crate::smoothing::FilterConfig;
use crate::types::Viewport;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub calibration: CalibrationSettings,
    pub smoothing: FilterConfig,
    pub screen: ScreenConfig,
    pub simulation: SubjectProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: f64,
    pub height: f64,
    /// Nominal frame rate of the feature source.
    pub fps: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { width: 1920.0, height: 1080.0, fps: 30.0 }
    }
}

impl ScreenConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.fps.max(1.0)
    }
}

impl AppConfig {
    pub const PATH: &'static str = "config.json";

    pub fn load() -> Result<Self> {
        Self::load_from(Self::PATH)
    }

    /// Missing fields fall back to defaults; an unparsable file is replaced
    /// by defaults. The file is always rewritten so new fields show up.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        config.save_to(path)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::PATH)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content).with_context(|| format!("writing {}", path.as_ref().display()))?;
        Ok(())
    }
}
