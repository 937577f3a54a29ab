use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use renderer::Configuration;
use serde::{Deserialize, Serialize};

/// Startup preferences read from `settings.toml`. Command-line flags win.
///
/// ```toml
/// fractal = "julia"
/// palette = "rainbow"
/// size = [1024, 1024]
///
/// [view]
/// iterations = 512
/// c = { x = -0.8, y = 0.156 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fractal: Option<String>,
    pub palette: Option<String>,
    pub size: Option<[u32; 2]>,
    pub preset: bool,
    pub view: Configuration,
}

impl Settings {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file at {}", path.display()))?;
        let settings: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse settings file at {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }
}
