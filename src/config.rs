// config.rs
//
// Runtime player configuration:
// - Optional JSON file, every field defaulted (partial files are fine)
// - Lookup: $VR360_PLAYER_CONFIG -> <exe_dir>/assets/player.json -> ./assets/player.json
// - Nothing found: built-in defaults

use crate::motion::InteractiveMode;
use crate::panorama::ProjectionMode;
use crate::render_state::{RenderState, VrConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "VR360_PLAYER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Centered frustum used for the single-view projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoProjection {
    pub fov_scale: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for MonoProjection {
    fn default() -> Self {
        Self { fov_scale: 2.5, near: 0.7, far: 500.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeProjection {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for EyeProjection {
    fn default() -> Self {
        Self { fov_y_degrees: 120.0, near: 0.1, far: 100.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Consecutive missed frames, after a first success, that count as disconnected.
    pub disconnect_threshold: u32,
    pub waiting_log_every: u32,
    pub transient_log_every: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { disconnect_threshold: 3, waiting_log_every: 60, transient_log_every: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub frame_interval_ms: u64,
    /// Used while the window surface cannot be queried.
    pub default_surface_size: (u32, u32),
    pub mono: MonoProjection,
    pub eye: EyeProjection,
    /// VR parameters applied whenever VR mode is switched on.
    pub vr: VrConfig,
    pub render_state: RenderState,
    pub projection_mode: ProjectionMode,
    pub interactive_mode: InteractiveMode,
    pub video: VideoConfig,
    /// Period of repeated render-loop error logs.
    pub error_log_every: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 17,
            default_surface_size: (1920, 1080),
            mono: MonoProjection::default(),
            eye: EyeProjection::default(),
            vr: VrConfig::default(),
            render_state: RenderState::default(),
            projection_mode: ProjectionMode::Sphere,
            interactive_mode: InteractiveMode::Touch,
            video: VideoConfig::default(),
            error_log_every: 60,
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&text)?;
        info!("loaded player config from {}", path.display());
        Ok(config)
    }

    /// Resolves the config file as described at the top of this module. A file
    /// that exists but fails to load is reported and replaced by defaults.
    pub fn from_env() -> Self {
        let Some(path) = find_config_file() else {
            info!("no player config found, using defaults");
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring player config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("player.json");
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("assets").join("player.json");
    if p.exists() {
        return Some(p);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "frame_interval_ms": 33, "vr": {{ "ipd": 0.07 }}, "interactive_mode": "Cardboard" }}"#
        )
        .unwrap();

        let config = PlayerConfig::load(file.path()).unwrap();
        assert_eq!(config.frame_interval(), Duration::from_millis(33));
        assert_eq!(config.vr.ipd, 0.07);
        assert_eq!(config.vr.k1, VrConfig::default().k1);
        assert_eq!(config.interactive_mode, InteractiveMode::Cardboard);
        assert_eq!(config.default_surface_size, (1920, 1080));
        assert_eq!(config.video.disconnect_threshold, 3);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(PlayerConfig::load(file.path()), Err(ConfigError::Parse(_))));
        assert!(matches!(
            PlayerConfig::load(Path::new("/definitely/missing/player.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
