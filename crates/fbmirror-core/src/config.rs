use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::compositor::CursorAlpha;

/// Frame rate used when none is configured or the given one is unusable
pub const DEFAULT_FPS: u32 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frame rate must be greater than zero")]
    ZeroFrameRate,

    #[error("unknown cursor alpha mode '{0}' (expected 'straight' or 'premultiplied')")]
    UnknownCursorAlpha(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Target frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Destination framebuffer device
    #[serde(default = "default_device")]
    pub device: PathBuf,

    /// X11 display name; libxcb falls back to $DISPLAY when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Whether the cursor is composited onto each frame
    #[serde(default = "default_draw_cursor")]
    pub draw_cursor: bool,

    /// Interpretation of the cursor image's color channels
    #[serde(default)]
    pub cursor_alpha: CursorAlpha,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_device() -> PathBuf {
    PathBuf::from("/dev/fb1")
}
fn default_draw_cursor() -> bool {
    true
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            device: default_device(),
            display: None,
            draw_cursor: default_draw_cursor(),
            cursor_alpha: CursorAlpha::default(),
        }
    }
}

impl MirrorConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("org", "fbmirror", "fbmirror") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("fbmirror.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }
}

/// Interpret a frame rate given on the command line.
///
/// Returns `None` for anything that is not a positive integer, so the caller
/// can fall back to [`DEFAULT_FPS`].
pub fn parse_fps_arg(arg: &str) -> Option<u32> {
    match arg.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(fps) => Some(fps),
    }
}
