use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{AdjustError, Result};
use crate::image_loader::{OutputEncoding, ResizeFilter, DEFAULT_MAX_WIDTH};
use crate::pipeline;
use crate::task_scheduler::Kernel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Width cap used when the caller gives no target size
    pub max_width: u32,
    pub default_encoding: OutputEncoding,
    pub resize_filter: ResizeFilter,

    // Execution paths
    pub offload_enabled: bool,
    pub gpu_enabled: bool,
    /// Use the rayon kernel on the caller thread
    pub parallel_cpu: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            default_encoding: OutputEncoding::default(),
            resize_filter: ResizeFilter::default(),

            offload_enabled: true,
            gpu_enabled: true,
            parallel_cpu: false,
        }
    }
}

impl EngineSettings {
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "adjust", "AdjustEngine")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Settings from the user config directory, or defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| AdjustError::SettingsError {
            message: "no config directory for this platform".to_string(),
        })?;
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The kernel used on the caller thread.
    pub fn cpu_kernel(&self) -> Kernel {
        if self.parallel_cpu {
            pipeline::apply_adjustments_par
        } else {
            pipeline::apply_adjustments
        }
    }
}
