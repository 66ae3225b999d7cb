use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub use crate::settings::{BackgroundUri, Settings};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SceneOptions {
    /// Number of particles in the scene.
    pub density: usize,
    /// Smallest and largest dot radius, in px.
    pub dot_radius_range: [f32; 2],
    /// Width of the lines linking nearby particles, in px. Zero disables links.
    pub line_thickness: f32,
    /// Particles closer than this many px are linked.
    pub line_distance: f32,
    /// Multiplier on the base drift speed.
    pub speed_factor: f32,
    /// Dot and line color, ARGB.
    pub particle_color: u32,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            density: 60,
            dot_radius_range: [1.0, 3.5],
            line_thickness: 1.0,
            line_distance: 86.0,
            speed_factor: 1.0,
            particle_color: 0xFF86_8686,
        }
    }
}

impl SceneOptions {
    pub fn validate(&self) -> Result<()> {
        let [min_r, max_r] = self.dot_radius_range;
        ensure!(
            min_r.is_finite() && max_r.is_finite() && min_r > 0.0,
            "scene.dot-radius-range values must be positive"
        );
        ensure!(
            min_r <= max_r,
            "scene.dot-radius-range minimum must not exceed the maximum"
        );
        ensure!(
            self.line_thickness.is_finite() && self.line_thickness >= 0.0,
            "scene.line-thickness must be non-negative"
        );
        ensure!(
            self.line_distance.is_finite() && self.line_distance >= 0.0,
            "scene.line-distance must be non-negative"
        );
        ensure!(
            self.speed_factor.is_finite() && self.speed_factor >= 0.0,
            "scene.speed-factor must be non-negative"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceOptions {
    pub title: String,
    pub fullscreen: bool,
    /// Extra scroll room requested for the scene, in px. Never smaller than the surface.
    pub desired_size: Option<[u32; 2]>,
    /// MSAA samples per pixel; lowered at startup if the GPU cannot do it. 1 disables.
    pub num_samples: u32,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            title: "Particles".to_string(),
            fullscreen: false,
            desired_size: None,
            num_samples: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Live settings; edits to this block are picked up while running.
    pub settings: Settings,
    pub scene: SceneOptions,
    pub surface: SurfaceOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.scene.validate().context("invalid scene options")?;
        if let Some([w, h]) = self.surface.desired_size {
            ensure!(w > 0 && h > 0, "surface.desired-size must be positive");
        }
        ensure!(
            matches!(self.surface.num_samples, 1 | 2 | 4 | 8 | 16),
            "surface.num-samples must be one of 1, 2, 4, 8 or 16"
        );
        ensure!(
            self.settings.frame_delay_ms <= 10_000,
            "settings.frame-delay-ms must not exceed 10000"
        );
        Ok(self)
    }
}
