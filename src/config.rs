use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::tree::NodeKind;

/// Directory names never descended into by the scanner.
pub const DEFAULT_IGNORED: [&str; 7] = [
    "node_modules",
    "dist",
    "build",
    "target",
    "__pycache__",
    "venv",
    ".git",
];

/// Tuning knobs for the radial layout and the collision resolver.
///
/// All distances are in render units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// On-screen width reserved for a directory node (default 2.0).
    pub directory_footprint: f32,
    /// On-screen width reserved for a file node (default 1.0).
    pub file_footprint: f32,
    /// Minimum clearance between any two nodes (default 0.5).
    pub min_sibling_gap: f32,
    /// Extra weight granted to a directory whose children are laid out (default 0.5).
    pub subtree_buffer: f32,
    /// Minimum radius of the first ring (default 4.0).
    pub base_radius: f32,
    /// Minimum distance between consecutive rings (default 3.0).
    pub radius_growth_per_depth: f32,
    /// Elevation added per tree level (default 0.5).
    pub elevation_step: f32,
    /// Deepest level included in a layout; the root is level 0 (default 6).
    pub max_depth: usize,
    /// Hard cap on collision resolver rounds (default 50).
    pub max_iterations: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            directory_footprint: 2.0,
            file_footprint: 1.0,
            min_sibling_gap: 0.5,
            subtree_buffer: 0.5,
            base_radius: 4.0,
            radius_growth_per_depth: 3.0,
            elevation_step: 0.5,
            max_depth: 6,
            max_iterations: 50,
        }
    }
}

impl LayoutConfig {
    pub fn footprint(&self, kind: NodeKind) -> f32 {
        match kind {
            NodeKind::Directory => self.directory_footprint,
            NodeKind::File => self.file_footprint,
        }
    }

    /// Linear space a node claims along its ring: footprint plus gap.
    pub fn span(&self, kind: NodeKind) -> f32 {
        self.footprint(kind) + self.min_sibling_gap
    }

    /// Required center distance between two nodes.
    pub fn min_separation(&self, a: NodeKind, b: NodeKind) -> f32 {
        (self.footprint(a) + self.footprint(b)) * 0.5 + self.min_sibling_gap
    }

    /// Largest separation any pair can require.
    pub fn max_separation(&self) -> f32 {
        let widest = self.directory_footprint.max(self.file_footprint);
        widest + self.min_sibling_gap
    }
}

/// Filesystem scan options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Levels below the root to descend; direct children are level 1.
    pub max_depth: usize,
    /// Skip names starting with a dot.
    pub skip_hidden: bool,
    /// Entry names that are skipped together with their contents.
    pub ignored: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            skip_hidden: true,
            ignored: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Top-level configuration file.
///
/// ```toml
/// large_directory_threshold = 100
///
/// [layout]
/// max_depth = 4
///
/// [scan]
/// ignored = ["node_modules", "target"]
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub layout: LayoutConfig,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
    /// Descendant count at which a directory is reported as large.
    pub large_directory_threshold: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
            large_directory_threshold: 100,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let l = &self.layout;
        let lengths = [
            ("directory_footprint", l.directory_footprint),
            ("file_footprint", l.file_footprint),
            ("min_sibling_gap", l.min_sibling_gap),
            ("subtree_buffer", l.subtree_buffer),
            ("base_radius", l.base_radius),
            ("radius_growth_per_depth", l.radius_growth_per_depth),
            ("elevation_step", l.elevation_step),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "layout.{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        if l.max_separation() <= 0.0 {
            return Err(Error::Config(
                "footprints and gap cannot all be zero".to_string(),
            ));
        }
        Ok(())
    }
}
