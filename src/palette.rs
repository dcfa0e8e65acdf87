use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{VizError, VizResult};
use crate::render::{CITY_RADIUS, Marker};

const CLASSIC_BACKGROUND: &str = "#ffffff";
const CLASSIC_NEUTRAL: &str = "#0000ff";
const CLASSIC_START: &str = "#008000";
const CLASSIC_END: &str = "#ff0000";
const CLASSIC_INK: &str = "#000000";

const PATH_WIDTH: f64 = 1.0;
const OUTLINE_WIDTH: f64 = 1.0;

const BUILTIN_PALETTES: &[(&str, &str)] = &[
    ("classic", include_str!("../palettes/classic.toml")),
    ("midnight", include_str!("../palettes/midnight.toml")),
    ("solarized_light", include_str!("../palettes/solarized_light.toml")),
];

/// Colors and stroke widths used to paint a frame.
///
/// Any field missing from a palette file falls back to the classic look:
/// blue cities, green start, red end, black outlines and path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_neutral")]
    pub neutral_fill: String,
    #[serde(default = "default_start")]
    pub start_fill: String,
    #[serde(default = "default_end")]
    pub end_fill: String,
    #[serde(default = "default_ink")]
    pub outline: String,
    #[serde(default = "default_ink")]
    pub path_stroke: String,
    #[serde(default = "default_ink")]
    pub caption_color: String,

    #[serde(default = "default_city_radius")]
    pub city_radius: f64,
    #[serde(default = "default_path_width")]
    pub path_width: f64,
    #[serde(default = "default_outline_width")]
    pub outline_width: f64,
}

fn default_background() -> String {
    CLASSIC_BACKGROUND.to_string()
}
fn default_neutral() -> String {
    CLASSIC_NEUTRAL.to_string()
}
fn default_start() -> String {
    CLASSIC_START.to_string()
}
fn default_end() -> String {
    CLASSIC_END.to_string()
}
fn default_ink() -> String {
    CLASSIC_INK.to_string()
}
fn default_city_radius() -> f64 {
    CITY_RADIUS
}
fn default_path_width() -> f64 {
    PATH_WIDTH
}
fn default_outline_width() -> f64 {
    OUTLINE_WIDTH
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: default_background(),
            neutral_fill: default_neutral(),
            start_fill: default_start(),
            end_fill: default_end(),
            outline: default_ink(),
            path_stroke: default_ink(),
            caption_color: default_ink(),
            city_radius: CITY_RADIUS,
            path_width: PATH_WIDTH,
            outline_width: OUTLINE_WIDTH,
        }
    }
}

impl Palette {
    pub fn fill(&self, marker: Marker) -> &str {
        match marker {
            Marker::Neutral => &self.neutral_fill,
            Marker::Start => &self.start_fill,
            Marker::End => &self.end_fill,
        }
    }

    pub fn from_builtin(name: &str) -> VizResult<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let content = BUILTIN_PALETTES
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, c)| *c)
            .ok_or_else(|| {
                VizError::Config(format!(
                    "Unknown built-in palette '{}'. Available: {}",
                    name,
                    Self::list_builtins().join(", ")
                ))
            })?;
        Self::from_toml(content)
    }

    pub fn list_builtins() -> Vec<&'static str> {
        BUILTIN_PALETTES.iter().map(|(n, _)| *n).collect()
    }

    pub fn from_toml(content: &str) -> VizResult<Self> {
        let palette: Palette = toml::from_str(content)
            .map_err(|e| VizError::Config(format!("Failed to parse palette TOML: {}", e)))?;
        palette.validate()
    }

    pub fn from_yaml(content: &str) -> VizResult<Self> {
        let palette: Palette = serde_yaml::from_str(content)
            .map_err(|e| VizError::Config(format!("Failed to parse palette YAML: {}", e)))?;
        palette.validate()
    }

    /// Resolve a `--palette` argument: an existing file is parsed as TOML,
    /// then YAML; anything else is looked up among the builtins.
    pub fn resolve(spec: &str) -> VizResult<Self> {
        let path = Path::new(spec);
        if !path.is_file() {
            return Self::from_builtin(spec);
        }

        let content = std::fs::read_to_string(path)?;
        if let Ok(palette) = Self::from_toml(&content) {
            Ok(palette)
        } else if let Ok(palette) = Self::from_yaml(&content) {
            Ok(palette)
        } else {
            Err(VizError::Config(format!(
                "Failed to parse palette file {} as TOML or YAML",
                path.display()
            )))
        }
    }

    fn validate(self) -> VizResult<Self> {
        for (field, value) in [
            ("city_radius", self.city_radius),
            ("path_width", self.path_width),
            ("outline_width", self.outline_width),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(VizError::Config(format!(
                    "palette {} must be a non-negative number, got {}",
                    field, value
                )));
            }
        }
        Ok(self)
    }
}
