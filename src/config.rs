use crate::error::Result;
use crate::labels::{BadRowPolicy, MatchOrder};
use serde::Deserialize;
use std::{fmt, fs, path::Path, str::FromStr};
use toml_edit::{DocumentMut, value};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = ".config/runsheet_labels.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub template_dir: String,
    pub saved_files_dir: String,
    /// Placement defaults, written by `settings save`.
    pub settings_path: String,
    pub log_level: String,
    pub matching: MatchingSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_dir: "templates".to_string(),
            saved_files_dir: "saved_files".to_string(),
            settings_path: "templates/pdf_label_settings.toml".to_string(),
            log_level: "info".to_string(),
            matching: MatchingSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    pub order: MatchOrder,
    pub bad_rows: BadRowPolicy,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like `load`, but a missing file means "all defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Fixed palette for the stamped stop number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelColor {
    #[default]
    Red,
    Black,
    Blue,
    Green,
    Orange,
}

impl LabelColor {
    pub const ALL: [LabelColor; 5] = [
        LabelColor::Red,
        LabelColor::Black,
        LabelColor::Blue,
        LabelColor::Green,
        LabelColor::Orange,
    ];

    /// Fill colour as RGB components in 0..=1.
    pub fn rgb(self) -> (f32, f32, f32) {
        match self {
            LabelColor::Red => (1.0, 0.0, 0.0),
            LabelColor::Black => (0.0, 0.0, 0.0),
            LabelColor::Blue => (0.0, 0.0, 1.0),
            LabelColor::Green => (0.0, 0.5, 0.0),
            LabelColor::Orange => (1.0, 0.5, 0.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LabelColor::Red => "Red",
            LabelColor::Black => "Black",
            LabelColor::Blue => "Blue",
            LabelColor::Green => "Green",
            LabelColor::Orange => "Orange",
        }
    }
}

impl fmt::Display for LabelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LabelColor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown colour '{s}' (expected Red, Black, Blue, Green or Orange)")
            })
    }
}

/// Where and how the stop number is drawn on each label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementConfig {
    pub font_size: u32,
    /// Points from the left edge.
    pub x_position: u32,
    /// Points down from the top edge.
    pub y_offset: u32,
    pub color: LabelColor,
}

impl PlacementConfig {
    pub const FONT_SIZE_RANGE: (u32, u32) = (20, 200);
    pub const X_RANGE: (u32, u32) = (0, 600);
    pub const Y_RANGE: (u32, u32) = (0, 800);

    /// Pull every value back inside its slider range.
    pub fn clamped(self) -> Self {
        Self {
            font_size: clamp(self.font_size.into(), Self::FONT_SIZE_RANGE),
            x_position: clamp(self.x_position.into(), Self::X_RANGE),
            y_offset: clamp(self.y_offset.into(), Self::Y_RANGE),
            color: self.color,
        }
    }

    /// Read the saved defaults. A missing file gives the built-in defaults,
    /// missing keys fall back one by one, an unknown colour becomes Red.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw: RawPlacement = toml::from_str(&fs::read_to_string(path)?)?;
        let defaults = Self::default();
        Ok(Self {
            font_size: raw
                .font_size
                .map_or(defaults.font_size, |v| clamp(v, Self::FONT_SIZE_RANGE)),
            x_position: raw
                .x_position
                .map_or(defaults.x_position, |v| clamp(v, Self::X_RANGE)),
            y_offset: raw
                .y_offset
                .map_or(defaults.y_offset, |v| clamp(v, Self::Y_RANGE)),
            color: raw
                .color
                .and_then(|c| c.parse().ok())
                .unwrap_or_default(),
        })
    }

    /// Persist these values as the new defaults, keeping any other content
    /// (comments, unrelated keys) already in the file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        let placement = self.clamped();
        doc["font_size"] = value(i64::from(placement.font_size));
        doc["x_position"] = value(i64::from(placement.x_position));
        doc["y_offset"] = value(i64::from(placement.y_offset));
        doc["color"] = value(placement.color.name());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, doc.to_string())?;
        info!(path = %path.display(), "Saved placement defaults");
        Ok(())
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            font_size: 72,
            x_position: 30,
            y_offset: 90,
            color: LabelColor::Red,
        }
    }
}

#[derive(Deserialize)]
struct RawPlacement {
    font_size: Option<i64>,
    x_position: Option<i64>,
    y_offset: Option<i64>,
    color: Option<String>,
}

fn clamp(v: i64, (lo, hi): (u32, u32)) -> u32 {
    // the range bounds fit in u32, so the cast cannot truncate
    v.clamp(i64::from(lo), i64::from(hi)) as u32
}
