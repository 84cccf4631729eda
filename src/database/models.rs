//! Data models for QSticky database entities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Store-assigned note identity
pub type NoteId = i64;

/// 8-bit RGBA color, stored as `#rrggbbaa`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const WHITE: Rgba = Rgba::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const LEMON_CHIFFON: Rgba = Rgba::rgb(0xff, 0xfa, 0xcd);

    fn named(name: &str) -> Option<Self> {
        match name {
            "white" => Some(Self::WHITE),
            "black" => Some(Self::BLACK),
            "lemonchiffon" => Some(Self::LEMON_CHIFFON),
            _ => None,
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(color) = Self::named(&s) {
            return Ok(color);
        }
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("Invalid color: {s}"))?;
        if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
            return Err(format!("Invalid color: {s}"));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("Invalid color: {s}"))
        };
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 0xff },
        })
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

/// Font family and point size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Font {
    pub family: String,
    pub size: i32,
}

impl Font {
    pub fn new(family: impl Into<String>, size: i32) -> Self {
        Self {
            family: family.into(),
            size,
        }
    }
}

impl Default for Font {
    fn default() -> Self {
        Self::new(crate::DEFAULT_FONT_FAMILY, crate::DEFAULT_FONT_SIZE)
    }
}

/// A sticky note record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Assigned by the store on first insert; `None` while unsaved
    pub id: Option<NoteId>,
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Background color
    pub color: Rgba,
    /// Text color
    pub font_color: Rgba,
    pub font: Font,
    /// Stacking index, higher = more recently focused
    pub z_order: i64,
    pub visible: bool,
}

impl Note {
    /// A new unsaved note styled with the given preferences
    pub fn with_preferences(prefs: &Preferences) -> Self {
        Self {
            id: None,
            text: String::new(),
            x: crate::DEFAULT_NOTE_X,
            y: crate::DEFAULT_NOTE_Y,
            width: crate::DEFAULT_NOTE_WIDTH,
            height: crate::DEFAULT_NOTE_HEIGHT,
            color: prefs.color,
            font_color: prefs.font_color,
            font: prefs.font.clone(),
            z_order: 0,
            visible: true,
        }
    }

    /// Copy of the note carrying the given id
    pub fn with_id(&self, id: NoteId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    /// Reject rows that would break the stored invariants
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "note size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.font.size <= 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "font size must be positive, got {}",
                self.font.size
            )));
        }
        Ok(())
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::with_preferences(&Preferences::default())
    }
}

/// Global settings stored in the singleton preferences row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Default background color
    pub color: Rgba,
    /// Default text color
    pub font_color: Rgba,
    pub font: Font,
    /// Apply the defaults to every note instead of new notes only
    pub apply_globally: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            color: Rgba::LEMON_CHIFFON,
            font_color: Rgba::BLACK,
            font: Font::default(),
            apply_globally: false,
        }
    }
}

/// Preferences row as stored; `None` columns fall back to built-in defaults
#[derive(Debug, Clone, Default)]
pub struct RawPreferences {
    pub color: Option<String>,
    pub font_color: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<i32>,
    pub apply_globally: Option<bool>,
}

impl RawPreferences {
    /// Merge stored overrides onto the built-in defaults
    pub fn merge_defaults(self) -> Preferences {
        let (color, font_color, font) =
            resolve_style(self.color, self.font_color, self.font_family, self.font_size);
        Preferences {
            color,
            font_color,
            font,
            apply_globally: self.apply_globally.unwrap_or_default(),
        }
    }
}

/// Note row as stored, before color parsing
#[derive(Debug, Clone)]
pub struct RawNote {
    pub id: NoteId,
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub color: Option<String>,
    pub font_color: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<i32>,
    pub z_order: i64,
    pub visible: bool,
}

impl RawNote {
    /// Decode a stored row; unset or unreadable style columns fall back to
    /// the built-in defaults and non-positive sizes are clamped
    pub fn into_note(self) -> Note {
        let (color, font_color, font) =
            resolve_style(self.color, self.font_color, self.font_family, self.font_size);
        Note {
            id: Some(self.id),
            text: self.text,
            x: self.x,
            y: self.y,
            width: self.width.max(1),
            height: self.height.max(1),
            color,
            font_color,
            font,
            z_order: self.z_order,
            visible: self.visible,
        }
    }
}

/// Style columns shared by note and preferences rows. Unset or unreadable
/// values fall back to the built-in preferences.
fn resolve_style(
    color: Option<String>,
    font_color: Option<String>,
    font_family: Option<String>,
    font_size: Option<i32>,
) -> (Rgba, Rgba, Font) {
    let defaults = Preferences::default();
    let color = color
        .and_then(|c| c.parse().ok())
        .unwrap_or(defaults.color);
    let font_color = font_color
        .and_then(|c| c.parse().ok())
        .unwrap_or(defaults.font_color);
    let font = Font {
        family: font_family
            .filter(|f| !f.is_empty())
            .unwrap_or(defaults.font.family),
        size: font_size.filter(|s| *s > 0).unwrap_or(defaults.font.size),
    };
    (color, font_color, font)
}
