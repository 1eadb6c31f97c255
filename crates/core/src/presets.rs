//! Output sizes, background colors and the presets that pin both.
//!
//! Every table is a closed enum so an unknown key can only appear at the
//! parsing boundary, where it fails with [`AppError::InvalidParameter`].

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `rrggbb`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(AppError::parameter(format!("invalid hex color '{hex}'")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| AppError::parameter(format!("invalid hex color '{hex}'")))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Lowercase `#rrggbb`, the form the processing service expects.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Standard passport/visa output sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhotoSize {
    Passport,
    IndianVisa,
    UsVisa,
    UkVisa,
    SchengenVisa,
    CanadaVisa,
}

impl PhotoSize {
    pub const ALL: [PhotoSize; 6] = [
        PhotoSize::Passport,
        PhotoSize::IndianVisa,
        PhotoSize::UsVisa,
        PhotoSize::UkVisa,
        PhotoSize::SchengenVisa,
        PhotoSize::CanadaVisa,
    ];

    /// Canvas used by operations that run before any size is chosen.
    pub const DEFAULT_CANVAS: PhotoSize = PhotoSize::Passport;

    pub fn key(self) -> &'static str {
        match self {
            PhotoSize::Passport => "passport",
            PhotoSize::IndianVisa => "indianVisa",
            PhotoSize::UsVisa => "usVisa",
            PhotoSize::UkVisa => "ukVisa",
            PhotoSize::SchengenVisa => "schengenVisa",
            PhotoSize::CanadaVisa => "canadaVisa",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PhotoSize::Passport => "Passport Size",
            PhotoSize::IndianVisa => "Indian Visa",
            PhotoSize::UsVisa => "US Visa",
            PhotoSize::UkVisa => "UK Visa",
            PhotoSize::SchengenVisa => "Schengen Visa",
            PhotoSize::CanadaVisa => "Canada Visa",
        }
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            PhotoSize::Passport | PhotoSize::IndianVisa | PhotoSize::UsVisa => (600, 600),
            PhotoSize::UkVisa => (413, 531),
            PhotoSize::SchengenVisa => (531, 413),
            PhotoSize::CanadaVisa => (420, 540),
        }
    }

    pub fn width(self) -> u32 {
        self.dimensions().0
    }

    pub fn height(self) -> u32 {
        self.dimensions().1
    }

    /// Printed size, e.g. "2×2 inches".
    pub fn display_size(self) -> &'static str {
        match self {
            PhotoSize::Passport | PhotoSize::IndianVisa | PhotoSize::UsVisa => "2×2 inches",
            PhotoSize::UkVisa => "45×35mm",
            PhotoSize::SchengenVisa => "35×45mm",
            PhotoSize::CanadaVisa => "50×70mm",
        }
    }
}

/// Background fills offered for replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundColor {
    White,
    LightBlue,
    LightGray,
    LightRed,
}

impl BackgroundColor {
    pub const ALL: [BackgroundColor; 4] = [
        BackgroundColor::White,
        BackgroundColor::LightBlue,
        BackgroundColor::LightGray,
        BackgroundColor::LightRed,
    ];

    /// Fill used by operations that run before any background is chosen.
    pub const DEFAULT: BackgroundColor = BackgroundColor::White;

    pub fn key(self) -> &'static str {
        match self {
            BackgroundColor::White => "white",
            BackgroundColor::LightBlue => "lightBlue",
            BackgroundColor::LightGray => "lightGray",
            BackgroundColor::LightRed => "lightRed",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackgroundColor::White => "White",
            BackgroundColor::LightBlue => "Light Blue",
            BackgroundColor::LightGray => "Light Gray",
            BackgroundColor::LightRed => "Light Red",
        }
    }

    pub fn rgb(self) -> Rgb {
        match self {
            BackgroundColor::White => Rgb::WHITE,
            BackgroundColor::LightBlue => Rgb::new(0xdb, 0xea, 0xfe),
            BackgroundColor::LightGray => Rgb::new(0xf3, 0xf4, 0xf6),
            BackgroundColor::LightRed => Rgb::new(0xfe, 0xe2, 0xe2),
        }
    }
}

/// Named templates pinning a size and a background together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Preset {
    UsPassport,
    IndianVisa,
    UkVisa,
    SchengenVisa,
    CanadaVisa,
    GeneralPassport,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::UsPassport,
        Preset::IndianVisa,
        Preset::UkVisa,
        Preset::SchengenVisa,
        Preset::CanadaVisa,
        Preset::GeneralPassport,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Preset::UsPassport => "usPassport",
            Preset::IndianVisa => "indianVisa",
            Preset::UkVisa => "ukVisa",
            Preset::SchengenVisa => "schengenVisa",
            Preset::CanadaVisa => "canadaVisa",
            Preset::GeneralPassport => "generalPassport",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::UsPassport => "US Passport",
            Preset::IndianVisa => "Indian Visa",
            Preset::UkVisa => "UK Visa",
            Preset::SchengenVisa => "Schengen Visa",
            Preset::CanadaVisa => "Canada Visa",
            Preset::GeneralPassport => "General Passport",
        }
    }

    pub fn size(self) -> PhotoSize {
        match self {
            Preset::UsPassport => PhotoSize::UsVisa,
            Preset::IndianVisa => PhotoSize::IndianVisa,
            Preset::UkVisa => PhotoSize::UkVisa,
            Preset::SchengenVisa => PhotoSize::SchengenVisa,
            Preset::CanadaVisa => PhotoSize::CanadaVisa,
            Preset::GeneralPassport => PhotoSize::Passport,
        }
    }

    pub fn background(self) -> BackgroundColor {
        match self {
            Preset::UkVisa => BackgroundColor::LightBlue,
            Preset::GeneralPassport => BackgroundColor::LightGray,
            Preset::UsPassport
            | Preset::IndianVisa
            | Preset::SchengenVisa
            | Preset::CanadaVisa => BackgroundColor::White,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Preset::UsPassport => "🇺🇸",
            Preset::IndianVisa => "🇮🇳",
            Preset::UkVisa => "🇬🇧",
            Preset::SchengenVisa => "🇪🇺",
            Preset::CanadaVisa => "🇨🇦",
            Preset::GeneralPassport => "📘",
        }
    }

    /// e.g. "45×35mm, Light Blue background"
    pub fn description(self) -> String {
        format!(
            "{}, {} background",
            self.size().display_size(),
            self.background().name()
        )
    }
}

macro_rules! keyed_enum {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self> {
                <$ty>::ALL
                    .into_iter()
                    .find(|item| item.key().eq_ignore_ascii_case(s))
                    .ok_or_else(|| AppError::parameter(format!("unknown {} '{}'", $what, s)))
            }
        }
    };
}

keyed_enum!(PhotoSize, "size");
keyed_enum!(BackgroundColor, "background");
keyed_enum!(Preset, "preset");
