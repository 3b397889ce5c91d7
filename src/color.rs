//! Palette channels and hex to HSL conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ColorError;

/// One of the four palette roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Accent,
    Primary,
    Secondary,
    Tertiary,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Accent,
        Channel::Primary,
        Channel::Secondary,
        Channel::Tertiary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Accent => "accent",
            Channel::Primary => "primary",
            Channel::Secondary => "secondary",
            Channel::Tertiary => "tertiary",
        }
    }

    /// Colour used when a palette leaves this channel unset.
    pub fn default_color(self) -> &'static str {
        match self {
            Channel::Accent => "#5865f2",
            Channel::Primary => "#313338",
            Channel::Secondary => "#2b2d31",
            Channel::Tertiary => "#1e1f22",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown channel {s:?}"))
    }
}

/// Hue, saturation or lightness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    H,
    S,
    L,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::H, Component::S, Component::L];

    pub fn suffix(self) -> &'static str {
        match self {
            Component::H => "h",
            Component::S => "s",
            Component::L => "l",
        }
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|c| c.suffix() == s)
            .ok_or_else(|| format!("unknown colour component {s:?}"))
    }
}

/// HSL with hue in whole degrees and saturation/lightness in whole percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let [r, g, b] = parse_hex(hex)?;
        Ok(Self::from_rgb(r, g, b))
    }

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let d = max - min;

        if d == 0.0 {
            return Self {
                h: 0.0,
                s: 0.0,
                l: (l * 100.0).round(),
            };
        }

        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Self {
            h: (h * 60.0).round() % 360.0,
            s: (s * 100.0).round(),
            l: (l * 100.0).round(),
        }
    }

    pub fn component(&self, component: Component) -> f64 {
        match component {
            Component::H => self.h,
            Component::S => self.s,
            Component::L => self.l,
        }
    }
}

/// Parses `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` (the `#` is optional).
/// Alpha is ignored.
pub fn parse_hex(hex: &str) -> Result<[u8; 3], ColorError> {
    let invalid = || ColorError::InvalidHex(hex.to_string());
    let digits = hex.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());

    match digits.len() {
        3 | 4 => {
            let mut out = [0u8; 3];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = channel(&digits[i..i + 1].repeat(2))?;
            }
            Ok(out)
        }
        6 | 8 => Ok([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ]),
        _ => Err(invalid()),
    }
}

/// The four colours a template is compiled against.
///
/// `id: None` is the "no colorway selected" state: templates compiled against
/// it skip conditional blocks and variable hoisting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Palette {
    pub id: Option<String>,
    pub accent: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub tertiary: Option<String>,
}

impl Palette {
    /// An active palette with no channels set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, hex: impl Into<String>) -> Self {
        *self.slot(channel) = Some(hex.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Accent => self.accent.as_deref(),
            Channel::Primary => self.primary.as_deref(),
            Channel::Secondary => self.secondary.as_deref(),
            Channel::Tertiary => self.tertiary.as_deref(),
        }
    }

    fn slot(&mut self, channel: Channel) -> &mut Option<String> {
        match channel {
            Channel::Accent => &mut self.accent,
            Channel::Primary => &mut self.primary,
            Channel::Secondary => &mut self.secondary,
            Channel::Tertiary => &mut self.tertiary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blurple_to_hsl() {
        let hsl = Hsl::from_hex("#5865f2").unwrap();
        assert_eq!(hsl, Hsl { h: 235.0, s: 86.0, l: 65.0 });
    }

    #[test]
    fn dark_greys_and_achromatic() {
        assert_eq!(
            Hsl::from_hex("#313338").unwrap(),
            Hsl { h: 223.0, s: 7.0, l: 21.0 }
        );
        assert_eq!(Hsl::from_hex("fff").unwrap(), Hsl { h: 0.0, s: 0.0, l: 100.0 });
        assert_eq!(Hsl::from_hex("#000000ff").unwrap(), Hsl { h: 0.0, s: 0.0, l: 0.0 });
    }

    #[test]
    fn primaries() {
        assert_eq!(Hsl::from_hex("#ff0000").unwrap().h, 0.0);
        assert_eq!(Hsl::from_hex("#00ff00").unwrap().h, 120.0);
        assert_eq!(Hsl::from_hex("#0000ff").unwrap().h, 240.0);
        assert_eq!(Hsl::from_hex("#ff00ff").unwrap().h, 300.0);
    }

    #[test]
    fn bad_hex() {
        for input in ["", "#12", "#12345", "#ggg", "red"] {
            assert!(parse_hex(input).is_err(), "{input}");
        }
    }

    #[test]
    fn channel_names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.name().parse::<Channel>().unwrap(), channel);
        }
        assert!("quaternary".parse::<Channel>().is_err());
    }

    #[test]
    fn palette_from_json() {
        let palette: Palette =
            serde_json::from_str(r##"{"id":"midnight","accent":"#ff0000","primary":"#111111"}"##)
                .unwrap();
        assert!(palette.is_active());
        assert_eq!(palette.get(Channel::Accent), Some("#ff0000"));
        assert_eq!(palette.get(Channel::Tertiary), None);
        assert!(!Palette::inactive().is_active());
    }
}
