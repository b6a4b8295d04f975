//! Name colors of the chat box.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

static HSL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^hsl\((\d+),\s*(\d+)%,\s*(\d+)%\)$").expect("valid hsl regex")
});

static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").expect("valid hex color regex"));

const PASTEL_SATURATION: u8 = 70;
const PASTEL_LIGHTNESS: u8 = 80;

/// Lightness range of text drawn over a name label.
const TEXT_LIGHTNESS_MIN: u8 = 30;
const TEXT_LIGHTNESS_MAX: u8 = 90;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hsl {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({}, {}%, {}%)", self.hue, self.saturation, self.lightness)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("not an hsl() color")]
pub struct ParseHslError;

impl FromStr for Hsl {
    type Err = ParseHslError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = HSL_RE.captures(s.trim()).ok_or(ParseHslError)?;
        let hue = caps[1].parse().map_err(|_| ParseHslError)?;
        let saturation = caps[2].parse().map_err(|_| ParseHslError)?;
        let lightness = caps[3].parse().map_err(|_| ParseHslError)?;
        Ok(Self {
            hue,
            saturation,
            lightness,
        })
    }
}

impl Hsl {
    /// Flips the lightness, kept within a range that stays readable on pastel labels.
    pub fn inverted(self) -> Self {
        Self {
            lightness: (100u8.saturating_sub(self.lightness)).clamp(TEXT_LIGHTNESS_MIN, TEXT_LIGHTNESS_MAX),
            ..self
        }
    }

    pub fn to_rgb(self) -> (u8, u8, u8) {
        let h = f64::from(self.hue % 360) / 360.0;
        let s = f64::from(self.saturation.min(100)) / 100.0;
        let l = f64::from(self.lightness.min(100)) / 100.0;
        if s == 0.0 {
            let v = channel(l);
            return (v, v, v);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        (
            channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
            channel(hue_to_rgb(p, q, h)),
            channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
        )
    }
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// The same name always gets the same pastel hue.
///
/// The hash runs over UTF-16 code units with 32-bit wrapping shifts, so names keep the colors
/// they have in browsers showing the same chat.
pub fn pastel_for_name(name: &str) -> Hsl {
    let mut hash: i64 = 0;
    for unit in name.encode_utf16() {
        #[allow(clippy::cast_possible_truncation)]
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        hash = i64::from(unit).wrapping_add(shifted).wrapping_sub(hash);
    }
    #[allow(clippy::cast_possible_truncation)]
    let hue = (hash.unsigned_abs() % 360) as u16;
    Hsl {
        hue,
        saturation: PASTEL_SATURATION,
        lightness: PASTEL_LIGHTNESS,
    }
}

/// Text color for a label with the given background.
///
/// Only `hsl()` backgrounds can be inverted; anything else gets white text.
pub fn contrast_text_color(background: &str) -> String {
    match background.parse::<Hsl>() {
        Ok(hsl) => hsl.inverted().to_string(),
        Err(_) => "white".to_owned(),
    }
}

/// Whether `css` is a color this module can produce or read back, and so is safe to put in a
/// style attribute.
pub fn is_known_color(css: &str) -> bool {
    HEX_RE.is_match(css) || HSL_RE.is_match(css)
}

/// RGB of a `#rgb`, `#rrggbb` or `hsl()` color.
pub fn css_to_rgb(css: &str) -> Option<(u8, u8, u8)> {
    let css = css.trim();
    if let Ok(hsl) = css.parse::<Hsl>() {
        return Some(hsl.to_rgb());
    }
    if !HEX_RE.is_match(css) {
        return None;
    }
    let digits = &css[1..];
    let expand = |s: &str| u8::from_str_radix(s, 16).ok();
    match digits.len() {
        3 => {
            let mut rgb = digits.chars().map(|c| expand(&format!("{c}{c}")));
            Some((rgb.next()??, rgb.next()??, rgb.next()??))
        }
        _ => Some((expand(&digits[0..2])?, expand(&digits[2..4])?, expand(&digits[4..6])?)),
    }
}
