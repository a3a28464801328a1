//! Length, page-size and color vocabulary used by report forms.
//!
//! Form authors write lengths as `"1 in"`, `"2.5cm"`, `"36 pt"` or bare
//! numbers (points). Colors are names, `#rrggbb` strings, or component
//! tuples in either the 0..1 or 0..255 range.

use crate::types::{Color, Pt, Size};

const POINTS_PER_INCH: f64 = 72.0;

/// Parses a length string into points. Bare numbers are points.
pub fn parse_length(text: &str) -> Option<Pt> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    let factor = unit_factor(unit.trim())?;
    Some(Pt::from_f64(number * factor))
}

fn unit_factor(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_lowercase();
    let factor = match unit.as_str() {
        "" | "pt" | "pts" | "point" | "points" => 1.0,
        "in" | "inch" | "inches" | "\"" => POINTS_PER_INCH,
        "cm" => POINTS_PER_INCH / 2.54,
        "mm" => POINTS_PER_INCH / 25.4,
        "pc" | "pica" | "picas" => 12.0,
        _ => return None,
    };
    Some(factor)
}

/// Named page-size presets, portrait orientation.
pub fn page_size(name: &str) -> Option<Size> {
    let (w, h) = match name.trim().to_ascii_lowercase().as_str() {
        "letter" => (612.0, 792.0),
        "legal" => (612.0, 1008.0),
        "executive" => (522.0, 756.0),
        "ledger" | "tabloid" => (792.0, 1224.0),
        "a0" => (2383.94, 3370.39),
        "a1" => (1683.78, 2383.94),
        "a2" => (1190.55, 1683.78),
        "a3" => (841.89, 1190.55),
        "a4" => (595.28, 841.89),
        "a5" => (419.53, 595.28),
        "a6" => (297.64, 419.53),
        "b4" => (708.66, 1000.63),
        "b5" => (498.9, 708.66),
        _ => return None,
    };
    Some(Size::new(Pt::from_f64(w), Pt::from_f64(h)))
}

pub fn named_color(name: &str) -> Option<Color> {
    let rgb: (u8, u8, u8) = match name.trim().to_ascii_lowercase().as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "navy" => (0, 0, 128),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "magenta" | "fuchsia" => (255, 0, 255),
        "cyan" | "aqua" => (0, 255, 255),
        "teal" => (0, 128, 128),
        "maroon" => (128, 0, 0),
        "olive" => (128, 128, 0),
        "silver" => (192, 192, 192),
        "gray" | "grey" => (128, 128, 128),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "brown" => (165, 42, 42),
        "pink" => (255, 192, 203),
        _ => return None,
    };
    Some(Color::from_u8(rgb.0, rgb.1, rgb.2))
}

/// Color from a name or a `#rgb` / `#rrggbb` hex string.
pub fn parse_color(text: &str) -> Option<Color> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    named_color(text)
}

fn parse_hex(hex: &str) -> Option<Color> {
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()?;
    match digits.len() {
        3 => Some(Color::from_u8(
            digits[0] * 17,
            digits[1] * 17,
            digits[2] * 17,
        )),
        6 => Some(Color::from_u8(
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
        )),
        _ => None,
    }
}

/// Color from numeric components. Components that all fall in 0..=1 are
/// read as fractions, anything larger as 0..255 channel values.
pub fn color_from_components(components: &[f64]) -> Option<Color> {
    if components.len() < 3 || components.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let rgb = &components[..3];
    if rgb.iter().all(|c| (0.0..=1.0).contains(c)) {
        Some(Color::rgb(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32))
    } else {
        Some(Color::rgb(
            (rgb[0] / 255.0) as f32,
            (rgb[1] / 255.0) as f32,
            (rgb[2] / 255.0) as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_convert_to_points() {
        assert_eq!(parse_length("1 in"), Some(Pt::from_i32(72)));
        assert_eq!(parse_length("36 pt"), Some(Pt::from_i32(36)));
        assert_eq!(parse_length("2.54cm"), Some(Pt::from_i32(72)));
        assert_eq!(parse_length("25.4 mm"), Some(Pt::from_i32(72)));
        assert_eq!(parse_length("1 pica"), Some(Pt::from_i32(12)));
        assert_eq!(parse_length("18"), Some(Pt::from_i32(18)));
        assert_eq!(parse_length(".5 in"), Some(Pt::from_i32(36)));
        assert_eq!(parse_length("-0.25 in"), Some(Pt::from_i32(-18)));
    }

    #[test]
    fn bad_lengths_are_rejected() {
        assert_eq!(parse_length(""), None);
        assert_eq!(parse_length("wide"), None);
        assert_eq!(parse_length("3 furlongs"), None);
    }

    #[test]
    fn presets_are_case_insensitive() {
        let a4 = page_size("A4").expect("a4");
        assert_eq!(a4.width, Pt::from_f64(595.28));
        assert_eq!(page_size("Letter"), Some(Size::letter()));
        assert!(page_size("napkin").is_none());
    }

    #[test]
    fn colors_from_names_hex_and_tuples() {
        assert_eq!(parse_color("Red"), Some(Color::from_u8(255, 0, 0)));
        assert_eq!(parse_color("#00ff00"), Some(Color::from_u8(0, 255, 0)));
        assert_eq!(parse_color("#fff"), Some(Color::WHITE));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(
            color_from_components(&[0.0, 0.5, 1.0]),
            Some(Color::rgb(0.0, 0.5, 1.0))
        );
        assert_eq!(
            color_from_components(&[255.0, 0.0, 0.0]),
            Some(Color::from_u8(255, 0, 0))
        );
        assert_eq!(color_from_components(&[1.0, 1.0]), None);
    }
}
