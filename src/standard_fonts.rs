//! Metrics for the PDF base-14 fonts, which every viewer provides without
//! embedding. Widths are in 1/1000 em for codes 32..=126.

pub(crate) struct StandardFont {
    pub name: &'static str,
    pub ascent: i16,
    pub descent: i16,
    pub default_width: u16,
    widths: Option<&'static [u16; 95]>,
}

impl StandardFont {
    pub fn char_width(&self, ch: char) -> u16 {
        let code = ch as u32;
        match self.widths {
            Some(table) if (32..=126).contains(&code) => table[(code - 32) as usize],
            _ => self.default_width,
        }
    }
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

// Oblique and italic faces reuse the upright advance tables.
const FONTS: [StandardFont; 14] = [
    StandardFont { name: "Helvetica", ascent: 718, descent: -207, default_width: 556, widths: Some(&HELVETICA) },
    StandardFont { name: "Helvetica-Bold", ascent: 718, descent: -207, default_width: 556, widths: Some(&HELVETICA_BOLD) },
    StandardFont { name: "Helvetica-Oblique", ascent: 718, descent: -207, default_width: 556, widths: Some(&HELVETICA) },
    StandardFont { name: "Helvetica-BoldOblique", ascent: 718, descent: -207, default_width: 556, widths: Some(&HELVETICA_BOLD) },
    StandardFont { name: "Times-Roman", ascent: 683, descent: -217, default_width: 500, widths: Some(&TIMES_ROMAN) },
    StandardFont { name: "Times-Bold", ascent: 683, descent: -217, default_width: 500, widths: Some(&TIMES_BOLD) },
    StandardFont { name: "Times-Italic", ascent: 683, descent: -217, default_width: 500, widths: Some(&TIMES_ROMAN) },
    StandardFont { name: "Times-BoldItalic", ascent: 683, descent: -217, default_width: 500, widths: Some(&TIMES_BOLD) },
    StandardFont { name: "Courier", ascent: 629, descent: -157, default_width: 600, widths: None },
    StandardFont { name: "Courier-Bold", ascent: 629, descent: -157, default_width: 600, widths: None },
    StandardFont { name: "Courier-Oblique", ascent: 629, descent: -157, default_width: 600, widths: None },
    StandardFont { name: "Courier-BoldOblique", ascent: 629, descent: -157, default_width: 600, widths: None },
    StandardFont { name: "Symbol", ascent: 1010, descent: -293, default_width: 600, widths: None },
    StandardFont { name: "ZapfDingbats", ascent: 820, descent: -143, default_width: 788, widths: None },
];

fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Looks up a base-14 font, tolerating case, punctuation and the bare
/// `Times` family name.
pub(crate) fn lookup(name: &str) -> Option<&'static StandardFont> {
    let key = squash(name);
    let key = if key == "times" { "timesroman".to_string() } else { key };
    FONTS.iter().find(|font| squash(font.name) == key)
}

/// Base-14 face for a family with the requested style, if the family is a
/// base-14 family.
pub(crate) fn styled(family: &str, bold: bool, italic: bool) -> Option<&'static str> {
    let base = lookup(family)?;
    let family = match base.name.split('-').next().unwrap_or(base.name) {
        "Times" => "Times",
        "Helvetica" => "Helvetica",
        "Courier" => "Courier",
        _ => return Some(base.name),
    };
    let name = match (family, bold, italic) {
        ("Times", false, false) => "Times-Roman",
        ("Times", true, false) => "Times-Bold",
        ("Times", false, true) => "Times-Italic",
        ("Times", true, true) => "Times-BoldItalic",
        ("Helvetica", false, false) => "Helvetica",
        ("Helvetica", true, false) => "Helvetica-Bold",
        ("Helvetica", false, true) => "Helvetica-Oblique",
        ("Helvetica", true, true) => "Helvetica-BoldOblique",
        ("Courier", false, false) => "Courier",
        ("Courier", true, false) => "Courier-Bold",
        ("Courier", false, true) => "Courier-Oblique",
        _ => "Courier-BoldOblique",
    };
    Some(name)
}
