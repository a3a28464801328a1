//! WinAnsi (cp1252) text handling shared by the PDF writer, the font
//! metrics and the byte-to-text conversion of record values.

const CP1252_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

/// WinAnsi code for `ch`, if the encoding can represent it.
pub fn winansi_byte(ch: char) -> Option<u8> {
    match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u8),
        _ => CP1252_HIGH
            .iter()
            .find(|(_, c)| *c == ch)
            .map(|(byte, _)| *byte),
    }
}

/// Character for a WinAnsi code; undefined slots yield `None`.
pub fn winansi_char(byte: u8) -> Option<char> {
    match byte {
        0x00..=0x7F | 0xA0..=0xFF => Some(byte as char),
        _ => CP1252_HIGH
            .iter()
            .find(|(b, _)| *b == byte)
            .map(|(_, ch)| *ch),
    }
}

/// Text as WinAnsi bytes; unrepresentable characters become `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            '\u{2264}' | '\u{2265}' => b'?',
            _ => winansi_byte(ch).unwrap_or(b'?'),
        })
        .collect()
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

fn decode_cp1252(bytes: &[u8]) -> Option<String> {
    bytes.iter().map(|b| winansi_char(*b)).collect()
}

fn normalize_encoding(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Decodes record bytes: UTF-8 first, then the configured encoding, then
/// Latin-1, which always succeeds.
pub fn decode_bytes(bytes: &[u8], encoding: &str) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    match normalize_encoding(encoding).as_str() {
        "cp1252" | "windows1252" | "winansi" => {
            decode_cp1252(bytes).unwrap_or_else(|| decode_latin1(bytes))
        }
        _ => decode_latin1(bytes),
    }
}
