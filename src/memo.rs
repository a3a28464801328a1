//! Rich-text memos.
//!
//! Memo text is parsed into styled runs, wrapped into lines once, and kept
//! as a [`Story`]: the lines still waiting to print. Each placement takes
//! as many lines as fit and leaves the rest in the story, which is how a
//! memo continues on the next column or page.

use crate::canvas::Canvas;
use crate::expr::Value;
use crate::font::FontRegistry;
use crate::types::{Color, Pt};
use crate::units;
use std::collections::VecDeque;

const ELLIPSIS: &str = "\u{2026}";

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub family: String,
    pub size: Pt,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextStyle {
    pub fn new(family: impl Into<String>, size: Pt) -> Self {
        Self {
            family: family.into(),
            size,
            color: Color::BLACK,
            bold: false,
            italic: false,
            underline: false,
        }
    }

    fn native(&self, fonts: &FontRegistry) -> String {
        fonts.styled_face(&self.family, self.bold, self.italic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leading {
    /// Multiple of the largest font size on a line.
    Factor(f64),
    Fixed(Pt),
}

impl Default for Leading {
    fn default() -> Self {
        Leading::Factor(1.2)
    }
}

impl Leading {
    /// `'single'` and `'double'` (1.2 and 2.4 times the font size), each `+`
    /// or `-` after them moving the spacing by a tenth of the font size.
    /// Numbers are absolute point values.
    pub fn from_value(value: &Value) -> Leading {
        match value {
            Value::Str(text) => Self::parse(text),
            Value::None => Leading::default(),
            other => other
                .as_f64()
                .filter(|n| *n > 0.0)
                .map(|n| Leading::Fixed(Pt::from_f64(n)))
                .unwrap_or_default(),
        }
    }

    pub fn parse(text: &str) -> Leading {
        let text = text.trim().to_ascii_lowercase();
        let (mut factor, rest): (f64, &str) = if let Some(rest) = text.strip_prefix("single") {
            (1.2, rest)
        } else if let Some(rest) = text.strip_prefix("double") {
            (2.4, rest)
        } else {
            return units::parse_length(&text)
                .filter(|pt| pt.is_positive())
                .map(Leading::Fixed)
                .unwrap_or_default();
        };
        for ch in rest.chars() {
            match ch {
                '+' => factor += 0.1,
                '-' => factor -= 0.1,
                _ => {}
            }
        }
        Leading::Factor(factor.max(0.1))
    }

    fn line_height(self, size: Pt) -> Pt {
        match self {
            Leading::Factor(factor) => Pt::from_f64(size.to_f64() * factor),
            Leading::Fixed(pt) => pt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    pub fn parse(text: &str) -> Align {
        match text.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Align::Center,
            "right" => Align::Right,
            _ => Align::Left,
        }
    }

    /// Offset of a line of `width` inside `avail`.
    pub fn offset(self, avail: Pt, width: Pt) -> Pt {
        let slack = (avail - width).max(Pt::ZERO);
        match self {
            Align::Left => Pt::ZERO,
            Align::Center => slack / 2,
            Align::Right => slack,
        }
    }
}

/// One paragraph source: markup plus the style it starts from.
#[derive(Debug, Clone)]
pub struct ParagraphSpec {
    pub markup: String,
    pub style: TextStyle,
    pub leading: Leading,
    pub first_line_indent: Pt,
    pub align: Align,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    pub native: String,
    pub style: TextStyle,
    pub width: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub pieces: Vec<Piece>,
    pub width: Pt,
    pub height: Pt,
    /// Largest font size on the line; the baseline sits this far below the
    /// line top.
    pub size: Pt,
    pub indent: Pt,
    pub align: Align,
}

impl Line {
    pub fn text(&self) -> String {
        self.pieces.iter().map(|p| p.text.as_str()).collect()
    }
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// `name=value` pairs of a start tag; values may be quoted.
fn tag_attributes(body: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = body.trim();
    while let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim().to_ascii_lowercase();
        let after = rest[eq + 1..].trim_start();
        let (value, remaining) = match after.chars().next() {
            Some(q @ ('"' | '\'')) => match after[1..].find(q) {
                Some(end) => (&after[1..end + 1], &after[end + 2..]),
                None => (&after[1..], ""),
            },
            _ => match after.find(char::is_whitespace) {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            },
        };
        out.push((name, value.to_string()));
        rest = remaining.trim_start();
    }
    out
}

/// Reads the inside of `<...>` as `(closing, name, attributes)` when it is a
/// supported tag. The name must follow `<` or `</` directly.
fn markup_tag(inner: &str) -> Option<(bool, String, &str)> {
    if inner.contains('<') {
        return None;
    }
    let (closing, body) = match inner.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, inner),
    };
    let body = body.strip_suffix('/').unwrap_or(body);
    let name_len = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    if name_len == 0 {
        return None;
    }
    let name = body[..name_len].to_ascii_lowercase();
    let attributes = &body[name_len..];
    let known = match name.as_str() {
        "b" | "i" | "u" | "br" => attributes.trim().is_empty(),
        "font" => attributes.is_empty() || attributes.starts_with(char::is_whitespace),
        _ => false,
    };
    known.then_some((closing, name, attributes))
}

/// Splits memo markup into paragraphs of styled runs. Newlines and `<br/>`
/// end a paragraph; unknown tags print as text.
pub fn parse_markup(markup: &str, base: &TextStyle) -> Vec<Vec<Run>> {
    let mut paragraphs = vec![Vec::new()];
    let mut stack = vec![base.clone()];
    let mut text = String::new();

    fn flush(text: &mut String, style: &TextStyle, paragraphs: &mut [Vec<Run>]) {
        if text.is_empty() {
            return;
        }
        if let Some(current) = paragraphs.last_mut() {
            match current.last_mut() {
                Some(last) if last.style == *style => last.text.push_str(text),
                _ => current.push(Run {
                    text: std::mem::take(text),
                    style: style.clone(),
                }),
            }
        }
        text.clear();
    }

    let mut rest = markup;
    while let Some(ch) = rest.chars().next() {
        let style = stack.last().cloned().unwrap_or_else(|| base.clone());
        match ch {
            '\n' => {
                flush(&mut text, &style, &mut paragraphs);
                paragraphs.push(Vec::new());
                rest = &rest[1..];
            }
            '\r' => rest = &rest[1..],
            '&' => {
                let decoded = rest[1..]
                    .find(';')
                    .filter(|end| *end <= 8)
                    .and_then(|end| decode_entity(&rest[1..end + 1]).map(|c| (c, end + 2)));
                match decoded {
                    Some((c, consumed)) => {
                        text.push(c);
                        rest = &rest[consumed..];
                    }
                    None => {
                        text.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            '<' => {
                let tag = rest
                    .find('>')
                    .and_then(|end| markup_tag(&rest[1..end]).map(|tag| (end, tag)));
                let Some((end, (closing, name, attributes))) = tag else {
                    text.push('<');
                    rest = &rest[1..];
                    continue;
                };
                flush(&mut text, &style, &mut paragraphs);
                rest = &rest[end + 1..];
                if name == "br" {
                    paragraphs.push(Vec::new());
                } else if closing {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                } else {
                    let mut next = style.clone();
                    match name.as_str() {
                        "b" => next.bold = true,
                        "i" => next.italic = true,
                        "u" => next.underline = true,
                        _ => {
                            for (key, value) in tag_attributes(attributes) {
                                match key.as_str() {
                                    "name" | "face" => next.family = value,
                                    "size" => {
                                        if let Some(size) = units::parse_length(&value) {
                                            next.size = size;
                                        }
                                    }
                                    "color" => {
                                        if let Some(color) = units::parse_color(&value) {
                                            next.color = color;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                    stack.push(next);
                }
            }
            c => {
                text.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    let style = stack.last().cloned().unwrap_or_else(|| base.clone());
    flush(&mut text, &style, &mut paragraphs);
    paragraphs
}

/// A word split across style changes.
struct Word {
    chunks: Vec<(String, TextStyle)>,
    /// Style of the space before the word, when there is one.
    space: Option<TextStyle>,
}

fn words(runs: &[Run]) -> Vec<Word> {
    let mut out: Vec<Word> = Vec::new();
    let mut pending_space: Option<TextStyle> = None;
    let mut in_word = false;
    for run in runs {
        for (index, part) in run.text.split(' ').enumerate() {
            if index > 0 {
                pending_space.get_or_insert_with(|| run.style.clone());
                in_word = false;
            }
            if part.is_empty() {
                continue;
            }
            match out.last_mut() {
                Some(word) if in_word => word.chunks.push((part.to_string(), run.style.clone())),
                _ => out.push(Word {
                    chunks: vec![(part.to_string(), run.style.clone())],
                    space: pending_space.take(),
                }),
            }
            in_word = true;
        }
    }
    out
}

struct LineBuilder<'f> {
    fonts: &'f FontRegistry,
    pieces: Vec<Piece>,
    width: Pt,
}

impl<'f> LineBuilder<'f> {
    fn new(fonts: &'f FontRegistry) -> Self {
        Self {
            fonts,
            pieces: Vec::new(),
            width: Pt::ZERO,
        }
    }

    fn measure(&self, text: &str, style: &TextStyle) -> Pt {
        self.fonts
            .measure_text_width(&style.native(self.fonts), style.size, text)
    }

    fn push(&mut self, text: &str, style: &TextStyle) {
        let width = self.measure(text, style);
        self.width += width;
        match self.pieces.last_mut() {
            Some(last) if last.style == *style => {
                last.text.push_str(text);
                last.width += width;
            }
            _ => self.pieces.push(Piece {
                text: text.to_string(),
                native: style.native(self.fonts),
                style: style.clone(),
                width,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    fn finish(&mut self, spec: &ParagraphSpec, indent: Pt) -> Line {
        let pieces = std::mem::take(&mut self.pieces);
        let size = pieces
            .iter()
            .fold(Pt::ZERO, |acc, p| acc.max(p.style.size))
            .max(if pieces.is_empty() { spec.style.size } else { Pt::ZERO });
        let width = std::mem::replace(&mut self.width, Pt::ZERO);
        Line {
            pieces,
            width,
            height: spec.leading.line_height(size),
            size,
            indent,
            align: spec.align,
        }
    }
}

/// Wraps one paragraph's runs greedily into lines of at most `width`.
fn wrap_paragraph(runs: &[Run], spec: &ParagraphSpec, width: Pt, fonts: &FontRegistry) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut builder = LineBuilder::new(fonts);
    let first_width = |lines: &Vec<Line>| {
        if lines.is_empty() {
            (width - spec.first_line_indent).max(Pt::from_i32(1))
        } else {
            width.max(Pt::from_i32(1))
        }
    };
    let indent_for = |lines: &Vec<Line>| {
        if lines.is_empty() {
            spec.first_line_indent
        } else {
            Pt::ZERO
        }
    };
    for word in words(runs) {
        let word_width: Pt = word
            .chunks
            .iter()
            .map(|(text, style)| builder.measure(text, style))
            .sum();
        let space_width = word
            .space
            .as_ref()
            .map(|style| builder.measure(" ", style))
            .unwrap_or(Pt::ZERO);
        let limit = first_width(&lines);
        if !builder.is_empty() && builder.width + space_width + word_width > limit {
            let indent = indent_for(&lines);
            lines.push(builder.finish(spec, indent));
        }
        if !builder.is_empty() {
            if let Some(style) = &word.space {
                builder.push(" ", style);
            }
        }
        let limit = first_width(&lines);
        if builder.is_empty() && word_width > limit {
            for (text, style) in &word.chunks {
                for ch in text.chars() {
                    let mut buf = [0u8; 4];
                    let ch = ch.encode_utf8(&mut buf);
                    let w = builder.measure(ch, style);
                    let limit = first_width(&lines);
                    if !builder.is_empty() && builder.width + w > limit {
                        let indent = indent_for(&lines);
                        lines.push(builder.finish(spec, indent));
                    }
                    builder.push(ch, style);
                }
            }
            continue;
        }
        for (text, style) in &word.chunks {
            builder.push(text, style);
        }
    }
    let indent = indent_for(&lines);
    lines.push(builder.finish(spec, indent));
    lines
}

/// Lines of a memo still waiting to be printed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Story {
    lines: VecDeque<Line>,
}

/// Lines placed by one call to [`Story::take`], column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoFrame {
    pub columns: Vec<Vec<Line>>,
    pub height: Pt,
    pub truncated: bool,
}

impl MemoFrame {
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }

    pub fn line_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    fn recompute_height(&mut self) {
        self.height = self
            .columns
            .iter()
            .map(|column| column.iter().map(|line| line.height).sum::<Pt>())
            .fold(Pt::ZERO, Pt::max);
    }
}

impl Story {
    /// Wraps every paragraph to `width`.
    pub fn build(paragraphs: &[ParagraphSpec], width: Pt, fonts: &FontRegistry) -> Story {
        let mut lines = VecDeque::new();
        for spec in paragraphs {
            for runs in parse_markup(&spec.markup, &spec.style) {
                lines.extend(wrap_paragraph(&runs, spec, width, fonts));
            }
        }
        Story { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn height(&self) -> Pt {
        self.lines.iter().map(|line| line.height).sum()
    }

    /// Height of the next line, the least a placement needs.
    pub fn first_line_height(&self) -> Option<Pt> {
        self.lines.front().map(|line| line.height)
    }

    /// Moves the lines that fit `columns` columns of `avail` height out of
    /// the story. With `balance`, lines are spread evenly across columns
    /// instead of filling the first column first.
    pub fn take(&mut self, avail: Pt, columns: usize, balance: bool) -> MemoFrame {
        let columns = columns.max(1);
        let mut limit = avail;
        if balance && columns > 1 {
            let target = self.height() / columns as i32;
            limit = target.min(avail);
            while limit < avail && !self.fits(limit, columns) {
                let step = self
                    .lines
                    .iter()
                    .map(|line| line.height)
                    .fold(avail, Pt::min)
                    .max(Pt::from_i32(1));
                limit = (limit + step).min(avail);
            }
        }
        let mut frame = MemoFrame {
            columns: vec![Vec::new(); columns],
            height: Pt::ZERO,
            truncated: false,
        };
        for column in frame.columns.iter_mut() {
            let mut used = Pt::ZERO;
            while let Some(line) = self.lines.front() {
                if used + line.height > limit {
                    break;
                }
                used += line.height;
                if let Some(line) = self.lines.pop_front() {
                    column.push(line);
                }
            }
        }
        frame.recompute_height();
        frame
    }

    fn fits(&self, limit: Pt, columns: usize) -> bool {
        let mut column = 0;
        let mut used = Pt::ZERO;
        for line in &self.lines {
            if line.height > limit {
                return false;
            }
            if used + line.height > limit {
                column += 1;
                used = Pt::ZERO;
                if column >= columns {
                    return false;
                }
            }
            used += line.height;
        }
        true
    }

    /// Ends the memo inside `frame`: the last placed line gets an ellipsis
    /// and whatever is left in the story is dropped. An empty frame takes
    /// the next line, truncated.
    pub fn truncate_into(&mut self, frame: &mut MemoFrame, width: Pt, fonts: &FontRegistry) {
        if self.lines.is_empty() {
            return;
        }
        if frame.is_empty() {
            if let (Some(line), Some(column)) = (self.lines.pop_front(), frame.columns.first_mut()) {
                column.push(line);
            }
        }
        self.lines.clear();
        let last = frame
            .columns
            .iter_mut()
            .rev()
            .find_map(|column| column.last_mut());
        if let Some(line) = last {
            add_ellipsis(line, width, fonts);
        }
        frame.truncated = true;
        frame.recompute_height();
    }
}

fn add_ellipsis(line: &mut Line, width: Pt, fonts: &FontRegistry) {
    let Some(style) = line.pieces.last().map(|p| p.style.clone()) else {
        return;
    };
    let native = style.native(fonts);
    let ellipsis_width = fonts.measure_text_width(&native, style.size, ELLIPSIS);
    let avail = width - line.indent - ellipsis_width;
    while line.width > avail {
        let Some(piece) = line.pieces.last_mut() else {
            break;
        };
        match piece.text.pop() {
            Some(_) => {
                let w = fonts.measure_text_width(&piece.native, piece.style.size, &piece.text);
                line.width = line.width - piece.width + w;
                piece.width = w;
            }
            None => {
                line.pieces.pop();
            }
        }
    }
    if let Some(piece) = line.pieces.last_mut() {
        let trimmed = piece.text.trim_end().len();
        piece.text.truncate(trimmed);
        let w = fonts.measure_text_width(&piece.native, piece.style.size, &piece.text);
        line.width = line.width - piece.width + w;
        piece.width = w;
    }
    line.pieces.push(Piece {
        text: ELLIPSIS.to_string(),
        native,
        style,
        width: ellipsis_width,
    });
    line.width += ellipsis_width;
}

/// Draws a frame with its top-left corner at (`x`, `top`).
pub fn draw_frame(
    canvas: &mut Canvas,
    frame: &MemoFrame,
    x: Pt,
    top: Pt,
    column_width: Pt,
    column_padding: Pt,
) {
    for (index, column) in frame.columns.iter().enumerate() {
        let column_x = x + (column_width + column_padding) * index as i32;
        let mut cursor = top;
        for line in column {
            let baseline = cursor - line.size;
            let avail = column_width - line.indent;
            let mut pen = column_x + line.indent + line.align.offset(avail, line.width);
            for piece in &line.pieces {
                if !piece.text.trim().is_empty() {
                    canvas.set_font(&piece.native, piece.style.size, Some(line.height));
                    canvas.set_fill_color(piece.style.color);
                    canvas.draw_text(pen, baseline, piece.text.as_str());
                }
                if piece.style.underline && piece.width.is_positive() {
                    let offset = piece.style.size.mul_ratio(1, 10);
                    canvas.set_stroke_color(piece.style.color);
                    canvas.set_line_width((piece.style.size * 0.05f32).max(Pt::from_f32(0.5)));
                    canvas.draw_line(pen, baseline - offset, pen + piece.width, baseline - offset);
                }
                pen += piece.width;
            }
            cursor -= line.height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn style() -> TextStyle {
        TextStyle::new("Helvetica", Pt::from_i32(10))
    }

    fn spec(markup: &str) -> ParagraphSpec {
        ParagraphSpec {
            markup: markup.to_string(),
            style: style(),
            leading: Leading::default(),
            first_line_indent: Pt::ZERO,
            align: Align::Left,
        }
    }

    #[test]
    fn leading_keywords_and_steps() {
        let size = Pt::from_i32(10);
        assert_eq!(Leading::parse("single").line_height(size), Pt::from_i32(12));
        assert_eq!(Leading::parse("double").line_height(size), Pt::from_i32(24));
        assert_eq!(Leading::parse("single++").line_height(size), Pt::from_i32(14));
        assert_eq!(Leading::parse("double-").line_height(size), Pt::from_i32(23));
        assert_eq!(Leading::parse("14").line_height(size), Pt::from_i32(14));
        assert_eq!(
            Leading::from_value(&Value::Int(16)).line_height(size),
            Pt::from_i32(16)
        );
    }

    #[test]
    fn markup_tracks_nested_styles() {
        let paragraphs = parse_markup(
            "plain <b>bold <i>both</i></b><br/><font size=14 color=\"red\">big &amp; red</font>",
            &style(),
        );
        assert_eq!(paragraphs.len(), 2);
        let first = &paragraphs[0];
        assert_eq!(first[0].text, "plain ");
        assert!(!first[0].style.bold);
        assert_eq!(first[1].text, "bold ");
        assert!(first[1].style.bold && !first[1].style.italic);
        assert_eq!(first[2].text, "both");
        assert!(first[2].style.bold && first[2].style.italic);
        let second = &paragraphs[1];
        assert_eq!(second[0].text, "big & red");
        assert_eq!(second[0].style.size, Pt::from_i32(14));
        assert_eq!(second[0].style.color, Color::rgb(1.0, 0.0, 0.0));
    }

    #[test]
    fn unknown_tags_print_literally() {
        let paragraphs = parse_markup("a < b and <blink>", &style());
        assert_eq!(paragraphs[0][0].text, "a < b and <blink>");
        let paragraphs = parse_markup("<b and c> 2<3 >", &style());
        assert_eq!(paragraphs[0].len(), 1);
        assert_eq!(paragraphs[0][0].text, "<b and c> 2<3 >");
    }

    #[test]
    fn tags_next_to_comparisons_still_apply() {
        let paragraphs = parse_markup("x < y <b>bold</b><br />z", &style());
        assert_eq!(paragraphs.len(), 2);
        let texts: Vec<(&str, bool)> = paragraphs[0]
            .iter()
            .map(|run| (run.text.as_str(), run.style.bold))
            .collect();
        assert_eq!(texts, vec![("x < y ", false), ("bold", true)]);
        assert_eq!(paragraphs[1][0].text, "z");
    }

    #[test]
    fn wrapping_respects_width() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let text = "the quick brown fox jumps over the lazy dog ".repeat(6);
        let width = Pt::from_i32(120);
        let story = Story::build(&[spec(&text)], width, &fonts);
        assert!(story.len() > 3);
        for line in &story.lines {
            assert!(line.width <= width, "{} is too wide", line.text());
            assert_eq!(line.height, Pt::from_i32(12));
        }
        let rejoined: Vec<String> = story.lines.iter().map(Line::text).collect();
        assert_eq!(rejoined.join(" ").trim(), text.trim());
    }

    #[test]
    fn first_line_indent_applies_once_per_paragraph() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let mut para = spec(&"word ".repeat(40));
        para.first_line_indent = Pt::from_i32(20);
        let story = Story::build(&[para], Pt::from_i32(100), &fonts);
        assert_eq!(story.lines[0].indent, Pt::from_i32(20));
        assert!(story.lines[0].width <= Pt::from_i32(80));
        assert_eq!(story.lines[1].indent, Pt::ZERO);
    }

    #[test]
    fn take_leaves_the_remainder_for_the_next_column() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let text = (1..=10).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        let mut story = Story::build(&[spec(&text)], Pt::from_i32(200), &fonts);
        assert_eq!(story.len(), 10);
        let frame = story.take(Pt::from_i32(40), 1, false);
        assert_eq!(frame.line_count(), 3);
        assert_eq!(frame.height, Pt::from_i32(36));
        assert_eq!(story.len(), 7);
        let rest = story.take(Pt::from_i32(500), 1, false);
        assert_eq!(rest.line_count(), 7);
        assert_eq!(rest.columns[0][0].text(), "line4");
        assert!(story.is_empty());
    }

    #[test]
    fn balanced_columns_share_lines() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let text = (1..=6).map(|n| format!("l{n}")).collect::<Vec<_>>().join("\n");
        let mut story = Story::build(&[spec(&text)], Pt::from_i32(100), &fonts);
        let frame = story.take(Pt::from_i32(500), 2, true);
        assert_eq!(frame.columns[0].len(), 3);
        assert_eq!(frame.columns[1].len(), 3);
        assert_eq!(frame.height, Pt::from_i32(36));
        assert!(story.is_empty());
    }

    #[test]
    fn truncation_marks_the_last_line() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let text = "alpha beta gamma\ndelta epsilon\nzeta";
        let mut story = Story::build(&[spec(text)], Pt::from_i32(200), &fonts);
        let mut frame = story.take(Pt::from_i32(13), 1, false);
        assert_eq!(frame.line_count(), 1);
        story.truncate_into(&mut frame, Pt::from_i32(200), &fonts);
        assert!(story.is_empty());
        assert!(frame.truncated);
        assert_eq!(frame.columns[0][0].text(), format!("alpha beta gamma{ELLIPSIS}"));

        let mut story = Story::build(&[spec(text)], Pt::from_i32(200), &fonts);
        let mut frame = story.take(Pt::from_i32(5), 1, false);
        assert!(frame.is_empty());
        story.truncate_into(&mut frame, Pt::from_i32(40), &fonts);
        let line = &frame.columns[0][0];
        assert!(line.text().ends_with(ELLIPSIS));
        assert!(line.width <= Pt::from_i32(40));
    }

    #[test]
    fn frames_draw_lines_top_down() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let mut story = Story::build(&[spec("one\n<u>two</u>")], Pt::from_i32(100), &fonts);
        let frame = story.take(Pt::from_i32(100), 1, false);
        let mut canvas = Canvas::new(Size::letter());
        draw_frame(&mut canvas, &frame, Pt::from_i32(10), Pt::from_i32(100), Pt::from_i32(100), Pt::ZERO);
        let strings: Vec<(Pt, String)> = canvas
            .current_commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { y, text, .. } => Some((*y, text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            strings,
            vec![
                (Pt::from_i32(90), "one".to_string()),
                (Pt::from_i32(78), "two".to_string())
            ]
        );
        assert!(canvas
            .current_commands()
            .iter()
            .any(|c| matches!(c, Command::Stroke)));
    }
}
