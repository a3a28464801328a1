//! Drawable renderers: one function per object kind, each turning evaluated
//! properties into canvas calls inside its own save/restore pair.

use crate::bargraph::BarGraph;
use crate::canvas::{Canvas, ImageRef, LineCap, Paint, Stroke};
use crate::encoding;
use crate::expr::Value;
use crate::font::FontRegistry;
use crate::memo::{self, Align, Leading, MemoFrame, ParagraphSpec, Story, TextStyle};
use crate::model::NodeId;
use crate::pdf;
use crate::props::{self, PropReader};
use crate::schema::ObjectType;
use crate::types::{Color, Pt, Rect};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Source marker for text that must be stamped once the page count is
/// known.
pub(crate) const PAGE_COUNT_REFERENCE: &str = "self.PageCount";

/// Stands in for the page count until the run is finished.
pub(crate) const PAGE_COUNT_PLACEHOLDER: i64 = 999_999_999_999;

pub(crate) const IMAGE_ERROR_TEXT: &str = "<< Image expr error >>";

/// Run-wide settings every renderer reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderContext<'a> {
    pub fonts: &'a FontRegistry,
    pub none_display: &'a str,
    pub encoding: &'a str,
    pub home_directory: Option<&'a Path>,
    pub stringify_dates: bool,
    pub date_format: Option<&'a str>,
    pub datetime_format: Option<&'a str>,
    /// Width given to objects whose Width is None: the column width.
    pub default_width: Pt,
}

fn format_chrono(value: impl std::fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{value}").ok().map(|_| out)
}

/// Text a value prints as.
pub(crate) fn stringify(value: &Value, ctx: &RenderContext<'_>) -> String {
    match value {
        Value::None => ctx.none_display.to_string(),
        Value::Bytes(bytes) => encoding::decode_bytes(bytes, ctx.encoding),
        Value::Date(date) if ctx.stringify_dates => {
            format_chrono(date.format(ctx.date_format.unwrap_or("%x")))
                .unwrap_or_else(|| value.to_string())
        }
        Value::DateTime(stamp) if ctx.stringify_dates => {
            format_chrono(stamp.format(ctx.datetime_format.unwrap_or("%x %X")))
                .unwrap_or_else(|| value.to_string())
        }
        other => other.to_string(),
    }
}

/// `expr` as text; an evaluation error prints its own message.
fn text_value(props: &PropReader<'_>, node: NodeId, ctx: &RenderContext<'_>) -> String {
    match props.try_value(node, "expr") {
        Ok(value) => stringify(&value, ctx),
        Err(err) => err.to_string(),
    }
}

/// Anchor-corrected box of an object, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Placement {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
    pub rotation: f32,
}

pub(crate) fn placement(
    props: &PropReader<'_>,
    node: NodeId,
    origin: (Pt, Pt),
    width: Pt,
    height: Pt,
) -> Placement {
    let mut x = origin.0 + props.length_or(node, "x", Pt::ZERO);
    let mut y = origin.1 + props.length_or(node, "y", Pt::ZERO);
    match props.choice(node, "hAnchor").as_str() {
        "center" => x -= width / 2,
        "right" => x -= width,
        _ => {}
    }
    match props.choice(node, "vAnchor").as_str() {
        "middle" => y -= height / 2,
        "top" => y -= height,
        _ => {}
    }
    Placement {
        x,
        y,
        width,
        height,
        rotation: props.number(node, "Rotation").unwrap_or(0.0) as f32,
    }
}

fn object_width(props: &PropReader<'_>, node: NodeId, ctx: &RenderContext<'_>) -> Pt {
    props.length(node, "Width").unwrap_or(ctx.default_width)
}

fn scale_percent(props: &PropReader<'_>, node: NodeId) -> (f32, f32) {
    let pct = |v: &Value| v.as_f64().filter(|n| *n > 0.0).map(|n| n as f32 / 100.0);
    match props.value(node, "ScalePercent") {
        Value::Tuple(items) | Value::List(items) if items.len() == 2 => (
            pct(&items[0]).unwrap_or(1.0),
            pct(&items[1]).unwrap_or(1.0),
        ),
        other => {
            let both = pct(&other).unwrap_or(1.0);
            (both, both)
        }
    }
}

/// Height an object occupies in its band. `None` for memos whose height
/// comes from their text.
pub(crate) fn object_height(props: &PropReader<'_>, node: NodeId) -> Option<Pt> {
    if let Some(height) = props.length(node, "Height") {
        return Some(height);
    }
    match props.form().object_type(node) {
        ObjectType::String => {
            let size = props.length_or(node, "FontSize", Pt::from_i32(10));
            Some(size * scale_percent(props, node).1)
        }
        ObjectType::Memo | ObjectType::Frameset => None,
        _ => Some(Pt::ZERO),
    }
}

fn stroke_of(props: &PropReader<'_>, node: NodeId) -> Option<Stroke> {
    let width = props.length_or(node, "StrokeWidth", Pt::ZERO);
    if !width.is_positive() {
        return None;
    }
    let color = props.color(node, "StrokeColor")?;
    let dash = match props.value(node, "StrokeDashArray") {
        Value::Tuple(items) | Value::List(items) => {
            items.iter().filter_map(props::value_to_length).collect()
        }
        _ => Vec::new(),
    };
    let cap = match props.choice(node, "LineCap").as_str() {
        "round" => LineCap::Round,
        "square" => LineCap::Square,
        _ => LineCap::Butt,
    };
    Some(Stroke {
        color,
        width,
        dash,
        cap,
    })
}

/// Applies stroke and fill properties; returns what the shape should paint.
fn shape_paint(canvas: &mut Canvas, props: &PropReader<'_>, node: NodeId) -> Paint {
    let stroke = stroke_of(props, node);
    if let Some(stroke) = &stroke {
        canvas.set_stroke(stroke);
    }
    let fill = props.color(node, "FillColor");
    if let Some(fill) = fill {
        canvas.set_fill(fill);
    }
    Paint {
        fill: fill.is_some(),
        stroke: stroke.is_some(),
    }
}

/// A fully resolved string object. Page-count strings are kept in this form
/// until the run ends.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextBox {
    pub placement: Placement,
    pub text: String,
    pub native: String,
    pub size: Pt,
    pub color: Color,
    pub align: Align,
    pub scale: (f32, f32),
    pub border: Option<(Pt, Color)>,
}

impl TextBox {
    fn resolve(
        props: &PropReader<'_>,
        node: NodeId,
        ctx: &RenderContext<'_>,
        origin: (Pt, Pt),
    ) -> TextBox {
        let family = props
            .text(node, "FontName")
            .unwrap_or_else(|| "Helvetica".to_string());
        let native =
            ctx.fonts
                .styled_face(&family, props.flag(node, "FontBold"), props.flag(node, "FontItalic"));
        let size = props.length_or(node, "FontSize", Pt::from_i32(10));
        let width = object_width(props, node, ctx);
        let height = object_height(props, node).unwrap_or(size);
        let border_width = props.length_or(node, "BorderWidth", Pt::ZERO);
        TextBox {
            placement: placement(props, node, origin, width, height),
            text: text_value(props, node, ctx),
            native,
            size,
            color: props.color(node, "FontColor").unwrap_or(Color::BLACK),
            align: Align::parse(&props.choice(node, "Align")),
            scale: scale_percent(props, node),
            border: border_width
                .is_positive()
                .then(|| (border_width, props.color(node, "BorderColor").unwrap_or(Color::BLACK))),
        }
    }

    pub(crate) fn draw(&self, canvas: &mut Canvas, fonts: &FontRegistry) {
        let p = self.placement;
        canvas.save_state();
        canvas.translate(p.x, p.y);
        canvas.rotate(p.rotation);
        let bounds = Rect::new(Pt::ZERO, Pt::ZERO, p.width, p.height);
        if let Some((width, color)) = self.border {
            canvas.set_stroke(&Stroke {
                color,
                width,
                ..Stroke::default()
            });
            canvas.draw_rect(bounds, Paint::STROKE);
        }
        canvas.clip_to(bounds);
        let (sx, sy) = self.scale;
        if sx != 1.0 || sy != 1.0 {
            canvas.scale(sx, sy);
        }
        canvas.set_font(&self.native, self.size, None);
        canvas.set_fill_color(self.color);
        let text_width = fonts.measure_text_width(&self.native, self.size, &self.text);
        let x = self.align.offset(p.width / sx, text_width);
        let baseline = fonts.descent(&self.native, self.size);
        canvas.draw_text(x, baseline, self.text.as_str());
        canvas.restore_state();
    }

    /// Re-evaluates the text once the scope knows the page count. Layout
    /// stays as resolved during the run.
    pub(crate) fn restamp(&mut self, props: &PropReader<'_>, node: NodeId, ctx: &RenderContext<'_>) {
        self.text = text_value(props, node, ctx);
    }
}

/// Box model of a memo or frameset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MemoBox {
    pub width: Pt,
    pub fixed_height: Option<Pt>,
    pub pad_left: Pt,
    pub pad_right: Pt,
    pub pad_top: Pt,
    pub pad_bottom: Pt,
    pub columns: usize,
    pub column_padding: Pt,
}

impl MemoBox {
    pub(crate) fn resolve(props: &PropReader<'_>, node: NodeId, ctx: &RenderContext<'_>) -> MemoBox {
        MemoBox {
            width: object_width(props, node, ctx),
            fixed_height: props.length(node, "Height"),
            pad_left: props.length_or(node, "PadLeft", Pt::ZERO),
            pad_right: props.length_or(node, "PadRight", Pt::ZERO),
            pad_top: props.length_or(node, "PadTop", Pt::ZERO),
            pad_bottom: props.length_or(node, "PadBottom", Pt::ZERO),
            columns: props.int(node, "ColumnCount").unwrap_or(1).clamp(1, 64) as usize,
            column_padding: props.length_or(node, "ColumnPadding", Pt::from_i32(6)),
        }
    }

    pub(crate) fn vertical_padding(&self) -> Pt {
        self.pad_top + self.pad_bottom
    }

    pub(crate) fn column_width(&self) -> Pt {
        let inner = self.width - self.pad_left - self.pad_right;
        let gaps = self.column_padding * (self.columns as i32 - 1);
        ((inner - gaps) / self.columns as i32).max(Pt::from_i32(1))
    }
}

fn paragraph_spec(props: &PropReader<'_>, node: NodeId, ctx: &RenderContext<'_>) -> ParagraphSpec {
    let mut style = TextStyle::new(
        props
            .text(node, "FontName")
            .unwrap_or_else(|| "Helvetica".to_string()),
        props.length_or(node, "FontSize", Pt::from_i32(10)),
    );
    style.bold = props.flag(node, "FontBold");
    style.italic = props.flag(node, "FontItalic");
    style.color = props.color(node, "FontColor").unwrap_or(Color::BLACK);
    ParagraphSpec {
        markup: text_value(props, node, ctx),
        style,
        leading: Leading::from_value(&props.value(node, "Leading")),
        first_line_indent: props.length_or(node, "FirstLineIndent", Pt::ZERO),
        align: Align::parse(&props.choice(node, "Align")),
    }
}

/// Wrapped text of a memo, or of a frameset's paragraphs.
pub(crate) fn memo_story(
    props: &PropReader<'_>,
    node: NodeId,
    ctx: &RenderContext<'_>,
    memo_box: &MemoBox,
) -> Story {
    let form = props.form();
    let specs: Vec<ParagraphSpec> = match form.object_type(node) {
        ObjectType::Frameset => form
            .children_of_type(node, ObjectType::Paragraph)
            .into_iter()
            .map(|para| paragraph_spec(props, para, ctx))
            .collect(),
        _ => vec![paragraph_spec(props, node, ctx)],
    };
    Story::build(&specs, memo_box.column_width(), ctx.fonts)
}

/// What rendering an object produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Drawn,
    Hidden,
    /// A string that references the page count; draw it at finish time.
    PageCount(TextBox),
}

/// Renders one drawable whose band origin is `origin`. `frame` carries the
/// lines already laid out for a growing memo.
pub(crate) fn render_object(
    canvas: &mut Canvas,
    props: &PropReader<'_>,
    ctx: &RenderContext<'_>,
    node: NodeId,
    origin: (Pt, Pt),
    frame: Option<&MemoFrame>,
) -> Outcome {
    if !props.flag(node, "Show") {
        return Outcome::Hidden;
    }
    let kind = props.form().object_type(node);
    match kind {
        ObjectType::String => {
            let text = TextBox::resolve(props, node, ctx, origin);
            let source = props::raw_source(props.form(), node, "expr").unwrap_or_default();
            if source.contains(PAGE_COUNT_REFERENCE) {
                return Outcome::PageCount(text);
            }
            text.draw(canvas, ctx.fonts);
        }
        ObjectType::Memo | ObjectType::Frameset => render_memo(canvas, props, ctx, node, origin, frame),
        ObjectType::Image => render_image(canvas, props, ctx, node, origin),
        ObjectType::SpanningLine | ObjectType::SpanningRectangle => return Outcome::Hidden,
        _ => {
            let width = object_width(props, node, ctx);
            let height = object_height(props, node).unwrap_or(Pt::ZERO);
            let p = placement(props, node, origin, width, height);
            canvas.save_state();
            canvas.translate(p.x, p.y);
            canvas.rotate(p.rotation);
            let bounds = Rect::new(Pt::ZERO, Pt::ZERO, p.width, p.height);
            match kind {
                ObjectType::Rectangle => {
                    let paint = shape_paint(canvas, props, node);
                    canvas.draw_rect(bounds, paint);
                }
                ObjectType::RoundedRectangle => {
                    let paint = shape_paint(canvas, props, node);
                    let radius = props.length_or(node, "Radius", Pt::from_i32(6));
                    canvas.draw_rounded_rect(bounds, radius, paint);
                }
                ObjectType::Ellipse => {
                    let paint = shape_paint(canvas, props, node);
                    canvas.draw_ellipse(bounds, paint);
                }
                ObjectType::Arc => {
                    let paint = shape_paint(canvas, props, node);
                    let radius = props.length_or(node, "Radius", Pt::from_i32(6));
                    let start = props.number(node, "StartAngle").unwrap_or(0.0) as f32;
                    let end = props.number(node, "EndAngle").unwrap_or(90.0) as f32;
                    canvas.draw_arc(Pt::ZERO, Pt::ZERO, radius, start, end, paint);
                }
                ObjectType::EllipticArc => {
                    let paint = shape_paint(canvas, props, node);
                    let start = props.number(node, "StartAngle").unwrap_or(0.0) as f32;
                    let end = props.number(node, "EndAngle").unwrap_or(90.0) as f32;
                    canvas.draw_elliptic_arc(bounds, start, end - start, paint);
                }
                ObjectType::Line => {
                    if let Some(stroke) = stroke_of(props, node) {
                        canvas.set_stroke(&stroke);
                        let slant = props.text(node, "LineSlant").unwrap_or_default();
                        let ((x1, y1), (x2, y2)) = slant_endpoints(slant.trim(), p.width, p.height);
                        canvas.draw_line(x1, y1, x2, y2);
                    }
                }
                ObjectType::BarGraph => {
                    BarGraph::from_props(props, node).draw(canvas, ctx.fonts, p.width, p.height);
                }
                _ => {}
            }
            canvas.restore_state();
        }
    }
    Outcome::Drawn
}

/// Endpoints of a line inside its `width` x `height` box.
pub(crate) fn slant_endpoints(slant: &str, width: Pt, height: Pt) -> ((Pt, Pt), (Pt, Pt)) {
    match slant {
        "|" => ((width / 2, Pt::ZERO), (width / 2, height)),
        "/" => ((Pt::ZERO, Pt::ZERO), (width, height)),
        "\\" => ((Pt::ZERO, height), (width, Pt::ZERO)),
        _ => ((Pt::ZERO, height / 2), (width, height / 2)),
    }
}

fn render_memo(
    canvas: &mut Canvas,
    props: &PropReader<'_>,
    ctx: &RenderContext<'_>,
    node: NodeId,
    origin: (Pt, Pt),
    frame: Option<&MemoFrame>,
) {
    let memo_box = MemoBox::resolve(props, node, ctx);
    let owned;
    let (frame, height) = match (frame, memo_box.fixed_height) {
        (Some(frame), fixed) => (
            frame,
            fixed.unwrap_or(frame.height + memo_box.vertical_padding()),
        ),
        (None, fixed) => {
            let mut story = memo_story(props, node, ctx, &memo_box);
            let avail = match fixed {
                Some(height) => height - memo_box.vertical_padding(),
                None => story.height(),
            };
            let mut placed = story.take(avail, memo_box.columns, fixed.is_none());
            if !story.is_empty() {
                story.truncate_into(&mut placed, memo_box.column_width(), ctx.fonts);
            }
            owned = placed;
            let height = fixed.unwrap_or(owned.height + memo_box.vertical_padding());
            (&owned, height)
        }
    };
    let p = placement(props, node, origin, memo_box.width, height);
    canvas.save_state();
    canvas.translate(p.x, p.y);
    canvas.rotate(p.rotation);
    let border = props.length_or(node, "BorderWidth", Pt::ZERO);
    if border.is_positive() {
        canvas.set_stroke(&Stroke {
            color: props.color(node, "BorderColor").unwrap_or(Color::BLACK),
            width: border,
            ..Stroke::default()
        });
        canvas.draw_rect(Rect::new(Pt::ZERO, Pt::ZERO, p.width, p.height), Paint::STROKE);
    }
    memo::draw_frame(
        canvas,
        frame,
        memo_box.pad_left,
        p.height - memo_box.pad_top,
        memo_box.column_width(),
        memo_box.column_padding,
    );
    canvas.restore_state();
}

/// Where an image expression points: a file path, or a `data:` URI built
/// from image bytes.
fn image_source(value: &Value, home: Option<&Path>) -> Option<String> {
    match value {
        Value::Bytes(bytes) => Some(pdf::data_uri(bytes)),
        Value::Str(text) if text.starts_with("data:") => Some(text.clone()),
        Value::Str(text) if !text.trim().is_empty() => {
            let path = PathBuf::from(text.trim());
            let resolved = match home {
                Some(home) if path.is_relative() && home.join(&path).exists() => home.join(&path),
                _ => path,
            };
            Some(resolved.to_string_lossy().into_owned())
        }
        _ => None,
    }
}

fn render_image(
    canvas: &mut Canvas,
    props: &PropReader<'_>,
    ctx: &RenderContext<'_>,
    node: NodeId,
    origin: (Pt, Pt),
) {
    let width = object_width(props, node, ctx);
    let height = object_height(props, node).unwrap_or(Pt::ZERO);
    let p = placement(props, node, origin, width, height);
    let image = props
        .try_value(node, "expr")
        .map_err(|err| err.to_string())
        .and_then(|value| {
            image_source(&value, ctx.home_directory).ok_or_else(|| format!("no image in {value}"))
        })
        .and_then(|source| match pdf::image_dimensions(&source) {
            Some((pixel_width, pixel_height)) => Ok(ImageRef {
                source,
                pixel_width,
                pixel_height,
            }),
            None => Err(format!("cannot decode image {}", shorten(&source))),
        });

    canvas.save_state();
    canvas.translate(p.x, p.y);
    canvas.rotate(p.rotation);
    let bounds = Rect::new(Pt::ZERO, Pt::ZERO, p.width, p.height);
    match image {
        Ok(image) => {
            let mask = props.flag(node, "ImageMask");
            match props.choice(node, "ScaleMode").as_str() {
                "clip" => {
                    canvas.clip_to(bounds);
                    canvas.draw_image(&image, Pt::ZERO, Pt::ZERO, None, None, mask, false);
                }
                "proportional" => {
                    canvas.draw_image(&image, Pt::ZERO, Pt::ZERO, Some(p.width), Some(p.height), mask, true)
                }
                _ => canvas.draw_image(&image, Pt::ZERO, Pt::ZERO, Some(p.width), Some(p.height), mask, false),
            }
        }
        Err(reason) => {
            log::error!("{}: {reason}", props.form().label(node));
            let size = Pt::from_i32(8);
            let text_width = ctx.fonts.measure_text_width("Helvetica", size, IMAGE_ERROR_TEXT);
            canvas.set_font("Helvetica", size, None);
            canvas.set_fill_color(Color::BLACK);
            canvas.draw_text((p.width - text_width) / 2, (p.height - size) / 2, IMAGE_ERROR_TEXT);
        }
    }
    let border = props.length_or(node, "BorderWidth", Pt::ZERO);
    if border.is_positive() {
        canvas.set_stroke(&Stroke {
            color: props.color(node, "BorderColor").unwrap_or(Color::BLACK),
            width: border,
            ..Stroke::default()
        });
        canvas.draw_rect(bounds, Paint::STROKE);
    }
    canvas.restore_state();
}

fn shorten(source: &str) -> String {
    if source.len() > 48 {
        let cut = source
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= 48)
            .last()
            .unwrap_or(0);
        format!("{}...", &source[..cut])
    } else {
        source.to_string()
    }
}

/// Draws a spanning line or rectangle between two page points.
pub(crate) fn draw_spanner(
    canvas: &mut Canvas,
    props: &PropReader<'_>,
    node: NodeId,
    from: (Pt, Pt),
    to: (Pt, Pt),
) {
    if !props.flag(node, "Show") {
        return;
    }
    canvas.save_state();
    match props.form().object_type(node) {
        ObjectType::SpanningRectangle => {
            let paint = shape_paint(canvas, props, node);
            let x = from.0.min(to.0);
            let y = from.1.min(to.1);
            let rect = Rect::new(x, y, (from.0 - to.0).abs(), (from.1 - to.1).abs());
            canvas.draw_rect(rect, paint);
        }
        _ => {
            if let Some(stroke) = stroke_of(props, node) {
                canvas.set_stroke(&stroke);
                canvas.draw_line(from.0, from.1, to.0, to.1);
            }
        }
    }
    canvas.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::engine::RunScope;
    use crate::expr::Evaluator;
    use crate::model::ReportForm;
    use crate::types::Size;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    struct Fixture {
        form: ReportForm,
        detail: NodeId,
        evaluator: Evaluator,
        fonts: FontRegistry,
        scope: BTreeMap<String, Value>,
    }

    impl Fixture {
        fn new() -> Self {
            let form = ReportForm::new();
            let detail = form.band(ObjectType::Detail).expect("detail");
            Self {
                form,
                detail,
                evaluator: Evaluator::new(),
                fonts: FontRegistry::with_search_paths(Vec::new()),
                scope: BTreeMap::from([("amt".to_string(), Value::Int(42))]),
            }
        }

        fn ctx(&self) -> RenderContext<'_> {
            RenderContext {
                fonts: &self.fonts,
                none_display: "< None >",
                encoding: "utf-8",
                home_directory: None,
                stringify_dates: true,
                date_format: Some("%d.%m.%Y"),
                datetime_format: None,
                default_width: Pt::from_i32(500),
            }
        }

        fn object(&mut self, kind: ObjectType, attrs: &[(&str, &str)]) -> NodeId {
            let id = self.form.add_object(self.detail, kind);
            for (name, source) in attrs {
                self.form.set_prop(id, name, source);
            }
            id
        }

        fn render(&self, node: NodeId) -> (Outcome, Vec<Command>) {
            let props = PropReader::new(&self.form, &self.evaluator, &self.scope);
            let mut canvas = Canvas::new(Size::letter());
            let outcome = render_object(
                &mut canvas,
                &props,
                &self.ctx(),
                node,
                (Pt::from_i32(36), Pt::from_i32(100)),
                None,
            );
            (outcome, canvas.current_commands().to_vec())
        }
    }

    fn strings(commands: &[Command]) -> Vec<(Pt, Pt, String)> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { x, y, text } => Some((*x, *y, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stringify_dates_nulls_and_bytes() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        assert_eq!(stringify(&Value::Date(date), &ctx), "09.03.2024");
        assert_eq!(stringify(&Value::None, &ctx), "< None >");
        assert_eq!(stringify(&Value::Bytes(vec![0xE9]), &ctx), "é");
        let plain = RenderContext {
            stringify_dates: false,
            ..ctx
        };
        assert_eq!(stringify(&Value::Date(date), &plain), "2024-03-09");
    }

    #[test]
    fn strings_are_positioned_and_aligned() {
        let mut fixture = Fixture::new();
        let id = fixture.object(
            ObjectType::String,
            &[
                ("expr", "'Total: %d' % amt"),
                ("x", "10"),
                ("Width", "200"),
                ("Align", "'right'"),
            ],
        );
        let (outcome, commands) = fixture.render(id);
        assert_eq!(outcome, Outcome::Drawn);
        assert!(commands.contains(&Command::Translate(Pt::from_i32(46), Pt::from_i32(100))));
        assert!(commands.iter().any(|c| matches!(c, Command::ClipRect { .. })));
        let drawn = strings(&commands);
        assert_eq!(drawn.len(), 1);
        let width = fixture
            .fonts
            .measure_text_width("Helvetica", Pt::from_i32(10), "Total: 42");
        assert_eq!(drawn[0].0, Pt::from_i32(200) - width);
        assert_eq!(drawn[0].2, "Total: 42");
    }

    #[test]
    fn expression_errors_print_their_message() {
        let mut fixture = Fixture::new();
        let id = fixture.object(ObjectType::String, &[("expr", "missing_name")]);
        let (_, commands) = fixture.render(id);
        assert!(strings(&commands)[0].2.contains("missing_name"));
    }

    #[test]
    fn page_count_strings_are_deferred_and_reevaluated() {
        let mut fixture = Fixture::new();
        let id = fixture.object(
            ObjectType::String,
            &[
                ("expr", "'%d left' % (self.PageCount - self.PageNumber)"),
                ("FontSize", "8"),
            ],
        );
        let (outcome, commands) = fixture.render(id);
        assert!(strings(&commands).is_empty());
        let Outcome::PageCount(mut text) = outcome else {
            panic!("expected a deferred string");
        };
        let scope = RunScope {
            page_number: 1,
            page_count: Some(3),
            ..RunScope::default()
        };
        let props = PropReader::new(&fixture.form, &fixture.evaluator, &scope);
        text.restamp(&props, id, &fixture.ctx());
        assert_eq!(text.text, "2 left");
        assert_eq!(text.size, Pt::from_i32(8));
    }

    #[test]
    fn hidden_objects_draw_nothing() {
        let mut fixture = Fixture::new();
        let id = fixture.object(ObjectType::Rectangle, &[("Show", "amt < 10")]);
        let (outcome, commands) = fixture.render(id);
        assert_eq!(outcome, Outcome::Hidden);
        assert!(commands.is_empty());
    }

    #[test]
    fn anchors_shift_the_origin() {
        let mut fixture = Fixture::new();
        let id = fixture.object(
            ObjectType::Rectangle,
            &[
                ("Width", "100"),
                ("Height", "40"),
                ("hAnchor", "'center'"),
                ("vAnchor", "'top'"),
                ("FillColor", "(0, 0, 255)"),
            ],
        );
        let (_, commands) = fixture.render(id);
        assert!(commands.contains(&Command::Translate(Pt::from_i32(-14), Pt::from_i32(60))));
        assert!(commands.contains(&Command::FillStroke));
    }

    #[test]
    fn line_slants() {
        let (w, h) = (Pt::from_i32(10), Pt::from_i32(4));
        assert_eq!(slant_endpoints("-", w, h), ((Pt::ZERO, Pt::from_i32(2)), (w, Pt::from_i32(2))));
        assert_eq!(slant_endpoints("|", w, h), ((Pt::from_i32(5), Pt::ZERO), (Pt::from_i32(5), h)));
        assert_eq!(slant_endpoints("/", w, h), ((Pt::ZERO, Pt::ZERO), (w, h)));
        assert_eq!(slant_endpoints("\\", w, h), ((Pt::ZERO, h), (w, Pt::ZERO)));
    }

    #[test]
    fn broken_images_get_a_placeholder() {
        let mut fixture = Fixture::new();
        let id = fixture.object(ObjectType::Image, &[("expr", "'/no/such/image.png'")]);
        let (_, commands) = fixture.render(id);
        assert_eq!(strings(&commands)[0].2, IMAGE_ERROR_TEXT);
        assert!(!commands.iter().any(|c| matches!(c, Command::DrawImage { .. })));
    }

    #[test]
    fn image_bytes_become_data_uris() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(20, 20, image::Rgba([200, 40, 40, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("png");
        let mut fixture = Fixture::new();
        fixture.scope.insert("logo".to_string(), Value::Bytes(png));
        let id = fixture.object(
            ObjectType::Image,
            &[("expr", "logo"), ("ScaleMode", "'proportional'"), ("Width", "40"), ("Height", "20")],
        );
        let (_, commands) = fixture.render(id);
        let image = commands.iter().find_map(|c| match c {
            Command::DrawImage {
                source,
                width,
                height,
                ..
            } => Some((source.clone(), *width, *height)),
            _ => None,
        });
        let (source, width, height) = image.expect("image drawn");
        assert!(source.starts_with("data:image/png;base64,"));
        assert_eq!((width, height), (Pt::from_i32(20), Pt::from_i32(20)));
    }

    #[test]
    fn fixed_memos_truncate_with_ellipsis() {
        let mut fixture = Fixture::new();
        let id = fixture.object(
            ObjectType::Memo,
            &[
                ("expr", "'one\\ntwo\\nthree'"),
                ("Width", "200"),
                ("Height", "25"),
            ],
        );
        let (_, commands) = fixture.render(id);
        let drawn: Vec<String> = strings(&commands).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(drawn, vec!["one", "two", "\u{2026}"]);
    }

    #[test]
    fn framesets_stack_their_paragraphs() {
        let mut fixture = Fixture::new();
        let frame = fixture.object(ObjectType::Frameset, &[("Width", "300")]);
        for (text, size) in [("'Heading'", "14"), ("'Body text'", "9")] {
            let para = fixture.form.add_object(frame, ObjectType::Paragraph);
            fixture.form.set_prop(para, "expr", text);
            fixture.form.set_prop(para, "FontSize", size);
        }
        let (_, commands) = fixture.render(frame);
        let drawn = strings(&commands);
        assert_eq!(drawn.len(), 2);
        assert_eq!(drawn[0].2, "Heading");
        assert_eq!(drawn[1].2, "Body text");
        // Baselines sit one font size below the top of each line.
        let heading_line = Pt::from_f64(14.0 * 1.2);
        assert_eq!(drawn[0].1 - drawn[1].1, heading_line - Pt::from_i32(5));
    }
}
