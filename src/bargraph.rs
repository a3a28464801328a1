//! Bar graphs. Bars, grid and axes are rasterized with tiny-skia into a PNG
//! that is placed as an image; titles and tick labels stay vector text.

use crate::canvas::{Canvas, ImageRef};
use crate::expr::Value;
use crate::font::FontRegistry;
use crate::model::NodeId;
use crate::pdf;
use crate::props::{self, PropReader};
use crate::types::{Color, Pt};
use tiny_skia::{Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

/// Raster resolution of the plot area, in pixels per point.
const RASTER_SCALE: f32 = 2.0;

const PALETTE: [Color; 6] = [
    Color {
        r: 0.25,
        g: 0.45,
        b: 0.75,
    },
    Color {
        r: 0.85,
        g: 0.45,
        b: 0.2,
    },
    Color {
        r: 0.35,
        g: 0.65,
        b: 0.35,
    },
    Color {
        r: 0.75,
        g: 0.3,
        b: 0.3,
    },
    Color {
        r: 0.55,
        g: 0.45,
        b: 0.7,
    },
    Color {
        r: 0.5,
        g: 0.5,
        b: 0.5,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct BarGraph {
    pub series: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub horizontal: bool,
    pub log: bool,
    pub value_grid: bool,
    pub category_grid: bool,
    pub bar_colors: Vec<Color>,
    pub grid_color: Color,
    pub axis_color: Color,
    pub font_name: String,
    pub font_size: Pt,
}

/// A flat list of numbers is one series; a list of lists is several.
pub fn series_from_value(value: &Value) -> Vec<Vec<f64>> {
    let items = match value {
        Value::List(items) | Value::Tuple(items) => items,
        other => return other.as_f64().map(|n| vec![vec![n]]).unwrap_or_default(),
    };
    let nested = items
        .iter()
        .all(|item| matches!(item, Value::List(_) | Value::Tuple(_)));
    if nested && !items.is_empty() {
        items
            .iter()
            .map(|item| match item {
                Value::List(inner) | Value::Tuple(inner) => {
                    inner.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect()
                }
                _ => Vec::new(),
            })
            .collect()
    } else {
        vec![items.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect()]
    }
}

fn strings_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) | Value::Tuple(items) => items.iter().map(Value::to_string).collect(),
        Value::None => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Value axis range and tick positions.
#[derive(Debug, Clone, PartialEq)]
struct Scale {
    lo: f64,
    hi: f64,
    log: bool,
    ticks: Vec<f64>,
}

impl Scale {
    fn new(series: &[Vec<f64>], log: bool) -> Scale {
        let values = series.iter().flatten().copied().filter(|v| v.is_finite());
        if log {
            let positive: Vec<f64> = values.filter(|v| *v > 0.0).collect();
            let min = positive.iter().copied().fold(f64::INFINITY, f64::min);
            let max = positive.iter().copied().fold(0.0, f64::max);
            let (lo, hi) = if positive.is_empty() {
                (0.0, 1.0)
            } else {
                let lo = min.log10().floor();
                let hi = max.log10().ceil().max(lo + 1.0);
                (lo, hi)
            };
            let ticks = (lo as i32..=hi as i32).map(|p| 10f64.powi(p)).collect();
            return Scale {
                lo,
                hi,
                log,
                ticks,
            };
        }
        let (min, max) = values.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let range = if max > min { max - min } else { 1.0 };
        let raw = range / 5.0;
        let magnitude = 10f64.powf(raw.log10().floor());
        let step = [1.0, 2.0, 5.0, 10.0]
            .iter()
            .map(|m| m * magnitude)
            .find(|s| *s >= raw)
            .unwrap_or(magnitude * 10.0);
        let lo = (min / step).floor() * step;
        let hi = ((max / step).ceil() * step).max(lo + step);
        let count = ((hi - lo) / step).round() as i64;
        let ticks = (0..=count).map(|i| lo + step * i as f64).collect();
        Scale {
            lo,
            hi,
            log,
            ticks,
        }
    }

    /// Position of `value` along the axis, 0 at `lo` and 1 at `hi`.
    fn fraction(&self, value: f64) -> f64 {
        let v = if self.log {
            if value > 0.0 { value.log10() } else { self.lo }
        } else {
            value
        };
        ((v - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0)
    }

    fn baseline(&self) -> f64 {
        if self.log { 0.0 } else { self.fraction(0.0) }
    }
}

fn tick_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Plot area inside a `width` x `height` box: (left, bottom, width, height).
fn plot_area(graph: &BarGraph, width: Pt, height: Pt) -> (Pt, Pt, Pt, Pt) {
    let fs = graph.font_size;
    let mut left = fs * 4;
    if graph.y_label.is_some() {
        left += fs * 1.5f32;
    }
    let mut bottom = fs * 2;
    if graph.x_label.is_some() {
        bottom += fs * 1.5f32;
    }
    let top = if graph.title.is_some() { fs * 2 } else { fs / 2 };
    let right = fs;
    if graph.horizontal {
        std::mem::swap(&mut left, &mut bottom);
        left = left.max(fs * 5);
    }
    let w = (width - left - right).max(Pt::from_i32(1));
    let h = (height - bottom - top).max(Pt::from_i32(1));
    (left, bottom, w, h)
}

fn raster_size(width: Pt, height: Pt) -> (u32, u32) {
    let px = |len: Pt| (len.to_f32() * RASTER_SCALE).round().max(1.0) as u32;
    (px(width), px(height))
}

fn sk_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(color.r, color.g, color.b, 1.0)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(sk_color(color));
    paint.anti_alias = true;
    paint
}

fn stroke_line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &solid(color), &stroke, Transform::identity(), None);
    }
}

impl BarGraph {
    pub fn from_props(props: &PropReader<'_>, node: NodeId) -> BarGraph {
        let bar_colors = match props.value(node, "BarColors") {
            Value::List(items) | Value::Tuple(items) => {
                items.iter().filter_map(props::value_to_color).collect()
            }
            _ => Vec::new(),
        };
        BarGraph {
            series: series_from_value(&props.value(node, "expr")),
            labels: strings_from_value(&props.value(node, "Labels")),
            title: props.text(node, "Title").filter(|t| !t.is_empty()),
            x_label: props.text(node, "XLabel").filter(|t| !t.is_empty()),
            y_label: props.text(node, "YLabel").filter(|t| !t.is_empty()),
            horizontal: props.choice(node, "Orientation") == "horizontal",
            log: props.flag(node, "Log"),
            value_grid: props.flag(node, "ShowValueGrid"),
            category_grid: props.flag(node, "ShowCategoryGrid"),
            bar_colors,
            grid_color: props
                .color(node, "GridColor")
                .unwrap_or(Color::rgb(0.85, 0.85, 0.85)),
            axis_color: props.color(node, "AxisColor").unwrap_or(Color::BLACK),
            font_name: props
                .text(node, "FontName")
                .unwrap_or_else(|| "Helvetica".to_string()),
            font_size: props.length_or(node, "FontSize", Pt::from_i32(7)),
        }
    }

    fn category_count(&self) -> usize {
        self.series
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.labels.len())
    }

    fn series_color(&self, index: usize) -> Color {
        if self.bar_colors.is_empty() {
            PALETTE[index % PALETTE.len()]
        } else {
            self.bar_colors[index % self.bar_colors.len()]
        }
    }

    /// PNG of the plot area: grid, bars and axes, transparent elsewhere.
    pub fn rasterize(&self, width: Pt, height: Pt) -> Option<Vec<u8>> {
        let (px_w, px_h) = raster_size(width, height);
        let mut pixmap = Pixmap::new(px_w, px_h)?;
        let (w, h) = (px_w as f32, px_h as f32);
        let scale = Scale::new(&self.series, self.log);
        // Maps (category fraction, value fraction) to pixel coordinates.
        let at = |cat: f32, val: f32| {
            if self.horizontal {
                (val * w, h - cat * h)
            } else {
                (cat * w, h - val * h)
            }
        };

        if self.value_grid {
            for tick in &scale.ticks {
                let f = scale.fraction(*tick) as f32;
                stroke_line(&mut pixmap, at(0.0, f), at(1.0, f), self.grid_color, 1.0);
            }
        }
        let categories = self.category_count();
        if self.category_grid && categories > 0 {
            for i in 1..categories {
                let f = i as f32 / categories as f32;
                stroke_line(&mut pixmap, at(f, 0.0), at(f, 1.0), self.grid_color, 1.0);
            }
        }

        let series_count = self.series.len().max(1);
        let base = scale.baseline() as f32;
        if categories > 0 {
            let slot = 1.0 / categories as f32;
            let bar = slot * 0.8 / series_count as f32;
            for (s, values) in self.series.iter().enumerate() {
                let paint = solid(self.series_color(s));
                for (c, value) in values.iter().enumerate() {
                    let start = c as f32 * slot + slot * 0.1 + bar * s as f32;
                    let end = start + bar;
                    let f = scale.fraction(*value) as f32;
                    let (x0, y0) = at(start, base.min(f));
                    let (x1, y1) = at(end, base.max(f));
                    let rect = Rect::from_ltrb(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1));
                    if let Some(rect) = rect {
                        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                    }
                }
            }
        }

        let axis_width = RASTER_SCALE;
        stroke_line(&mut pixmap, at(0.0, base), at(1.0, base), self.axis_color, axis_width);
        stroke_line(&mut pixmap, at(0.0, 0.0), at(0.0, 1.0), self.axis_color, axis_width);
        pixmap.encode_png().ok()
    }

    /// Draws the graph into a box whose bottom-left corner is the current
    /// origin.
    pub fn draw(&self, canvas: &mut Canvas, fonts: &FontRegistry, width: Pt, height: Pt) {
        let (left, bottom, plot_w, plot_h) = plot_area(self, width, height);
        let Some(png) = self.rasterize(plot_w, plot_h) else {
            log::error!("bar graph of {width}x{height} could not be rasterized");
            return;
        };
        let (px_w, px_h) = raster_size(plot_w, plot_h);
        let image = ImageRef {
            source: pdf::data_uri(&png),
            pixel_width: px_w,
            pixel_height: px_h,
        };
        canvas.draw_image(&image, left, bottom, Some(plot_w), Some(plot_h), false, false);

        let native = fonts.resolve_face(&self.font_name);
        let fs = self.font_size;
        canvas.set_font(&native, fs, None);
        canvas.set_fill_color(self.axis_color);
        let measure = |text: &str| fonts.measure_text_width(&native, fs, text);
        let scale = Scale::new(&self.series, self.log);

        for tick in &scale.ticks {
            let f = Pt::from_f64(scale.fraction(*tick));
            let label = tick_label(*tick);
            let label_w = measure(&label);
            if self.horizontal {
                let x = left + Pt::from_f64(plot_w.to_f64() * f.to_f64()) - label_w / 2;
                canvas.draw_text(x, bottom - fs * 1.2f32, label);
            } else {
                let y = bottom + Pt::from_f64(plot_h.to_f64() * f.to_f64()) - fs / 3;
                canvas.draw_text(left - label_w - fs / 2, y, label);
            }
        }

        let categories = self.category_count();
        for (i, label) in self.labels.iter().enumerate().take(categories) {
            let center = (i as f64 + 0.5) / categories as f64;
            let label_w = measure(label);
            if self.horizontal {
                let y = bottom + Pt::from_f64(plot_h.to_f64() * (1.0 - center)) - fs / 3;
                canvas.draw_text(left - label_w - fs / 2, y, label.as_str());
            } else {
                let x = left + Pt::from_f64(plot_w.to_f64() * center) - label_w / 2;
                canvas.draw_text(x, bottom - fs * 1.2f32, label.as_str());
            }
        }

        if let Some(title) = &self.title {
            let title_size = fs * 1.3f32;
            let title_w = fonts.measure_text_width(&native, title_size, title);
            canvas.set_font(&native, title_size, None);
            canvas.draw_text((width - title_w) / 2, height - title_size, title.as_str());
            canvas.set_font(&native, fs, None);
        }
        let (cat_caption, val_caption) = if self.horizontal {
            (&self.y_label, &self.x_label)
        } else {
            (&self.x_label, &self.y_label)
        };
        if let Some(caption) = cat_caption {
            let caption_w = measure(caption);
            if self.horizontal {
                canvas.draw_rotated_text(fs, bottom + (plot_h + caption_w) / 2, -90.0, caption.as_str());
            } else {
                canvas.draw_text(left + (plot_w - caption_w) / 2, fs / 2, caption.as_str());
            }
        }
        if let Some(caption) = val_caption {
            let caption_w = measure(caption);
            if self.horizontal {
                canvas.draw_text(left + (plot_w - caption_w) / 2, fs / 2, caption.as_str());
            } else {
                canvas.draw_rotated_text(fs, bottom + (plot_h - caption_w) / 2, 90.0, caption.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn graph(series: Vec<Vec<f64>>) -> BarGraph {
        BarGraph {
            series,
            labels: vec!["Q1".into(), "Q2".into(), "Q3".into()],
            title: Some("Sales".into()),
            x_label: None,
            y_label: Some("USD".into()),
            horizontal: false,
            log: false,
            value_grid: true,
            category_grid: false,
            bar_colors: Vec::new(),
            grid_color: Color::rgb(0.85, 0.85, 0.85),
            axis_color: Color::BLACK,
            font_name: "Helvetica".into(),
            font_size: Pt::from_i32(7),
        }
    }

    #[test]
    fn series_shapes() {
        let flat = Value::List(vec![Value::Int(1), Value::Float(2.5)]);
        assert_eq!(series_from_value(&flat), vec![vec![1.0, 2.5]]);
        let nested = Value::List(vec![
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(3)]),
        ]);
        assert_eq!(series_from_value(&nested), vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(series_from_value(&Value::None).is_empty());
    }

    #[test]
    fn linear_scale_uses_round_steps() {
        let scale = Scale::new(&[vec![3.0, 17.0, 42.0]], false);
        assert_eq!(scale.lo, 0.0);
        assert_eq!(scale.hi, 50.0);
        assert_eq!(scale.ticks, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(scale.fraction(25.0), 0.5);
    }

    #[test]
    fn log_scale_spans_decades() {
        let scale = Scale::new(&[vec![5.0, 800.0]], true);
        assert_eq!(scale.ticks, vec![1.0, 10.0, 100.0, 1000.0]);
        assert!((scale.fraction(100.0) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(scale.fraction(-3.0), 0.0);
    }

    #[test]
    fn rasterizes_to_png() {
        let png = graph(vec![vec![1.0, 4.0, 2.0]])
            .rasterize(Pt::from_i32(100), Pt::from_i32(60))
            .expect("png");
        assert_eq!(&png[..4], b"\x89PNG");
        let uri = pdf::data_uri(&png);
        assert_eq!(pdf::image_dimensions(&uri), Some((200, 120)));
    }

    #[test]
    fn draw_places_image_and_labels() {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let mut canvas = Canvas::new(Size::letter());
        graph(vec![vec![1.0, 4.0, 2.0]]).draw(&mut canvas, &fonts, Pt::from_i32(200), Pt::from_i32(120));
        let commands = canvas.current_commands();
        assert!(commands.iter().any(|c| matches!(c, Command::DrawImage { .. })));
        let texts: Vec<&str> = commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        for expected in ["Q1", "Q2", "Q3", "Sales", "USD", "0", "4"] {
            assert!(texts.contains(&expected), "missing {expected} in {texts:?}");
        }
    }
}
