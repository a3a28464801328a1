use crate::types::{Color, Pt, Rect, Size};

/// Bezier control-point factor for quarter ellipses.
const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Pt, Pt),
    Scale(f32, f32),
    Rotate(f32),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetLineCap(LineCap),
    SetDash {
        pattern: Vec<Pt>,
        phase: Pt,
    },
    SetFontName(String),
    SetFontSize(Pt),
    ClipRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    Stroke,
    FillStroke,
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        source: String,
        mask: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

impl LineCap {
    pub fn pdf_operand(self) -> u8 {
        match self {
            LineCap::Butt => 0,
            LineCap::Round => 1,
            LineCap::Square => 2,
        }
    }
}

/// Which parts of a closed shape get painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    pub fill: bool,
    pub stroke: bool,
}

impl Paint {
    pub const STROKE: Paint = Paint {
        fill: false,
        stroke: true,
    };
    pub const FILL: Paint = Paint {
        fill: true,
        stroke: false,
    };

    pub fn is_visible(self) -> bool {
        self.fill || self.stroke
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: Pt,
    pub dash: Vec<Pt>,
    pub cap: LineCap,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: Pt::from_i32(1),
            dash: Vec::new(),
            cap: LineCap::Butt,
        }
    }
}

/// A decoded image ready to be placed: the source string (file path or
/// `data:` URI) plus its pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub source: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    line_cap: LineCap,
    font_size: Pt,
    font_name: String,
    leading: Pt,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            line_cap: LineCap::Butt,
            font_size: Pt::from_f32(12.0),
            font_name: "Helvetica".to_string(),
            leading: Pt::from_f32(14.4),
        }
    }
}

/// Records drawing operations page by page. Completed pages are held until
/// [`Canvas::finish`] so page-dependent text can be stamped once the final
/// page count is known.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Number of pages already shown.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Index the next `show_page` will assign to the current page.
    pub fn current_page_index(&self) -> usize {
        self.pages.len()
    }

    pub fn current_commands(&self) -> &[Command] {
        &self.current.commands
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn translate(&mut self, x: Pt, y: Pt) {
        if x == Pt::ZERO && y == Pt::ZERO {
            return;
        }
        self.current.commands.push(Command::Translate(x, y));
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.current.commands.push(Command::Scale(x, y));
    }

    /// Rotates the coordinate system counter-clockwise by `degrees`.
    pub fn rotate(&mut self, degrees: f32) {
        if degrees == 0.0 || !degrees.is_finite() {
            return;
        }
        self.current
            .commands
            .push(Command::Rotate(degrees.to_radians()));
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_line_cap(&mut self, cap: LineCap) {
        if self.current_state.line_cap == cap {
            return;
        }
        self.current_state.line_cap = cap;
        self.current.commands.push(Command::SetLineCap(cap));
    }

    pub fn set_dash(&mut self, pattern: Vec<Pt>, phase: Pt) {
        self.current
            .commands
            .push(Command::SetDash { pattern, phase });
    }

    pub fn set_stroke(&mut self, stroke: &Stroke) {
        self.set_stroke_color(stroke.color);
        self.set_line_width(stroke.width);
        self.set_line_cap(stroke.cap);
        if !stroke.dash.is_empty() {
            self.set_dash(stroke.dash.clone(), Pt::ZERO);
        }
    }

    pub fn set_fill(&mut self, color: Color) {
        self.set_fill_color(color);
    }

    pub fn set_font(&mut self, name: &str, size: Pt, leading: Option<Pt>) {
        if self.current_state.font_name != name {
            self.current_state.font_name = name.to_string();
            self.current
                .commands
                .push(Command::SetFontName(name.to_string()));
        }
        if self.current_state.font_size != size {
            self.current_state.font_size = size;
            self.current.commands.push(Command::SetFontSize(size));
        }
        self.current_state.leading = leading.unwrap_or(size * 1.2);
    }

    pub fn font_name(&self) -> &str {
        &self.current_state.font_name
    }

    pub fn font_size(&self) -> Pt {
        self.current_state.font_size
    }

    pub fn leading(&self) -> Pt {
        self.current_state.leading
    }

    pub fn clip_to(&mut self, rect: Rect) {
        self.current.commands.push(Command::ClipRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, x: Pt, y: Pt) {
        self.current.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.current.commands.push(Command::ClosePath);
    }

    fn paint(&mut self, paint: Paint) {
        let cmd = match (paint.fill, paint.stroke) {
            (true, true) => Command::FillStroke,
            (true, false) => Command::Fill,
            (false, true) => Command::Stroke,
            (false, false) => return,
        };
        self.current.commands.push(cmd);
    }

    pub fn draw_text(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_rotated_text(&mut self, x: Pt, y: Pt, degrees: f32, text: impl Into<String>) {
        self.save_state();
        self.translate(x, y);
        self.rotate(degrees);
        self.draw_text(Pt::ZERO, Pt::ZERO, text);
        self.restore_state();
    }

    pub fn draw_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.paint(Paint::STROKE);
    }

    pub fn draw_rect(&mut self, rect: Rect, paint: Paint) {
        if !paint.is_visible() {
            return;
        }
        self.move_to(rect.x, rect.y);
        self.line_to(rect.right(), rect.y);
        self.line_to(rect.right(), rect.top());
        self.line_to(rect.x, rect.top());
        self.close_path();
        self.paint(paint);
    }

    pub fn draw_rounded_rect(&mut self, rect: Rect, radius: Pt, paint: Paint) {
        let limit = rect.width.abs().min(rect.height.abs()) / 2;
        let r = radius.max(Pt::ZERO).min(limit);
        if r == Pt::ZERO {
            self.draw_rect(rect, paint);
            return;
        }
        if !paint.is_visible() {
            return;
        }
        let k = r * (1.0 - KAPPA);
        let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.top());
        self.move_to(x0 + r, y0);
        self.line_to(x1 - r, y0);
        self.curve_to(x1 - k, y0, x1, y0 + k, x1, y0 + r);
        self.line_to(x1, y1 - r);
        self.curve_to(x1, y1 - k, x1 - k, y1, x1 - r, y1);
        self.line_to(x0 + r, y1);
        self.curve_to(x0 + k, y1, x0, y1 - k, x0, y1 - r);
        self.line_to(x0, y0 + r);
        self.curve_to(x0, y0 + k, x0 + k, y0, x0 + r, y0);
        self.close_path();
        self.paint(paint);
    }

    /// Ellipse inscribed in `rect`.
    pub fn draw_ellipse(&mut self, rect: Rect, paint: Paint) {
        if !paint.is_visible() {
            return;
        }
        let rx = rect.width / 2;
        let ry = rect.height / 2;
        let cx = rect.x + rx;
        let cy = rect.y + ry;
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;
        self.move_to(cx + rx, cy);
        self.curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
        self.curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
        self.curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
        self.curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
        self.close_path();
        self.paint(paint);
    }

    /// Circular arc around (`cx`, `cy`) from `start` to `end` degrees,
    /// counter-clockwise from +x.
    pub fn draw_arc(&mut self, cx: Pt, cy: Pt, radius: Pt, start: f32, end: f32, paint: Paint) {
        let diameter = radius * 2;
        let rect = Rect::new(cx - radius, cy - radius, diameter, diameter);
        self.draw_elliptic_arc(rect, start, end - start, paint);
    }

    /// Arc of the ellipse inscribed in `rect`, starting at `start` degrees
    /// and sweeping `extent` degrees. A filled arc is closed as a pie slice.
    pub fn draw_elliptic_arc(&mut self, rect: Rect, start: f32, extent: f32, paint: Paint) {
        if !paint.is_visible() || extent == 0.0 {
            return;
        }
        let rx = rect.width.to_f32() / 2.0;
        let ry = rect.height.to_f32() / 2.0;
        let cx = rect.x.to_f32() + rx;
        let cy = rect.y.to_f32() + ry;
        let extent = extent.clamp(-360.0, 360.0);
        let segments = (extent.abs() / 90.0).ceil().max(1.0) as usize;
        let step = (extent / segments as f32).to_radians();
        let mut theta = start.to_radians();
        let point = |t: f32| {
            (
                Pt::from_f32(cx + rx * libm::cosf(t)),
                Pt::from_f32(cy + ry * libm::sinf(t)),
            )
        };
        let (sx, sy) = point(theta);
        if paint.fill {
            self.move_to(Pt::from_f32(cx), Pt::from_f32(cy));
            self.line_to(sx, sy);
        } else {
            self.move_to(sx, sy);
        }
        let alpha = 4.0 / 3.0 * libm::tanf(step / 4.0);
        for _ in 0..segments {
            let t1 = theta + step;
            let (c1x, c1y) = (
                cx + rx * (libm::cosf(theta) - alpha * libm::sinf(theta)),
                cy + ry * (libm::sinf(theta) + alpha * libm::cosf(theta)),
            );
            let (c2x, c2y) = (
                cx + rx * (libm::cosf(t1) + alpha * libm::sinf(t1)),
                cy + ry * (libm::sinf(t1) - alpha * libm::cosf(t1)),
            );
            let (ex, ey) = point(t1);
            self.curve_to(
                Pt::from_f32(c1x),
                Pt::from_f32(c1y),
                Pt::from_f32(c2x),
                Pt::from_f32(c2y),
                ex,
                ey,
            );
            theta = t1;
        }
        if paint.fill {
            self.close_path();
        }
        self.paint(paint);
    }

    pub fn draw_polygon(&mut self, points: &[(Pt, Pt)], paint: Paint) {
        if points.len() < 2 || !paint.is_visible() {
            return;
        }
        self.trace(points);
        self.close_path();
        self.paint(paint);
    }

    pub fn draw_polyline(&mut self, points: &[(Pt, Pt)]) {
        if points.len() < 2 {
            return;
        }
        self.trace(points);
        self.paint(Paint::STROKE);
    }

    fn trace(&mut self, points: &[(Pt, Pt)]) {
        let (x, y) = points[0];
        self.move_to(x, y);
        for &(x, y) in &points[1..] {
            self.line_to(x, y);
        }
    }

    /// Places an image. Missing `width`/`height` fall back to the natural
    /// size at 72 dpi; `preserve_ratio` fits the image inside the box,
    /// centered.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        image: &ImageRef,
        x: Pt,
        y: Pt,
        width: Option<Pt>,
        height: Option<Pt>,
        mask: bool,
        preserve_ratio: bool,
    ) {
        let natural_w = Pt::from_i32(image.pixel_width as i32);
        let natural_h = Pt::from_i32(image.pixel_height as i32);
        let box_w = width.unwrap_or(natural_w);
        let box_h = height.unwrap_or(natural_h);
        let (mut x, mut y, mut w, mut h) = (x, y, box_w, box_h);
        if preserve_ratio && image.pixel_width > 0 && image.pixel_height > 0 {
            let sx = box_w.to_f32() / image.pixel_width as f32;
            let sy = box_h.to_f32() / image.pixel_height as f32;
            let s = sx.min(sy);
            w = Pt::from_f32(image.pixel_width as f32 * s);
            h = Pt::from_f32(image.pixel_height as f32 * s);
            x += (box_w - w) / 2;
            y += (box_h - h) / 2;
        }
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width: w,
            height: h,
            source: image.source.clone(),
            mask,
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::default();
    }

    /// Ends the run. Any pending page is shown, then each held page is
    /// reopened in order and handed to `stamp` together with its index and
    /// the total page count before the document is assembled.
    pub fn finish<F>(mut self, mut stamp: F) -> Document
    where
        F: FnMut(&mut Canvas, usize, usize),
    {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        let held = std::mem::take(&mut self.pages);
        let total = held.len();
        let mut finished = Vec::with_capacity(total);
        for (index, page) in held.into_iter().enumerate() {
            self.current = page;
            self.state_stack.clear();
            self.current_state = GraphicsState::default();
            stamp(&mut self, index, total);
            while !self.state_stack.is_empty() {
                self.restore_state();
            }
            finished.push(std::mem::take(&mut self.current));
        }
        Document {
            page_size: self.page_size,
            pages: finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
        commands.iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn state_changes_are_deduplicated() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.set_fill_color(Color::BLACK);
        canvas.set_fill_color(Color::WHITE);
        canvas.set_fill_color(Color::WHITE);
        canvas.set_font("Helvetica", Pt::from_i32(12), None);
        canvas.set_font("Times-Roman", Pt::from_i32(12), None);
        let cmds = canvas.current_commands();
        assert_eq!(count(cmds, |c| matches!(c, Command::SetFillColor(_))), 1);
        assert_eq!(count(cmds, |c| matches!(c, Command::SetFontName(_))), 1);
        assert_eq!(count(cmds, |c| matches!(c, Command::SetFontSize(_))), 0);
    }

    #[test]
    fn restore_returns_to_saved_state() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.save_state();
        canvas.set_font("Courier", Pt::from_i32(9), Some(Pt::from_i32(11)));
        assert_eq!(canvas.leading(), Pt::from_i32(11));
        canvas.restore_state();
        assert_eq!(canvas.font_name(), "Helvetica");
        assert_eq!(canvas.font_size(), Pt::from_i32(12));
    }

    #[test]
    fn ellipse_uses_four_curves() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.draw_ellipse(
            Rect::new(Pt::ZERO, Pt::ZERO, Pt::from_i32(100), Pt::from_i32(50)),
            Paint::STROKE,
        );
        let cmds = canvas.current_commands();
        assert_eq!(count(cmds, |c| matches!(c, Command::CurveTo { .. })), 4);
        assert!(matches!(cmds.last(), Some(Command::Stroke)));
    }

    #[test]
    fn arc_splits_into_quarter_segments() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.draw_arc(
            Pt::from_i32(50),
            Pt::from_i32(50),
            Pt::from_i32(10),
            0.0,
            180.0,
            Paint::STROKE,
        );
        let cmds = canvas.current_commands();
        assert_eq!(count(cmds, |c| matches!(c, Command::CurveTo { .. })), 2);
        match cmds.first() {
            Some(Command::MoveTo { x, y }) => {
                assert_eq!(*x, Pt::from_i32(60));
                assert_eq!(*y, Pt::from_i32(50));
            }
            other => panic!("unexpected first command {other:?}"),
        }
    }

    #[test]
    fn invisible_shapes_emit_nothing() {
        let mut canvas = Canvas::new(Size::letter());
        let rect = Rect::new(Pt::ZERO, Pt::ZERO, Pt::from_i32(10), Pt::from_i32(10));
        canvas.draw_rect(
            rect,
            Paint {
                fill: false,
                stroke: false,
            },
        );
        assert!(canvas.current_commands().is_empty());
    }

    #[test]
    fn proportional_image_is_centered_in_box() {
        let mut canvas = Canvas::new(Size::letter());
        let image = ImageRef {
            source: "logo.png".to_string(),
            pixel_width: 200,
            pixel_height: 100,
        };
        canvas.draw_image(
            &image,
            Pt::ZERO,
            Pt::ZERO,
            Some(Pt::from_i32(100)),
            Some(Pt::from_i32(100)),
            false,
            true,
        );
        match &canvas.current_commands()[0] {
            Command::DrawImage {
                y, width, height, ..
            } => {
                assert_eq!(*width, Pt::from_i32(100));
                assert_eq!(*height, Pt::from_i32(50));
                assert_eq!(*y, Pt::from_i32(25));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn finish_stamps_each_held_page_with_total() {
        let mut canvas = Canvas::new(Size::letter());
        for _ in 0..3 {
            canvas.draw_text(Pt::ZERO, Pt::ZERO, "body");
            canvas.show_page();
        }
        let mut seen = Vec::new();
        let doc = canvas.finish(|canvas, index, total| {
            seen.push((index, total));
            canvas.draw_text(Pt::ZERO, Pt::ZERO, format!("{} of {}", index + 1, total));
        });
        assert_eq!(seen, vec![(0, 3), (1, 3), (2, 3)]);
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(
            doc.pages[2].commands.last(),
            Some(&Command::DrawString {
                x: Pt::ZERO,
                y: Pt::ZERO,
                text: "3 of 3".to_string()
            })
        );
    }

    #[test]
    fn finish_closes_unbalanced_stamp_state() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.show_page();
        let doc = canvas.finish(|canvas, _, _| canvas.save_state());
        let cmds = &doc.pages[0].commands;
        assert_eq!(cmds, &vec![Command::SaveState, Command::RestoreState]);
    }
}
