//! Band placement: measures a band against the space left in the column,
//! splits growing memos across columns, and draws the band's objects.

use crate::canvas::{Canvas, LineCap, Paint, Stroke};
use crate::engine::{BandPlacement, Engine, PageCountStamp, SpanScope, Spanner};
use crate::error::{ReportError, Result};
use crate::memo::{MemoFrame, Story};
use crate::model::NodeId;
use crate::props::PropReader;
use crate::render::{self, MemoBox, Outcome};
use crate::schema::ObjectType;
use crate::types::{Color, Pt, Rect};

/// Height of a band and the memo lines it will print.
#[derive(Debug, Clone, Default)]
pub(crate) struct BandPlan {
    pub height: Pt,
    pub frames: Vec<(NodeId, MemoFrame)>,
    /// A growing memo could not place a single line.
    pub stuck: bool,
}

impl BandPlan {
    fn frame(&self, node: NodeId) -> Option<&MemoFrame> {
        self.frames
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, frame)| frame)
    }
}

/// Memos of a band whose height comes from their text.
fn growing_memos(props: &PropReader<'_>, band: NodeId) -> Vec<NodeId> {
    let form = props.form();
    form.objects(band)
        .into_iter()
        .filter(|obj| {
            form.object_type(*obj).is_flowing()
                && props.flag(*obj, "Show")
                && props.length(*obj, "Height").is_none()
        })
        .collect()
}

fn draw_outline(canvas: &mut Canvas, label: &str, rect: Rect) {
    let gray = Color::rgb(0.75, 0.75, 0.75);
    canvas.save_state();
    canvas.set_stroke(&Stroke {
        color: gray,
        width: Pt::from_f32(0.5),
        dash: vec![Pt::from_i32(2), Pt::from_i32(2)],
        cap: LineCap::Butt,
    });
    canvas.draw_rect(rect, Paint::STROKE);
    canvas.set_font("Helvetica", Pt::from_i32(6), None);
    canvas.set_fill_color(gray);
    canvas.draw_text(rect.x + Pt::from_i32(1), rect.y + Pt::from_i32(1), label);
    canvas.restore_state();
}

impl Engine<'_> {
    fn band_width(&self, band: NodeId) -> Pt {
        match self.form.object_type(band) {
            ObjectType::PageBackground | ObjectType::PageForeground => self.geometry.page.width,
            ObjectType::PageHeader | ObjectType::PageFooter => self.geometry.avail_width(),
            _ => self.geometry.column_width(),
        }
    }

    fn build_stories(&self, band: NodeId, width: Pt) -> Vec<(NodeId, Story)> {
        let props = self.props();
        let ctx = self.context(width);
        growing_memos(&props, band)
            .into_iter()
            .map(|memo| {
                let memo_box = MemoBox::resolve(&props, memo, &ctx);
                (memo, render::memo_story(&props, memo, &ctx, &memo_box))
            })
            .collect()
    }

    /// Measures `band`, moving the memo lines that fit `avail` out of
    /// `stories`. Without a limit every remaining line is taken. A
    /// continuation only carries memos that still have lines.
    pub(crate) fn plan_band(
        &self,
        band: NodeId,
        stories: &mut [(NodeId, Story)],
        avail: Option<Pt>,
        continuation: bool,
    ) -> BandPlan {
        let props = self.props();
        let ctx = self.context(self.band_width(band));
        let explicit = props.length(band, "Height");
        let mut plan = BandPlan::default();
        if !continuation {
            plan.height = explicit.unwrap_or(Pt::ZERO);
            if explicit.is_none() {
                for obj in self.form.objects(band) {
                    if !props.flag(obj, "Show") || stories.iter().any(|(id, _)| *id == obj) {
                        continue;
                    }
                    if let Some(height) = render::object_height(&props, obj) {
                        let y = props.length_or(obj, "y", Pt::ZERO);
                        plan.height = plan.height.max(y + height);
                    }
                }
            }
        }
        for (memo, story) in stories.iter_mut() {
            if story.is_empty() {
                continue;
            }
            let memo_box = MemoBox::resolve(&props, *memo, &ctx);
            let y = if continuation {
                Pt::ZERO
            } else {
                props.length_or(*memo, "y", Pt::ZERO)
            };
            let room = match avail {
                Some(avail) => (avail - y - memo_box.vertical_padding()).max(Pt::ZERO),
                None => story.height(),
            };
            let frame = story.take(room, memo_box.columns, true);
            if frame.is_empty() {
                plan.stuck = true;
            }
            plan.height = plan
                .height
                .max(y + frame.height + memo_box.vertical_padding());
            plan.frames.push((*memo, frame));
        }
        plan
    }

    /// Prints a flow band at the current position, breaking columns and
    /// pages as needed until any growing memo has printed all its lines.
    pub(crate) fn print_band(&mut self, band: NodeId) -> Result<()> {
        if !self.props().flag(band, "Show") {
            return Ok(());
        }
        let width = self.band_width(band);
        let mut stories = self.build_stories(band, width);
        let mut continuation = false;
        let outer_continuation = self.in_continuation;
        loop {
            let avail = self.y - self.bottom_limit();
            let mut trial = stories.clone();
            let mut plan = self.plan_band(band, &mut trial, Some(avail), continuation);
            if plan.stuck || plan.height > avail {
                if !self.at_column_top() {
                    self.column_break()?;
                    continue;
                }
                if plan.stuck {
                    self.truncate_stuck(band, &mut plan, &mut trial, width);
                } else {
                    self.in_continuation = outer_continuation;
                    return Err(ReportError::Layout(format!(
                        "{} needs {} pt but a column holds {} pt",
                        self.form.label(band),
                        plan.height,
                        avail
                    )));
                }
            }

            let origin = (self.geometry.column_x(self.column), self.y - plan.height);
            self.draw_band(band, &plan, origin, width, continuation);
            self.y = origin.1;
            if !self.reprinting {
                self.column_fresh = false;
            }
            stories = trial;
            if stories.iter().all(|(_, story)| story.is_empty()) {
                self.in_continuation = outer_continuation;
                return Ok(());
            }
            self.in_continuation = true;
            self.metrics.deferred_continuations += 1;
            if let Err(err) = self.column_break() {
                self.in_continuation = outer_continuation;
                return Err(err);
            }
            continuation = true;
        }
    }

    /// Ends memos that cannot place a line even in an empty column.
    fn truncate_stuck(
        &self,
        band: NodeId,
        plan: &mut BandPlan,
        stories: &mut [(NodeId, Story)],
        width: Pt,
    ) {
        let props = self.props();
        let ctx = self.context(width);
        for (memo, frame) in plan.frames.iter_mut() {
            if !frame.is_empty() {
                continue;
            }
            let Some((_, story)) = stories.iter_mut().find(|(id, _)| id == memo) else {
                continue;
            };
            log::error!(
                "{} in {} does not fit an empty column; truncating",
                self.form.label(*memo),
                self.form.label(band)
            );
            let memo_box = MemoBox::resolve(&props, *memo, &ctx);
            story.truncate_into(frame, memo_box.column_width(), self.fonts);
            plan.height = plan
                .height
                .max(frame.height + memo_box.vertical_padding());
        }
        plan.stuck = false;
    }

    /// Draws a page-level band at its fixed place and returns its height.
    pub(crate) fn print_page_band(&mut self, kind: ObjectType) -> Pt {
        let Some(band) = self.form.band(kind) else {
            return Pt::ZERO;
        };
        if !self.props().flag(band, "Show") {
            return Pt::ZERO;
        }
        let width = self.band_width(band);
        let mut stories = self.build_stories(band, width);
        let plan = self.plan_band(band, &mut stories, None, false);
        let margins = self.geometry.margins;
        let origin = match kind {
            ObjectType::PageHeader => (
                margins.left,
                self.geometry.page.height - margins.top - plan.height,
            ),
            ObjectType::PageFooter => (margins.left, margins.bottom),
            _ => (Pt::ZERO, Pt::ZERO),
        };
        self.draw_band(band, &plan, origin, width, false);
        plan.height
    }

    /// Height a page-level band would take on the current page.
    pub(crate) fn page_band_height(&self, kind: ObjectType) -> Pt {
        match self.form.band(kind) {
            Some(band) if self.props().flag(band, "Show") => {
                let mut stories = self.build_stories(band, self.band_width(band));
                self.plan_band(band, &mut stories, None, false).height
            }
            _ => Pt::ZERO,
        }
    }

    /// Prints a group footer, pinned above the page footer when it asks to
    /// print at bottom.
    pub(crate) fn print_group_footer(&mut self, footer: NodeId) -> Result<()> {
        let props = self.props();
        if !props.flag(footer, "PrintAtBottom") {
            return self.print_band(footer);
        }
        if !props.flag(footer, "Show") {
            return Ok(());
        }
        let width = self.band_width(footer);
        let mut stories = self.build_stories(footer, width);
        let plan = self.plan_band(footer, &mut stories, None, false);
        let origin = (
            self.geometry.column_x(self.column),
            self.geometry.margins.bottom + self.page_footer_height + Pt::from_i32(1),
        );
        self.draw_band(footer, &plan, origin, width, false);
        Ok(())
    }

    /// Draws every object of `band` with the band's bottom-left corner at
    /// `origin`, then records spanners and the band's placement.
    fn draw_band(
        &mut self,
        band: NodeId,
        plan: &BandPlan,
        origin: (Pt, Pt),
        width: Pt,
        continuation: bool,
    ) {
        let kind = self.form.object_type(band);
        let page_index = self.canvas.current_page_index();
        let ctx = self.context(width);
        let props = PropReader::new(self.form, &self.evaluator, &self.scope);
        for obj in self.form.objects(band) {
            if self.form.object_type(obj).is_spanning() {
                continue;
            }
            let frame = plan.frame(obj);
            let mut at = origin;
            if continuation {
                let Some(frame) = frame else {
                    continue;
                };
                // Continued memos hang from the band top.
                let memo_box = MemoBox::resolve(&props, obj, &ctx);
                let obj_y = props.length_or(obj, "y", Pt::ZERO);
                at.1 = origin.1 + plan.height - frame.height - memo_box.vertical_padding() - obj_y;
            }
            if let Outcome::PageCount(text) =
                render::render_object(&mut self.canvas, &props, &ctx, obj, at, frame)
            {
                self.page_counts.push(PageCountStamp {
                    page: page_index,
                    node: obj,
                    text,
                    ctx,
                    scope: self.scope.clone(),
                });
            }
        }

        if !continuation {
            match kind {
                ObjectType::PageHeader => self.arm_spanners(band, SpanScope::Page, origin),
                ObjectType::GroupHeader => {
                    if let Some(index) = self.group_index(band) {
                        self.arm_spanners(band, SpanScope::Group(index), origin);
                    }
                }
                ObjectType::PageFooter => self.close_spanners(SpanScope::Page, origin),
                ObjectType::GroupFooter => {
                    if let Some(index) = self.group_index(band) {
                        self.close_spanners(SpanScope::Group(index), origin);
                    }
                }
                _ => {}
            }
        }

        let label = self.form.label(band);
        if self.options.show_band_outlines {
            let rect = Rect::new(origin.0, origin.1, width, plan.height);
            draw_outline(&mut self.canvas, &label, rect);
        }
        self.page_bands += 1;
        self.debug_event(
            "band",
            &[
                ("name", crate::debug::json_str(&label)),
                ("page", (page_index + 1).to_string()),
                ("y", origin.1.to_f32().to_string()),
                ("height", plan.height.to_f32().to_string()),
            ],
        );
        self.bands.insert(
            label,
            BandPlacement {
                page_index,
                x: origin.0,
                y: origin.1,
                width,
                height: plan.height,
            },
        );
    }

    /// Remembers the start point of each spanning object in a header band.
    fn arm_spanners(&mut self, band: NodeId, scope: SpanScope, origin: (Pt, Pt)) {
        let props = self.props();
        let mut armed = Vec::new();
        for obj in self.form.objects(band) {
            if !self.form.object_type(obj).is_spanning() || !props.flag(obj, "Show") {
                continue;
            }
            let offset = (
                props.length_or(obj, "x", Pt::ZERO),
                props.length_or(obj, "y", Pt::ZERO),
            );
            armed.push(Spanner {
                node: obj,
                scope,
                offset,
                from: (origin.0 + offset.0, origin.1 + offset.1),
            });
        }
        self.spanners
            .retain(|spanner| !armed.iter().any(|new| new.node == spanner.node));
        self.spanners.extend(armed);
    }

    /// Draws the spanners waiting for this footer to their end points.
    fn close_spanners(&mut self, scope: SpanScope, origin: (Pt, Pt)) {
        let (closing, waiting): (Vec<Spanner>, Vec<Spanner>) = std::mem::take(&mut self.spanners)
            .into_iter()
            .partition(|spanner| spanner.scope == scope);
        self.spanners = waiting;
        let props = PropReader::new(self.form, &self.evaluator, &self.scope);
        for spanner in closing {
            let to = (
                origin.0 + props.length_or(spanner.node, "xFooter", Pt::ZERO),
                origin.1 + props.length_or(spanner.node, "yFooter", Pt::ZERO),
            );
            render::draw_spanner(&mut self.canvas, &props, spanner.node, spanner.from, to);
        }
    }

    /// Draws matching spanners down to `bottom` at a break; they stay armed.
    pub(crate) fn flush_spanners(
        &mut self,
        matches: impl Fn(SpanScope) -> bool,
        column_x: Pt,
        bottom: Pt,
    ) {
        let props = PropReader::new(self.form, &self.evaluator, &self.scope);
        for spanner in self.spanners.iter().filter(|s| matches(s.scope)) {
            let to = (
                column_x + props.length_or(spanner.node, "xFooter", Pt::ZERO),
                bottom,
            );
            render::draw_spanner(&mut self.canvas, &props, spanner.node, spanner.from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::canvas::{Command, Document};
    use crate::debug::DebugLogger;
    use crate::engine::{Engine, NoObserver, Record, RunOptions, RunOutput};
    use crate::error::ReportError;
    use crate::expr::Value;
    use crate::font::FontRegistry;
    use crate::model::{NodeId, ReportForm};
    use crate::schema::ObjectType;
    use crate::types::Pt;

    fn run_with(form: &ReportForm, cursor: &[Record], options: &RunOptions) -> RunOutput {
        let fonts = FontRegistry::with_search_paths(Vec::new());
        Engine::new(form, &fonts, options, None)
            .expect("engine")
            .run(cursor, &mut NoObserver)
            .expect("run")
    }

    fn run(form: &ReportForm, cursor: &[Record]) -> RunOutput {
        run_with(form, cursor, &RunOptions::default())
    }

    fn records(count: i64) -> Vec<Record> {
        (1..=count)
            .map(|n| {
                Record::from([
                    ("n".to_string(), Value::Int(n)),
                    ("group".to_string(), Value::Int((n - 1) / 3)),
                ])
            })
            .collect()
    }

    fn lines(document: &Document, page: usize) -> Vec<(Pt, Pt, Pt, Pt)> {
        document.pages[page]
            .commands
            .windows(3)
            .filter_map(|w| match w {
                [
                    Command::MoveTo { x: x1, y: y1 },
                    Command::LineTo { x: x2, y: y2 },
                    Command::Stroke,
                ] => Some((*x1, *y1, *x2, *y2)),
                _ => None,
            })
            .collect()
    }

    fn texts(document: &Document, page: usize) -> Vec<String> {
        document.pages[page]
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn add(form: &mut ReportForm, band: NodeId, kind: ObjectType, props: &[(&str, &str)]) -> NodeId {
        let id = form.add_object(band, kind);
        for (name, source) in props {
            form.set_prop(id, name, source);
        }
        id
    }

    #[test]
    fn dynamic_band_grows_with_its_objects() {
        let mut form = ReportForm::new();
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "None");
        add(&mut form, detail, ObjectType::Rectangle, &[("y", "10"), ("Height", "30")]);
        add(&mut form, detail, ObjectType::String, &[("y", "5"), ("FontSize", "12")]);
        let out = run(&form, &records(1));
        assert_eq!(out.bands["Detail"].height, Pt::from_i32(40));
        // Directly under the 54 pt page header.
        assert_eq!(out.bands["Detail"].y, Pt::from_i32(792 - 36 - 54 - 40));
    }

    #[test]
    fn growing_memo_continues_in_the_next_page() {
        let mut form = ReportForm::new();
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "None");
        // 100 lines of 12 pt against 792 - 72 - 108 = 612 pt per page.
        let text = (1..=100).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\\n");
        add(&mut form, detail, ObjectType::Memo, &[("expr", &format!("'{text}'"))]);
        let out = run(&form, &records(1));
        assert_eq!(out.page_count, 2);
        assert_eq!(out.metrics.deferred_continuations, 1);
        let first = texts(&out.document, 0);
        let second = texts(&out.document, 1);
        assert_eq!(first.len(), 51);
        assert_eq!(first.last().map(String::as_str), Some("line 51"));
        assert_eq!(second.first().map(String::as_str), Some("line 52"));
        assert_eq!(first.len() + second.len(), 100);
    }

    #[test]
    fn fixed_band_taller_than_a_page_is_an_error() {
        let mut form = ReportForm::new();
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "'20 in'");
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let options = RunOptions::default();
        let result = Engine::new(&form, &fonts, &options, None)
            .expect("engine")
            .run(&records(1), &mut NoObserver);
        assert!(matches!(result, Err(ReportError::Layout(_))));
    }

    #[test]
    fn print_at_bottom_footer_sits_on_the_page_footer() {
        let mut form = ReportForm::new();
        let group = form.add_group("group");
        let footer = form.group_footer(group).expect("footer");
        form.set_prop(footer, "PrintAtBottom", "True");
        form.set_prop(footer, "Height", "20");
        let out = run(&form, &records(2));
        let placed = out.bands["GroupFooter[group]"];
        // Bottom margin 36 plus the 54 pt page footer plus one.
        assert_eq!(placed.y + placed.height, Pt::from_i32(36 + 54 + 20 + 1));
    }

    #[test]
    fn spanning_line_joins_header_and_footer() {
        let mut form = ReportForm::new();
        let group = form.add_group("group");
        let header = form.group_header(group).expect("header");
        add(&mut form, header, ObjectType::SpanningLine, &[("x", "5"), ("xFooter", "5")]);
        let out = run(&form, &records(2));
        let header_at = out.bands["GroupHeader[group]"];
        let footer_at = out.bands["GroupFooter[group]"];
        let x = header_at.x + Pt::from_i32(5);
        assert_eq!(lines(&out.document, 0), vec![(x, header_at.y, x, footer_at.y)]);
    }

    #[test]
    fn spanning_line_resumes_after_a_page_break() {
        let mut form = ReportForm::new();
        let group = form.add_group("group");
        form.set_prop(group, "ReprintHeaderOnNewPage", "True");
        let header = form.group_header(group).expect("header");
        add(&mut form, header, ObjectType::SpanningLine, &[]);
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "200");
        // Header plus two details fill page one; the third breaks.
        let out = run(&form, &records(3));
        assert_eq!(out.page_count, 2);
        let first = lines(&out.document, 0);
        let second = lines(&out.document, 1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].3, Pt::from_i32(36 + 54));
        assert_eq!(second.len(), 1);
        let reprinted = out.bands["GroupHeader[group]"];
        assert_eq!(reprinted.page_index, 1);
        assert_eq!(second[0].1, reprinted.y);
        assert_eq!(second[0].3, out.bands["GroupFooter[group]"].y);
    }

    #[test]
    fn spanning_line_stops_at_the_last_band_of_a_column() {
        let mut form = ReportForm::new();
        let root = form.root();
        form.set_prop(root, "ColumnCount", "2");
        let group = form.add_group("group");
        let header = form.group_header(group).expect("header");
        add(&mut form, header, ObjectType::SpanningLine, &[]);
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "200");
        // Header plus two details fill the first column; the third moves right.
        let out = run(&form, &records(3));
        assert_eq!(out.page_count, 1);
        assert_eq!(out.metrics.column_breaks, 1);
        let header_at = out.bands["GroupHeader[group]"];
        let footer_at = out.bands["GroupFooter[group]"];
        let segments = lines(&out.document, 0);
        assert_eq!(segments.len(), 2);
        let left = header_at.x;
        assert_eq!(segments[0], (left, header_at.y, left, header_at.y - Pt::from_i32(400)));
        let right = footer_at.x;
        assert!(right > left);
        assert_eq!(segments[1], (right, Pt::from_i32(792 - 36 - 54), right, footer_at.y));
    }

    #[test]
    fn outlines_label_each_band() {
        let form = ReportForm::new();
        let options = RunOptions {
            show_band_outlines: true,
            ..RunOptions::default()
        };
        let out = run_with(&form, &records(1), &options);
        let labels = texts(&out.document, 0);
        for label in ["PageHeader", "ReportBegin", "Detail", "ReportEnd", "PageFooter"] {
            assert!(labels.iter().any(|t| t == label), "{label} missing: {labels:?}");
        }
    }

    #[test]
    fn band_events_reach_the_debug_log() {
        let path = std::env::temp_dir().join(format!(
            "reportwriter_bands_{}.jsonl",
            std::process::id()
        ));
        let logger = DebugLogger::new(&path).expect("log");
        let form = ReportForm::new();
        let fonts = FontRegistry::with_search_paths(Vec::new());
        let options = RunOptions::default();
        Engine::new(&form, &fonts, &options, Some(&logger))
            .expect("engine")
            .run(&records(2), &mut NoObserver)
            .expect("run");
        logger.flush();
        let log = std::fs::read_to_string(&path).expect("read log");
        let details = log
            .lines()
            .filter(|line| line.contains("\"name\":\"Detail\""))
            .count();
        assert_eq!(details, 2);
        let _ = std::fs::remove_file(path);
    }
}
