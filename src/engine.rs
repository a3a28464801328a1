//! Pagination controller. Walks the cursor once, detects group breaks,
//! keeps report variables, and moves bands across columns and pages.
//! Band placement itself lives in [`crate::band`].

use crate::canvas::{Canvas, Document};
use crate::debug::DebugLogger;
use crate::error::{ReportError, Result};
use crate::expr::eval::values_equal;
use crate::expr::{Evaluator, Scope, Value};
use crate::font::FontRegistry;
use crate::metrics::{PageMetrics, RunMetrics};
use crate::model::{NodeId, ReportForm};
use crate::props::{self, PropReader};
use crate::render::{PAGE_COUNT_PLACEHOLDER, RenderContext, TextBox};
use crate::schema::ObjectType;
use crate::types::{Margins, Pt, Size};
use crate::units;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One cursor row: field name to value.
pub type Record = BTreeMap<String, Value>;

/// Names visible to expressions while a report runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunScope {
    pub page_number: usize,
    /// Unknown until the run ends; expressions see a placeholder meanwhile.
    pub page_count: Option<usize>,
    pub record_number: usize,
    pub record: Record,
    pub variables: BTreeMap<String, Value>,
}

impl Scope for RunScope {
    fn report_attr(&self, name: &str) -> Option<Value> {
        let value = match name {
            "PageNumber" => Value::Int(self.page_number as i64),
            "PageCount" => Value::Int(
                self.page_count
                    .map(|count| count as i64)
                    .unwrap_or(PAGE_COUNT_PLACEHOLDER),
            ),
            "RecordNumber" => Value::Int(self.record_number as i64),
            "Record" => Value::Dict(self.record.clone()),
            "Variables" => Value::Dict(self.variables.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn name(&self, name: &str) -> Option<Value> {
        self.variables
            .get(name)
            .or_else(|| self.record.get(name))
            .cloned()
    }
}

/// Settings the writer hands to a run.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub none_display: String,
    pub encoding: String,
    pub home_directory: Option<PathBuf>,
    pub date_format: Option<String>,
    pub datetime_format: Option<String>,
    pub show_band_outlines: bool,
    pub print_status: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            none_display: "< None >".to_string(),
            encoding: "utf-8".to_string(),
            home_directory: None,
            date_format: None,
            datetime_format: None,
            show_band_outlines: false,
            print_status: false,
        }
    }
}

/// Hooks the run consults once per record.
pub(crate) trait RunObserver {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn iteration(&mut self, _record_number: usize) {}

    fn cancelled(&mut self) {}
}

#[cfg(test)]
pub(crate) struct NoObserver;

#[cfg(test)]
impl RunObserver for NoObserver {}

/// Where a band was last drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPlacement {
    pub page_index: usize,
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
}

/// Page and column geometry of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Geometry {
    pub page: Size,
    pub margins: Margins,
    pub columns: usize,
    pub column_padding: Pt,
}

impl Geometry {
    pub(crate) fn resolve(props: &PropReader<'_>) -> Geometry {
        let form = props.form();
        let root = form.root();
        let mut page = Size::letter();
        let mut margins = Margins::all(36.0);
        if let Some(node) = form.page() {
            page = match props.value(node, "Size") {
                Value::Str(name) => units::page_size(&name).unwrap_or_else(|| {
                    log::warn!("unknown page size {name:?}; using letter");
                    Size::letter()
                }),
                Value::Tuple(items) | Value::List(items) if items.len() == 2 => {
                    match (
                        props::value_to_length(&items[0]),
                        props::value_to_length(&items[1]),
                    ) {
                        (Some(width), Some(height)) => Size::new(width, height),
                        _ => Size::letter(),
                    }
                }
                _ => Size::letter(),
            };
            page = match props.choice(node, "Orientation").as_str() {
                "landscape" => page.landscape(),
                _ => page.portrait(),
            };
            margins = Margins {
                top: props.length_or(node, "MarginTop", margins.top),
                right: props.length_or(node, "MarginRight", margins.right),
                bottom: props.length_or(node, "MarginBottom", margins.bottom),
                left: props.length_or(node, "MarginLeft", margins.left),
            };
        }
        Geometry {
            page,
            margins,
            columns: props.int(root, "ColumnCount").unwrap_or(1).clamp(1, 64) as usize,
            column_padding: props.length_or(root, "ColumnPadding", Pt::ZERO),
        }
    }

    pub(crate) fn avail_width(&self) -> Pt {
        self.page.width - self.margins.left - self.margins.right
    }

    pub(crate) fn column_width(&self) -> Pt {
        let gaps = self.column_padding * (self.columns as i32 - 1);
        (self.avail_width() - gaps) / self.columns as i32
    }

    pub(crate) fn column_x(&self, column: usize) -> Pt {
        self.margins.left + (self.column_width() + self.column_padding) * column as i32
    }
}

/// Which footer a spanning object waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpanScope {
    Page,
    Group(usize),
}

/// A spanning line or rectangle whose start point is known.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanner {
    pub node: NodeId,
    pub scope: SpanScope,
    /// Start point relative to the header band.
    pub offset: (Pt, Pt),
    pub from: (Pt, Pt),
}

#[derive(Debug, Clone)]
struct GroupState {
    node: NodeId,
    /// `None` while the group is closed.
    value: Option<Value>,
}

#[derive(Debug, Clone)]
struct VariableState {
    node: NodeId,
    name: String,
    reset_token: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boundary {
    Page,
    Column,
}

/// Everything a finished run hands back.
#[derive(Debug)]
pub(crate) struct RunOutput {
    pub document: Document,
    pub page_count: usize,
    pub page_number: usize,
    pub record_number: usize,
    pub record: Record,
    pub record_numbers: Vec<usize>,
    pub bands: BTreeMap<String, BandPlacement>,
    pub metrics: RunMetrics,
}

/// A string that shows the page count, held back until the run ends. The
/// scope is the one it saw when its band was placed.
pub(crate) struct PageCountStamp<'a> {
    pub page: usize,
    pub node: NodeId,
    pub text: TextBox,
    pub ctx: RenderContext<'a>,
    pub scope: RunScope,
}

pub(crate) struct Engine<'a> {
    pub(crate) form: &'a ReportForm,
    pub(crate) fonts: &'a FontRegistry,
    pub(crate) options: &'a RunOptions,
    pub(crate) debug: Option<&'a DebugLogger>,
    pub(crate) evaluator: Evaluator,
    pub(crate) scope: RunScope,
    pub(crate) canvas: Canvas,
    pub(crate) geometry: Geometry,
    stringify_dates: bool,
    groups: Vec<GroupState>,
    variables: Vec<VariableState>,
    pub(crate) column: usize,
    /// Top of the free space in the current column.
    pub(crate) y: Pt,
    pub(crate) column_top: Pt,
    /// Nothing but reprinted headers has been placed in this column.
    pub(crate) column_fresh: bool,
    pub(crate) page_footer_height: Pt,
    reserved_bottom: Pt,
    pub(crate) spanners: Vec<Spanner>,
    pub(crate) page_counts: Vec<PageCountStamp<'a>>,
    pub(crate) bands: BTreeMap<String, BandPlacement>,
    pub(crate) metrics: RunMetrics,
    pub(crate) page_bands: usize,
    pub(crate) reprinting: bool,
    pub(crate) in_continuation: bool,
    record_numbers: Vec<usize>,
}

impl<'a> Engine<'a> {
    /// Checks the form and prepares a run. Nothing is drawn yet.
    pub(crate) fn new(
        form: &'a ReportForm,
        fonts: &'a FontRegistry,
        options: &'a RunOptions,
        debug: Option<&'a DebugLogger>,
    ) -> Result<Self> {
        let evaluator = Evaluator::new();
        let scope = RunScope::default();
        let props = PropReader::new(form, &evaluator, &scope);
        let geometry = Geometry::resolve(&props);
        if !geometry.column_width().is_positive() {
            return Err(ReportError::InvalidForm(
                "page margins and column padding leave no room for columns".to_string(),
            ));
        }

        let mut reserved_bottom = Pt::ZERO;
        let mut groups = Vec::new();
        for node in form.groups() {
            if let Some(footer) = form.group_footer(node) {
                if props.flag(footer, "PrintAtBottom") {
                    let height = props.length(footer, "Height").ok_or_else(|| {
                        ReportError::InvalidForm(format!(
                            "{} prints at bottom but has no Height",
                            form.label(footer)
                        ))
                    })?;
                    reserved_bottom += height + Pt::from_i32(1);
                }
            }
            groups.push(GroupState { node, value: None });
        }

        let mut variables = Vec::new();
        let mut published = BTreeMap::new();
        for node in form.variables() {
            let Some(name) = props.text(node, "Name").filter(|name| !name.is_empty()) else {
                log::warn!("skipping a variable without a Name");
                continue;
            };
            published.insert(name.clone(), props.value(node, "InitialValue"));
            variables.push(VariableState {
                node,
                name,
                reset_token: None,
            });
        }
        let stringify_dates = props.flag(form.root(), "StringifyDates");

        let mut scope = scope;
        scope.variables = published;
        Ok(Self {
            form,
            fonts,
            options,
            debug,
            evaluator,
            scope,
            canvas: Canvas::new(geometry.page),
            geometry,
            stringify_dates,
            groups,
            variables,
            column: 0,
            y: Pt::ZERO,
            column_top: Pt::ZERO,
            column_fresh: true,
            page_footer_height: Pt::ZERO,
            reserved_bottom,
            spanners: Vec::new(),
            page_counts: Vec::new(),
            bands: BTreeMap::new(),
            metrics: RunMetrics::default(),
            page_bands: 0,
            reprinting: false,
            in_continuation: false,
            record_numbers: Vec::new(),
        })
    }

    pub(crate) fn props(&self) -> PropReader<'_> {
        PropReader::new(self.form, &self.evaluator, &self.scope)
    }

    /// Render settings with `default_width` for objects without a Width.
    pub(crate) fn context(&self, default_width: Pt) -> RenderContext<'a> {
        let options = self.options;
        RenderContext {
            fonts: self.fonts,
            none_display: &options.none_display,
            encoding: &options.encoding,
            home_directory: options.home_directory.as_deref(),
            stringify_dates: self.stringify_dates,
            date_format: options.date_format.as_deref(),
            datetime_format: options.datetime_format.as_deref(),
            default_width,
        }
    }

    /// Flow bands may not extend below this line.
    pub(crate) fn bottom_limit(&self) -> Pt {
        self.geometry.margins.bottom + self.page_footer_height + self.reserved_bottom
    }

    pub(crate) fn at_column_top(&self) -> bool {
        self.column_fresh
    }

    pub(crate) fn at_page_top(&self) -> bool {
        self.column == 0 && self.column_fresh
    }

    /// Index of a group band's group.
    pub(crate) fn group_index(&self, band: NodeId) -> Option<usize> {
        let group = self.form.owning_group(band)?;
        self.groups.iter().position(|state| state.node == group)
    }

    pub(crate) fn debug_event(&self, kind: &str, fields: &[(&str, String)]) {
        if let Some(debug) = self.debug {
            debug.event(kind, fields);
        }
    }

    /// Runs the whole report over `cursor`.
    pub(crate) fn run(
        mut self,
        cursor: &[Record],
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutput> {
        self.begin_page();
        self.print_report_band(ObjectType::ReportBegin)?;

        for (index, record) in cursor.iter().enumerate() {
            if observer.is_cancelled() {
                log::warn!("report cancelled at record {index}");
                observer.cancelled();
                return Err(ReportError::Cancelled);
            }
            let previous = std::mem::replace(&mut self.scope.record, record.clone());
            self.scope.record_number = index;
            observer.iteration(index);
            if self.options.print_status {
                log::info!("processing record {} of {}", index + 1, cursor.len());
            }
            self.metrics.record_count += 1;

            let changed = self.changed_groups();
            if let Some((first, _)) = &changed {
                let first = *first;
                if index > 0 {
                    let current = std::mem::replace(&mut self.scope.record, previous);
                    self.scope.record_number = index - 1;
                    let closed = self.close_groups(first);
                    self.scope.record = current;
                    self.scope.record_number = index;
                    closed?;
                    self.break_for_groups(first)?;
                }
            }
            self.update_variables(index == 0);
            if let Some((first, values)) = changed {
                self.open_groups(first, values)?;
            }
            if let Some(detail) = self.form.band(ObjectType::Detail) {
                self.print_band(detail)?;
            }
            self.record_numbers.push(index);
        }

        self.close_groups(0)?;
        self.print_report_band(ObjectType::ReportEnd)?;
        self.end_page();
        Ok(self.finish())
    }

    /// The outermost group whose value changed, plus every group's new
    /// value. Inner groups of a changed group count as changed.
    fn changed_groups(&self) -> Option<(usize, Vec<Value>)> {
        let props = self.props();
        let values: Vec<Value> = self
            .groups
            .iter()
            .map(|group| props.value(group.node, "expr"))
            .collect();
        let first = self
            .groups
            .iter()
            .zip(&values)
            .position(|(group, value)| match &group.value {
                Some(current) => !values_equal(current, value),
                None => true,
            })?;
        Some((first, values))
    }

    /// Prints footers of the open groups from `first` inward, innermost
    /// first, and closes them.
    fn close_groups(&mut self, first: usize) -> Result<()> {
        for index in (first..self.groups.len()).rev() {
            if self.groups[index].value.is_none() {
                continue;
            }
            if let Some(footer) = self.form.group_footer(self.groups[index].node) {
                self.print_group_footer(footer)?;
            }
            self.groups[index].value = None;
            self.spanners
                .retain(|spanner| spanner.scope != SpanScope::Group(index));
        }
        Ok(())
    }

    fn break_for_groups(&mut self, first: usize) -> Result<()> {
        let props = self.props();
        let nodes = &self.groups[first..];
        let new_page = nodes
            .iter()
            .any(|group| props.flag(group.node, "StartOnNewPage"));
        let new_column = nodes
            .iter()
            .any(|group| props.flag(group.node, "StartOnNewColumn"));
        if new_page && !self.at_page_top() {
            self.page_break("group")
        } else if new_column && !self.at_column_top() {
            self.column_break()
        } else {
            Ok(())
        }
    }

    /// Sets each group from `first` inward to its new value, printing its
    /// header first.
    fn open_groups(&mut self, first: usize, values: Vec<Value>) -> Result<()> {
        for (index, value) in values.into_iter().enumerate().skip(first) {
            let node = self.groups[index].node;
            if self.props().flag(node, "ResetPageNumber") && !self.in_continuation {
                self.scope.page_number = 1;
            }
            if let Some(header) = self.form.group_header(node) {
                self.print_band(header)?;
            }
            self.groups[index].value = Some(value);
        }
        Ok(())
    }

    /// Resets and advances every variable for the current record.
    fn update_variables(&mut self, first_record: bool) {
        for index in 0..self.variables.len() {
            let node = self.variables[index].node;
            let name = self.variables[index].name.clone();
            let props = PropReader::new(self.form, &self.evaluator, &self.scope);
            let token = props.value(node, "ResetAt");
            let reset = first_record
                || match &self.variables[index].reset_token {
                    Some(last) => !values_equal(last, &token),
                    None => true,
                };
            let initial = reset.then(|| props.value(node, "InitialValue"));
            if let Some(initial) = initial {
                self.scope.variables.insert(name.clone(), initial);
            }
            self.variables[index].reset_token = Some(token);

            let props = PropReader::new(self.form, &self.evaluator, &self.scope);
            if !props.is_set(node, "expr") {
                continue;
            }
            let value = match props.try_value(node, "expr") {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("variable {name}: {err}");
                    Value::None
                }
            };
            self.scope.variables.insert(name, value);
        }
    }

    fn print_report_band(&mut self, kind: ObjectType) -> Result<()> {
        let Some(band) = self.form.band(kind) else {
            return Ok(());
        };
        let props = self.props();
        if !props.flag(band, "Show") {
            return Ok(());
        }
        let before = props.flag(band, "PageBreakBefore");
        let after = props.flag(band, "PageBreakAfter");
        let column_after = props.flag(band, "ColumnBreakAfter");
        if before && !self.at_page_top() {
            self.page_break("page_break_before")?;
        }
        self.print_band(band)?;
        if after {
            self.page_break("page_break_after")?;
        } else if column_after {
            self.column_break()?;
        }
        Ok(())
    }

    pub(crate) fn begin_page(&mut self) {
        self.scope.page_number += 1;
        self.column = 0;
        self.page_bands = 0;
        self.print_page_band(ObjectType::PageBackground);
        let header = self.print_page_band(ObjectType::PageHeader);
        self.page_footer_height = self.page_band_height(ObjectType::PageFooter);
        self.column_top = self.geometry.page.height - self.geometry.margins.top - header;
        self.y = self.column_top;
        self.column_fresh = true;
    }

    pub(crate) fn end_page(&mut self) {
        self.print_page_band(ObjectType::PageFooter);
        let bottom = self.geometry.margins.bottom;
        let left = self.geometry.margins.left;
        self.flush_spanners(|scope| scope == SpanScope::Page, left, bottom);
        self.spanners.retain(|spanner| spanner.scope != SpanScope::Page);
        self.print_page_band(ObjectType::PageForeground);
        self.metrics.pages.push(PageMetrics {
            page_number: self.scope.page_number,
            band_count: self.page_bands,
            command_count: self.canvas.current_commands().len(),
        });
        self.canvas.show_page();
    }

    pub(crate) fn page_break(&mut self, reason: &str) -> Result<()> {
        let from = self.canvas.current_page_index() + 1;
        let x = self.geometry.column_x(self.column);
        let bottom = self.bottom_limit();
        self.flush_spanners(|scope| matches!(scope, SpanScope::Group(_)), x, bottom);
        self.end_page();
        self.begin_page();
        log::debug!("page break ({reason}) to page {}", from + 1);
        self.debug_event(
            "page_break",
            &[
                ("from_page", from.to_string()),
                ("to_page", (from + 1).to_string()),
                ("reason", crate::debug::json_str(reason)),
            ],
        );
        self.after_break(Boundary::Page)
    }

    pub(crate) fn column_break(&mut self) -> Result<()> {
        if self.column + 1 >= self.geometry.columns {
            return self.page_break("column_overflow");
        }
        let x = self.geometry.column_x(self.column);
        // Group lines stop where the column's last band ended.
        let bottom = self.y;
        self.flush_spanners(|scope| matches!(scope, SpanScope::Group(_)), x, bottom);
        self.column += 1;
        self.y = self.column_top;
        self.column_fresh = true;
        self.metrics.column_breaks += 1;
        log::debug!("column break to column {}", self.column + 1);
        self.debug_event(
            "column_break",
            &[
                ("page", (self.canvas.current_page_index() + 1).to_string()),
                ("column", self.column.to_string()),
            ],
        );
        self.after_break(Boundary::Column)
    }

    /// Reprints the headers of open groups that ask for it and re-arms the
    /// spanners of the others at the new column top.
    fn after_break(&mut self, boundary: Boundary) -> Result<()> {
        let flag = match boundary {
            Boundary::Page => "ReprintHeaderOnNewPage",
            Boundary::Column => "ReprintHeaderOnNewColumn",
        };
        let mut reprint = Vec::new();
        if !self.reprinting {
            let props = self.props();
            for (index, group) in self.groups.iter().enumerate() {
                if group.value.is_some() && props.flag(group.node, flag) {
                    if let Some(header) = self.form.group_header(group.node) {
                        reprint.push((index, header));
                    }
                }
            }
        }

        let x = self.geometry.column_x(self.column);
        let top = self.y;
        self.spanners.retain(|spanner| match spanner.scope {
            SpanScope::Group(index) => !reprint.iter().any(|(i, _)| *i == index),
            SpanScope::Page => true,
        });
        for spanner in self.spanners.iter_mut() {
            if matches!(spanner.scope, SpanScope::Group(_)) {
                spanner.from = (x + spanner.offset.0, top);
            }
        }

        self.reprinting = true;
        let result = reprint
            .into_iter()
            .try_for_each(|(_, header)| self.print_band(header));
        self.reprinting = false;
        result
    }

    fn finish(self) -> RunOutput {
        let Engine {
            form,
            evaluator,
            canvas,
            fonts,
            page_counts,
            mut scope,
            bands,
            mut metrics,
            record_numbers,
            ..
        } = self;
        let document = canvas.finish(|canvas, index, total| {
            for stamp in page_counts.iter().filter(|stamp| stamp.page == index) {
                let scope = RunScope {
                    page_count: Some(total),
                    ..stamp.scope.clone()
                };
                let props = PropReader::new(form, &evaluator, &scope);
                let mut text = stamp.text.clone();
                text.restamp(&props, stamp.node, &stamp.ctx);
                text.draw(canvas, fonts);
            }
        });
        let page_count = document.pages.len();
        scope.page_count = Some(page_count);
        metrics.pages.truncate(page_count);
        RunOutput {
            document,
            page_count,
            page_number: scope.page_number,
            record_number: scope.record_number,
            record: scope.record,
            record_numbers,
            bands,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn fonts() -> FontRegistry {
        FontRegistry::with_search_paths(Vec::new())
    }

    fn rows(values: &[(&str, i64)]) -> Vec<Record> {
        values
            .iter()
            .map(|(region, amt)| {
                Record::from([
                    ("region".to_string(), Value::from(*region)),
                    ("amt".to_string(), Value::Int(*amt)),
                ])
            })
            .collect()
    }

    fn run(form: &ReportForm, cursor: &[Record]) -> RunOutput {
        let fonts = fonts();
        let options = RunOptions::default();
        Engine::new(form, &fonts, &options, None)
            .expect("engine")
            .run(cursor, &mut NoObserver)
            .expect("run")
    }

    /// Text drawn on each page, in drawing order.
    fn page_texts(document: &Document) -> Vec<Vec<String>> {
        document
            .pages
            .iter()
            .map(|page| {
                page.commands
                    .iter()
                    .filter_map(|c| match c {
                        Command::DrawString { text, .. } => Some(text.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    fn string(form: &mut ReportForm, band: NodeId, expr: &str) -> NodeId {
        let id = form.add_object(band, ObjectType::String);
        form.set_prop(id, "expr", expr);
        id
    }

    fn small_form() -> ReportForm {
        let mut form = ReportForm::new();
        let header = form.band(ObjectType::PageHeader).expect("header");
        string(&mut form, header, "'Header'");
        let footer = form.band(ObjectType::PageFooter).expect("footer");
        string(&mut form, footer, "'Page %s of %s' % (self.PageNumber, self.PageCount)");
        form
    }

    #[test]
    fn scope_resolves_variables_before_fields() {
        let scope = RunScope {
            page_number: 2,
            page_count: None,
            record_number: 4,
            record: Record::from([("amt".to_string(), Value::Int(1))]),
            variables: BTreeMap::from([("amt".to_string(), Value::Int(9))]),
        };
        assert_eq!(scope.name("amt"), Some(Value::Int(9)));
        assert_eq!(scope.report_attr("PageNumber"), Some(Value::Int(2)));
        assert_eq!(
            scope.report_attr("PageCount"),
            Some(Value::Int(PAGE_COUNT_PLACEHOLDER))
        );
        assert_eq!(scope.report_attr("RecordNumber"), Some(Value::Int(4)));
        assert_eq!(scope.report_attr("Nope"), None);
    }

    #[test]
    fn geometry_splits_columns() {
        let mut form = ReportForm::new();
        let root = form.root();
        form.set_prop(root, "ColumnCount", "2");
        form.set_prop(root, "ColumnPadding", "12");
        let page = form.page().expect("page");
        form.set_prop(page, "Orientation", "'landscape'");
        let evaluator = Evaluator::new();
        let scope = RunScope::default();
        let geometry = Geometry::resolve(&PropReader::new(&form, &evaluator, &scope));
        assert_eq!(geometry.page, Size::letter().landscape());
        assert_eq!(geometry.avail_width(), Pt::from_i32(792 - 72));
        assert_eq!(geometry.column_width(), Pt::from_i32(354));
        assert_eq!(geometry.column_x(1), Pt::from_i32(36 + 354 + 12));
    }

    #[test]
    fn empty_report_still_prints_page_bands() {
        let form = small_form();
        let out = run(&form, &[]);
        assert_eq!(out.page_count, 1);
        assert_eq!(page_texts(&out.document), vec![vec!["Header", "Page 1 of 1"]]);
        assert!(out.record_numbers.is_empty());
    }

    #[test]
    fn page_count_expressions_see_the_final_total() {
        let mut form = ReportForm::new();
        let footer = form.band(ObjectType::PageFooter).expect("footer");
        string(&mut form, footer, "'%d left' % (self.PageCount - self.PageNumber)");
        string(&mut form, footer, "'last' if self.PageNumber == self.PageCount else 'more'");
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "400");
        let out = run(&form, &rows(&[("N", 1), ("N", 2)]));
        assert_eq!(out.page_count, 2);
        assert_eq!(
            page_texts(&out.document),
            vec![vec!["1 left", "more"], vec!["0 left", "last"]]
        );
    }

    #[test]
    fn group_footers_see_the_previous_record() {
        let mut form = small_form();
        let group = form.add_group("region");
        let header = form.group_header(group).expect("group header");
        string(&mut form, header, "'Region %s' % region");
        let footer = form.group_footer(group).expect("group footer");
        string(&mut form, footer, "'Total %s' % total");
        let variable = form.add_variable("total", "total + amt");
        form.set_prop(variable, "ResetAt", "region");
        let detail = form.band(ObjectType::Detail).expect("detail");
        string(&mut form, detail, "'%s %s' % (self.RecordNumber, amt)");

        let out = run(&form, &rows(&[("N", 10), ("N", 20), ("S", 5)]));
        assert_eq!(
            page_texts(&out.document)[0],
            vec![
                "Header",
                "Region N",
                "0 10",
                "1 20",
                "Total 30",
                "Region S",
                "2 5",
                "Total 5",
                "Page 1 of 1"
            ]
        );
        assert_eq!(out.record_numbers, vec![0, 1, 2]);
        assert_eq!(out.metrics.record_count, 3);
    }

    #[test]
    fn variables_fold_over_records() {
        let mut form = ReportForm::new();
        form.add_variable("running", "running + amt");
        let detail = form.band(ObjectType::Detail).expect("detail");
        string(&mut form, detail, "str(running)");
        let out = run(&form, &rows(&[("N", 1), ("N", 2), ("S", 3), ("S", 4)]));
        assert_eq!(page_texts(&out.document)[0], vec!["1", "3", "6", "10"]);
    }

    #[test]
    fn detail_rows_overflow_onto_new_pages() {
        let mut form = small_form();
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "100");
        string(&mut form, detail, "str(amt)");
        let cursor: Vec<Record> = (1..=12).map(|n| rows(&[("N", n)]).remove(0)).collect();
        let out = run(&form, &cursor);
        // 792 - 72 margins - 54 header - 54 footer leaves room for 6 rows.
        assert_eq!(out.page_count, 2);
        let texts = page_texts(&out.document);
        assert_eq!(texts[0].len(), 1 + 6 + 1);
        assert_eq!(texts[1][0], "Header");
        assert_eq!(texts[1][1], "7");
        assert_eq!(texts[1].last().map(String::as_str), Some("Page 2 of 2"));
        assert_eq!(out.metrics.pages.len(), 2);
        assert_eq!(out.metrics.pages[1].page_number, 2);
    }

    #[test]
    fn rows_fill_columns_before_pages() {
        let mut form = ReportForm::new();
        let root = form.root();
        form.set_prop(root, "ColumnCount", "2");
        let page = form.page().expect("page");
        // 72 pt tall content area: three 24 pt rows per column.
        form.set_prop(page, "Size", "(300, 216)");
        form.set_prop(page, "Orientation", "'landscape'");
        for band in [ObjectType::PageHeader, ObjectType::PageFooter] {
            let id = form.band(band).expect("band");
            form.set_prop(id, "Height", "'.5 in'");
        }
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "24");
        string(&mut form, detail, "str(amt)");
        let cursor: Vec<Record> = (1..=5).map(|n| rows(&[("N", n)]).remove(0)).collect();
        let out = run(&form, &cursor);
        assert_eq!(out.page_count, 1);
        assert_eq!(out.metrics.column_breaks, 1);

        let mut x = Pt::ZERO;
        let mut placed = Vec::new();
        for command in &out.document.pages[0].commands {
            match command {
                Command::Translate(tx, _) => x = *tx,
                Command::DrawString { text, .. } => placed.push((x, text.clone())),
                _ => {}
            }
        }
        let left = Pt::from_i32(36);
        let right = Pt::from_i32(36 + 114);
        assert_eq!(
            placed,
            vec![
                (left, "1".to_string()),
                (left, "2".to_string()),
                (left, "3".to_string()),
                (right, "4".to_string()),
                (right, "5".to_string()),
            ]
        );
    }

    #[test]
    fn tuple_page_sizes_follow_orientation() {
        let mut form = ReportForm::new();
        let page = form.page().expect("page");
        form.set_prop(page, "Size", "(300, 216)");
        let evaluator = Evaluator::new();
        let scope = RunScope::default();
        let portrait = Geometry::resolve(&PropReader::new(&form, &evaluator, &scope));
        assert_eq!(portrait.page, Size::new(Pt::from_i32(216), Pt::from_i32(300)));
        form.set_prop(page, "Orientation", "'landscape'");
        let landscape = Geometry::resolve(&PropReader::new(&form, &evaluator, &scope));
        assert_eq!(landscape.page, Size::new(Pt::from_i32(300), Pt::from_i32(216)));
    }

    #[test]
    fn start_on_new_page_breaks_between_groups() {
        let mut form = small_form();
        let group = form.add_group("region");
        form.set_prop(group, "StartOnNewPage", "True");
        form.set_prop(group, "ResetPageNumber", "True");
        let header = form.group_header(group).expect("group header");
        string(&mut form, header, "region");
        let out = run(&form, &rows(&[("N", 1), ("S", 2), ("S", 3), ("W", 4)]));
        assert_eq!(out.page_count, 3);
        let texts = page_texts(&out.document);
        assert_eq!(texts[1], vec!["Header", "S", "Page 1 of 3"]);
        assert_eq!(texts[2], vec!["Header", "W", "Page 1 of 3"]);
    }

    #[test]
    fn print_at_bottom_needs_a_height() {
        let mut form = ReportForm::new();
        let group = form.add_group("region");
        let footer = form.group_footer(group).expect("footer");
        form.set_prop(footer, "PrintAtBottom", "True");
        form.set_prop(footer, "Height", "None");
        let fonts = fonts();
        let options = RunOptions::default();
        assert!(matches!(
            Engine::new(&form, &fonts, &options, None),
            Err(ReportError::InvalidForm(_))
        ));
    }

    #[test]
    fn cancellation_stops_the_run() {
        struct CancelAfter(usize, Vec<usize>, bool);
        impl RunObserver for CancelAfter {
            fn is_cancelled(&self) -> bool {
                self.1.len() >= self.0
            }
            fn iteration(&mut self, record_number: usize) {
                self.1.push(record_number);
            }
            fn cancelled(&mut self) {
                self.2 = true;
            }
        }
        let form = ReportForm::new();
        let fonts = fonts();
        let options = RunOptions::default();
        let mut observer = CancelAfter(2, Vec::new(), false);
        let result = Engine::new(&form, &fonts, &options, None)
            .expect("engine")
            .run(&rows(&[("N", 1), ("N", 2), ("N", 3)]), &mut observer);
        assert!(matches!(result, Err(ReportError::Cancelled)));
        assert_eq!(observer.1, vec![0, 1]);
        assert!(observer.2);
    }

    #[test]
    fn identical_runs_are_identical() {
        let form = small_form();
        let cursor = rows(&[("N", 1), ("S", 2)]);
        let first = run(&form, &cursor);
        let second = run(&form, &cursor);
        assert_eq!(first.page_count, second.page_count);
        assert_eq!(first.record_numbers, second.record_numbers);
        assert_eq!(first.document.pages, second.document.pages);
    }
}
