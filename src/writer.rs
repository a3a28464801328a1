//! `ReportWriter`, the public driver: takes a form and a cursor, runs the
//! report and saves the PDF.

use crate::canvas::Document;
use crate::debug::DebugLogger;
use crate::engine::{BandPlacement, Engine, Record, RunObserver, RunOptions, RunOutput};
use crate::error::{ReportError, Result};
use crate::expr::{Evaluator, LiteralScope, Value};
use crate::font::FontRegistry;
use crate::metrics::RunMetrics;
use crate::model::ReportForm;
use crate::pdf::{self, PdfOptions};
use crate::props::PropReader;
use crate::serializer;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type BeginHook = Box<dyn FnMut() + Send>;
type IterationHook = Box<dyn FnMut(usize) + Send>;
type CancelHook = Box<dyn FnMut() + Send>;
type EndHook = Box<dyn FnMut(&WriteSummary) + Send>;

enum FormSource {
    Form(ReportForm),
    File(PathBuf),
    Xml(String),
}

enum Output {
    File(PathBuf),
    Stream(Box<dyn Write + Send>),
}

/// Cooperative cancel flag, checked once per record.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub page_count: usize,
    pub record_count: usize,
    /// Record numbers in the order their detail bands printed.
    pub record_numbers: Vec<usize>,
    pub metrics: RunMetrics,
}

#[derive(Default)]
struct Hooks {
    begin: Option<BeginHook>,
    iteration: Option<IterationHook>,
    cancel: Option<CancelHook>,
    end: Option<EndHook>,
}

struct HookObserver<'h> {
    hooks: &'h mut Hooks,
    token: &'h CancelToken,
}

impl RunObserver for HookObserver<'_> {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn iteration(&mut self, record_number: usize) {
        if let Some(hook) = self.hooks.iteration.as_mut() {
            hook(record_number);
        }
    }

    fn cancelled(&mut self) {
        if let Some(hook) = self.hooks.cancel.as_mut() {
            hook();
        }
    }
}

/// Runs a report form over a cursor and writes the PDF.
///
/// ```no_run
/// use reportwriter::{Record, ReportWriter, Value};
///
/// let rows = vec![Record::from([("name".to_string(), Value::from("Ada"))])];
/// let mut writer = ReportWriter::new()
///     .form_file("invoice.rfxml")
///     .cursor(rows)
///     .output_file("invoice.pdf");
/// let summary = writer.write(true)?;
/// println!("{} pages", summary.page_count);
/// # Ok::<(), reportwriter::ReportError>(())
/// ```
pub struct ReportWriter {
    source: Option<FormSource>,
    form: Option<ReportForm>,
    cursor: Vec<Record>,
    output: Option<Output>,
    options: RunOptions,
    use_test_cursor: bool,
    font_paths: Vec<PathBuf>,
    font_files: Vec<(String, PathBuf)>,
    creation_date: Option<NaiveDateTime>,
    debug_path: Option<PathBuf>,
    hooks: Hooks,
    token: CancelToken,
    result: Option<RunOutput>,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWriter {
    pub fn new() -> Self {
        Self {
            source: None,
            form: None,
            cursor: Vec::new(),
            output: None,
            options: RunOptions::default(),
            use_test_cursor: false,
            font_paths: Vec::new(),
            font_files: Vec::new(),
            creation_date: None,
            debug_path: None,
            hooks: Hooks::default(),
            token: CancelToken::default(),
            result: None,
        }
    }

    pub fn form(mut self, form: ReportForm) -> Self {
        self.source = Some(FormSource::Form(form));
        self
    }

    /// An `.rfxml` file or a `.py` form module, read by `write`.
    pub fn form_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(FormSource::File(path.into()));
        self
    }

    pub fn form_xml(mut self, xml: impl Into<String>) -> Self {
        self.source = Some(FormSource::Xml(xml.into()));
        self
    }

    pub fn cursor(mut self, rows: Vec<Record>) -> Self {
        self.cursor = rows;
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(Output::File(path.into()));
        self
    }

    pub fn output_stream(mut self, stream: impl Write + Send + 'static) -> Self {
        self.output = Some(Output::Stream(Box::new(stream)));
        self
    }

    /// Encoding of byte values in the cursor.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.options.encoding = encoding.into();
        self
    }

    /// Base directory for relative image paths. Defaults to the directory
    /// of the form file.
    pub fn home_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.home_directory = Some(path.into());
        self
    }

    /// Text printed for null values.
    pub fn none_display(mut self, text: impl Into<String>) -> Self {
        self.options.none_display = text.into();
        self
    }

    /// Run over the form's embedded test cursor instead of `cursor`.
    pub fn use_test_cursor(mut self, enabled: bool) -> Self {
        self.use_test_cursor = enabled;
        self
    }

    pub fn show_band_outlines(mut self, enabled: bool) -> Self {
        self.options.show_band_outlines = enabled;
        self
    }

    /// Log one status line per record.
    pub fn print_status(mut self, enabled: bool) -> Self {
        self.options.print_status = enabled;
        self
    }

    /// strftime pattern for dates; the locale's `%x` when unset.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.options.date_format = Some(format.into());
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.options.datetime_format = Some(format.into());
        self
    }

    /// Extra directory searched for TrueType fonts.
    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_paths.push(path.into());
        self
    }

    /// Maps a face name straight to a font file.
    pub fn font_file(mut self, face: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.font_files.push((face.into(), path.into()));
        self
    }

    /// PDF creation timestamp. Left out of the file when unset.
    pub fn creation_date(mut self, stamp: NaiveDateTime) -> Self {
        self.creation_date = Some(stamp);
        self
    }

    /// JSONL trace of page breaks, column breaks and placed bands.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn on_begin(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hooks.begin = Some(Box::new(hook));
        self
    }

    /// Called with the record number before each record is processed.
    pub fn on_iteration(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.hooks.iteration = Some(Box::new(hook));
        self
    }

    pub fn on_cancel(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hooks.cancel = Some(Box::new(hook));
        self
    }

    pub fn on_end(mut self, hook: impl FnMut(&WriteSummary) + Send + 'static) -> Self {
        self.hooks.end = Some(Box::new(hook));
        self
    }

    /// A handle that cancels the running report from a hook or another
    /// thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Loads the form if needed and returns it.
    pub fn report_form(&mut self) -> Result<&ReportForm> {
        if let Some(source) = self.source.take() {
            let form = match source {
                FormSource::Form(form) => form,
                FormSource::Xml(xml) => serializer::from_xml(&xml)?,
                FormSource::File(path) => {
                    if self.options.home_directory.is_none() {
                        self.options.home_directory = path.parent().map(Path::to_path_buf);
                    }
                    serializer::load_form_file(&path)?
                }
            };
            self.form = Some(form);
        }
        self.form
            .as_ref()
            .ok_or_else(|| ReportError::FormLoad("no report form has been set".to_string()))
    }

    /// Runs the report. With `save`, the PDF is written to the output as
    /// well.
    pub fn write(&mut self, save: bool) -> Result<WriteSummary> {
        self.report_form()?;
        let Some(form) = self.form.as_ref() else {
            return Err(ReportError::FormLoad("no report form has been set".to_string()));
        };
        let test_rows;
        let cursor: &[Record] = if self.use_test_cursor {
            test_rows = test_cursor_rows(form);
            &test_rows
        } else {
            &self.cursor
        };

        let fonts = FontRegistry::global();
        for path in &self.font_paths {
            fonts.add_search_path(path.clone());
        }
        for (face, path) in &self.font_files {
            fonts.map_face(face, path.clone());
        }
        let debug = self.debug_path.as_ref().map(DebugLogger::new).transpose()?;

        self.token.reset();
        self.result = None;
        if let Some(hook) = self.hooks.begin.as_mut() {
            hook();
        }
        let run = Engine::new(form, &fonts, &self.options, debug.as_ref()).and_then(|engine| {
            let mut observer = HookObserver {
                hooks: &mut self.hooks,
                token: &self.token,
            };
            engine.run(cursor, &mut observer)
        });
        if let Some(debug) = &debug {
            debug.emit_summary("write");
            debug.flush();
        }
        let output = run?;

        let summary = WriteSummary {
            page_count: output.page_count,
            record_count: output.metrics.record_count,
            record_numbers: output.record_numbers.clone(),
            metrics: output.metrics.clone(),
        };
        log::debug!(
            "report finished: {} pages, {} records",
            summary.page_count,
            summary.record_count
        );
        self.result = Some(output);
        if save {
            self.save()?;
        }
        if let Some(hook) = self.hooks.end.as_mut() {
            hook(&summary);
        }
        Ok(summary)
    }

    /// Writes the last run's PDF to the output file or stream.
    pub fn save(&mut self) -> Result<usize> {
        let Some(result) = self.result.as_ref() else {
            return Err(ReportError::NothingToSave);
        };
        let options = self.pdf_options();
        let fonts = FontRegistry::global();
        let written = match self.output.as_mut() {
            Some(Output::File(path)) => {
                let mut file = BufWriter::new(File::create(&*path)?);
                let written = pdf::write_document(&result.document, &fonts, &options, &mut file)?;
                file.flush()?;
                written
            }
            Some(Output::Stream(stream)) => {
                let written = pdf::write_document(&result.document, &fonts, &options, stream)?;
                stream.flush()?;
                written
            }
            None => return Err(ReportError::NoOutput),
        };
        Ok(written)
    }

    fn pdf_options(&self) -> PdfOptions {
        let mut options = PdfOptions {
            creation_date: self.creation_date,
            ..PdfOptions::default()
        };
        if let Some(form) = self.form.as_ref() {
            let evaluator = Evaluator::new();
            let props = PropReader::new(form, &evaluator, &LiteralScope);
            let root = form.root();
            let meta = |name: &str| props.text(root, name).filter(|text| !text.is_empty());
            options.title = meta("Title");
            options.author = meta("Author");
            options.subject = meta("Subject");
            options.keywords = meta("Keywords");
        }
        options
    }

    /// Page number at the end of the last run.
    pub fn page_number(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.page_number)
    }

    pub fn page_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.page_count)
    }

    pub fn record_number(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.record_number)
    }

    /// The last record processed.
    pub fn record(&self) -> Option<&Record> {
        self.result.as_ref().map(|r| &r.record)
    }

    /// Where each band was last drawn, by band name.
    pub fn bands(&self) -> Option<&BTreeMap<String, BandPlacement>> {
        self.result.as_ref().map(|r| &r.bands)
    }

    pub fn document(&self) -> Option<&Document> {
        self.result.as_ref().map(|r| &r.document)
    }
}

/// Rows of the form's test cursor. Each field is a literal expression; text
/// that does not parse is taken as a plain string.
fn test_cursor_rows(form: &ReportForm) -> Vec<Record> {
    let evaluator = Evaluator::new();
    form.test_cursor()
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(field, source)| {
                    let value = evaluator
                        .eval(&source, &LiteralScope)
                        .unwrap_or_else(|_| Value::Str(source.clone()));
                    (field, value)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectType;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str, ext: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "reportwriter_{tag}_{}_{}.{ext}",
            std::process::id(),
            nanos
        ))
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn page_count_form() -> ReportForm {
        let mut form = ReportForm::new();
        let root = form.root();
        form.set_prop(root, "Title", "'Totals'");
        let footer = form.band(ObjectType::PageFooter).expect("footer");
        let text = form.add_object(footer, ObjectType::String);
        form.set_prop(text, "expr", "'Page %s of %s' % (self.PageNumber, self.PageCount)");
        form.set_prop(text, "Width", "200");
        let detail = form.band(ObjectType::Detail).expect("detail");
        form.set_prop(detail, "Height", "300");
        let name = form.add_object(detail, ObjectType::String);
        form.set_prop(name, "expr", "name");
        form
    }

    fn rows(names: &[&str]) -> Vec<Record> {
        names
            .iter()
            .map(|name| Record::from([("name".to_string(), Value::from(*name))]))
            .collect()
    }

    #[test]
    fn writes_a_pdf_with_stamped_page_counts() {
        let buffer = SharedBuffer::default();
        let mut writer = ReportWriter::new()
            .form(page_count_form())
            .cursor(rows(&["a", "b", "c", "d", "e"]))
            .output_stream(buffer.clone());
        let summary = writer.write(true).expect("write");
        // Two 300 pt details per page.
        assert_eq!(summary.page_count, 3);
        assert_eq!(summary.record_numbers, vec![0, 1, 2, 3, 4]);
        assert_eq!(writer.page_count(), 3);
        assert_eq!(writer.record_number(), 4);
        assert_eq!(
            writer.record().and_then(|r| r.get("name")),
            Some(&Value::from("e"))
        );

        let bytes = buffer.0.lock().expect("buffer").clone();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Title (Totals)"));
        assert!(!text.contains("CreationDate"));

        let stamps: Vec<String> = writer
            .document()
            .expect("document")
            .pages
            .iter()
            .map(|page| {
                page.commands
                    .iter()
                    .filter_map(|c| match c {
                        crate::canvas::Command::DrawString { text, .. } if text.starts_with("Page") => {
                            Some(text.clone())
                        }
                        _ => None,
                    })
                    .collect::<String>()
            })
            .collect();
        assert_eq!(stamps, vec!["Page 1 of 3", "Page 2 of 3", "Page 3 of 3"]);
    }

    #[test]
    fn xml_forms_and_files_load_on_write() {
        let xml = serializer::to_xml(&page_count_form());
        let mut writer = ReportWriter::new().form_xml(xml.clone()).cursor(rows(&["x"]));
        assert_eq!(writer.write(false).expect("write").page_count, 1);

        let form_path = temp_path("form", "rfxml");
        std::fs::write(&form_path, &xml).expect("write form");
        let pdf_path = form_path.with_extension("pdf");
        let mut writer = ReportWriter::new()
            .form_file(&form_path)
            .cursor(rows(&["x"]))
            .output_file(&pdf_path);
        writer.write(true).expect("write");
        let bytes = std::fs::read(&pdf_path).expect("pdf");
        assert!(bytes.ends_with(b"%%EOF\n"));
        let _ = std::fs::remove_file(form_path);
        let _ = std::fs::remove_file(pdf_path);
    }

    #[test]
    fn malformed_xml_fails_before_any_page() {
        let mut writer = ReportWriter::new().form_xml("<report><Page>");
        assert!(matches!(writer.write(false), Err(ReportError::FormLoad(_))));
        assert!(writer.document().is_none());
    }

    #[test]
    fn test_cursor_rows_are_literals() {
        let mut form = page_count_form();
        form.set_test_cursor(vec![
            BTreeMap::from([("name".to_string(), "'first'".to_string())]),
            BTreeMap::from([("name".to_string(), "plain words".to_string())]),
        ]);
        let rows = test_cursor_rows(&form);
        assert_eq!(rows[0]["name"], Value::from("first"));
        assert_eq!(rows[1]["name"], Value::from("plain words"));

        let mut writer = ReportWriter::new().form(form).use_test_cursor(true);
        assert_eq!(writer.write(false).expect("write").record_count, 2);
    }

    #[test]
    fn cancel_from_a_hook_stops_the_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut writer = ReportWriter::new()
            .form(page_count_form())
            .cursor(rows(&["a", "b", "c"]));
        let token = writer.cancel_token();
        let log = seen.clone();
        let flag = cancelled.clone();
        writer = writer
            .on_iteration(move |n| {
                log.lock().expect("log").push(n);
                if n == 1 {
                    token.cancel();
                }
            })
            .on_cancel(move || flag.store(true, Ordering::SeqCst));
        assert!(matches!(writer.write(true), Err(ReportError::Cancelled)));
        assert_eq!(*seen.lock().expect("log"), vec![0, 1]);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(matches!(writer.save(), Err(ReportError::NothingToSave)));
    }

    #[test]
    fn save_needs_an_output() {
        let mut writer = ReportWriter::new().form(ReportForm::new());
        writer.write(false).expect("write");
        assert!(matches!(writer.save(), Err(ReportError::NoOutput)));
        assert!(writer.bands().is_some_and(|bands| !bands.contains_key("Detail")));
    }

    #[test]
    fn bundled_sample_renders_from_its_test_cursor() {
        let form = serializer::from_xml(include_str!("../demos/sample.rfxml")).expect("sample");
        let mut writer = ReportWriter::new().form(form).use_test_cursor(true);
        let summary = writer.write(false).expect("write");
        assert_eq!(summary.record_count, 6);
        assert_eq!(summary.page_count, 1);
        let texts: Vec<String> = writer.document().expect("document").pages[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                crate::canvas::Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert!(texts.iter().any(|t| t == "Region: North"));
        assert!(texts.iter().any(|t| t == "Subtotal 242.75"));
        assert!(texts.iter().any(|t| t == "Grand total 666.50"));
        assert!(texts.iter().any(|t| t == "Page 1 of 1"));
    }

    #[test]
    fn hooks_bracket_the_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (begin, end) = (events.clone(), events.clone());
        let mut writer = ReportWriter::new()
            .form(ReportForm::new())
            .cursor(rows(&["a"]))
            .on_begin(move || begin.lock().expect("events").push("begin".to_string()))
            .on_end(move |summary| {
                end.lock()
                    .expect("events")
                    .push(format!("end {}", summary.page_count))
            });
        writer.write(false).expect("write");
        assert_eq!(*events.lock().expect("events"), vec!["begin", "end 1"]);
    }
}
