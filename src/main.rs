//! # reportwriter CLI
//!
//! Renders report forms over their embedded test cursors.
//!
//! ```bash
//! # Writes invoice.pdf next to invoice.rfxml
//! reportwriter invoice.rfxml
//!
//! # Renders the bundled sample to tempfile.pdf
//! reportwriter tempfile
//! ```

use clap::Parser;
use reportwriter::{ReportError, ReportWriter, WriteSummary, serializer};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const SAMPLE_FORM: &str = include_str!("../demos/sample.rfxml");

/// Banded PDF report writer
#[derive(Parser, Debug)]
#[command(name = "reportwriter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Form files (.rfxml or .py); `tempfile` renders the bundled sample
    #[arg(required = true)]
    forms: Vec<String>,

    /// Draw a labelled outline around every band
    #[arg(long)]
    outlines: bool,

    /// Log a status line per record
    #[arg(long)]
    status: bool,

    /// Write a JSONL pagination trace
    #[arg(long, value_name = "FILE")]
    debug_log: Option<PathBuf>,

    /// Extra directory to search for TrueType fonts
    #[arg(long = "font-path", value_name = "DIR")]
    font_paths: Vec<PathBuf>,
}

impl Cli {
    fn configure(&self, mut writer: ReportWriter) -> ReportWriter {
        writer = writer
            .use_test_cursor(true)
            .show_band_outlines(self.outlines)
            .print_status(self.status);
        if let Some(path) = &self.debug_log {
            writer = writer.debug_log(path);
        }
        for path in &self.font_paths {
            writer = writer.font_path(path);
        }
        writer
    }
}

fn render_sample(cli: &Cli) -> Result<WriteSummary, ReportError> {
    let form = serializer::from_xml(SAMPLE_FORM)?;
    let output = BufWriter::new(File::create("tempfile.pdf")?);
    let mut writer = cli.configure(ReportWriter::new().form(form).output_stream(output));
    writer.write(true)
}

fn render_form(cli: &Cli, path: &Path) -> Result<WriteSummary, ReportError> {
    let mut writer = cli.configure(
        ReportWriter::new()
            .form_file(path)
            .output_file(path.with_extension("pdf")),
    );
    writer.write(true)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut failed = false;
    for name in &cli.forms {
        let result = if name == "tempfile" {
            render_sample(&cli)
        } else {
            render_form(&cli, Path::new(name))
        };
        match result {
            Ok(summary) => println!(
                "{name}: {} page(s), {} record(s)",
                summary.page_count, summary.record_count
            ),
            Err(err) => {
                eprintln!("{name}: {err}");
                failed = true;
            }
        }
    }
    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
