mod band;
mod bargraph;
mod canvas;
mod debug;
mod encoding;
mod engine;
mod error;
pub mod expr;
mod font;
mod memo;
mod metrics;
mod model;
mod pdf;
mod props;
mod render;
pub mod schema;
pub mod serializer;
mod standard_fonts;
mod types;
pub mod units;
mod writer;

pub use bargraph::{BarGraph, series_from_value};
pub use canvas::{Canvas, Command, Document, ImageRef, LineCap, Page, Paint, Stroke};
pub use encoding::decode_bytes;
pub use engine::{BandPlacement, Record};
pub use error::{ReportError, Result};
pub use expr::{Decimal, Evaluator, ExprError, LiteralScope, Scope, Value};
pub use font::FontRegistry;
pub use memo::{Align, Leading, MemoFrame, ParagraphSpec, Story, TextStyle, parse_markup};
pub use metrics::{PageMetrics, RunMetrics};
pub use model::{Memento, Node, NodeId, ReportForm};
pub use pdf::{PdfOptions, write_document};
pub use props::{PropOrigin, PropReader, raw_source, source_chain};
pub use schema::{ObjectType, PropDef, PropKind};
pub use types::{Color, Margins, Pt, Rect, Size};
pub use writer::{CancelToken, ReportWriter, WriteSummary};
