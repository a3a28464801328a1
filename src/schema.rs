//! Object types of a report form and the properties each one declares.
//!
//! Property defaults are expression sources, exactly as a form author would
//! write them, so a default can be shown, serialized or evaluated the same
//! way as an explicit value.

/// Value family of a property. Drives the typed accessors in
/// [`crate::props`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Length,
    Number,
    Int,
    Bool,
    Color,
    Text,
    Choice(&'static [&'static str]),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropDef {
    pub name: &'static str,
    pub kind: PropKind,
    pub default: &'static str,
    pub doc: &'static str,
}

const fn prop(
    name: &'static str,
    kind: PropKind,
    default: &'static str,
    doc: &'static str,
) -> PropDef {
    PropDef {
        name,
        kind,
        default,
        doc,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Report,
    Page,
    Defaults,
    TestCursor,
    TestRecord,
    Group,
    Variable,
    PageBackground,
    PageHeader,
    Detail,
    PageFooter,
    PageForeground,
    ReportBegin,
    ReportEnd,
    GroupHeader,
    GroupFooter,
    Rectangle,
    RoundedRectangle,
    Ellipse,
    Arc,
    EllipticArc,
    Line,
    SpanningLine,
    SpanningRectangle,
    String,
    Memo,
    Frameset,
    Paragraph,
    Image,
    BarGraph,
}

const ANCHOR_H: &[&str] = &["left", "center", "right"];
const ANCHOR_V: &[&str] = &["bottom", "middle", "top"];
const ALIGN: &[&str] = &["left", "center", "right"];

const REPORT_PROPS: &[PropDef] = &[
    prop("Title", PropKind::Text, "''", "Document title, also written to the PDF info."),
    prop("Author", PropKind::Text, "''", "Document author."),
    prop("Subject", PropKind::Text, "''", "Document subject."),
    prop("Keywords", PropKind::Text, "''", "Document keywords."),
    prop("ColumnCount", PropKind::Int, "1", "Number of detail columns per page."),
    prop("ColumnPadding", PropKind::Length, "0", "Gap between detail columns."),
    prop("StringifyDates", PropKind::Bool, "True", "Format date values with the date format."),
];

const PAGE_PROPS: &[PropDef] = &[
    prop("MarginLeft", PropKind::Length, "'.5 in'", "Left page margin."),
    prop("MarginRight", PropKind::Length, "'.5 in'", "Right page margin."),
    prop("MarginTop", PropKind::Length, "'.5 in'", "Top page margin."),
    prop("MarginBottom", PropKind::Length, "'.5 in'", "Bottom page margin."),
    prop(
        "Orientation",
        PropKind::Choice(&["portrait", "landscape"]),
        "'portrait'",
        "Page orientation.",
    ),
    prop("Size", PropKind::Any, "'letter'", "Named page size or a (width, height) tuple."),
];

const GROUP_PROPS: &[PropDef] = &[
    prop("expr", PropKind::Any, "None", "Grouping expression; a change starts a new group."),
    prop("StartOnNewPage", PropKind::Bool, "False", "Begin each group on a new page."),
    prop("StartOnNewColumn", PropKind::Bool, "False", "Begin each group in a new column."),
    prop(
        "ReprintHeaderOnNewPage",
        PropKind::Bool,
        "False",
        "Repeat the group header at the top of each new page.",
    ),
    prop(
        "ReprintHeaderOnNewColumn",
        PropKind::Bool,
        "False",
        "Repeat the group header at the top of each new column.",
    ),
    prop("ResetPageNumber", PropKind::Bool, "False", "Restart page numbering at each group."),
];

const VARIABLE_PROPS: &[PropDef] = &[
    prop("Name", PropKind::Text, "None", "Name the variable is published under."),
    prop("InitialValue", PropKind::Any, "0", "Value the variable resets to."),
    prop("expr", PropKind::Any, "None", "Expression evaluated once per record."),
    prop("ResetAt", PropKind::Any, "None", "The variable resets when this value changes."),
];

const BAND_PROPS: &[PropDef] = &[
    prop("Height", PropKind::Length, "0", "Band height; None grows to fit the contents."),
    prop("Show", PropKind::Bool, "True", "Whether the band prints."),
    prop("DesignerLock", PropKind::Bool, "False", "Locks the band in a form designer."),
];

const HEADER_FOOTER_HEIGHT: &[PropDef] = &[prop(
    "Height",
    PropKind::Length,
    "'.75 in'",
    "Band height; None grows to fit the contents.",
)];

const DETAIL_HEIGHT: &[PropDef] = &[prop(
    "Height",
    PropKind::Length,
    "'.25 in'",
    "Band height; None grows to fit the contents.",
)];

const BREAK_PROPS: &[PropDef] = &[
    prop("PageBreakBefore", PropKind::Bool, "False", "Start a new page before the band."),
    prop("PageBreakAfter", PropKind::Bool, "False", "Start a new page after the band."),
    prop("ColumnBreakAfter", PropKind::Bool, "False", "Start a new column after the band."),
];

const GROUP_FOOTER_PROPS: &[PropDef] = &[prop(
    "PrintAtBottom",
    PropKind::Bool,
    "False",
    "Pin the footer just above the page footer.",
)];

const DRAWABLE_PROPS: &[PropDef] = &[
    prop("x", PropKind::Length, "0", "Horizontal position inside the band."),
    prop("y", PropKind::Length, "0", "Vertical position inside the band, from its bottom."),
    prop("Width", PropKind::Length, "55", "Object width."),
    prop("Height", PropKind::Length, "18", "Object height."),
    prop("Rotation", PropKind::Number, "0", "Rotation in degrees, counter-clockwise."),
    prop("hAnchor", PropKind::Choice(ANCHOR_H), "'left'", "Which edge x refers to."),
    prop("vAnchor", PropKind::Choice(ANCHOR_V), "'bottom'", "Which edge y refers to."),
    prop("Show", PropKind::Bool, "True", "Whether the object prints."),
    prop("DesignerLock", PropKind::Bool, "False", "Locks the object in a form designer."),
];

const STROKE_PROPS: &[PropDef] = &[
    prop("StrokeColor", PropKind::Color, "(0, 0, 0)", "Outline color."),
    prop("StrokeWidth", PropKind::Length, "1", "Outline width; 0 draws no outline."),
    prop("StrokeDashArray", PropKind::Any, "None", "Dash pattern, e.g. (2, 2)."),
];

const FILL_PROPS: &[PropDef] = &[prop("FillColor", PropKind::Color, "None", "Fill color; None leaves the shape unfilled.")];

const RADIUS_PROPS: &[PropDef] = &[prop("Radius", PropKind::Length, "6", "Corner or arc radius.")];

const ANGLE_PROPS: &[PropDef] = &[
    prop("StartAngle", PropKind::Number, "0", "Start angle in degrees from +x."),
    prop("EndAngle", PropKind::Number, "90", "End angle in degrees from +x."),
];

const LINE_PROPS: &[PropDef] = &[
    prop("LineCap", PropKind::Choice(&["butt", "round", "square"]), "'butt'", "Line end style."),
    prop(
        "LineSlant",
        PropKind::Choice(&["-", "|", "/", "\\"]),
        "'-'",
        "Which line inside the box gets drawn.",
    ),
];

const SPANNING_PROPS: &[PropDef] = &[
    prop("xFooter", PropKind::Length, "0", "End x inside the matching footer."),
    prop("yFooter", PropKind::Length, "0", "End y inside the matching footer."),
];

const FONT_PROPS: &[PropDef] = &[
    prop("FontName", PropKind::Text, "'Helvetica'", "Font face."),
    prop("FontSize", PropKind::Length, "10", "Font size in points."),
    prop("FontBold", PropKind::Bool, "False", "Use the bold face."),
    prop("FontItalic", PropKind::Bool, "False", "Use the italic face."),
    prop("FontColor", PropKind::Color, "(0, 0, 0)", "Text color."),
];

const BORDER_PROPS: &[PropDef] = &[
    prop("BorderWidth", PropKind::Length, "0", "Border width; 0 draws no border."),
    prop("BorderColor", PropKind::Color, "(0, 0, 0)", "Border color."),
];

const STRING_PROPS: &[PropDef] = &[
    prop("expr", PropKind::Any, "'< New String Object >'", "Text to print."),
    prop("Align", PropKind::Choice(ALIGN), "'left'", "Horizontal alignment inside Width."),
    prop("Height", PropKind::Length, "None", "Box height; None uses the font size."),
    prop("ScalePercent", PropKind::Any, "(100, 100)", "Horizontal and vertical scaling."),
];

const TEXT_BLOCK_PROPS: &[PropDef] = &[
    prop("Leading", PropKind::Any, "'single'", "Line spacing: points, or 'single'/'double' with +/- steps."),
    prop("FirstLineIndent", PropKind::Length, "0", "Indent of each paragraph's first line."),
    prop("Align", PropKind::Choice(ALIGN), "'left'", "Horizontal alignment of lines."),
];

const MEMO_PROPS: &[PropDef] = &[
    prop("expr", PropKind::Any, "''", "Text with optional <b>, <i>, <u>, <br/> and <font> markup."),
    prop("Width", PropKind::Length, "None", "Frame width; None spans the column."),
    prop("Height", PropKind::Length, "None", "Frame height; None grows to fit."),
    prop("ColumnCount", PropKind::Int, "1", "Text columns inside the frame."),
    prop("ColumnPadding", PropKind::Length, "6", "Gap between text columns."),
    prop("PadLeft", PropKind::Length, "0", "Inner left padding."),
    prop("PadRight", PropKind::Length, "0", "Inner right padding."),
    prop("PadTop", PropKind::Length, "0", "Inner top padding."),
    prop("PadBottom", PropKind::Length, "0", "Inner bottom padding."),
];

const PARAGRAPH_PROPS: &[PropDef] = &[prop("expr", PropKind::Any, "''", "Paragraph text.")];

const IMAGE_PROPS: &[PropDef] = &[
    prop("expr", PropKind::Any, "None", "Image path or image bytes."),
    prop("ImageMask", PropKind::Any, "None", "Apply the image's alpha channel as a mask."),
    prop(
        "ScaleMode",
        PropKind::Choice(&["scale", "clip", "proportional"]),
        "'scale'",
        "How the image fills its box.",
    ),
];

const BARGRAPH_PROPS: &[PropDef] = &[
    prop("expr", PropKind::Any, "[]", "Values, or a list of series."),
    prop("Labels", PropKind::Any, "None", "Category labels."),
    prop("Title", PropKind::Text, "None", "Graph title."),
    prop("XLabel", PropKind::Text, "None", "Category axis caption."),
    prop("YLabel", PropKind::Text, "None", "Value axis caption."),
    prop(
        "Orientation",
        PropKind::Choice(&["vertical", "horizontal"]),
        "'vertical'",
        "Bar direction.",
    ),
    prop("Log", PropKind::Bool, "False", "Logarithmic value axis."),
    prop("ShowValueGrid", PropKind::Bool, "True", "Grid lines across the value axis."),
    prop("ShowCategoryGrid", PropKind::Bool, "False", "Grid lines between categories."),
    prop("BarColors", PropKind::Any, "None", "One color per series."),
    prop("GridColor", PropKind::Color, "(0.85, 0.85, 0.85)", "Grid line color."),
    prop("AxisColor", PropKind::Color, "(0, 0, 0)", "Axis line color."),
    prop("FontSize", PropKind::Length, "7", "Label font size."),
    prop("FontName", PropKind::Text, "'Helvetica'", "Label font face."),
    prop("Width", PropKind::Length, "200", "Graph width."),
    prop("Height", PropKind::Length, "120", "Graph height."),
];

/// Lowercase spellings older forms used for element names.
const LEGACY_NAMES: &[(&str, ObjectType)] = &[
    ("rect", ObjectType::Rectangle),
    ("roundrect", ObjectType::RoundedRectangle),
    ("spanline", ObjectType::SpanningLine),
    ("spanrect", ObjectType::SpanningRectangle),
    ("record", ObjectType::TestRecord),
    ("frame", ObjectType::Frameset),
    ("para", ObjectType::Paragraph),
    ("graph", ObjectType::BarGraph),
];

impl ObjectType {
    pub const ALL: [ObjectType; 30] = [
        ObjectType::Report,
        ObjectType::Page,
        ObjectType::Defaults,
        ObjectType::TestCursor,
        ObjectType::TestRecord,
        ObjectType::Group,
        ObjectType::Variable,
        ObjectType::PageBackground,
        ObjectType::PageHeader,
        ObjectType::Detail,
        ObjectType::PageFooter,
        ObjectType::PageForeground,
        ObjectType::ReportBegin,
        ObjectType::ReportEnd,
        ObjectType::GroupHeader,
        ObjectType::GroupFooter,
        ObjectType::Rectangle,
        ObjectType::RoundedRectangle,
        ObjectType::Ellipse,
        ObjectType::Arc,
        ObjectType::EllipticArc,
        ObjectType::Line,
        ObjectType::SpanningLine,
        ObjectType::SpanningRectangle,
        ObjectType::String,
        ObjectType::Memo,
        ObjectType::Frameset,
        ObjectType::Paragraph,
        ObjectType::Image,
        ObjectType::BarGraph,
    ];

    /// Bands every report owns, in serialization order.
    pub const REPORT_BANDS: [ObjectType; 7] = [
        ObjectType::PageBackground,
        ObjectType::PageHeader,
        ObjectType::ReportBegin,
        ObjectType::Detail,
        ObjectType::ReportEnd,
        ObjectType::PageFooter,
        ObjectType::PageForeground,
    ];

    /// Element name used in rfxml.
    pub fn element_name(self) -> &'static str {
        match self {
            ObjectType::Report => "report",
            ObjectType::Page => "page",
            ObjectType::Defaults => "defaults",
            ObjectType::TestCursor => "testcursor",
            ObjectType::TestRecord => "record",
            ObjectType::Group => "Group",
            ObjectType::Variable => "Variable",
            ObjectType::PageBackground => "pageBackground",
            ObjectType::PageHeader => "pageHeader",
            ObjectType::Detail => "detail",
            ObjectType::PageFooter => "pageFooter",
            ObjectType::PageForeground => "pageForeground",
            ObjectType::ReportBegin => "reportBegin",
            ObjectType::ReportEnd => "reportEnd",
            ObjectType::GroupHeader => "groupHeader",
            ObjectType::GroupFooter => "groupFooter",
            ObjectType::Rectangle => "Rectangle",
            ObjectType::RoundedRectangle => "RoundedRectangle",
            ObjectType::Ellipse => "Ellipse",
            ObjectType::Arc => "Arc",
            ObjectType::EllipticArc => "EllipticArc",
            ObjectType::Line => "Line",
            ObjectType::SpanningLine => "SpanningLine",
            ObjectType::SpanningRectangle => "SpanningRectangle",
            ObjectType::String => "String",
            ObjectType::Memo => "Memo",
            ObjectType::Frameset => "Frameset",
            ObjectType::Paragraph => "Paragraph",
            ObjectType::Image => "Image",
            ObjectType::BarGraph => "BarGraph",
        }
    }

    /// Display name, also the `type` key of `.py` form modules.
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectType::TestRecord => "Record",
            ObjectType::PageBackground => "PageBackground",
            ObjectType::PageHeader => "PageHeader",
            ObjectType::Detail => "Detail",
            ObjectType::PageFooter => "PageFooter",
            ObjectType::PageForeground => "PageForeground",
            ObjectType::ReportBegin => "ReportBegin",
            ObjectType::ReportEnd => "ReportEnd",
            ObjectType::GroupHeader => "GroupHeader",
            ObjectType::GroupFooter => "GroupFooter",
            ObjectType::Report => "Report",
            ObjectType::Page => "Page",
            ObjectType::Defaults => "Defaults",
            ObjectType::TestCursor => "TestCursor",
            other => other.element_name(),
        }
    }

    /// Resolves an element or type name, case-insensitively, including the
    /// legacy spellings.
    pub fn from_name(name: &str) -> Option<ObjectType> {
        let wanted = name.trim();
        ObjectType::ALL
            .iter()
            .copied()
            .find(|ty| {
                ty.element_name().eq_ignore_ascii_case(wanted)
                    || ty.type_name().eq_ignore_ascii_case(wanted)
            })
            .or_else(|| {
                LEGACY_NAMES
                    .iter()
                    .find(|(legacy, _)| legacy.eq_ignore_ascii_case(wanted))
                    .map(|(_, ty)| *ty)
            })
    }

    pub fn is_band(self) -> bool {
        matches!(
            self,
            ObjectType::PageBackground
                | ObjectType::PageHeader
                | ObjectType::Detail
                | ObjectType::PageFooter
                | ObjectType::PageForeground
                | ObjectType::ReportBegin
                | ObjectType::ReportEnd
                | ObjectType::GroupHeader
                | ObjectType::GroupFooter
        )
    }

    pub fn is_drawable(self) -> bool {
        matches!(
            self,
            ObjectType::Rectangle
                | ObjectType::RoundedRectangle
                | ObjectType::Ellipse
                | ObjectType::Arc
                | ObjectType::EllipticArc
                | ObjectType::Line
                | ObjectType::SpanningLine
                | ObjectType::SpanningRectangle
                | ObjectType::String
                | ObjectType::Memo
                | ObjectType::Frameset
                | ObjectType::Image
                | ObjectType::BarGraph
        )
    }

    pub fn is_spanning(self) -> bool {
        matches!(self, ObjectType::SpanningLine | ObjectType::SpanningRectangle)
    }

    /// Drawables whose height can come from their content.
    pub fn is_flowing(self) -> bool {
        matches!(self, ObjectType::Memo | ObjectType::Frameset)
    }

    fn prop_tables(self) -> &'static [&'static [PropDef]] {
        match self {
            ObjectType::Report => &[REPORT_PROPS],
            ObjectType::Page => &[PAGE_PROPS],
            ObjectType::Group => &[GROUP_PROPS],
            ObjectType::Variable => &[VARIABLE_PROPS],
            ObjectType::Defaults | ObjectType::TestCursor | ObjectType::TestRecord => &[],
            ObjectType::PageHeader | ObjectType::PageFooter => &[HEADER_FOOTER_HEIGHT, BAND_PROPS],
            ObjectType::Detail | ObjectType::GroupHeader => &[DETAIL_HEIGHT, BAND_PROPS],
            ObjectType::GroupFooter => &[DETAIL_HEIGHT, GROUP_FOOTER_PROPS, BAND_PROPS],
            ObjectType::ReportBegin | ObjectType::ReportEnd => &[BREAK_PROPS, BAND_PROPS],
            ObjectType::PageBackground | ObjectType::PageForeground => &[BAND_PROPS],
            ObjectType::Rectangle | ObjectType::Ellipse => {
                &[FILL_PROPS, STROKE_PROPS, DRAWABLE_PROPS]
            }
            ObjectType::RoundedRectangle => &[RADIUS_PROPS, FILL_PROPS, STROKE_PROPS, DRAWABLE_PROPS],
            ObjectType::Arc => &[RADIUS_PROPS, ANGLE_PROPS, FILL_PROPS, STROKE_PROPS, DRAWABLE_PROPS],
            ObjectType::EllipticArc => &[ANGLE_PROPS, FILL_PROPS, STROKE_PROPS, DRAWABLE_PROPS],
            ObjectType::Line => &[LINE_PROPS, STROKE_PROPS, DRAWABLE_PROPS],
            ObjectType::SpanningLine => &[SPANNING_PROPS, LINE_PROPS, STROKE_PROPS, DRAWABLE_PROPS],
            ObjectType::SpanningRectangle => {
                &[SPANNING_PROPS, FILL_PROPS, STROKE_PROPS, DRAWABLE_PROPS]
            }
            ObjectType::String => &[STRING_PROPS, FONT_PROPS, BORDER_PROPS, DRAWABLE_PROPS],
            ObjectType::Memo => &[
                MEMO_PROPS,
                TEXT_BLOCK_PROPS,
                FONT_PROPS,
                BORDER_PROPS,
                DRAWABLE_PROPS,
            ],
            ObjectType::Frameset => &[MEMO_PROPS, BORDER_PROPS, DRAWABLE_PROPS],
            ObjectType::Paragraph => &[PARAGRAPH_PROPS, TEXT_BLOCK_PROPS, FONT_PROPS],
            ObjectType::Image => &[IMAGE_PROPS, BORDER_PROPS, DRAWABLE_PROPS],
            ObjectType::BarGraph => &[BARGRAPH_PROPS, DRAWABLE_PROPS],
        }
    }

    /// Declared property by name. Earlier tables override later ones, so a
    /// type-specific default shadows the generic one.
    pub fn prop(self, name: &str) -> Option<&'static PropDef> {
        self.prop_tables()
            .iter()
            .flat_map(|table| table.iter())
            .find(|def| def.name == name)
    }

    /// All declared properties, overridden entries removed.
    pub fn props(self) -> Vec<&'static PropDef> {
        let mut out: Vec<&'static PropDef> = Vec::new();
        for def in self.prop_tables().iter().flat_map(|table| table.iter()) {
            if !out.iter().any(|seen| seen.name == def.name) {
                out.push(def);
            }
        }
        out
    }

    /// True for declared properties and their `_def` shadows.
    pub fn accepts(self, name: &str) -> bool {
        let base = name.strip_suffix("_def").unwrap_or(name);
        self.prop(base).is_some()
    }
}
