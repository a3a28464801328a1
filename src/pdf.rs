use crate::canvas::{Command, Document, Page};
use crate::encoding::encode_winansi;
use crate::font::{substitute_face, FontProgramKind, FontRegistry, RegisteredFont};
use crate::standard_fonts;
use crate::types::{Color, Pt};
use base64::Engine;
use chrono::NaiveDateTime;
use fixed::types::I32F32;
use image::GenericImageView;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_INFO_ID: usize = 3;
const PDF_FIRST_FREE_ID: usize = 4;

/// Document-level settings for the serializer.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    /// Written as /CreationDate when set; left out otherwise so identical
    /// runs produce identical bytes.
    pub creation_date: Option<NaiveDateTime>,
    pub compress: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            subject: None,
            keywords: None,
            creation_date: None,
            compress: true,
        }
    }
}

enum FontResource {
    Base14(&'static str),
    Embedded(Arc<RegisteredFont>),
}

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Serializes finished pages into a PDF file. Catalog, page tree and info
/// have fixed object numbers; fonts, images and pages follow in first-use
/// order, so the output depends only on the document.
pub(crate) struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    offsets: Vec<usize>,
    next_id: usize,
    options: &'a PdfOptions,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut W, options: &'a PdfOptions) -> io::Result<Self> {
        let mut offset = 0;
        write_bytes(writer, b"%PDF-1.4\n", &mut offset)?;
        write_bytes(writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![0; PDF_FIRST_FREE_ID],
            next_id: PDF_FIRST_FREE_ID,
            options,
        })
    }

    fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.offsets.push(0);
        id
    }

    fn write_object(&mut self, obj_id: usize, body: &[u8]) -> io::Result<()> {
        write_pdf_object(self.writer, &mut self.offset, &mut self.offsets, obj_id, body)
    }

    fn write_stream(&mut self, obj_id: usize, dict: &str, data: &[u8]) -> io::Result<()> {
        let mut body = Vec::with_capacity(data.len() + dict.len() + 32);
        body.extend_from_slice(
            format!("<< /Length {}{} >>\nstream\n", data.len(), dict).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.write_object(obj_id, &body)
    }

    pub(crate) fn write_document(
        mut self,
        document: &Document,
        registry: &FontRegistry,
    ) -> io::Result<usize> {
        let info = info_object(self.options);
        self.write_object(PDF_INFO_ID, info.as_bytes())?;

        let mut font_ids: BTreeMap<String, String> = BTreeMap::new();
        let mut font_entries: Vec<(String, usize)> = Vec::new();
        for name in collect_font_names(document) {
            let resource = format!("F{}", font_entries.len() + 1);
            let id = self.write_font(&name, registry)?;
            font_ids.insert(name, resource.clone());
            font_entries.push((resource, id));
        }

        let mut image_names: HashMap<String, String> = HashMap::new();
        let mut image_entries: Vec<(String, usize)> = Vec::new();
        for (source, mask) in collect_image_sources(document) {
            let Some(image) = load_image(&source) else {
                log::error!("image '{}' could not be decoded", preview(&source));
                continue;
            };
            let smask_id = match (&image.alpha, mask) {
                (Some(alpha), true) => {
                    let id = self.alloc_id();
                    let dict = format!(
                        " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                        image.width, image.height
                    );
                    self.write_stream(id, &dict, alpha)?;
                    Some(id)
                }
                _ => None,
            };
            let id = self.alloc_id();
            self.write_stream(id, &image_dict(&image, smask_id), &image.data)?;
            let resource = format!("Im{}", image_entries.len() + 1);
            image_names.insert(image_key(&source, mask), resource.clone());
            image_entries.push((resource, id));
        }

        let resources = format!(
            "<< /Font {} /XObject {} >>",
            resource_dict(&font_entries),
            resource_dict(&image_entries)
        );
        let resources_id = self.alloc_id();
        self.write_object(resources_id, resources.as_bytes())?;

        let mut page_ids = Vec::with_capacity(document.pages.len());
        for page in &document.pages {
            let content = render_page(page, &font_ids, &image_names);
            let content_id = self.alloc_id();
            if self.options.compress {
                self.write_stream(
                    content_id,
                    " /Filter /FlateDecode",
                    &flate_compress(content.as_bytes())?,
                )?;
            } else {
                self.write_stream(content_id, "", content.as_bytes())?;
            }
            let page_id = self.alloc_id();
            let page_obj = format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
                PDF_PAGES_ID,
                fmt_pt(document.page_size.width),
                fmt_pt(document.page_size.height),
                resources_id,
                content_id
            );
            self.write_object(page_id, page_obj.as_bytes())?;
            page_ids.push(page_id);
        }

        let kids = page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        let pages = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_ids.len()
        );
        self.write_object(PDF_PAGES_ID, pages.as_bytes())?;
        let catalog = format!("<< /Type /Catalog /Pages {PDF_PAGES_ID} 0 R >>");
        self.write_object(PDF_CATALOG_ID, catalog.as_bytes())?;
        self.finish()
    }

    fn write_font(&mut self, name: &str, registry: &FontRegistry) -> io::Result<usize> {
        let resource = match standard_fonts::lookup(name) {
            Some(standard) => FontResource::Base14(standard.name),
            None => match registry.embedded(name) {
                Some(font) => FontResource::Embedded(font),
                None => FontResource::Base14(substitute_face(name)),
            },
        };
        match resource {
            FontResource::Base14(base) => {
                let id = self.alloc_id();
                self.write_object(id, font_object(base).as_bytes())?;
                Ok(id)
            }
            FontResource::Embedded(font) => {
                let file_id = self.alloc_id();
                let mut dict = format!(" /Length1 {}", font.data.len());
                if font.program_kind == FontProgramKind::OpenTypeCff {
                    dict.push_str(" /Subtype /OpenType");
                }
                self.write_stream(file_id, &dict, &font.data)?;
                let descriptor_id = self.alloc_id();
                self.write_object(
                    descriptor_id,
                    font_descriptor_object(&font, file_id).as_bytes(),
                )?;
                let id = self.alloc_id();
                self.write_object(id, truetype_font_object(&font, descriptor_id).as_bytes())?;
                Ok(id)
            }
        }
    }

    fn finish(self) -> io::Result<usize> {
        let Self {
            writer,
            mut offset,
            offsets,
            ..
        } = self;
        let xref_start = offset;
        write_str(writer, &format!("xref\n0 {}\n", offsets.len()), &mut offset)?;
        write_bytes(writer, b"0000000000 65535 f \n", &mut offset)?;
        for entry in offsets.iter().skip(1) {
            write_str(writer, &format!("{entry:010} 00000 n \n"), &mut offset)?;
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len(),
            PDF_CATALOG_ID,
            PDF_INFO_ID,
            xref_start
        );
        write_str(writer, &trailer, &mut offset)?;
        writer.flush()?;
        Ok(offset)
    }
}

/// Writes `document` as a PDF to `writer`, returning the byte count.
pub fn write_document<W: Write>(
    document: &Document,
    registry: &FontRegistry,
    options: &PdfOptions,
    writer: &mut W,
) -> io::Result<usize> {
    PdfWriter::new(writer, options)?.write_document(document, registry)
}

pub fn document_to_pdf(
    document: &Document,
    registry: &FontRegistry,
    options: &PdfOptions,
) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    write_document(document, registry, options, &mut bytes)?;
    Ok(bytes)
}

struct TextState {
    font_name: String,
    font_size: Pt,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_i32(12),
        }
    }
}

/// Font names actually used by text, in first-use order. The canvas only
/// emits font changes relative to its saved state, so the walk mirrors the
/// q/Q stack.
fn collect_font_names(document: &Document) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for page in &document.pages {
        let mut stack: Vec<String> = Vec::new();
        let mut current = TextState::default().font_name;
        for cmd in &page.commands {
            match cmd {
                Command::SaveState => stack.push(current.clone()),
                Command::RestoreState => {
                    if let Some(prev) = stack.pop() {
                        current = prev;
                    }
                }
                Command::SetFontName(name) => current = name.clone(),
                Command::DrawString { .. } => {
                    if !names.contains(&current) {
                        names.push(current.clone());
                    }
                }
                _ => {}
            }
        }
    }
    names
}

fn image_key(source: &str, mask: bool) -> String {
    format!("{}:{}", mask as u8, source)
}

fn collect_image_sources(document: &Document) -> Vec<(String, bool)> {
    let mut seen = Vec::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::DrawImage { source, mask, .. } = cmd {
                let entry = (source.clone(), *mask);
                if !seen.contains(&entry) {
                    seen.push(entry);
                }
            }
        }
    }
    seen
}

fn render_page(
    page: &Page,
    font_map: &BTreeMap<String, String>,
    image_map: &HashMap<String, String>,
) -> String {
    let mut out = String::new();
    let mut stack: Vec<TextState> = Vec::new();
    let mut state = TextState::default();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                stack.push(TextState {
                    font_name: state.font_name.clone(),
                    font_size: state.font_size,
                });
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some(prev) = stack.pop() {
                    state = prev;
                }
                out.push_str("Q\n");
            }
            Command::Translate(x, y) => {
                out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::Scale(x, y) => {
                out.push_str(&format!("{} 0 0 {} 0 0 cm\n", fmt(*x), fmt(*y)));
            }
            Command::Rotate(angle) => {
                let sin = libm::sinf(*angle);
                let cos = libm::cosf(*angle);
                out.push_str(&format!(
                    "{} {} {} {} 0 0 cm\n",
                    fmt(cos),
                    fmt(sin),
                    fmt(-sin),
                    fmt(cos)
                ));
            }
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetLineCap(cap) => {
                out.push_str(&format!("{} J\n", cap.pdf_operand()));
            }
            Command::SetDash { pattern, phase } => {
                let items = pattern
                    .iter()
                    .map(|v| fmt_pt(*v))
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("[{}] {} d\n", items, fmt_pt(*phase)));
            }
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::ClipRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nW\nn\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_pt(*x1),
                    fmt_pt(*y1),
                    fmt_pt(*x2),
                    fmt_pt(*y2),
                    fmt_pt(*x),
                    fmt_pt(*y),
                ));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::DrawString { x, y, text } => {
                let resource = font_map
                    .get(&state.font_name)
                    .map(String::as_str)
                    .unwrap_or("F1");
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(state.font_size)));
                out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(*y)));
                out.push_str(&format!("({}) Tj\n", encode_winansi_pdf_string(text)));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                source,
                mask,
            } => {
                if let Some(name) = image_map.get(&image_key(source, *mask)) {
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(*y)
                    ));
                    out.push_str(&format!("/{} Do\n", name));
                    out.push_str("Q\n");
                }
            }
        }
    }
    out
}

fn load_image(source: &str) -> Option<ImageData> {
    if let Some((mime, data)) = parse_data_uri(source) {
        return decode_image_bytes(&data, Some(&mime));
    }
    let bytes = std::fs::read(Path::new(source)).ok()?;
    decode_image_bytes(&bytes, None)
}

/// Pixel size of an image source without keeping the decoded pixels.
pub(crate) fn image_dimensions(source: &str) -> Option<(u32, u32)> {
    load_image(source).map(|image| (image.width, image.height))
}

fn decode_image_bytes(data: &[u8], mime: Option<&str>) -> Option<ImageData> {
    let format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };
    let decoded = image::load_from_memory(data).ok()?;
    let (width, height) = decoded.dimensions();

    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return Some(ImageData {
            width,
            height,
            color_space,
            filter: "/DCTDecode",
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let alpha = if has_alpha {
        Some(flate_compress(&alpha).ok()?)
    } else {
        None
    };
    Some(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb).ok()?,
        alpha,
    })
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

/// `data:` URI carrying `bytes`, sniffing PNG/JPEG for the media type.
pub(crate) fn data_uri(bytes: &[u8]) -> String {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        _ => "application/octet-stream",
    };
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn image_dict(image: &ImageData, smask_id: Option<usize>) -> String {
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {}{}",
        image.width, image.height, image.color_space, image.filter, smask
    )
}

fn truetype_font_object(font: &RegisteredFont, descriptor_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    let subtype = match font.program_kind {
        FontProgramKind::OpenTypeCff => "Type1",
        FontProgramKind::TrueType => "TrueType",
    };
    let widths = metrics
        .widths
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /FirstChar {} /LastChar {} /Widths [{}] /FontDescriptor {} 0 R /Encoding /WinAnsiEncoding >>",
        subtype, base, metrics.first_char, metrics.last_char, widths, descriptor_id
    )
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    let mut flags = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = match font.program_kind {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn font_object(name: &str) -> String {
    let base = sanitize_font_name(name);
    if matches!(base.as_str(), "Symbol" | "ZapfDingbats") {
        return format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} >>");
    }
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base
    )
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let items = entries
        .iter()
        .map(|(resource, id)| format!("/{} {} 0 R", resource, id))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<< {} >>", items)
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Helvetica".to_string()
    } else {
        out
    }
}

fn info_object(options: &PdfOptions) -> String {
    let mut entries = vec!["/Producer (reportwriter)".to_string()];
    let fields = [
        ("Title", &options.title),
        ("Author", &options.author),
        ("Subject", &options.subject),
        ("Keywords", &options.keywords),
    ];
    for (key, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            entries.push(format!("/{} ({})", key, encode_winansi_pdf_string(value)));
        }
    }
    if let Some(date) = options.creation_date {
        entries.push(format!("/CreationDate (D:{})", date.format("%Y%m%d%H%M%S")));
    }
    format!("<< {} >>", entries.join(" "))
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &[u8],
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n", obj_id), offset)?;
    write_bytes(writer, body, offset)?;
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

/// Text as the body of a PDF literal string in WinAnsi, with bytes outside
/// printable ASCII written as octal escapes.
fn encode_winansi_pdf_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in encode_winansi(input) {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}

fn preview(source: &str) -> String {
    if source.chars().count() <= 64 {
        return source.to_string();
    }
    let mut out: String = source.chars().take(64).collect();
    out.push_str("...");
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    Pt::from_milli_i64(milli).to_string()
}

fn fmt_pt(value: Pt) -> String {
    value.to_string()
}

fn color_components(color: Color) -> String {
    format!(
        "{} {} {}",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0))
    )
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} rg\n", color_components(color))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} RG\n", color_components(color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::{Rect, Size};

    fn registry() -> FontRegistry {
        FontRegistry::with_search_paths(Vec::new())
    }

    fn plain() -> PdfOptions {
        PdfOptions {
            compress: false,
            ..PdfOptions::default()
        }
    }

    fn count_token(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    fn one_page_document() -> Document {
        let mut canvas = Canvas::new(Size::letter());
        canvas.set_font("Times-Bold", Pt::from_i32(14), None);
        canvas.draw_text(Pt::from_i32(72), Pt::from_i32(700), "Caf\u{e9} (1)");
        canvas.draw_rect(
            Rect::new(Pt::from_i32(10), Pt::from_i32(20), Pt::from_i32(30), Pt::from_i32(40)),
            crate::canvas::Paint::STROKE,
        );
        canvas.show_page();
        canvas.finish(|_, _, _| {})
    }

    #[test]
    fn writes_native_coordinates_and_winansi_text() {
        let bytes = document_to_pdf(&one_page_document(), &registry(), &plain()).expect("pdf");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("/BaseFont /Times-Bold /Encoding /WinAnsiEncoding"));
        assert!(text.contains("/F1 14 Tf\n72 700 Td\n(Caf\\351 \\(1\\)) Tj"));
        assert!(text.contains("10 20 m\n40 20 l\n40 60 l\n10 60 l\nh\nS"));
        assert!(text.contains("/MediaBox [0 0 612 792]"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn compressed_content_inflates_to_the_page_operators() {
        use std::io::Read;

        let bytes =
            document_to_pdf(&one_page_document(), &registry(), &PdfOptions::default()).expect("pdf");
        let marker = b" /Filter /FlateDecode >>\nstream\n";
        let start = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .expect("content stream")
            + marker.len();
        let end = bytes[start..]
            .windows(b"\nendstream".len())
            .position(|w| w == b"\nendstream")
            .expect("endstream")
            + start;
        let mut inflated = String::new();
        flate2::read::ZlibDecoder::new(&bytes[start..end])
            .read_to_string(&mut inflated)
            .expect("inflate");
        assert!(inflated.contains("72 700 Td"));
        assert!(inflated.contains("10 20 m"));
        assert_eq!(flate_compress(b"").map(|data| data.is_empty()).ok(), Some(false));
    }

    #[test]
    fn output_is_deterministic_without_creation_date() {
        let doc = one_page_document();
        let first = document_to_pdf(&doc, &registry(), &PdfOptions::default()).expect("pdf");
        let second = document_to_pdf(&doc, &registry(), &PdfOptions::default()).expect("pdf");
        assert_eq!(first, second);
        assert_eq!(count_token(&String::from_utf8_lossy(&first), "/CreationDate"), 0);
    }

    #[test]
    fn info_carries_metadata_and_optional_date() {
        let options = PdfOptions {
            title: Some("Sales".to_string()),
            author: Some("Ops".to_string()),
            creation_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
                .and_then(|d| d.and_hms_opt(8, 5, 0)),
            ..plain()
        };
        let bytes = document_to_pdf(&one_page_document(), &registry(), &options).expect("pdf");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Title (Sales)"));
        assert!(text.contains("/Author (Ops)"));
        assert!(text.contains("/CreationDate (D:20240309080500)"));
    }

    #[test]
    fn font_state_follows_save_restore() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.save_state();
        canvas.set_font("Courier", Pt::from_i32(9), None);
        canvas.draw_text(Pt::ZERO, Pt::ZERO, "a");
        canvas.restore_state();
        canvas.draw_text(Pt::ZERO, Pt::ZERO, "b");
        canvas.show_page();
        let doc = canvas.finish(|_, _, _| {});
        assert_eq!(collect_font_names(&doc), vec!["Courier", "Helvetica"]);
        let bytes = document_to_pdf(&doc, &registry(), &plain()).expect("pdf");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/F1 9 Tf"));
        assert!(text.contains("/F2 12 Tf"));
    }

    #[test]
    fn unknown_font_names_fall_back_to_helvetica() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.set_font("Nonexistent Bold", Pt::from_i32(10), None);
        canvas.draw_text(Pt::ZERO, Pt::ZERO, "x");
        canvas.show_page();
        let doc = canvas.finish(|_, _, _| {});
        let bytes = document_to_pdf(&doc, &registry(), &plain()).expect("pdf");
        assert!(String::from_utf8_lossy(&bytes).contains("/BaseFont /Helvetica-Bold"));
    }

    #[test]
    fn data_uri_round_trips_png_bytes() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 0, 128]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        let uri = data_uri(&png);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(image_dimensions(&uri), Some((2, 1)));

        let mut canvas = Canvas::new(Size::letter());
        let image = crate::canvas::ImageRef {
            source: uri,
            pixel_width: 2,
            pixel_height: 1,
        };
        canvas.draw_image(&image, Pt::ZERO, Pt::ZERO, None, None, true, false);
        canvas.show_page();
        let doc = canvas.finish(|_, _, _| {});
        let bytes = document_to_pdf(&doc, &registry(), &plain()).expect("pdf");
        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(count_token(&text, "/Subtype /Image"), 2);
        assert!(text.contains("/SMask"));
        assert!(text.contains("/Im1 Do"));
    }
}
