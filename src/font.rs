use crate::encoding::winansi_char;
use crate::error::ReportError;
use crate::standard_fonts::{self, StandardFont};
use crate::types::Pt;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

static GLOBAL_REGISTRY: Lazy<Arc<FontRegistry>> = Lazy::new(|| Arc::new(FontRegistry::new()));

/// Process-wide font table. Faces named by report forms resolve to either a
/// base-14 font or a TrueType/OpenType file registered on first use; faces
/// that cannot be found are substituted with a Helvetica variant.
#[derive(Debug)]
pub struct FontRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    fonts: Vec<Arc<RegisteredFont>>,
    lookup: HashMap<String, usize>,
    registered_paths: HashMap<PathBuf, String>,
    face_files: HashMap<String, PathBuf>,
    search_paths: Vec<PathBuf>,
    dir_index: Option<HashMap<String, PathBuf>>,
    resolved: HashMap<String, String>,
    warned: HashSet<String>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// Metrics in 1/1000 em, with widths indexed by WinAnsi code.
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) first_char: u8,
    pub(crate) last_char: u8,
    pub(crate) widths: Vec<u16>,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(target_os = "windows") {
        let windir = std::env::var_os("windir").unwrap_or_else(|| "C:\\Windows".into());
        paths.push(PathBuf::from(windir).join("fonts"));
    } else if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/Library/Fonts"));
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join("Library/Fonts"));
        }
    } else {
        paths.push(PathBuf::from("/usr/share/fonts/truetype"));
    }
    paths
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::with_search_paths(default_search_paths())
    }

    pub fn with_search_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                search_paths: paths,
                ..RegistryState::default()
            }),
        }
    }

    /// The registry shared by every report in the process.
    pub fn global() -> Arc<FontRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_search_path(&self, path: impl Into<PathBuf>) {
        let mut state = self.state();
        let path = path.into();
        if !state.search_paths.contains(&path) {
            state.search_paths.push(path);
            state.dir_index = None;
        }
    }

    /// Maps a face name to an explicit font file, consulted before the
    /// directory search.
    pub fn map_face(&self, face: &str, path: impl Into<PathBuf>) {
        let mut state = self.state();
        state.face_files.insert(normalize_name(face), path.into());
        state.resolved.remove(&normalize_name(face));
    }

    pub fn register_file(&self, path: impl AsRef<Path>) -> Result<String, ReportError> {
        let mut state = self.state();
        state.register_file(path.as_ref())
    }

    pub fn register_bytes(
        &self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, ReportError> {
        let mut state = self.state();
        state.register_bytes(data, source_name.unwrap_or("EmbeddedFont"))
    }

    /// Native font name for a requested face. Never fails: unknown faces are
    /// substituted and logged once.
    pub fn resolve_face(&self, requested: &str) -> String {
        let key = normalize_name(requested);
        let mut state = self.state();
        if let Some(native) = state.resolved.get(&key) {
            return native.clone();
        }
        let native = state.resolve_uncached(requested, &key);
        state.resolved.insert(key, native.clone());
        native
    }

    /// Native face for `family` with bold/italic applied.
    pub fn styled_face(&self, family: &str, bold: bool, italic: bool) -> String {
        let base = self.resolve_face(family);
        if !bold && !italic {
            return base;
        }
        if let Some(name) = standard_fonts::styled(&base, bold, italic) {
            return name.to_string();
        }
        let suffix = match (bold, italic) {
            (true, true) => "BoldItalic",
            (true, false) => "Bold",
            _ => "Italic",
        };
        let candidates = [format!("{family}-{suffix}"), format!("{family} {suffix}")];
        let state = self.state();
        for candidate in candidates {
            if let Some(index) = state.lookup.get(&normalize_name(&candidate)) {
                return state.fonts[*index].name.clone();
            }
        }
        base
    }

    pub(crate) fn embedded(&self, native: &str) -> Option<Arc<RegisteredFont>> {
        let state = self.state();
        state
            .lookup
            .get(&normalize_name(native))
            .and_then(|index| state.fonts.get(*index))
            .cloned()
    }

    pub fn is_registered(&self, face: &str) -> bool {
        self.state().lookup.contains_key(&normalize_name(face))
    }

    pub fn measure_text_width(&self, native: &str, font_size: Pt, text: &str) -> Pt {
        if let Some(font) = self.embedded(native) {
            return font.metrics.measure_text_width(font_size, text);
        }
        if let Some(standard) = standard_fonts::lookup(native) {
            let units: i32 = text.chars().map(|ch| standard.char_width(ch) as i32).sum();
            return font_size.mul_ratio(units, 1000);
        }
        let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
        char_width * (text.chars().count() as i32)
    }

    pub fn ascent(&self, native: &str, font_size: Pt) -> Pt {
        let units = self.vertical_metrics(native).0;
        font_size.mul_ratio(units as i32, 1000)
    }

    /// Descent below the baseline as a positive length.
    pub fn descent(&self, native: &str, font_size: Pt) -> Pt {
        let units = self.vertical_metrics(native).1;
        font_size.mul_ratio(-(units as i32), 1000)
    }

    fn vertical_metrics(&self, native: &str) -> (i16, i16) {
        if let Some(font) = self.embedded(native) {
            return (font.metrics.ascent, font.metrics.descent);
        }
        standard_fonts::lookup(native)
            .map(|f: &StandardFont| (f.ascent, f.descent))
            .unwrap_or((718, -207))
    }
}

impl RegistryState {
    fn resolve_uncached(&mut self, requested: &str, key: &str) -> String {
        if let Some(index) = self.lookup.get(key) {
            return self.fonts[*index].name.clone();
        }
        if let Some(standard) = standard_fonts::lookup(requested) {
            return standard.name.to_string();
        }
        if let Some(path) = self.find_font_file(key) {
            match self.register_file(&path) {
                Ok(name) => return name,
                Err(err) => log::warn!("font file {} unusable: {err}", path.display()),
            }
        }
        let substitute = substitute_face(requested);
        if self.warned.insert(key.to_string()) {
            log::warn!("font face '{requested}' not found; substituting {substitute}");
        }
        substitute.to_string()
    }

    fn find_font_file(&mut self, key: &str) -> Option<PathBuf> {
        if let Some(path) = self.face_files.get(key) {
            return Some(path.clone());
        }
        if self.dir_index.is_none() {
            let mut index = HashMap::new();
            for dir in &self.search_paths {
                index_font_dir(dir, &mut index, 0);
            }
            self.dir_index = Some(index);
        }
        self.dir_index.as_ref().and_then(|index| index.get(key).cloned())
    }

    fn register_file(&mut self, path: &Path) -> Result<String, ReportError> {
        if let Some(name) = self.registered_paths.get(path) {
            return Ok(name.clone());
        }
        let data = fs::read(path)?;
        let name = self.register_bytes(data, &path.to_string_lossy())?;
        self.registered_paths.insert(path.to_path_buf(), name.clone());
        Ok(name)
    }

    fn register_bytes(&mut self, data: Vec<u8>, source: &str) -> Result<String, ReportError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| ReportError::Font(format!("invalid font data for {source}: {err}")))?;
        let (name, aliases) = font_names(&face, Path::new(source));
        if let Some(index) = self.lookup.get(&normalize_name(&name)) {
            return Ok(self.fonts[*index].name.clone());
        }
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        let index = self.fonts.len();
        self.fonts.push(Arc::new(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        }));
        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.resolved.remove(&key);
            self.lookup.insert(key, index);
        }
        Ok(name)
    }
}

fn index_font_dir(dir: &Path, index: &mut HashMap<String, PathBuf>, depth: usize) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            index_font_dir(&path, index, depth + 1);
            continue;
        }
        let ext = path
            .extension()
            .and_then(|v| v.to_str())
            .map(|v| v.to_ascii_lowercase());
        if !matches!(ext.as_deref(), Some("ttf") | Some("otf")) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|v| v.to_str()) {
            index.entry(normalize_name(stem)).or_insert(path.clone());
        }
    }
}

/// Helvetica variant carrying the weight/slant words of the requested face.
pub(crate) fn substitute_face(requested: &str) -> &'static str {
    let lower = requested.to_ascii_lowercase();
    let bold = lower.contains("bold");
    let italic = lower.contains("italic") || lower.contains("oblique");
    match (bold, italic) {
        (true, true) => "Helvetica-BoldOblique",
        (true, false) => "Helvetica-Bold",
        (false, true) => "Helvetica-Oblique",
        (false, false) => "Helvetica",
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let widths = build_widths(face, scale, first_char, last_char);
        let missing_width = widths.first().copied().unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };
        (
            Self {
                first_char,
                last_char,
                widths,
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let Some(code) = crate::encoding::winansi_byte(ch) else {
            return self.missing_width;
        };
        if code < self.first_char || code > self.last_char {
            return self.missing_width;
        }
        let idx = (code - self.first_char) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let total_units: i32 = text
            .chars()
            .map(|ch| self.advance_for_char(ch) as i32)
            .fold(0i32, |acc, v| acc.saturating_add(v));
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }
}

fn build_widths(face: &ttf_parser::Face<'_>, scale: f32, first: u8, last: u8) -> Vec<u16> {
    (first..=last)
        .map(|code| {
            let width = winansi_char(code)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            let scaled = (width as f32 * scale).round() as i32;
            scaled.clamp(0, u16::MAX as i32) as u16
        })
        .collect()
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    let mut family = None;
    let mut full = None;
    let mut postscript = None;
    for name in face.names() {
        let Some(value) = name.to_string() else {
            continue;
        };
        match name.name_id {
            ttf_parser::name_id::FAMILY if family.is_none() => family = Some(value),
            ttf_parser::name_id::FULL_NAME if full.is_none() => full = Some(value),
            ttf_parser::name_id::POST_SCRIPT_NAME if postscript.is_none() => {
                postscript = Some(value)
            }
            _ => {}
        }
    }
    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .unwrap_or("EmbeddedFont")
        .to_string();
    let name = postscript
        .clone()
        .or_else(|| full.clone())
        .unwrap_or_else(|| stem.clone());
    let mut aliases = Vec::new();
    for alias in [full, family, Some(stem)].into_iter().flatten() {
        if alias != name && !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    (name, aliases)
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_registry() -> FontRegistry {
        FontRegistry::with_search_paths(Vec::new())
    }

    #[test]
    fn base14_faces_resolve_to_themselves() {
        let registry = empty_registry();
        assert_eq!(registry.resolve_face("helvetica"), "Helvetica");
        assert_eq!(registry.resolve_face("Times"), "Times-Roman");
        assert_eq!(registry.resolve_face("Courier-Bold"), "Courier-Bold");
    }

    #[test]
    fn missing_faces_are_substituted_by_style() {
        let registry = empty_registry();
        assert_eq!(registry.resolve_face("Garamond"), "Helvetica");
        assert_eq!(registry.resolve_face("Garamond Bold"), "Helvetica-Bold");
        assert_eq!(registry.resolve_face("Garamond-Italic"), "Helvetica-Oblique");
        assert_eq!(
            registry.resolve_face("Garamond BoldOblique"),
            "Helvetica-BoldOblique"
        );
        assert_eq!(registry.state().warned.len(), 4);
        registry.resolve_face("Garamond");
        assert_eq!(registry.state().warned.len(), 4);
    }

    #[test]
    fn styled_face_maps_base14_families() {
        let registry = empty_registry();
        assert_eq!(registry.styled_face("Times-Roman", true, false), "Times-Bold");
        assert_eq!(
            registry.styled_face("Helvetica", true, true),
            "Helvetica-BoldOblique"
        );
        assert_eq!(registry.styled_face("Courier", false, false), "Courier");
    }

    #[test]
    fn standard_widths_drive_measurement() {
        let registry = empty_registry();
        let width = registry.measure_text_width("Helvetica", Pt::from_i32(10), "WW");
        assert_eq!(width, Pt::from_f32(18.88));
        let width = registry.measure_text_width("Courier", Pt::from_i32(10), "abc");
        assert_eq!(width, Pt::from_i32(18));
    }

    #[test]
    fn vertical_metrics_scale_with_size() {
        let registry = empty_registry();
        assert_eq!(registry.ascent("Helvetica", Pt::from_i32(10)), Pt::from_f32(7.18));
        assert_eq!(registry.descent("Helvetica", Pt::from_i32(10)), Pt::from_f32(2.07));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let registry = empty_registry();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"))
            .unwrap_err();
        assert!(err.to_string().contains("broken.ttf"));
    }

    #[test]
    fn mapped_face_with_missing_file_falls_back() {
        let registry = empty_registry();
        registry.map_face("Corporate", "/nonexistent/corporate.ttf");
        assert_eq!(registry.resolve_face("Corporate"), "Helvetica");
        assert!(!registry.is_registered("Corporate"));
    }
}
