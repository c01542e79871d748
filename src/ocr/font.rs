use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

const DEFAULT_ASCENT_EM: f32 = 0.88;
const DEFAULT_DESCENT_EM: f32 = 0.12;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn ascent_em(&self) -> f32 {
        self.ascender as f32 / self.units_per_em.max(1) as f32
    }

    /// Positive distance below the baseline.
    pub fn descent_em(&self) -> f32 {
        -(self.descender as f32) / self.units_per_em.max(1) as f32
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// The typesetting font shared by every page of a batch. `metrics` is `None`
/// when no usable font file was found; measurement then falls back to
/// per-character estimates and usvg picks whatever `sans-serif` resolves to.
#[derive(Clone)]
pub struct ResolvedFont {
    pub metrics: Option<FontMetrics>,
    pub family: Option<String>,
    pub fontdb: Arc<fontdb::Database>,
}

impl ResolvedFont {
    /// Estimate-only font with an empty database. Glyphs are not drawn.
    pub fn estimated() -> Self {
        Self {
            metrics: None,
            family: None,
            fontdb: Arc::new(fontdb::Database::new()),
        }
    }

    pub fn ascent_em(&self) -> f32 {
        vertical_metrics_em(self.metrics.as_ref()).0
    }
}

/// `(ascent, descent)` in em units, with fixed defaults when no font is loaded.
pub(crate) fn vertical_metrics_em(font: Option<&FontMetrics>) -> (f32, f32) {
    match font {
        Some(font) => (font.ascent_em(), font.descent_em()),
        None => (DEFAULT_ASCENT_EM, DEFAULT_DESCENT_EM),
    }
}

/// Resolves the typesetting font: an explicit `font_path` (must load), then
/// the first readable `candidates` entry, then the system `sans-serif` face,
/// then estimates.
pub fn resolve_font(font_path: Option<&Path>, candidates: &[&str]) -> Result<ResolvedFont> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let mut metrics = match font_path {
        Some(path) => Some(load_font_metrics(path)?),
        None => None,
    };
    if metrics.is_none() {
        metrics = candidates.iter().find_map(|candidate| {
            let path = Path::new(candidate);
            if !path.is_file() {
                return None;
            }
            match load_font_metrics(path) {
                Ok(metrics) => Some(metrics),
                Err(err) => {
                    warn!("skipping font candidate: {}", err);
                    None
                }
            }
        });
    }
    if metrics.is_none() {
        metrics = load_font_metrics_from_family(&db, "sans-serif").ok();
    }

    let Some(metrics) = metrics else {
        warn!("no usable font found; using estimated metrics");
        return Ok(ResolvedFont {
            metrics: None,
            family: None,
            fontdb: Arc::new(db),
        });
    };
    db.load_font_data(metrics.data().to_vec());
    let family = metrics.family().map(|name| name.to_string());
    if let Some(name) = &family {
        db.set_sans_serif_family(name.clone());
        debug!("typesetting font: {}", name);
    }
    Ok(ResolvedFont {
        metrics: Some(metrics),
        family,
        fontdb: Arc::new(db),
    })
}

#[cfg(target_os = "macos")]
pub fn candidate_font_paths() -> &'static [&'static str] {
    &[
        "simhei.ttf",
        "msyh.ttc",
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/Hiragino Sans GB.ttc",
        "/Library/Fonts/Arial Unicode.ttf",
    ]
}

#[cfg(target_os = "windows")]
pub fn candidate_font_paths() -> &'static [&'static str] {
    &[
        "simhei.ttf",
        "msyh.ttc",
        "C:/Windows/Fonts/msyh.ttc",
        "C:/Windows/Fonts/simhei.ttf",
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn candidate_font_paths() -> &'static [&'static str] {
    &[
        "simhei.ttf",
        "msyh.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc",
        "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    ]
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                if let Some(glyph) = face.glyph_index(ch) {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                } else {
                    advance = advance.saturating_add(font.space_advance as u32);
                }
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_size / units);
        }
    }
    estimate_text_width_units(text) * font_size
}

pub(crate) fn is_wide_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xFF00..=0xFFEF
    )
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_wide_char(ch) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

fn load_font_metrics_from_data(data: &[u8]) -> Result<FontMetrics> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    let shared = Arc::new(data.to_vec());
    (0..count)
        .find_map(|index| metrics_for_face(&shared, index))
        .ok_or_else(|| anyhow!("failed to parse font data"))
}

fn metrics_for_face(data: &Arc<Vec<u8>>, index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Some(FontMetrics {
        data: Arc::clone(data),
        units_per_em,
        space_advance,
        ascender: face.ascender(),
        descender: face.descender(),
        family: extract_family_name(&face),
        face_index: index,
    })
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    metrics_for_face(&Arc::new(data), face_index)
        .ok_or_else(|| anyhow!("failed to parse font data: {}", family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_treat_cjk_as_full_width() {
        assert_eq!(measure_text_width_px("こんにちは", 40.0, None), 200.0);
        assert_eq!(measure_text_width_px("你好", 10.0, None), 20.0);
        assert_eq!(measure_text_width_px("안녕", 10.0, None), 20.0);
    }

    #[test]
    fn estimates_are_narrower_for_latin_text() {
        let latin = measure_text_width_px("hello", 20.0, None);
        assert!((latin - 55.0).abs() < 1e-3);
        assert!(measure_text_width_px("a b", 20.0, None) < measure_text_width_px("abc", 20.0, None));
    }

    #[test]
    fn estimated_font_uses_default_vertical_metrics() {
        let font = ResolvedFont::estimated();
        assert!(font.metrics.is_none());
        let (ascent, descent) = vertical_metrics_em(font.metrics.as_ref());
        assert_eq!(font.ascent_em(), ascent);
        assert!((ascent + descent - 1.0).abs() < 1e-6);
    }

    #[test]
    fn explicit_font_path_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.ttf");
        assert!(resolve_font(Some(&missing), &[]).is_err());
    }

    #[test]
    fn unparsable_font_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").expect("write");
        assert!(load_font_metrics(&path).is_err());
    }
}
