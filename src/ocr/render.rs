use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use resvg::render;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::debug;
use usvg::{Options, Tree};

use super::font::ResolvedFont;
use super::layout::{centered_origin, fit_layout, line_box_px, LayoutResult, TypesetConfig, LINE_SPACING_PX};
use super::{BoundingBox, InkColor, InkPlan};

const OUTLINE_OFFSETS: [(f32, f32); 8] = [
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
    (-1.0, 0.0),
    (1.0, 0.0),
    (-1.0, 1.0),
    (0.0, 1.0),
    (1.0, 1.0),
];

/// Where a region's translation ended up on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub layout: LayoutResult,
    pub origin: (f32, f32),
    pub ink: InkColor,
}

/// Lays out and rasterises translated text. Holds the batch-wide font so
/// every page shares one font database.
pub struct Typesetter {
    font: ResolvedFont,
    config: TypesetConfig,
}

impl Typesetter {
    pub fn new(font: ResolvedFont, config: TypesetConfig) -> Self {
        Self { font, config }
    }

    /// Estimated metrics only; layout works but no glyphs are drawn.
    pub fn estimated(config: TypesetConfig) -> Self {
        Self::new(ResolvedFont::estimated(), config)
    }

    pub fn layout(&self, bbox: &BoundingBox, text: &str) -> LayoutResult {
        fit_layout(
            bbox.width(),
            bbox.height(),
            text,
            self.font.metrics.as_ref(),
            &self.config,
        )
    }

    pub fn draw(&self, canvas: &mut RgbImage, plan: &InkPlan) -> Result<PlacedText> {
        let layout = self.layout(&plan.bbox, &plan.text);
        let origin = centered_origin(&plan.bbox, &layout);
        if layout.lines.is_empty() {
            return Ok(PlacedText {
                layout,
                origin,
                ink: plan.ink,
            });
        }

        let pad = (layout.font_size as f32 / 4.0).ceil() + 1.0;
        let left = (origin.0 - pad).floor();
        let top = (origin.1 - pad).floor();
        let block = TextBlock {
            layout: &layout,
            offset_x: origin.0 - left,
            offset_y: origin.1 - top,
            width: (layout.measured_width + 2.0 * pad).ceil().max(1.0) as u32 + 1,
            height: (layout.measured_height + 2.0 * pad).ceil().max(1.0) as u32 + 1,
        };
        let svg = build_text_svg(&block, &self.font, plan.ink);
        let pixmap = self.rasterize(&svg)?;
        composite(canvas, &pixmap, left as i64, top as i64);
        debug!(
            "typeset {} line(s) at {}px into {:?}",
            layout.lines.len(),
            layout.font_size,
            plan.bbox
        );
        Ok(PlacedText {
            layout,
            origin,
            ink: plan.ink,
        })
    }

    fn rasterize(&self, svg: &str) -> Result<Pixmap> {
        let options = Options {
            fontdb: Arc::clone(&self.font.fontdb),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
        let size = tree.size().to_int_size();
        let mut pixmap =
            Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
        let mut pixmap_mut = pixmap.as_mut();
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
        Ok(pixmap)
    }
}

struct TextBlock<'a> {
    layout: &'a LayoutResult,
    /// Block origin inside the SVG canvas.
    offset_x: f32,
    offset_y: f32,
    width: u32,
    height: u32,
}

fn build_text_svg(block: &TextBlock<'_>, font: &ResolvedFont, ink: InkColor) -> String {
    let layout = block.layout;
    let font_size = layout.font_size as f32;
    let metrics = font.metrics.as_ref();
    let line_step = line_box_px(font_size, metrics) + LINE_SPACING_PX;
    let first_baseline = block.offset_y + font.ascent_em() * font_size;
    let center_x = block.offset_x + layout.measured_width / 2.0;
    let family = match font.family.as_deref() {
        Some(name) => format!("{}, sans-serif", escape_xml(name)),
        None => "sans-serif".to_string(),
    };

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = block.width,
        h = block.height
    ));
    svg.push_str(&format!(
        r#"<g font-size="{size}" font-family="{family}" text-anchor="middle">"#,
        size = font_size,
        family = family
    ));
    if let Some(outline) = ink.outline() {
        for (dx, dy) in OUTLINE_OFFSETS {
            push_lines(&mut svg, layout, center_x + dx, first_baseline + dy, line_step, outline);
        }
    }
    push_lines(&mut svg, layout, center_x, first_baseline, line_step, ink.fill());
    svg.push_str("</g></svg>");
    svg
}

fn push_lines(
    svg: &mut String,
    layout: &LayoutResult,
    x: f32,
    first_baseline: f32,
    line_step: f32,
    color: &str,
) {
    for (idx, line) in layout.lines.iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" fill="{color}">{text}</text>"#,
            x = x,
            y = first_baseline + idx as f32 * line_step,
            color = color,
            text = escape_xml(line)
        ));
    }
}

/// Source-over blend of a premultiplied pixmap onto the canvas at
/// `(left, top)`, clipped to the canvas.
fn composite(canvas: &mut RgbImage, pixmap: &Pixmap, left: i64, top: i64) {
    let width = pixmap.width() as i64;
    for (idx, src) in pixmap.pixels().iter().enumerate() {
        let alpha = src.alpha() as u32;
        if alpha == 0 {
            continue;
        }
        let x = left + idx as i64 % width;
        let y = top + idx as i64 / width;
        if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
            continue;
        }
        let dst = canvas.get_pixel_mut(x as u32, y as u32);
        let inverse = 255 - alpha;
        for (channel, value) in dst.0.iter_mut().zip([src.red(), src.green(), src.blue()]) {
            let blended = value as u32 + (*channel as u32 * inverse + 127) / 255;
            *channel = blended.min(255) as u8;
        }
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
