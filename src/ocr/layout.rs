use serde::Serialize;

use super::font::{measure_text_width_px, vertical_metrics_em, FontMetrics};
use super::BoundingBox;
use crate::settings::Settings;

/// Gap between consecutive lines, in pixels.
pub const LINE_SPACING_PX: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypesetConfig {
    pub max_font_size: u32,
    pub min_font_size: u32,
    pub step: u32,
}

impl Default for TypesetConfig {
    fn default() -> Self {
        Self {
            max_font_size: 40,
            min_font_size: 10,
            step: 2,
        }
    }
}

impl TypesetConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_font_size: settings.max_font_size,
            min_font_size: settings.min_font_size,
            step: settings.font_size_step,
        }
    }

    /// Sizes tried in order, largest first. The floor is always the last
    /// entry, even when the step skips over it.
    pub fn candidate_sizes(&self) -> Vec<u32> {
        let floor = self.min_font_size.max(1);
        let top = self.max_font_size.max(floor);
        let mut sizes: Vec<u32> = (floor..=top)
            .rev()
            .step_by(self.step.max(1) as usize)
            .collect();
        if sizes.last() != Some(&floor) {
            sizes.push(floor);
        }
        sizes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutResult {
    pub font_size: u32,
    pub lines: Vec<String>,
    pub measured_width: f32,
    pub measured_height: f32,
    /// `false` when even the floor size overflows the box.
    pub fitted: bool,
}

/// First-fit search over `config.candidate_sizes()`. When nothing fits, the
/// floor size is returned with `fitted == false`.
pub fn fit_layout(
    box_width: u32,
    box_height: u32,
    text: &str,
    font: Option<&FontMetrics>,
    config: &TypesetConfig,
) -> LayoutResult {
    let mut last = None;
    for size in config.candidate_sizes() {
        let layout = layout_at(size, box_width, box_height, text, font);
        if layout.fitted {
            return layout;
        }
        last = Some(layout);
    }
    last.unwrap_or_else(|| layout_at(config.min_font_size.max(1), box_width, box_height, text, font))
}

fn layout_at(
    size: u32,
    box_width: u32,
    box_height: u32,
    text: &str,
    font: Option<&FontMetrics>,
) -> LayoutResult {
    let font_size = size as f32;
    let lines = wrap_text(text, chars_per_line(box_width, size));
    let measured_width = lines
        .iter()
        .map(|line| measure_text_width_px(line, font_size, font))
        .fold(0.0, f32::max);
    let measured_height = block_height(lines.len(), font_size, font);
    let fitted = measured_width <= box_width as f32 && measured_height <= box_height as f32;
    LayoutResult {
        font_size: size,
        lines,
        measured_width,
        measured_height,
        fitted,
    }
}

/// Height of a line box (ascent + descent) at `font_size`.
pub fn line_box_px(font_size: f32, font: Option<&FontMetrics>) -> f32 {
    let (ascent, descent) = vertical_metrics_em(font);
    (ascent + descent) * font_size
}

fn block_height(line_count: usize, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if line_count == 0 {
        return 0.0;
    }
    line_count as f32 * line_box_px(font_size, font) + (line_count - 1) as f32 * LINE_SPACING_PX
}

pub fn chars_per_line(box_width: u32, font_size: u32) -> usize {
    (box_width / font_size.max(1)).max(1) as usize
}

/// Greedy wrap to at most `width` characters per line. Whitespace runs
/// collapse to one space and words longer than `width` are split, filling the
/// rest of the current line first.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut rest: Vec<char> = word.chars().collect();
        while !rest.is_empty() {
            let sep = usize::from(current_len > 0);
            if current_len + sep + rest.len() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current_len += sep + rest.len();
                current.extend(rest.drain(..));
                break;
            }
            if rest.len() <= width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            let room = width.saturating_sub(current_len + sep);
            if room == 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            if sep == 1 {
                current.push(' ');
            }
            current.extend(rest.drain(..room));
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Top-left corner of the text block when centred on `bbox`. Negative when
/// the block overflows the box.
pub fn centered_origin(bbox: &BoundingBox, layout: &LayoutResult) -> (f32, f32) {
    let x = bbox.x_min as f32 + (bbox.width() as f32 - layout.measured_width) / 2.0;
    let y = bbox.y_min as f32 + (bbox.height() as f32 - layout.measured_height) / 2.0;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> BoundingBox {
        BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    #[test]
    fn candidate_sizes_descend_to_the_floor() {
        let sizes = TypesetConfig::default().candidate_sizes();
        assert_eq!(sizes.first(), Some(&40));
        assert_eq!(sizes.last(), Some(&10));
        assert_eq!(sizes.len(), 16);
        assert!(sizes.windows(2).all(|pair| pair[0] - pair[1] == 2));
    }

    #[test]
    fn odd_ranges_never_go_below_the_floor() {
        let config = TypesetConfig {
            max_font_size: 15,
            min_font_size: 10,
            step: 4,
        };
        assert_eq!(config.candidate_sizes(), vec![15, 11, 10]);
    }

    #[test]
    fn uneven_step_still_falls_back_to_the_floor() {
        let config = TypesetConfig {
            max_font_size: 15,
            min_font_size: 10,
            step: 4,
        };
        let text = "这是一段非常长的翻译文本，它无论如何都不可能放进一个五十像素见方的小气泡里面去。";
        let layout = fit_layout(50, 50, text, None, &config);
        assert_eq!(layout.font_size, 10);
        assert!(!layout.fitted);
        assert_eq!(layout.lines, wrap_text(text, chars_per_line(50, 10)));
    }

    #[test]
    fn chosen_size_is_the_largest_that_fits() {
        let config = TypesetConfig::default();
        let cases = [
            (120, 90, "翻訳されたテキストがここに入ります"),
            (160, 70, "the quick brown fox jumps over the lazy dog"),
            (90, 120, "もう一度言ってみろ！"),
            (200, 48, "今日はいい天気ですね、散歩に行きましょう"),
        ];
        for (w, h, text) in cases {
            let layout = fit_layout(w, h, text, None, &config);
            assert!(layout.fitted, "{text:?} should fit {w}x{h}");
            for size in config.candidate_sizes() {
                if size > layout.font_size {
                    assert!(
                        !layout_at(size, w, h, text, None).fitted,
                        "{text:?} in {w}x{h} also fits at {size}, chose {}",
                        layout.font_size
                    );
                }
            }
        }

        let layout = fit_layout(120, 90, "翻訳されたテキストがここに入ります", None, &config);
        assert_eq!(layout.font_size, 20);
        assert_eq!(layout.lines.len(), 3);
    }

    #[test]
    fn short_japanese_fits_at_the_largest_size() {
        let config = TypesetConfig::default();
        let layout = fit_layout(200, 60, "こんにちは", None, &config);
        assert_eq!(layout.font_size, 40);
        assert_eq!(layout.lines, vec!["こんにちは".to_string()]);
        assert!(layout.fitted);
        assert_eq!(layout.measured_width, 200.0);

        let (x, y) = centered_origin(&bbox(10, 20, 210, 80), &layout);
        assert_eq!(x, 10.0);
        assert!((y - (20.0 + (60.0 - layout.measured_height) / 2.0)).abs() < 1e-4);
    }

    #[test]
    fn tiny_box_stops_at_the_floor_size() {
        let config = TypesetConfig::default();
        let text = "这是一段非常长的翻译文本，它无论如何都不可能放进一个五十像素见方的小气泡里面去。";
        let layout = fit_layout(50, 50, text, None, &config);
        assert_eq!(layout.font_size, 10);
        assert!(!layout.fitted);
        assert!(layout.lines.iter().all(|line| line.chars().count() <= 5));

        let (x, y) = centered_origin(&bbox(0, 0, 50, 50), &layout);
        assert!(x >= -1e-4);
        assert!(y < 0.0);
    }

    #[test]
    fn fitted_layouts_stay_inside_the_box() {
        let config = TypesetConfig::default();
        for (w, h) in [(120, 90), (64, 200), (300, 40), (90, 90)] {
            let layout = fit_layout(w, h, "the quick brown fox jumps over the lazy dog", None, &config);
            if layout.fitted {
                assert!(layout.measured_width <= w as f32);
                assert!(layout.measured_height <= h as f32);
            }
        }
    }

    #[test]
    fn acceptance_is_monotonic_in_box_size() {
        let config = TypesetConfig::default();
        let text = "翻訳されたテキストがここに入ります";
        let mut previous = 0;
        for side in (40..=400).step_by(20) {
            let layout = fit_layout(side, side, text, None, &config);
            assert!(
                layout.font_size >= previous,
                "size shrank from {previous} to {} at {side}",
                layout.font_size
            );
            previous = layout.font_size;
        }
    }

    #[test]
    fn block_height_includes_line_spacing() {
        let config = TypesetConfig {
            max_font_size: 20,
            min_font_size: 20,
            step: 2,
        };
        let layout = fit_layout(40, 500, "一二三四五六", None, &config);
        assert_eq!(layout.lines.len(), 3);
        assert!((layout.measured_height - (3.0 * 20.0 + 2.0 * LINE_SPACING_PX)).abs() < 1e-4);
    }

    #[test]
    fn wrap_breaks_on_whitespace() {
        assert_eq!(
            wrap_text("the quick  brown\tfox", 10),
            vec!["the quick".to_string(), "brown fox".to_string()]
        );
    }

    #[test]
    fn wrap_chunks_long_words() {
        assert_eq!(
            wrap_text("こんにちは世界", 3),
            vec!["こんに".to_string(), "ちは世".to_string(), "界".to_string()]
        );
        assert_eq!(
            wrap_text("ab cdefgh", 5),
            vec!["ab cd".to_string(), "efgh".to_string()]
        );
    }

    #[test]
    fn wrap_lines_respect_the_width() {
        let text = "a bb ccc dddd eeeee ffffff ggggggg";
        for width in 1..10 {
            for line in wrap_text(text, width) {
                assert!(line.chars().count() <= width, "{line:?} wider than {width}");
                assert_eq!(line.trim(), line);
            }
        }
    }

    #[test]
    fn blank_text_wraps_to_nothing() {
        assert!(wrap_text("   \n ", 4).is_empty());
    }

    #[test]
    fn chars_per_line_is_at_least_one() {
        assert_eq!(chars_per_line(5, 40), 1);
        assert_eq!(chars_per_line(200, 40), 5);
        assert_eq!(chars_per_line(99, 10), 9);
    }
}
