use std::collections::BTreeMap;

use crate::ocr::BoundingBox;

use super::geom::union_bbox;
use super::text::needs_space;
use super::OcrLine;

#[derive(Clone)]
struct WordToken {
    text: String,
    bbox: BoundingBox,
    conf: f32,
    len: usize,
}

/// Word rows (level 5) of tesseract TSV output, grouped by
/// page/block/paragraph/line and split where words sit far apart.
pub(super) fn parse_tsv_lines(tsv: &str) -> Vec<OcrLine> {
    let mut word_map: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 || width == 0 || height == 0 {
            continue;
        }

        let key = (page_num, block_num, par_num, line_num);
        word_map.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            bbox: BoundingBox {
                x_min: left,
                y_min: top,
                x_max: left + width,
                y_max: top + height,
            },
            conf,
            len: text.chars().count().max(1),
        });
    }

    let mut lines = Vec::new();
    for (_, mut words) in word_map {
        words.sort_by_key(|word| word.bbox.x_min);
        for segment in split_word_segments(words) {
            if let Some(line) = build_line(&segment) {
                lines.push(line);
            }
        }
    }
    lines
}

fn split_word_segments(words: Vec<WordToken>) -> Vec<Vec<WordToken>> {
    if words.len() <= 1 {
        return if words.is_empty() { Vec::new() } else { vec![words] };
    }

    let mut heights = words.iter().map(|word| word.bbox.height()).collect::<Vec<_>>();
    heights.sort_unstable();
    let median_h = heights[heights.len() / 2].max(1) as f32;
    let gap_threshold = (median_h * 2.5).clamp(12.0, 120.0);
    let vertical_threshold = (median_h * 0.9).clamp(6.0, 80.0);

    let mut segments: Vec<Vec<WordToken>> = Vec::new();
    let mut current: Vec<WordToken> = Vec::new();
    let mut last_right = 0u32;
    let mut last_center_y = 0f32;
    for word in words {
        let center_y = (word.bbox.y_min + word.bbox.y_max) as f32 * 0.5;
        if current.is_empty() {
            last_right = word.bbox.x_max;
            last_center_y = center_y;
            current.push(word);
            continue;
        }
        let gap = word.bbox.x_min.saturating_sub(last_right);
        if (gap as f32) > gap_threshold || (center_y - last_center_y).abs() > vertical_threshold {
            segments.push(std::mem::take(&mut current));
            last_right = word.bbox.x_max;
            last_center_y = center_y;
        } else {
            last_right = last_right.max(word.bbox.x_max);
            last_center_y = (last_center_y + center_y) * 0.5;
        }
        current.push(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn build_line(words: &[WordToken]) -> Option<OcrLine> {
    let first = words.first()?;

    let mut text = String::new();
    let mut last_token = "";
    for word in words {
        if !text.is_empty() && needs_space(last_token, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        last_token = &word.text;
    }
    let final_text = text.trim();
    if final_text.is_empty() {
        return None;
    }

    let mut bbox = first.bbox;
    let mut conf_sum = 0.0;
    let mut len_sum = 0.0;
    for word in words {
        bbox = union_bbox(&bbox, &word.bbox);
        let weight = word.len as f32;
        conf_sum += word.conf * weight;
        len_sum += weight;
    }

    Some(OcrLine {
        text: final_text.to_string(),
        bbox,
        conf: if len_sum > 0.0 { conf_sum / len_sum } else { 0.0 },
    })
}
