use crate::ocr::{BoundingBox, DetectionResult};

use super::geom::{corners, union_bbox};
use super::text::join_inline;
use super::OcrLine;

/// Lines whose centre lies within this fraction of the mean line height of
/// the topmost remaining line count as the same row when ordering text.
const ROW_TOLERANCE: f32 = 0.4;

struct Member<'a> {
    line: &'a OcrLine,
    group: usize,
}

impl Member<'_> {
    fn height(&self) -> f32 {
        self.line.bbox.height() as f32
    }

    fn center_y(&self) -> f32 {
        (self.line.bbox.y_min + self.line.bbox.y_max) as f32 * 0.5
    }
}

/// Greedily merges lines into paragraphs. A group grows by one line at a time:
/// a line joins when one of its horizontal edges lies within the group's span
/// widened by `x_ths` mean heights and one of its vertical edges lies within
/// the span widened by `y_ths` mean heights. Each paragraph becomes one
/// detection whose text reads top-to-bottom, left-to-right.
pub fn group_paragraphs(lines: &[OcrLine], x_ths: f32, y_ths: f32) -> Vec<DetectionResult> {
    let mut members: Vec<Member<'_>> = lines.iter().map(|line| Member { line, group: 0 }).collect();
    let mut current = 1usize;

    while members.iter().any(|member| member.group == 0) {
        let grouped: Vec<usize> = (0..members.len())
            .filter(|&idx| members[idx].group == current)
            .collect();
        if grouped.is_empty() {
            if let Some(first) = members.iter_mut().find(|member| member.group == 0) {
                first.group = current;
            }
            continue;
        }

        let span = group_span(&members, &grouped);
        let mean_h = mean_height(&members, &grouped);
        let min_gx = span.x_min as f32 - x_ths * mean_h;
        let max_gx = span.x_max as f32 + x_ths * mean_h;
        let min_gy = span.y_min as f32 - y_ths * mean_h;
        let max_gy = span.y_max as f32 + y_ths * mean_h;
        let within_x = |value: u32| (min_gx..=max_gx).contains(&(value as f32));
        let within_y = |value: u32| (min_gy..=max_gy).contains(&(value as f32));

        let next = members.iter_mut().find(|member| {
            let bbox = &member.line.bbox;
            member.group == 0
                && (within_x(bbox.x_min) || within_x(bbox.x_max))
                && (within_y(bbox.y_min) || within_y(bbox.y_max))
        });
        match next {
            Some(member) => member.group = current,
            None => current += 1,
        }
    }

    (1..=current)
        .filter_map(|group| {
            let indices: Vec<usize> = (0..members.len())
                .filter(|&idx| members[idx].group == group)
                .collect();
            if indices.is_empty() {
                return None;
            }
            let span = group_span(&members, &indices);
            let text = reading_order_text(&members, indices);
            Some(DetectionResult {
                polygon: corners(&span),
                text,
            })
        })
        .collect()
}

fn group_span(members: &[Member<'_>], indices: &[usize]) -> BoundingBox {
    let first = members[indices[0]].line.bbox;
    indices
        .iter()
        .fold(first, |acc, &idx| union_bbox(&acc, &members[idx].line.bbox))
}

fn mean_height(members: &[Member<'_>], indices: &[usize]) -> f32 {
    let total: f32 = indices.iter().map(|&idx| members[idx].height()).sum();
    total / indices.len().max(1) as f32
}

fn reading_order_text(members: &[Member<'_>], mut remaining: Vec<usize>) -> String {
    let mean_h = mean_height(members, &remaining);
    let mut text = String::new();
    while !remaining.is_empty() {
        let highest = remaining
            .iter()
            .map(|&idx| members[idx].center_y())
            .fold(f32::INFINITY, f32::min);
        let limit = highest + ROW_TOLERANCE * mean_h;
        let best = remaining
            .iter()
            .enumerate()
            .filter(|(_, idx)| members[**idx].center_y() < limit)
            .min_by_key(|(_, idx)| members[**idx].line.bbox.x_min)
            .map(|(pos, _)| pos);
        let Some(pos) = best else {
            break;
        };
        let idx = remaining.remove(pos);
        let piece = members[idx].line.text.as_str();
        text = if text.is_empty() {
            piece.to_string()
        } else {
            join_inline(&text, piece)
        };
    }
    text
}
