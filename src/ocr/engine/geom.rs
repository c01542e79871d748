use crate::ocr::{BoundingBox, Point};

pub(super) fn union_bbox(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox {
        x_min: a.x_min.min(b.x_min),
        y_min: a.y_min.min(b.y_min),
        x_max: a.x_max.max(b.x_max),
        y_max: a.y_max.max(b.y_max),
    }
}

pub(super) fn scale_bbox(bbox: &BoundingBox, scale: f32) -> BoundingBox {
    let down = |value: u32| (value as f32 / scale).round() as u32;
    BoundingBox {
        x_min: down(bbox.x_min),
        y_min: down(bbox.y_min),
        x_max: down(bbox.x_max),
        y_max: down(bbox.y_max),
    }
}

/// Clockwise corners starting at the top-left.
pub(super) fn corners(bbox: &BoundingBox) -> Vec<Point> {
    let (x0, y0) = (bbox.x_min as i32, bbox.y_min as i32);
    let (x1, y1) = (bbox.x_max as i32, bbox.y_max as i32);
    vec![
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}
