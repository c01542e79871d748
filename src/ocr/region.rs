use super::{BoundingBox, Point};

/// Min/max reduction over the polygon, clamped to `[0, width] x [0, height]`.
/// An empty polygon yields an empty box at the origin.
pub fn bounding_box(polygon: &[Point], width: u32, height: u32) -> BoundingBox {
    let Some((x_min, y_min, x_max, y_max)) = polygon_extent(polygon) else {
        return BoundingBox {
            x_min: 0,
            y_min: 0,
            x_max: 0,
            y_max: 0,
        };
    };
    BoundingBox {
        x_min: clamp_coord(x_min, width),
        y_min: clamp_coord(y_min, height),
        x_max: clamp_coord(x_max, width),
        y_max: clamp_coord(y_max, height),
    }
}

fn polygon_extent(polygon: &[Point]) -> Option<(i32, i32, i32, i32)> {
    let first = polygon.first()?;
    let init = (first.x, first.y, first.x, first.y);
    Some(
        polygon
            .iter()
            .fold(init, |(x_min, y_min, x_max, y_max), point| {
                (
                    x_min.min(point.x),
                    y_min.min(point.y),
                    x_max.max(point.x),
                    y_max.max(point.y),
                )
            }),
    )
}

fn clamp_coord(value: i32, limit: u32) -> u32 {
    if value <= 0 {
        0
    } else {
        (value as u32).min(limit)
    }
}
