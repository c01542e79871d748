//! Fast-marching inpainting (Telea 2004).
//!
//! Masked pixels are filled in order of their distance from the mask
//! boundary. Each pixel becomes a weighted average of the already-known
//! pixels within `radius`, weighted by direction along the distance field
//! gradient, geometric distance and level-set distance.

use image::{GrayImage, RgbImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;
const UNREACHED: f32 = 1.0e6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InpaintError {
    #[error("mask is {mask_w}x{mask_h} but image is {image_w}x{image_h}")]
    SizeMismatch {
        mask_w: u32,
        mask_h: u32,
        image_w: u32,
        image_h: u32,
    },
    #[error("mask covers every pixel, nothing to propagate from")]
    NoKnownPixels,
}

/// Fills every pixel whose mask value is non-zero. Returns the number of filled
/// pixels. On error the image is left untouched.
pub fn inpaint_telea(
    image: &mut RgbImage,
    mask: &GrayImage,
    radius: u32,
) -> Result<usize, InpaintError> {
    if image.dimensions() != mask.dimensions() {
        return Err(InpaintError::SizeMismatch {
            mask_w: mask.width(),
            mask_h: mask.height(),
            image_w: image.width(),
            image_h: image.height(),
        });
    }
    let mut field = Field::new(mask);
    if field.inside == 0 {
        return Ok(0);
    }
    if field.inside == field.flags.len() {
        return Err(InpaintError::NoKnownPixels);
    }

    let radius = radius.max(1) as i64;
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    for idx in 0..field.flags.len() {
        if field.flags[idx] == KNOWN && field.touches_inside(idx) {
            field.flags[idx] = BAND;
            heap.push(NarrowBand { dist: 0.0, seq, idx });
            seq += 1;
        }
    }

    let mut filled = 0usize;
    while let Some(entry) = heap.pop() {
        if field.flags[entry.idx] == KNOWN {
            continue;
        }
        field.flags[entry.idx] = KNOWN;
        let (x, y) = field.coords(entry.idx);
        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            if !field.in_bounds(nx, ny) || field.flag(nx, ny) != INSIDE {
                continue;
            }
            let dist = [
                field.solve((nx - 1, ny), (nx, ny - 1)),
                field.solve((nx + 1, ny), (nx, ny - 1)),
                field.solve((nx - 1, ny), (nx, ny + 1)),
                field.solve((nx + 1, ny), (nx, ny + 1)),
            ]
            .into_iter()
            .fold(UNREACHED, f32::min);
            let nidx = field.index(nx, ny);
            field.dist[nidx] = dist;
            let value = field.propagate(image, nx, ny, radius);
            image.put_pixel(nx as u32, ny as u32, image::Rgb(value));
            field.flags[nidx] = BAND;
            heap.push(NarrowBand {
                dist,
                seq,
                idx: nidx,
            });
            seq += 1;
            filled += 1;
        }
    }
    Ok(filled)
}

struct Field {
    width: i64,
    height: i64,
    flags: Vec<u8>,
    dist: Vec<f32>,
    inside: usize,
}

impl Field {
    fn new(mask: &GrayImage) -> Self {
        let (width, height) = mask.dimensions();
        let len = width as usize * height as usize;
        let mut flags = vec![KNOWN; len];
        let mut dist = vec![0.0f32; len];
        let mut inside = 0usize;
        for (idx, pixel) in mask.pixels().enumerate() {
            if pixel[0] > 0 {
                flags[idx] = INSIDE;
                dist[idx] = UNREACHED;
                inside += 1;
            }
        }
        Self {
            width: width as i64,
            height: height as i64,
            flags,
            dist,
            inside,
        }
    }

    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    fn index(&self, x: i64, y: i64) -> usize {
        (y * self.width + x) as usize
    }

    fn coords(&self, idx: usize) -> (i64, i64) {
        let idx = idx as i64;
        (idx % self.width, idx / self.width)
    }

    // Out-of-bounds pixels behave like unknown ones.
    fn flag(&self, x: i64, y: i64) -> u8 {
        if self.in_bounds(x, y) {
            self.flags[self.index(x, y)]
        } else {
            INSIDE
        }
    }

    fn dist_at(&self, x: i64, y: i64) -> f32 {
        if self.in_bounds(x, y) {
            self.dist[self.index(x, y)]
        } else {
            UNREACHED
        }
    }

    fn touches_inside(&self, idx: usize) -> bool {
        let (x, y) = self.coords(idx);
        [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
            .into_iter()
            .any(|(nx, ny)| self.in_bounds(nx, ny) && self.flags[self.index(nx, ny)] == INSIDE)
    }

    /// Eikonal update from two orthogonal neighbours.
    fn solve(&self, a: (i64, i64), b: (i64, i64)) -> f32 {
        let (fa, fb) = (self.flag(a.0, a.1), self.flag(b.0, b.1));
        let (ta, tb) = (self.dist_at(a.0, a.1), self.dist_at(b.0, b.1));
        match (fa != INSIDE, fb != INSIDE) {
            (true, true) => {
                let diff = (ta - tb).abs();
                if diff >= 1.0 {
                    1.0 + ta.min(tb)
                } else {
                    (ta + tb + (2.0 - diff * diff).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + ta,
            (false, true) => 1.0 + tb,
            (false, false) => 1.0 + ta.min(tb),
        }
    }

    fn gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let here = self.dist_at(x, y);
        let axis = |before: (i64, i64), after: (i64, i64)| -> f32 {
            let known_before = self.flag(before.0, before.1) != INSIDE;
            let known_after = self.flag(after.0, after.1) != INSIDE;
            match (known_before, known_after) {
                (true, true) => {
                    (self.dist_at(after.0, after.1) - self.dist_at(before.0, before.1)) * 0.5
                }
                (false, true) => self.dist_at(after.0, after.1) - here,
                (true, false) => here - self.dist_at(before.0, before.1),
                (false, false) => 0.0,
            }
        };
        (
            axis((x - 1, y), (x + 1, y)),
            axis((x, y - 1), (x, y + 1)),
        )
    }

    fn propagate(&self, image: &RgbImage, x: i64, y: i64, radius: i64) -> [u8; 3] {
        let (gx, gy) = self.gradient(x, y);
        let here = self.dist_at(x, y);
        let radius_sq = radius * radius;
        let mut acc = [0.0f32; 3];
        let mut total = 0.0f32;
        for qy in (y - radius)..=(y + radius) {
            for qx in (x - radius)..=(x + radius) {
                let (dx, dy) = (x - qx, y - qy);
                let len_sq = dx * dx + dy * dy;
                if len_sq == 0 || len_sq > radius_sq || self.flag(qx, qy) == INSIDE {
                    continue;
                }
                let len_sq = len_sq as f32;
                let geometric = 1.0 / (len_sq * len_sq.sqrt());
                let level = 1.0 / (1.0 + (self.dist_at(qx, qy) - here).abs());
                let mut direction = (dx as f32 * gx + dy as f32 * gy).abs();
                if direction <= 0.01 {
                    direction = 1.0e-6;
                }
                let weight = geometric * level * direction;
                let pixel = image.get_pixel(qx as u32, qy as u32);
                for (channel, value) in acc.iter_mut().zip(pixel.0) {
                    *channel += weight * value as f32;
                }
                total += weight;
            }
        }
        if total <= 0.0 {
            return image.get_pixel(x as u32, y as u32).0;
        }
        acc.map(|value| (value / total).round().clamp(0.0, 255.0) as u8)
    }
}

struct NarrowBand {
    dist: f32,
    seq: u64,
    idx: usize,
}

impl PartialEq for NarrowBand {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NarrowBand {}

impl PartialOrd for NarrowBand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so BinaryHeap pops the smallest distance first, oldest first on ties.
impl Ord for NarrowBand {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::solid_rgb;
    use image::{Luma, Rgb};

    #[test]
    fn hole_in_flat_colour_is_filled_with_that_colour() {
        let mut image = solid_rgb(20, 20, [200, 120, 40]);
        let mut mask = GrayImage::new(20, 20);
        for y in 6..14 {
            for x in 6..14 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let filled = inpaint_telea(&mut image, &mask, 3).expect("inpaint");
        assert_eq!(filled, 64);
        for pixel in image.pixels() {
            assert_eq!(pixel.0, [200, 120, 40]);
        }
    }

    #[test]
    fn known_pixels_are_never_modified() {
        let mut image = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]));
        let original = image.clone();
        let mut mask = GrayImage::new(16, 16);
        mask.put_pixel(8, 8, Luma([255]));
        mask.put_pixel(9, 8, Luma([255]));
        inpaint_telea(&mut image, &mask, 3).expect("inpaint");
        for (x, y, pixel) in image.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                assert_eq!(pixel, original.get_pixel(x, y));
            }
        }
        let filled = image.get_pixel(8, 8);
        assert!(filled[0] > 60 && filled[0] < 110, "got {:?}", filled);
        assert!(filled[1] > 60 && filled[1] < 100, "got {:?}", filled);
    }

    #[test]
    fn hole_between_two_colours_blends_them() {
        let mut image = RgbImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut mask = GrayImage::new(20, 10);
        for y in 0..10 {
            for x in 8..12 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        inpaint_telea(&mut image, &mask, 3).expect("inpaint");
        assert!(image.get_pixel(8, 5)[0] < image.get_pixel(11, 5)[0]);
    }

    #[test]
    fn empty_mask_is_a_no_op() {
        let mut image = solid_rgb(4, 4, [1, 2, 3]);
        let mask = GrayImage::new(4, 4);
        assert_eq!(inpaint_telea(&mut image, &mask, 3), Ok(0));
        assert_eq!(image, solid_rgb(4, 4, [1, 2, 3]));
    }

    #[test]
    fn full_mask_is_rejected_without_touching_pixels() {
        let mut image = solid_rgb(4, 4, [9, 9, 9]);
        let mask = GrayImage::from_pixel(4, 4, Luma([255]));
        assert_eq!(
            inpaint_telea(&mut image, &mask, 3),
            Err(InpaintError::NoKnownPixels)
        );
        assert_eq!(image, solid_rgb(4, 4, [9, 9, 9]));
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let mut image = solid_rgb(4, 4, [0, 0, 0]);
        let mask = GrayImage::new(5, 4);
        assert!(matches!(
            inpaint_telea(&mut image, &mask, 3),
            Err(InpaintError::SizeMismatch { .. })
        ));
    }
}
