use crate::core_modules::blob::{Blob, NormPoint};
use crate::core_modules::label_map::LabelMap;
use std::f64::consts::TAU;

/// Minimum number of vertices for an approximated outline.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Approximates the outline of `blob` with `points` vertices.
///
/// A ray is cast from the pixel mass center at each of `points` evenly spaced
/// angles. Each ray starts at the distance of the farthest bounding-box corner
/// and walks inward one pixel at a time until it lands on a pixel carrying the
/// blob's raw label. A ray that never hits ends on the center pixel.
pub fn approximate_polygon(blob: &Blob, labels: &LabelMap, points: usize) -> Vec<NormPoint> {
    let (width, height) = labels.dimensions();
    if width == 0 || height == 0 || points == 0 {
        return Vec::new();
    }
    let (w, h) = (width as f64, height as f64);
    let center = blob.mass_center;

    let radius = blob
        .rect
        .corners()
        .iter()
        .map(|corner| (((corner.x - center.x) * w).powi(2) + ((corner.y - center.y) * h).powi(2)).sqrt())
        .fold(0.0, f64::max)
        .floor() as u32;

    let center_x = (center.x * w).floor();
    let center_y = (center.y * h).floor();

    (0..points)
        .map(|j| {
            let angle = j as f64 / points as f64 * TAU;
            let (sin, cos) = angle.sin_cos();

            let mut hit = (clamp_coord(center_x, width), clamp_coord(center_y, height));
            for r in (0..=radius).rev() {
                let r = r as f64;
                let x = clamp_coord((center_x + r * cos).floor(), width);
                let y = clamp_coord((center_y + r * sin).floor(), height);
                hit = (x, y);
                if labels.get(x, y) == blob.raw_label {
                    break;
                }
            }
            NormPoint::new(hit.0 as f64 / w, hit.1 as f64 / h)
        })
        .collect()
}

fn clamp_coord(value: f64, size: u32) -> u32 {
    if value < 0.0 || value.is_nan() {
        0
    } else if value >= size as f64 {
        size - 1
    } else {
        value as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::NormRect;
    use crate::core_modules::timestamp::Timestamp;

    /// 20x20 map with a filled square of label 1 over x, y in 5..=14.
    fn square_map() -> (LabelMap, Blob) {
        let mut labels = LabelMap::new(20, 20);
        for y in 5..15 {
            for x in 5..15 {
                labels.set(x, y, 1);
            }
        }
        let blob = Blob::new(
            NormRect::new(0.25, 0.25, 0.45, 0.45),
            NormPoint::new(0.475, 0.475),
            0.25,
            1,
            Timestamp::default(),
        );
        (labels, blob)
    }

    #[test]
    fn vertices_land_on_the_blob() {
        let (labels, blob) = square_map();
        let polygon = approximate_polygon(&blob, &labels, 6);
        assert_eq!(polygon.len(), 6);
        for point in &polygon {
            let x = (point.x * 20.0).round() as u32;
            let y = (point.y * 20.0).round() as u32;
            assert_eq!(labels.get(x, y), 1, "({}, {})", x, y);
        }
        // The first ray points along +x and stops on the right edge of the square.
        assert_eq!(polygon[0], NormPoint::new(14.0 / 20.0, 9.0 / 20.0));
    }

    #[test]
    fn rays_without_a_hit_fall_back_to_the_center() {
        let (labels, mut blob) = square_map();
        blob.raw_label = 2;
        let polygon = approximate_polygon(&blob, &labels, 4);
        assert_eq!(polygon.len(), 4);
        for point in polygon {
            assert_eq!(point, NormPoint::new(9.0 / 20.0, 9.0 / 20.0));
        }
    }

    #[test]
    fn empty_map_yields_no_polygon() {
        let (_, blob) = square_map();
        assert!(approximate_polygon(&blob, &LabelMap::default(), 6).is_empty());
    }
}
