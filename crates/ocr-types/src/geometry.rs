//! Box/polygon geometry and the rotation-frame coordinate transform

use serde::{Deserialize, Serialize};

/// One of the four counter-clockwise rotations the pipeline ever applies.
///
/// Kept as a closed enum rather than a bare integer so "invalid angle" is a
/// compile-time impossibility; the wire format still serializes to a plain
/// integer degree value for stability across implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationAngle {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            RotationAngle::Deg0 => 0,
            RotationAngle::Deg90 => 90,
            RotationAngle::Deg180 => 180,
            RotationAngle::Deg270 => 270,
        }
    }

    /// Any angle outside {0, 90, 180, 270} degrades to identity.
    #[must_use]
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            90 => RotationAngle::Deg90,
            180 => RotationAngle::Deg180,
            270 => RotationAngle::Deg270,
            _ => RotationAngle::Deg0,
        }
    }

    /// Maps a point in the rotated working frame back to the original frame.
    ///
    /// `orig_w`/`orig_h` are the **original** image dimensions. See the
    /// back-mapping table this implements: identity at 0°, and the three
    /// 90°-step reflections for 90/180/270.
    #[must_use]
    pub fn back_map_point(self, x: f64, y: f64, orig_w: u32, orig_h: u32) -> (f64, f64) {
        let w0 = f64::from(orig_w.saturating_sub(1));
        let h0 = f64::from(orig_h.saturating_sub(1));
        match self {
            RotationAngle::Deg0 => (x, y),
            RotationAngle::Deg90 => (w0 - y, x),
            RotationAngle::Deg180 => (w0 - x, h0 - y),
            RotationAngle::Deg270 => (y, h0 - x),
        }
    }

    /// The inverse of [`back_map_point`](Self::back_map_point): maps a point
    /// in the original frame forward into the rotated working frame.
    #[must_use]
    pub fn forward_map_point(self, x0: f64, y0: f64, orig_w: u32, orig_h: u32) -> (f64, f64) {
        let w0 = f64::from(orig_w.saturating_sub(1));
        let h0 = f64::from(orig_h.saturating_sub(1));
        match self {
            RotationAngle::Deg0 => (x0, y0),
            RotationAngle::Deg90 => (y0, w0 - x0),
            RotationAngle::Deg180 => (w0 - x0, h0 - y0),
            RotationAngle::Deg270 => (h0 - y0, x0),
        }
    }
}

/// Axis-aligned integer box, reported in whichever frame is documented by
/// the containing type (working frame pre-transform, original frame post).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl BBox {
    #[must_use]
    pub fn right(&self) -> i64 {
        self.x + self.w
    }

    #[must_use]
    pub fn bottom(&self) -> i64 {
        self.y + self.h
    }

    /// Back-transforms this box from the rotated working frame into the
    /// original frame by mapping all four corners and taking their AABB,
    /// rounded to the nearest integer. This is §4.3.1 of the box-mapping
    /// contract: the result is the AABB of the transformed corners, not a
    /// rotation of the original AABB.
    ///
    /// Corners are taken at the box's *inclusive* pixel bounds
    /// (`right() - 1`, `bottom() - 1`, the last pixel actually inside the
    /// box) rather than the exclusive one-past-the-end edge `right()`/
    /// `bottom()` report, matching `back_map_point`'s own pixel-index
    /// convention. Width/height of the result are likewise measured
    /// inclusively (`max - min + 1`), so a 0° identity rotation reproduces
    /// the input box exactly.
    #[must_use]
    pub fn back_map(&self, angle: RotationAngle, orig_w: u32, orig_h: u32) -> BBox {
        let last_x = (self.right() - 1) as f64;
        let last_y = (self.bottom() - 1) as f64;
        let corners = [
            (self.x as f64, self.y as f64),
            (last_x, self.y as f64),
            (last_x, last_y),
            (self.x as f64, last_y),
        ]
        .map(|(x, y)| angle.back_map_point(x, y, orig_w, orig_h));

        let min_x = corners.iter().fold(f64::INFINITY, |acc, &(x, _)| acc.min(x));
        let max_x = corners.iter().fold(f64::NEG_INFINITY, |acc, &(x, _)| acc.max(x));
        let min_y = corners.iter().fold(f64::INFINITY, |acc, &(_, y)| acc.min(y));
        let max_y = corners.iter().fold(f64::NEG_INFINITY, |acc, &(_, y)| acc.max(y));

        let x = min_x.round() as i64;
        let y = min_y.round() as i64;
        BBox {
            x,
            y,
            w: (max_x.round() as i64) - x + 1,
            h: (max_y.round() as i64) - y + 1,
        }
    }
}

/// Smallest axis-aligned integer box containing every point in `points`,
/// each coordinate rounded to the nearest integer.
fn aabb_of(points: impl Iterator<Item = (f64, f64)>) -> BBox {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for (x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let x = min_x.round() as i64;
    let y = min_y.round() as i64;
    BBox {
        x,
        y,
        w: (max_x.round() as i64) - x,
        h: (max_y.round() as i64) - y,
    }
}

/// A single (x, y) polygon vertex, in whichever frame the containing
/// [`crate::Region`] documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// An ordered, non-self-intersecting polygon of at least three vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    #[must_use]
    pub fn aabb(&self) -> BBox {
        aabb_of(self.0.iter().map(|p| (p.x, p.y)))
    }

    #[must_use]
    pub fn back_map(&self, angle: RotationAngle, orig_w: u32, orig_h: u32) -> Polygon {
        Polygon(
            self.0
                .iter()
                .map(|p| {
                    let (x, y) = angle.back_map_point(p.x, p.y, orig_w, orig_h);
                    Point { x, y }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rotation_is_noop() {
        let b = BBox { x: 10, y: 5, w: 20, h: 10 };
        assert_eq!(b.back_map(RotationAngle::Deg0, 80, 50), b);
    }

    #[test]
    fn coordinate_round_trip_all_angles() {
        for angle in [
            RotationAngle::Deg0,
            RotationAngle::Deg90,
            RotationAngle::Deg180,
            RotationAngle::Deg270,
        ] {
            let (x, y) = (37.0, 12.0);
            let (x0, y0) = angle.back_map_point(x, y, 80, 50);
            let (x1, y1) = angle.forward_map_point(x0, y0, 80, 50);
            assert!((x1 - x).abs() < 1e-9, "angle {:?}: x round-trip", angle);
            assert!((y1 - y).abs() < 1e-9, "angle {:?}: y round-trip", angle);
        }
    }

    /// The literal 90°-rotation worked example: a detection box of
    /// {x=10,y=5,w=20,h=10} in the working frame of an 80×50 original image
    /// back-maps to {x=65,y=10,w=10,h=20}.
    #[test]
    fn ninety_degree_worked_example() {
        let working_box = BBox { x: 10, y: 5, w: 20, h: 10 };
        let mapped = working_box.back_map(RotationAngle::Deg90, 80, 50);
        assert_eq!(mapped, BBox { x: 65, y: 10, w: 10, h: 20 });
    }

    #[test]
    fn from_degrees_clamps_unknown_to_identity() {
        assert_eq!(RotationAngle::from_degrees(45), RotationAngle::Deg0);
        assert_eq!(RotationAngle::from_degrees(90), RotationAngle::Deg90);
        assert_eq!(RotationAngle::from_degrees(-90), RotationAngle::Deg270);
    }
}
