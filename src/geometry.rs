//! Planar geometry for zone collision.
//!
//! All coordinates live in normalised frame-space: `x` and `y` are fractions
//! of the frame width and height. Nothing in this module returns an error.
//! Degenerate polygons, empty zones and non-finite boxes simply never contain
//! or intersect anything, so one dirty detection cannot stall a stream.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::frame::BoundingBox;
use crate::zones::Zone;

/// A 2-D point in normalised frame-space. Serialised as `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

// -------------------- Primitives --------------------

/// Even-odd ray casting containment test.
///
/// Polygons with fewer than 3 points have no interior and always return
/// `false`. Points outside the polygon's bounding rectangle are rejected
/// before walking the edges. Points exactly on the boundary may land either
/// way.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let first = polygon[0];
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for q in &polygon[1..] {
        min_x = min_x.min(q.x);
        max_x = max_x.max(q.x);
        min_y = min_y.min(q.y);
        max_y = max_y.max(q.y);
    }
    if p.x < min_x || p.x > max_x || p.y < min_y || p.y > max_y {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        // The first clause guarantees pi.y != pj.y, so the division is safe.
        if (pi.y > p.y) != (pj.y > p.y)
            && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Intersection point of segments `a1-a2` and `b1-b2`, if they cross.
///
/// Parallel segments (collinear overlap included) report `None`. Endpoints
/// touching count as an intersection.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let dx = a2.x - a1.x;
    let dy = a2.y - a1.y;

    let determinant = dx * (b2.y - b1.y) - (b2.x - b1.x) * dy;
    if determinant == 0.0 {
        return None;
    }

    let lambda = ((b2.y - b1.y) * (b2.x - a1.x) + (b1.x - b2.x) * (b2.y - a1.y)) / determinant;
    let gamma = ((a1.y - a2.y) * (b2.x - a1.x) + dx * (b2.y - a1.y)) / determinant;

    // NaN fails both range checks.
    if !(0.0..=1.0).contains(&lambda) || !(0.0..=1.0).contains(&gamma) {
        return None;
    }

    Some(Point::new(a1.x + lambda * dx, a1.y + lambda * dy))
}

// -------------------- Zone collision --------------------

/// The polygon a zone is tested against.
///
/// Areas (3+ points) are used as-is. A 2-point threshold line is projected
/// up to the top edge of the frame: `[(c.x, 0), (d.x, 0), c, d]`, so anything
/// that reaches the line from above registers as crossing it.
pub fn zone_outline(polygon: &[Point]) -> Cow<'_, [Point]> {
    match polygon {
        [c, d] => Cow::Owned(vec![Point::new(c.x, 0.0), Point::new(d.x, 0.0), *c, *d]),
        _ => Cow::Borrowed(polygon),
    }
}

/// Edges of a polygon outline, closing last -> first when there is an area.
fn outline_edges(outline: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let closing = if outline.len() >= 3 {
        Some((outline[outline.len() - 1], outline[0]))
    } else {
        None
    };
    outline
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .chain(closing)
}

/// True when the box touches the zone: one of ring points 1..4 of the closed
/// corner walk lies inside the zone outline, or a box edge crosses an
/// outline edge.
pub fn bounding_box_collides_zone(bbox: &BoundingBox, zone: &Zone) -> bool {
    if zone.polygon.is_empty() || !bbox.is_finite() {
        return false;
    }
    if !zone.polygon.iter().all(Point::is_finite) {
        return false;
    }

    let ring = bbox.corner_ring();
    let outline = zone_outline(&zone.polygon);

    if ring[1..]
        .iter()
        .any(|corner| point_in_polygon(*corner, &outline))
    {
        return true;
    }

    ring.windows(2).any(|box_edge| {
        outline_edges(&outline)
            .any(|(from, to)| segments_intersect(from, to, box_edge[0], box_edge[1]).is_some())
    })
}

/// Logical OR of [`bounding_box_collides_zone`] over `zones`.
pub fn bounding_box_collides_any_zone(bbox: &BoundingBox, zones: &[Zone]) -> bool {
    zones
        .iter()
        .any(|zone| bounding_box_collides_zone(bbox, zone))
}
