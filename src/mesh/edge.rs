use super::{
    flags::{FlagSet, Markable},
    vertex::{Point, Vertex, VertexKey},
    INTERSECTION_TOLERANCE,
};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use nalgebra::Vector2;
use slotmap::new_key_type;

new_key_type! {
    /// Identity of an [`Edge`] within a [`CellTree`](super::cell::CellTree)
    pub struct EdgeKey;
}

/// A straight line between two [`Vertex`]s
///
/// Edges on the border between two equally refined cells are shared (the same [`EdgeKey`]) by both cells.
/// The end-point coordinates and length are captured at construction; vertices never move, so they are never recomputed.
///
/// ```text
///    v[0] *-----------* v[1]
///               |<-length->|
/// ```
#[derive(Debug, Clone)]
pub struct Edge {
    pub vertices: [VertexKey; 2],
    pub points: [Point; 2],
    pub length: f64,
    pub boundary: bool,
    flags: FlagSet,
}

impl Edge {
    /// Construct a new edge between two vertices
    pub fn new(keys: [VertexKey; 2], vertices: [&Vertex; 2], boundary: bool) -> Self {
        let points = [vertices[0].coordinate(), vertices[1].coordinate()];
        Self {
            vertices: keys,
            length: points[0].dist(&points[1]),
            points,
            boundary,
            flags: FlagSet::new(),
        }
    }

    pub fn is_on_boundary(&self) -> bool {
        self.boundary
    }

    pub fn midpoint(&self) -> Point {
        self.points[0].midpoint(&self.points[1])
    }

    /// Whether `v` is one of this edge's end-points
    pub fn has_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains(&v)
    }

    /// Determine whether this edge intersects the line segment between `line[0]` and `line[1]`
    ///
    /// Writing the edge as `p + t*r` and the segment as `q + u*s` (`t, u` in `[0, 1]`):
    /// * parallel, collinear segments intersect when their parameter ranges overlap
    /// * parallel, non-collinear segments never intersect
    /// * otherwise the segments intersect when both `t` and `u` lie in `[0, 1]`
    ///
    /// In 1D, this is an interval overlap test.
    pub fn intersects_line_segment(&self, line: [Point; 2]) -> bool {
        match (self.points, line) {
            ([Point::XY(p0), Point::XY(p1)], [Point::XY(q0), Point::XY(q1)]) => {
                let p = Vector2::from(p0);
                let r = Vector2::from(p1) - p;
                let q = Vector2::from(q0);
                let s = Vector2::from(q1) - q;

                let r_cross_s = r.perp(&s);
                if r_cross_s.abs() < INTERSECTION_TOLERANCE {
                    if (q - p).perp(&r).abs() < INTERSECTION_TOLERANCE {
                        // collinear
                        let rr = r.dot(&r);
                        let t0 = (q - p).dot(&r) / rr;
                        let t1 = (q + s - p).dot(&r) / rr;
                        t0.max(t1) >= 0.0 && t0.min(t1) <= 1.0
                    } else {
                        false
                    }
                } else {
                    let t = (q - p).perp(&s) / r_cross_s;
                    let u = (p - q).perp(&r) / s.perp(&r);
                    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
                }
            }
            ([Point::X(a0), Point::X(a1)], [Point::X(b0), Point::X(b1)]) => {
                a0.max(a1) >= b0.min(b1) && b0.max(b1) >= a0.min(a1)
            }
            _ => false,
        }
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "points": JsonValue::from(vec![self.points[0].to_json(), self.points[1].to_json()]),
            "length": self.length,
            "boundary": self.boundary,
            "flags": self.flags.to_json(),
        }
    }
}

impl Markable for Edge {
    fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }
}
