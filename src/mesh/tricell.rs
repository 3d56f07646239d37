use super::{
    cell::{CellKey, CellTree},
    edge::EdgeKey,
    error::{MeshError, Result},
    flags::{FlagSet, Markable},
    position::{EdgePos, VertexPos},
    vertex::{Point, VertexKey},
};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use smallvec::SmallVec;

/// A mid-side vertex of a leaf whose neighbor is split, along with the neighbor's half-edges
/// (ordered by increasing coordinate along the side)
pub type HangingVertex = (VertexKey, [EdgeKey; 2]);

/// A triangle of a conforming triangulation
///
/// ```text
///        v2
///        *
///       / \
///   e2 /   \ e1
///     /     \
///    *-------*
///   v0   e0   v1
/// ```
///
/// Vertices are counter-clockwise; edge `i` joins vertex `i` and vertex `i + 1`.
/// Vertices and edges belong to the [`CellTree`] the triangle was built from.
#[derive(Clone, Debug)]
pub struct TriCell {
    vertices: [VertexKey; 3],
    edges: [EdgeKey; 3],
    points: [Point; 3],
    number: Option<usize>,
    flags: FlagSet,
}

impl TriCell {
    pub fn new(vertices: [VertexKey; 3], edges: [EdgeKey; 3], points: [Point; 3]) -> Self {
        Self {
            vertices,
            edges,
            points,
            number: None,
            flags: FlagSet::new(),
        }
    }

    pub fn vertices(&self) -> [VertexKey; 3] {
        self.vertices
    }

    pub fn edges(&self) -> [EdgeKey; 3] {
        self.edges
    }

    pub fn points(&self) -> [Point; 3] {
        self.points
    }

    pub fn area(&self) -> f64 {
        let [a, b, c] = self.points;
        let (ax, ay) = (a.x(), a.y().unwrap_or(0.0));
        let (bx, by) = (b.x(), b.y().unwrap_or(0.0));
        let (cx, cy) = (c.x(), c.y().unwrap_or(0.0));
        0.5 * ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs()
    }

    /// The element number assigned by [`TriCell::number`]
    pub fn num(&self) -> Option<usize> {
        self.number
    }

    /// Assign an element number. An existing number is only replaced if `overwrite` is set.
    pub fn number(&mut self, num: usize, overwrite: bool) -> Result<()> {
        match self.number {
            Some(existing) if !overwrite => Err(MeshError::AlreadyNumbered(existing)),
            _ => {
                self.number = Some(num);
                Ok(())
            }
        }
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "points": JsonValue::from(self.points.iter().map(|p| p.to_json()).collect::<Vec<_>>()),
            "number": self.number,
            "flags": self.flags.to_json(),
        }
    }
}

impl Markable for TriCell {
    fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }
}

impl CellTree {
    fn tricell(&self, vertices: [VertexKey; 3], edges: [EdgeKey; 3]) -> Result<TriCell> {
        let points = [
            self.point(vertices[0])?,
            self.point(vertices[1])?,
            self.point(vertices[2])?,
        ];
        Ok(TriCell::new(vertices, edges, points))
    }

    /// Triangulate a `QuadCell` so that it conforms with its neighbors
    ///
    /// `hanging` holds the hanging vertex on each side, indexed `[S, E, N, W]`. Without any, the
    /// cell is cut along its `SwNe` diagonal. Otherwise triangles fan out from the cell center
    /// through every corner and hanging vertex. A center and spokes which the cell doesn't already
    /// hold are removed again by `clear_triangulation_geometry`.
    pub(crate) fn triangulate_quadcell(
        &mut self,
        key: CellKey,
        hanging: [Option<HangingVertex>; 4],
    ) -> Result<Vec<TriCell>> {
        let quad = *self.try_cell(key)?.as_quadcell().ok_or_else(|| {
            MeshError::StructuralInconsistency(format!("Cell {:?} is not a QuadCell", key))
        })?;
        let corners = quad.corners();
        let sides = quad.sides();

        if hanging.iter().all(Option::is_none) {
            let [sw, se, ne, nw] = corners;
            let [s, e, n, w] = sides;
            let [sw_ne, _] = quad.diagonals();
            return Ok(vec![
                self.tricell([sw, se, ne], [s, e, sw_ne])?,
                self.tricell([sw, ne, nw], [sw_ne, n, w])?,
            ]);
        }

        // boundary vertices counter-clockwise from SW, each with the edge to the next one
        let mut ring: SmallVec<[(VertexKey, EdgeKey); 8]> = SmallVec::new();
        for (s, hang) in hanging.iter().enumerate() {
            match hang {
                None => ring.push((corners[s], sides[s])),
                Some((mid, [lower, upper])) => {
                    // S and E are walked in increasing coordinate, N and W in decreasing
                    let (first, second) = if s < 2 {
                        (*lower, *upper)
                    } else {
                        (*upper, *lower)
                    };
                    ring.push((corners[s], first));
                    ring.push((*mid, second));
                }
            }
        }

        let center = match quad.vertex(VertexPos::M) {
            Some(m) => m,
            None => self.add_triangulation_vertex(self.bounding_box(key)?.center()),
        };

        let mut spokes: SmallVec<[EdgeKey; 8]> = SmallVec::new();
        for (v, _) in ring.iter() {
            let existing = VertexPos::ALL
                .iter()
                .find(|pos| quad.vertex(**pos) == Some(*v))
                .and_then(|pos| EdgePos::spoke(*pos))
                .and_then(|spoke| quad.edge(spoke));
            spokes.push(match existing {
                Some(edge) => edge,
                None => self.add_triangulation_edge([center, *v])?,
            });
        }

        let n = ring.len();
        (0..n)
            .map(|i| {
                let j = (i + 1) % n;
                self.tricell(
                    [ring[i].0, ring[j].0, center],
                    [ring[i].1, spokes[j], spokes[i]],
                )
            })
            .collect()
    }
}
