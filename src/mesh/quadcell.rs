use super::{
    cell::{CellGeometry, CellKey, CellTree},
    edge::EdgeKey,
    error::{MeshError, Result},
    position::{ChildPos, Direction, EdgePos, GridSize, Quadrant, VertexPos},
    tree::Hierarchy,
    vertex::{Point, VertexKey},
};

use smallvec::SmallVec;

/// Geometry of a rectangular cell
///
/// An unsplit `QuadCell` holds its 4 corners, 4 sides and 2 diagonals. While it is split, it also holds
/// a center vertex `M`, the 4 mid-side vertices, the 8 half-edges along its sides, and 8 spokes from `M`.
///
/// ## Layout
/// ```text
///   NW        NNw       N        NeN       NE
///     *------------------*------------------*
///     |  .               |               .  |
///     |     . MNw        |MN        MNe.    |
///  NwW|        .         |         .        |ENe
///     |           .      |      .           |
///     |              .   |   .              |
///   W *------------------*------------------* E
///     |      MW      .   |M  .      ME      |
///     |           .      |      .           |
///  WSw|        .         |         .        |SeE
///     |     . MSw        |MS        MSe.    |
///     |  .               |               .  |
///     *------------------*------------------*
///   SW        SwS       S        SSe       SE
/// ```
///
/// ## Splitting
/// The children are the quadrants `SW`, `SE`, `NW` and `NE`. Each child inherits:
/// * its corners from the parent's corners, mid-side vertices and `M`
/// * its sides from the parent's half-edges and spokes
/// * the diagonal which runs through `M` from the parent's spokes
///
/// Its remaining diagonal is new. Mid-side vertices and half-edges are taken from an equally deep,
/// already split neighbor whenever there is one, so the shared side is never duplicated.
#[derive(Clone, Copy, Debug)]
pub struct QuadCell {
    corners: [VertexKey; 4],
    sides: [EdgeKey; 4],
    diagonals: [EdgeKey; 2],
    refinement: Option<Refinement>,
}

/// Vertices and edges which exist only while a `QuadCell` is split
#[derive(Clone, Copy, Debug)]
struct Refinement {
    center: VertexKey,
    /// indexed by [`side_index`]
    midpoints: [VertexKey; 4],
    /// indexed by [`side_index`], each ordered as in [`EdgePos::halves`]
    halves: [[EdgeKey; 2]; 4],
    /// ordered as [`EdgePos::SPOKES`]
    spokes: [EdgeKey; 8],
}

/// Sides in counter-clockwise order
pub const SIDES: [Direction; 4] = [Direction::S, Direction::E, Direction::N, Direction::W];

fn side_index(dir: Direction) -> Option<usize> {
    SIDES.iter().position(|d| *d == dir)
}

/// Parent vertices forming each child's `[SW, SE, NE, NW]` corners (indexed by [`Quadrant::index`])
const CHILD_CORNERS: [[VertexPos; 4]; 4] = {
    use VertexPos::*;
    [
        [SW, S, M, W],
        [S, SE, E, M],
        [W, M, N, NW],
        [M, E, NE, N],
    ]
};

/// Parent edges forming each child's `[SwSe, SeNe, NeNw, NwSw]` sides (indexed by [`Quadrant::index`])
const CHILD_SIDES: [[EdgePos; 4]; 4] = {
    use EdgePos::*;
    [
        [SwS, MS, MW, WSw],
        [SSe, SeE, ME, MS],
        [MW, MN, NNw, NwW],
        [ME, ENe, NeN, MN],
    ]
};

/// Parent spoke which becomes each child's diagonal through `M`
const CHILD_DIAGONAL: [(EdgePos, EdgePos); 4] = [
    (EdgePos::SwNe, EdgePos::MSw),
    (EdgePos::NwSe, EdgePos::MSe),
    (EdgePos::NwSe, EdgePos::MNw),
    (EdgePos::SwNe, EdgePos::MNe),
];

impl QuadCell {
    /// `corners`: `[SW, SE, NE, NW]`, `sides`: `[SwSe, SeNe, NeNw, NwSw]`, `diagonals`: `[SwNe, NwSe]`
    pub fn new(corners: [VertexKey; 4], sides: [EdgeKey; 4], diagonals: [EdgeKey; 2]) -> Self {
        Self {
            corners,
            sides,
            diagonals,
            refinement: None,
        }
    }

    /// `[SW, SE, NE, NW]`
    pub fn corners(&self) -> [VertexKey; 4] {
        self.corners
    }

    /// `[SwSe, SeNe, NeNw, NwSw]`
    pub fn sides(&self) -> [EdgeKey; 4] {
        self.sides
    }

    /// `[SwNe, NwSe]`
    pub fn diagonals(&self) -> [EdgeKey; 2] {
        self.diagonals
    }

    pub fn is_refined(&self) -> bool {
        self.refinement.is_some()
    }

    pub fn vertex(&self, pos: VertexPos) -> Option<VertexKey> {
        match pos {
            VertexPos::SW => Some(self.corners[0]),
            VertexPos::SE => Some(self.corners[1]),
            VertexPos::NE => Some(self.corners[2]),
            VertexPos::NW => Some(self.corners[3]),
            VertexPos::M => self.refinement.map(|r| r.center),
            VertexPos::S => self.midpoint(Direction::S),
            VertexPos::E => self.midpoint(Direction::E),
            VertexPos::N => self.midpoint(Direction::N),
            VertexPos::W => self.midpoint(Direction::W),
        }
    }

    pub fn edge(&self, pos: EdgePos) -> Option<EdgeKey> {
        if let Some(i) = EdgePos::BOUNDARY.iter().position(|e| *e == pos) {
            return Some(self.sides[i]);
        }
        if let Some(i) = EdgePos::DIAGONALS.iter().position(|e| *e == pos) {
            return Some(self.diagonals[i]);
        }
        let refinement = self.refinement?;
        if let Some(i) = EdgePos::SPOKES.iter().position(|e| *e == pos) {
            return Some(refinement.spokes[i]);
        }
        SIDES.iter().enumerate().find_map(|(s, dir)| {
            let k = EdgePos::halves(*dir)?.iter().position(|e| *e == pos)?;
            Some(refinement.halves[s][k])
        })
    }

    /// Mid-side vertex on side `dir` (present only while split)
    pub fn midpoint(&self, dir: Direction) -> Option<VertexKey> {
        Some(self.refinement?.midpoints[side_index(dir)?])
    }

    /// Half-edges along side `dir`, ordered as in [`EdgePos::halves`] (present only while split)
    pub fn halves(&self, dir: Direction) -> Option<[EdgeKey; 2]> {
        Some(self.refinement?.halves[side_index(dir)?])
    }

    pub fn edge_keys(&self) -> SmallVec<[EdgeKey; 22]> {
        EdgePos::ALL.iter().filter_map(|e| self.edge(*e)).collect()
    }

    pub(super) fn clear_refinement(&mut self) {
        self.refinement = None;
    }
}

impl CellTree {
    /// Split a `QuadCell` into quadrants; coarse neighbors must already be split
    pub(super) fn split_quadcell(&mut self, key: CellKey) -> Result<()> {
        let depth = self.depth(key);
        let quad = *self
            .try_cell(key)?
            .as_quadcell()
            .ok_or_else(|| not_a_quadcell(key))?;
        let [sw, se, ne, nw] = quad.corners;

        let center = self.add_vertex(self.bounding_box(key)?.center());

        let mut midpoints = [center; 4];
        let mut halves = [[quad.sides[0]; 2]; 4];
        for (s, dir) in SIDES.iter().enumerate() {
            let inherited = match self.neighbor(key, *dir) {
                Some(nb) if self.depth(nb) == depth => {
                    self.try_cell(nb)?.as_quadcell().and_then(|q| {
                        Some((q.midpoint(dir.opposite())?, q.halves(dir.opposite())?))
                    })
                }
                Some(nb) if self.depth(nb) + 1 == depth => None,
                None => None,
                Some(nb) => {
                    return Err(MeshError::StructuralInconsistency(format!(
                        "Cell {:?} (depth {}) has a neighbor to the {} at depth {}; it should have been split first",
                        key,
                        depth,
                        dir,
                        self.depth(nb)
                    )))
                }
            };

            (midpoints[s], halves[s]) = match inherited {
                Some(shared) => shared,
                None => {
                    // end-points of the side, by increasing coordinate
                    let [a, b] = match dir {
                        Direction::S => [sw, se],
                        Direction::E => [se, ne],
                        Direction::N => [nw, ne],
                        _ => [sw, nw],
                    };
                    let boundary = self.edge(quad.sides[s]).map_or(false, |e| e.boundary);
                    let m = self.add_vertex(self.point(a)?.midpoint(&self.point(b)?));
                    (
                        m,
                        [
                            self.add_edge([a, m], boundary)?,
                            self.add_edge([m, b], boundary)?,
                        ],
                    )
                }
            };
        }

        let vertex_of = |pos: VertexPos| match pos {
            VertexPos::SW => sw,
            VertexPos::SE => se,
            VertexPos::NE => ne,
            VertexPos::NW => nw,
            VertexPos::S => midpoints[0],
            VertexPos::E => midpoints[1],
            VertexPos::N => midpoints[2],
            VertexPos::W => midpoints[3],
            VertexPos::M => center,
        };
        let mut spokes = [quad.sides[0]; 8];
        for (k, spoke) in EdgePos::SPOKES.iter().enumerate() {
            spokes[k] = self.add_edge([center, vertex_of(spoke.endpoints()[1])], false)?;
        }

        let refined = QuadCell {
            refinement: Some(Refinement {
                center,
                midpoints,
                halves,
                spokes,
            }),
            ..quad
        };
        if let Some(cell) = self.cell_mut(key) {
            cell.geometry = CellGeometry::Quad(refined);
        }

        for q in Quadrant::ALL {
            let inherited_vertex = |pos: VertexPos| {
                refined.vertex(pos).ok_or_else(|| {
                    MeshError::StructuralInconsistency(format!(
                        "Cell {:?} is missing vertex {:?} after splitting",
                        key, pos
                    ))
                })
            };
            let inherited_edge = |pos: EdgePos| {
                refined.edge(pos).ok_or_else(|| {
                    MeshError::StructuralInconsistency(format!(
                        "Cell {:?} is missing edge {:?} after splitting",
                        key, pos
                    ))
                })
            };

            let [c0, c1, c2, c3] = CHILD_CORNERS[q.index()];
            let corners = [
                inherited_vertex(c0)?,
                inherited_vertex(c1)?,
                inherited_vertex(c2)?,
                inherited_vertex(c3)?,
            ];
            let [s0, s1, s2, s3] = CHILD_SIDES[q.index()];
            let sides = [
                inherited_edge(s0)?,
                inherited_edge(s1)?,
                inherited_edge(s2)?,
                inherited_edge(s3)?,
            ];

            let (slot, source) = CHILD_DIAGONAL[q.index()];
            let through_center = inherited_edge(source)?;
            let diagonals = if slot == EdgePos::SwNe {
                [through_center, self.add_edge([corners[3], corners[1]], false)?]
            } else {
                [self.add_edge([corners[0], corners[2]], false)?, through_center]
            };

            self.add_child(
                key,
                ChildPos::Quad(q),
                CellGeometry::Quad(QuadCell::new(corners, sides, diagonals)),
            )?;
        }

        Ok(())
    }

    /// Split a gridded root into `nx * ny` cells
    ///
    /// Grid vertex `(i, j)` and the grid lines between vertices are shared by all adjacent cells.
    /// The root's corners (and sides, when the grid does not divide them) are reused.
    pub(super) fn split_rectangle_grid(
        &mut self,
        key: CellKey,
        quad: QuadCell,
        grid: GridSize,
    ) -> Result<()> {
        let GridSize::Two(nx, ny) = grid else {
            return Err(MeshError::MalformedGrid(format!(
                "{:?} cannot divide a QuadCell",
                grid
            )));
        };
        let bbox = self.bounding_box(key)?;
        let [x0, x1] = bbox.x;
        let [y0, y1] = bbox.y.ok_or_else(|| not_a_quadcell(key))?;
        let [sw, se, ne, nw] = quad.corners;
        let [side_s, side_e, side_n, side_w] = quad.sides;

        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(match (i == 0, i == nx, j == 0, j == ny) {
                    (true, _, true, _) => sw,
                    (_, true, true, _) => se,
                    (_, true, _, true) => ne,
                    (true, _, _, true) => nw,
                    _ => self.add_vertex(Point::XY([
                        x0 + (x1 - x0) * i as f64 / nx as f64,
                        y0 + (y1 - y0) * j as f64 / ny as f64,
                    ])),
                });
            }
        }
        let v = |i: usize, j: usize| vertices[j * (nx + 1) + i];

        // horizontal lines (i, j) -> (i + 1, j)
        let mut h_edges = Vec::with_capacity(nx * (ny + 1));
        for j in 0..=ny {
            for i in 0..nx {
                h_edges.push(match (nx, j) {
                    (1, 0) => side_s,
                    (1, j) if j == ny => side_n,
                    _ => self.add_edge([v(i, j), v(i + 1, j)], j == 0 || j == ny)?,
                });
            }
        }
        // vertical lines (i, j) -> (i, j + 1)
        let mut v_edges = Vec::with_capacity((nx + 1) * ny);
        for j in 0..ny {
            for i in 0..=nx {
                v_edges.push(match (ny, i) {
                    (1, 0) => side_w,
                    (1, i) if i == nx => side_e,
                    _ => self.add_edge([v(i, j), v(i, j + 1)], i == 0 || i == nx)?,
                });
            }
        }
        let h = |i: usize, j: usize| h_edges[j * nx + i];
        let vl = |i: usize, j: usize| v_edges[j * (nx + 1) + i];

        for j in 0..ny {
            for i in 0..nx {
                let corners = [v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)];
                let sides = [h(i, j), vl(i + 1, j), h(i, j + 1), vl(i, j)];
                let diagonals = [
                    self.add_edge([corners[0], corners[2]], false)?,
                    self.add_edge([corners[3], corners[1]], false)?,
                ];
                self.add_child(
                    key,
                    ChildPos::Grid(i, j),
                    CellGeometry::Quad(QuadCell::new(corners, sides, diagonals)),
                )?;
            }
        }

        Ok(())
    }
}

fn not_a_quadcell(key: CellKey) -> MeshError {
    MeshError::StructuralInconsistency(format!("Cell {:?} is not a QuadCell", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::cell::BoundingBox;
    use std::collections::BTreeSet;

    fn grid_tree(nx: usize, ny: usize) -> CellTree {
        CellTree::new(
            BoundingBox::new(&[0.0, 2.0, 0.0, 1.0]).unwrap(),
            Some(GridSize::Two(nx, ny)),
        )
        .unwrap()
    }

    #[test]
    fn grid_children() {
        let tree = grid_tree(2, 2);
        let root = tree.root();
        let positions: Vec<ChildPos> = tree.children(root).iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, GridSize::Two(2, 2).positions());

        let c = tree.child(root, ChildPos::Grid(1, 1)).unwrap();
        let bbox = tree.bounding_box(c).unwrap();
        assert_eq!(bbox.x, [1.0, 2.0]);
        assert_eq!(bbox.y, Some([0.5, 1.0]));

        // grid cells share corners and sides
        let c00 = tree.child(root, ChildPos::Grid(0, 0)).unwrap();
        let c10 = tree.child(root, ChildPos::Grid(1, 0)).unwrap();
        let c01 = tree.child(root, ChildPos::Grid(0, 1)).unwrap();
        assert_eq!(
            tree.vertex_at(c00, VertexPos::NE),
            tree.vertex_at(c, VertexPos::SW)
        );
        assert_eq!(
            tree.edge_at(c00, EdgePos::SeNe),
            tree.edge_at(c10, EdgePos::NwSw)
        );
        assert_eq!(
            tree.edge_at(c00, EdgePos::NeNw),
            tree.edge_at(c01, EdgePos::SwSe)
        );
        assert_eq!(
            tree.vertex_at(c00, VertexPos::SW),
            tree.vertex_at(root, VertexPos::SW)
        );

        // 9 distinct vertices and 12 distinct sides
        let corners: BTreeSet<_> = tree
            .children(root)
            .iter()
            .flat_map(|(_, c)| tree.cell(*c).unwrap().corners())
            .collect();
        let sides: BTreeSet<_> = tree
            .children(root)
            .iter()
            .flat_map(|(_, c)| tree.cell(*c).unwrap().sides())
            .collect();
        assert_eq!(corners.len(), 9);
        assert_eq!(sides.len(), 12);
    }

    #[test]
    fn single_row_grid_reuses_root_sides() {
        let tree = grid_tree(3, 1);
        let root = tree.root();
        let first = tree.child(root, ChildPos::Grid(0, 0)).unwrap();
        let last = tree.child(root, ChildPos::Grid(2, 0)).unwrap();
        assert_eq!(tree.edge_at(first, EdgePos::NwSw), tree.edge_at(root, EdgePos::NwSw));
        assert_eq!(tree.edge_at(last, EdgePos::SeNe), tree.edge_at(root, EdgePos::SeNe));
        assert_ne!(tree.edge_at(first, EdgePos::SwSe), tree.edge_at(root, EdgePos::SwSe));
    }

    #[test]
    fn grid_neighbors() {
        let tree = grid_tree(3, 2);
        let root = tree.root();
        let at = |i, j| tree.child(root, ChildPos::Grid(i, j)).unwrap();

        assert_eq!(tree.neighbor(at(1, 0), Direction::E), Some(at(2, 0)));
        assert_eq!(tree.neighbor(at(1, 0), Direction::N), Some(at(1, 1)));
        assert_eq!(tree.neighbor(at(1, 0), Direction::NW), Some(at(0, 1)));
        assert_eq!(tree.neighbor(at(1, 0), Direction::S), None);
        assert_eq!(tree.neighbor(at(2, 1), Direction::E), None);
    }

    #[test]
    fn every_child_is_fully_defined() {
        let mut tree = grid_tree(1, 1);
        let root = tree.root();
        let c = tree.child(root, ChildPos::Grid(0, 0)).unwrap();
        tree.split(c).unwrap();

        let parent = *tree.cell(c).unwrap().as_quadcell().unwrap();
        assert!(parent.is_refined());
        assert_eq!(parent.edge_keys().len(), 22);
        assert_eq!(tree.cell(c).unwrap().vertex_keys().len(), 9);

        for (_, child) in tree.children(c) {
            let q = tree.cell(*child).unwrap().as_quadcell().unwrap();
            assert!(!q.is_refined());
            assert_eq!(q.edge_keys().len(), 6);
            for pos in VertexPos::CORNERS {
                assert!(q.vertex(pos).is_some());
            }
            assert!(q.vertex(VertexPos::M).is_none());
        }
    }

    #[test]
    fn diagonals_through_center() {
        let mut tree = grid_tree(1, 1);
        let root = tree.root();
        let c = tree.child(root, ChildPos::Grid(0, 0)).unwrap();
        tree.split(c).unwrap();
        let m = tree.vertex_at(c, VertexPos::M).unwrap();

        for q in Quadrant::ALL {
            let child = tree.child(c, ChildPos::Quad(q)).unwrap();
            let quad = tree.cell(child).unwrap().as_quadcell().unwrap();
            let through = quad
                .diagonals()
                .iter()
                .filter(|d| tree.edge(**d).unwrap().has_vertex(m))
                .count();
            assert_eq!(through, 1);
        }
    }
}
