use super::{
    bicell::BiCell,
    edge::{Edge, EdgeKey},
    error::{MeshError, Result},
    flags::{FlagSet, Markable},
    position::{ChildPos, Direction, EdgePos, GridSize, Quadrant, VertexPos},
    quadcell::QuadCell,
    tree::{Hierarchy, TraversalMode},
    vertex::{Point, Vertex, VertexKey},
    MAX_TREE_DEPTH,
};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use log::{debug, trace};
use slotmap::{new_key_type, SlotMap};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeSet;

new_key_type! {
    /// Identity of a [`Cell`] within a [`CellTree`]
    pub struct CellKey;
}

/// Cell variant of a [`CellTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    /// 1D intervals
    Bi,
    /// 2D rectangles
    Quad,
}

impl CellKind {
    pub fn dim(&self) -> usize {
        match self {
            Self::Bi => 1,
            Self::Quad => 2,
        }
    }

    /// Number of children produced by a (non-grid) split
    pub fn branching_factor(&self) -> usize {
        match self {
            Self::Bi => 2,
            Self::Quad => 4,
        }
    }
}

/// Axis aligned extent of a cell: `[x0, x1]` or `[x0, x1] x [y0, y1]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: [f64; 2],
    pub y: Option<[f64; 2]>,
}

impl BoundingBox {
    /// Build from `[x0, x1]` or `[x0, x1, y0, y1]`
    pub fn new(bounds: &[f64]) -> Result<Self> {
        let ordered = |lo: f64, hi: f64| lo.is_finite() && hi.is_finite() && lo < hi;
        match *bounds {
            [x0, x1] if ordered(x0, x1) => Ok(Self {
                x: [x0, x1],
                y: None,
            }),
            [x0, x1, y0, y1] if ordered(x0, x1) && ordered(y0, y1) => Ok(Self {
                x: [x0, x1],
                y: Some([y0, y1]),
            }),
            _ => Err(MeshError::MalformedBox(format!(
                "{:?}; expected [x0, x1] or [x0, x1, y0, y1] with increasing, finite bounds",
                bounds
            ))),
        }
    }

    pub fn dim(&self) -> usize {
        if self.y.is_some() {
            2
        } else {
            1
        }
    }

    /// Inclusive containment test; points on a shared border belong to both cells
    pub fn contains(&self, point: &Point) -> bool {
        match (point, self.y) {
            (Point::X(x), None) => self.x[0] <= *x && *x <= self.x[1],
            (Point::XY([x, y]), Some([y0, y1])) => {
                self.x[0] <= *x && *x <= self.x[1] && y0 <= *y && *y <= y1
            }
            _ => false,
        }
    }

    pub fn widths(&self) -> SmallVec<[f64; 2]> {
        let mut w = smallvec![self.x[1] - self.x[0]];
        if let Some([y0, y1]) = self.y {
            w.push(y1 - y0);
        }
        w
    }

    pub fn lower(&self) -> Point {
        match self.y {
            Some([y0, _]) => Point::XY([self.x[0], y0]),
            None => Point::X(self.x[0]),
        }
    }

    pub fn center(&self) -> Point {
        let cx = 0.5 * (self.x[0] + self.x[1]);
        match self.y {
            Some([y0, y1]) => Point::XY([cx, 0.5 * (y0 + y1)]),
            None => Point::X(cx),
        }
    }

    /// `[x0, x1]` or `[x0, x1, y0, y1]`
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = self.x.to_vec();
        if let Some(y) = self.y {
            v.extend(y);
        }
        v
    }
}

/// Geometry held by a cell
#[derive(Clone, Copy, Debug)]
pub enum CellGeometry {
    Bi(BiCell),
    Quad(QuadCell),
}

/// An interval or rectangle in a [`CellTree`]
///
/// A cell has either no children or a complete set of them: 2 for a `BiCell`, 4 for a `QuadCell`,
/// or one per grid position beneath a gridded root.
#[derive(Clone, Debug)]
pub struct Cell {
    parent: Option<CellKey>,
    position: Option<ChildPos>,
    depth: usize,
    children: SmallVec<[(ChildPos, CellKey); 4]>,
    grid: Option<GridSize>,
    pub geometry: CellGeometry,
    flags: FlagSet,
}

impl Cell {
    fn root(geometry: CellGeometry, grid: Option<GridSize>) -> Self {
        Self {
            parent: None,
            position: None,
            depth: 0,
            children: SmallVec::new(),
            grid,
            geometry,
            flags: FlagSet::new(),
        }
    }

    pub fn parent(&self) -> Option<CellKey> {
        self.parent
    }

    pub fn position(&self) -> Option<ChildPos> {
        self.position
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn children(&self) -> &[(ChildPos, CellKey)] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn grid_size(&self) -> Option<GridSize> {
        self.grid
    }

    pub fn kind(&self) -> CellKind {
        match self.geometry {
            CellGeometry::Bi(_) => CellKind::Bi,
            CellGeometry::Quad(_) => CellKind::Quad,
        }
    }

    pub fn as_bicell(&self) -> Option<&BiCell> {
        match &self.geometry {
            CellGeometry::Bi(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_quadcell(&self) -> Option<&QuadCell> {
        match &self.geometry {
            CellGeometry::Quad(q) => Some(q),
            _ => None,
        }
    }

    /// Corner vertices: `[L, R]` or `[SW, SE, NE, NW]` (counter-clockwise)
    pub fn corners(&self) -> SmallVec<[VertexKey; 4]> {
        match &self.geometry {
            CellGeometry::Bi(b) => SmallVec::from_slice(&b.vertices),
            CellGeometry::Quad(q) => SmallVec::from_slice(&q.corners()),
        }
    }

    /// Edges bounding the cell: the interval itself, or `[S, E, N, W]` sides
    pub fn sides(&self) -> SmallVec<[EdgeKey; 4]> {
        match &self.geometry {
            CellGeometry::Bi(b) => smallvec![b.edge],
            CellGeometry::Quad(q) => SmallVec::from_slice(&q.sides()),
        }
    }

    /// Every vertex currently held by the cell
    pub fn vertex_keys(&self) -> SmallVec<[VertexKey; 9]> {
        match &self.geometry {
            CellGeometry::Bi(b) => b.vertex_keys(),
            CellGeometry::Quad(q) => VertexPos::ALL
                .iter()
                .filter_map(|pos| q.vertex(*pos))
                .collect(),
        }
    }

    /// Every edge currently held by the cell
    pub fn edge_keys(&self) -> SmallVec<[EdgeKey; 22]> {
        match &self.geometry {
            CellGeometry::Bi(b) => smallvec![b.edge],
            CellGeometry::Quad(q) => q.edge_keys(),
        }
    }
}

impl Markable for Cell {
    fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }
}

/// The geometric refinement tree
///
/// Owns every [`Cell`], [`Vertex`] and [`Edge`] of a mesh. Cells reference vertices and edges by key,
/// so that adjacent cells share geometry by holding the same key.
///
/// Vertices and edges live as long as some cell references them. The centers and spokes of a
/// triangulation are tracked separately and removed along with it.
#[derive(Clone, Debug)]
pub struct CellTree {
    cells: SlotMap<CellKey, Cell>,
    vertices: SlotMap<VertexKey, Vertex>,
    edges: SlotMap<EdgeKey, Edge>,
    triangulation_vertices: Vec<VertexKey>,
    triangulation_edges: Vec<EdgeKey>,
    root: CellKey,
    kind: CellKind,
}

impl CellTree {
    /// Construct a root cell covering `bbox`. If a grid is given, the root is immediately split into it.
    pub fn new(bbox: BoundingBox, grid: Option<GridSize>) -> Result<Self> {
        if let Some(grid) = grid {
            grid.validate(bbox.dim())?;
        }

        let mut vertices = SlotMap::with_key();
        let mut edges = SlotMap::with_key();
        let mut new_edge = |vertices: &SlotMap<VertexKey, Vertex>, a: VertexKey, b: VertexKey, boundary| {
            edges.insert(Edge::new([a, b], [&vertices[a], &vertices[b]], boundary))
        };

        let (geometry, kind) = match bbox.y {
            None => {
                let l = vertices.insert(Vertex::new(bbox.x[0]));
                let r = vertices.insert(Vertex::new(bbox.x[1]));
                let edge = new_edge(&vertices, l, r, false);
                (CellGeometry::Bi(BiCell::new([l, r], edge)), CellKind::Bi)
            }
            Some([y0, y1]) => {
                let [x0, x1] = bbox.x;
                let sw = vertices.insert(Vertex::new([x0, y0]));
                let se = vertices.insert(Vertex::new([x1, y0]));
                let ne = vertices.insert(Vertex::new([x1, y1]));
                let nw = vertices.insert(Vertex::new([x0, y1]));
                let sides = [
                    new_edge(&vertices, sw, se, true),
                    new_edge(&vertices, se, ne, true),
                    new_edge(&vertices, ne, nw, true),
                    new_edge(&vertices, nw, sw, true),
                ];
                let diagonals = [
                    new_edge(&vertices, sw, ne, false),
                    new_edge(&vertices, nw, se, false),
                ];
                (
                    CellGeometry::Quad(QuadCell::new([sw, se, ne, nw], sides, diagonals)),
                    CellKind::Quad,
                )
            }
        };

        let mut cells = SlotMap::with_key();
        let root = cells.insert(Cell::root(geometry, grid));

        let mut tree = Self {
            cells,
            vertices,
            edges,
            triangulation_vertices: Vec::new(),
            triangulation_edges: Vec::new(),
            root,
            kind,
        };

        if grid.is_some() {
            tree.split(root)?;
        }

        Ok(tree)
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    // ----------------------------------------------------------------------------------------------------
    // Data retrieval
    // ----------------------------------------------------------------------------------------------------

    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(key)
    }

    pub fn vertex(&self, key: VertexKey) -> Option<&Vertex> {
        self.vertices.get(key)
    }

    pub fn vertex_mut(&mut self, key: VertexKey) -> Option<&mut Vertex> {
        self.vertices.get_mut(key)
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn edge_mut(&mut self, key: EdgeKey) -> Option<&mut Edge> {
        self.edges.get_mut(key)
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn iter_cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys()
    }

    /// Every vertex in the arena, including those of the current triangulation
    pub fn iter_vertex_keys(&self) -> impl Iterator<Item = VertexKey> + '_ {
        self.vertices.keys()
    }

    pub fn iter_edge_keys(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.edges.keys()
    }

    pub(crate) fn try_cell(&self, key: CellKey) -> Result<&Cell> {
        self.cells.get(key).ok_or(MeshError::MissingCell(key))
    }

    pub(crate) fn point(&self, key: VertexKey) -> Result<Point> {
        self.vertices
            .get(key)
            .map(|v| v.coordinate())
            .ok_or_else(|| {
                MeshError::StructuralInconsistency(format!("Vertex {:?} doesn't exist", key))
            })
    }

    /// Vertex at a named position of a `QuadCell`
    pub fn vertex_at(&self, key: CellKey, pos: VertexPos) -> Option<VertexKey> {
        self.cell(key)?.as_quadcell()?.vertex(pos)
    }

    /// Edge at a named position of a `QuadCell`
    pub fn edge_at(&self, key: CellKey, pos: EdgePos) -> Option<EdgeKey> {
        self.cell(key)?.as_quadcell()?.edge(pos)
    }

    /// The cell's extent, taken from its corner vertices
    pub fn bounding_box(&self, key: CellKey) -> Result<BoundingBox> {
        let cell = self.try_cell(key)?;
        match &cell.geometry {
            CellGeometry::Bi(b) => Ok(BoundingBox {
                x: [self.point(b.vertices[0])?.x(), self.point(b.vertices[1])?.x()],
                y: None,
            }),
            CellGeometry::Quad(q) => {
                let [sw, _, ne, _] = q.corners();
                let (sw, ne) = (self.point(sw)?, self.point(ne)?);
                Ok(BoundingBox {
                    x: [sw.x(), ne.x()],
                    y: Some([sw.y().unwrap_or(0.0), ne.y().unwrap_or(0.0)]),
                })
            }
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Refinement
    // ----------------------------------------------------------------------------------------------------

    pub(crate) fn add_vertex(&mut self, coordinate: Point) -> VertexKey {
        self.vertices.insert(Vertex::new(coordinate))
    }

    pub(crate) fn add_edge(&mut self, [a, b]: [VertexKey; 2], boundary: bool) -> Result<EdgeKey> {
        let missing =
            |v| MeshError::StructuralInconsistency(format!("Vertex {:?} doesn't exist", v));
        let edge = Edge::new(
            [a, b],
            [
                self.vertices.get(a).ok_or_else(|| missing(a))?,
                self.vertices.get(b).ok_or_else(|| missing(b))?,
            ],
            boundary,
        );
        Ok(self.edges.insert(edge))
    }

    pub(crate) fn add_child(
        &mut self,
        parent: CellKey,
        position: ChildPos,
        geometry: CellGeometry,
    ) -> Result<CellKey> {
        let depth = self.try_cell(parent)?.depth + 1;
        let child = self.cells.insert(Cell {
            parent: Some(parent),
            position: Some(position),
            depth,
            children: SmallVec::new(),
            grid: None,
            geometry,
            flags: FlagSet::new(),
        });
        self.cells
            .get_mut(parent)
            .ok_or(MeshError::MissingCell(parent))?
            .children
            .push((position, child));
        Ok(child)
    }

    /// Split a childless cell
    ///
    /// * a gridded root is split into its grid
    /// * a `BiCell` is split into `L` and `R` halves
    /// * a `QuadCell` is split into `SW`, `SE`, `NW` and `NE` quadrants, sharing mid-side
    ///   vertices and half-edges with equally deep neighbors which are already split
    ///
    /// Neighbors more than one level coarser than the cell are split first.
    pub fn split(&mut self, key: CellKey) -> Result<()> {
        let cell = self.try_cell(key)?;
        if cell.has_children() {
            return Err(MeshError::AlreadySplit(format!("Cell {:?}", key)));
        }
        if cell.depth >= MAX_TREE_DEPTH {
            return Err(MeshError::MaxDepthExceeded(MAX_TREE_DEPTH));
        }

        match (cell.grid, cell.geometry) {
            (Some(grid), CellGeometry::Bi(bi)) => self.split_interval_grid(key, bi, grid)?,
            (Some(grid), CellGeometry::Quad(quad)) => self.split_rectangle_grid(key, quad, grid)?,
            (None, CellGeometry::Bi(_)) => {
                self.split_coarse_neighbors(key)?;
                self.split_bicell(key)?;
            }
            (None, CellGeometry::Quad(_)) => {
                self.split_coarse_neighbors(key)?;
                self.split_quadcell(key)?;
            }
        }

        debug!(
            "split Cell {:?} at depth {} into {} children",
            key,
            self.depth(key),
            self.children(key).len()
        );
        Ok(())
    }

    /// Split neighbors which are more than one level coarser than `key`
    fn split_coarse_neighbors(&mut self, key: CellKey) -> Result<()> {
        let depth = self.depth(key);
        for dir in self.side_directions() {
            let mut splits = 0;
            while let Some(nb) = self.neighbor(key, *dir) {
                if self.depth(nb) + 1 >= depth {
                    break;
                }
                if splits > depth {
                    return Err(MeshError::StructuralInconsistency(format!(
                        "Neighbor of Cell {:?} to the {} remains coarser after {} splits",
                        key, dir, splits
                    )));
                }
                debug!(
                    "2:1 rule: splitting Cell {:?} (depth {}) before Cell {:?} (depth {})",
                    nb,
                    self.depth(nb),
                    key,
                    depth
                );
                self.split(nb)?;
                splits += 1;
            }
        }
        Ok(())
    }

    /// Remove the descendants of `key`, along with vertices and edges that only exist while it is split
    ///
    /// Geometry shared with an equally deep neighbor (or one of its descendants) remains in place.
    pub fn merge(&mut self, key: CellKey) -> Result<()> {
        self.try_cell(key)?;
        let descendants: Vec<CellKey> = self
            .traverse(key, None, TraversalMode::DepthFirst)
            .skip(1)
            .collect();
        if descendants.is_empty() {
            return Ok(());
        }

        let mut vertices = BTreeSet::new();
        let mut edges = BTreeSet::new();
        for c in std::iter::once(key).chain(descendants.iter().copied()) {
            let cell = self.try_cell(c)?;
            vertices.extend(cell.vertex_keys());
            edges.extend(cell.edge_keys());
        }

        for d in descendants.iter() {
            self.cells.remove(*d);
        }
        let cell = self
            .cells
            .get_mut(key)
            .ok_or(MeshError::MissingCell(key))?;
        cell.children.clear();
        match &mut cell.geometry {
            CellGeometry::Bi(b) => b.midpoint = None,
            CellGeometry::Quad(q) => q.clear_refinement(),
        }

        // anything still held by the merged cell or across its sides survives
        let mut holders = vec![key];
        for dir in self.side_directions() {
            if let Some(nb) = self.neighbor(key, *dir) {
                holders.extend(self.traverse(nb, None, TraversalMode::DepthFirst));
            }
        }
        for holder in holders {
            let cell = self.try_cell(holder)?;
            for v in cell.vertex_keys() {
                vertices.remove(&v);
            }
            for e in cell.edge_keys() {
                edges.remove(&e);
            }
        }

        for e in edges.iter() {
            self.edges.remove(*e);
        }
        for v in vertices.iter() {
            self.vertices.remove(*v);
        }

        debug!(
            "merged Cell {:?} ({} descendants, {} vertices and {} edges removed)",
            key,
            descendants.len(),
            vertices.len(),
            edges.len()
        );
        Ok(())
    }

    fn side_directions(&self) -> &'static [Direction] {
        match self.kind {
            CellKind::Bi => &Direction::LATERAL,
            CellKind::Quad => &Direction::CARDINAL,
        }
    }

    /// Record a vertex which only exists for the current triangulation
    pub(crate) fn add_triangulation_vertex(&mut self, coordinate: Point) -> VertexKey {
        let v = self.add_vertex(coordinate);
        self.triangulation_vertices.push(v);
        v
    }

    /// Record an edge which only exists for the current triangulation
    pub(crate) fn add_triangulation_edge(&mut self, ends: [VertexKey; 2]) -> Result<EdgeKey> {
        let e = self.add_edge(ends, false)?;
        self.triangulation_edges.push(e);
        Ok(e)
    }

    /// Remove the vertices and edges added while triangulating
    pub(crate) fn clear_triangulation_geometry(&mut self) {
        for e in self.triangulation_edges.drain(..) {
            self.edges.remove(e);
        }
        for v in self.triangulation_vertices.drain(..) {
            self.vertices.remove(v);
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Neighbors
    // ----------------------------------------------------------------------------------------------------

    /// Find the neighbor of `key` in direction `dir`
    ///
    /// The result is never deeper than `key`. Diagonal neighbors must share a corner vertex with `key`.
    pub fn find_neighbor(&self, key: CellKey, dir: Direction) -> Result<Option<CellKey>> {
        self.try_cell(key)?;
        if dir.dim() != self.kind.dim() {
            return Err(MeshError::InvalidDirection(format!(
                "{} (in a {}D cell tree)",
                dir,
                self.kind.dim()
            )));
        }
        Ok(self.neighbor(key, dir))
    }

    pub(crate) fn neighbor(&self, key: CellKey, dir: Direction) -> Option<CellKey> {
        let nb = self.find_neighbor_in_tree(key, dir)?;
        trace!("neighbor of Cell {:?} to the {}: {:?}", key, dir, nb);

        match dir.as_quadrant() {
            Some(q) => {
                let mine = self.vertex_at(key, q.corner())?;
                let theirs = self.vertex_at(nb, opposite_quadrant(q).corner())?;
                (mine == theirs).then_some(nb)
            }
            None => Some(nb),
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Point location and reference mapping
    // ----------------------------------------------------------------------------------------------------

    /// Inclusive test of whether `point` lies within the cell
    pub fn contains_point(&self, key: CellKey, point: &Point) -> Result<bool> {
        let point = self.check_dim(point)?;
        Ok(self.bounding_box(key)?.contains(point))
    }

    /// The leaf (beneath the root) containing `point`
    pub fn locate_point(&self, point: &Point) -> Result<Option<CellKey>> {
        self.locate_point_from(self.root, point)
    }

    /// The leaf beneath `key` containing `point`. Points on a shared border resolve to the first containing child.
    pub fn locate_point_from(&self, key: CellKey, point: &Point) -> Result<Option<CellKey>> {
        if !self.contains_point(key, point)? {
            return Ok(None);
        }

        let mut current = key;
        'descend: loop {
            for (_, child) in self.children(current) {
                if self.contains_point(*child, point)? {
                    current = *child;
                    continue 'descend;
                }
            }
            return Ok(Some(current));
        }
    }

    /// Map physical points into the reference cell `[0,1]` or `[0,1]²`
    pub fn map_to_reference(&self, key: CellKey, points: &[Point]) -> Result<Vec<Point>> {
        let bbox = self.bounding_box(key)?;
        let (lo, w) = (bbox.lower(), bbox.widths());
        points
            .iter()
            .map(|p| self.check_dim(p))
            .map(|p| {
                Ok(match p? {
                    Point::X(x) => Point::X((x - lo.x()) / w[0]),
                    Point::XY([x, y]) => Point::XY([
                        (x - lo.x()) / w[0],
                        (y - lo.y().unwrap_or(0.0)) / w[1],
                    ]),
                })
            })
            .collect()
    }

    /// Map points from the reference cell `[0,1]` or `[0,1]²` into the physical cell
    pub fn map_from_reference(&self, key: CellKey, points: &[Point]) -> Result<Vec<Point>> {
        let bbox = self.bounding_box(key)?;
        let (lo, w) = (bbox.lower(), bbox.widths());
        points
            .iter()
            .map(|p| self.check_dim(p))
            .map(|p| {
                Ok(match p? {
                    Point::X(u) => Point::X(lo.x() + u * w[0]),
                    Point::XY([u, v]) => {
                        Point::XY([lo.x() + u * w[0], lo.y().unwrap_or(0.0) + v * w[1]])
                    }
                })
            })
            .collect()
    }

    /// Chain-rule factor for derivatives taken on the reference cell: `Π (1/h_i)^orders[i]`
    pub fn derivative_multiplier(&self, key: CellKey, orders: &[u32]) -> Result<f64> {
        let widths = self.bounding_box(key)?.widths();
        if orders.len() != widths.len() {
            return Err(MeshError::DimensionMismatch {
                expected: widths.len(),
                found: orders.len(),
            });
        }
        Ok(widths
            .iter()
            .zip(orders.iter())
            .map(|(h, o)| (1.0 / h).powi(*o as i32))
            .product())
    }

    /// Whether the line segment lies inside the cell or crosses one of its sides
    pub fn intersects_line_segment(&self, key: CellKey, line: [Point; 2]) -> Result<bool> {
        self.check_dim(&line[0])?;
        self.check_dim(&line[1])?;
        let bbox = self.bounding_box(key)?;
        if bbox.contains(&line[0]) && bbox.contains(&line[1]) {
            return Ok(true);
        }
        Ok(self
            .try_cell(key)?
            .sides()
            .iter()
            .filter_map(|e| self.edge(*e))
            .any(|e| e.intersects_line_segment(line)))
    }

    fn check_dim<'a>(&self, p: &'a Point) -> Result<&'a Point> {
        if p.dim() == self.kind.dim() {
            Ok(p)
        } else {
            Err(MeshError::DimensionMismatch {
                expected: self.kind.dim(),
                found: p.dim(),
            })
        }
    }

    #[cfg(feature = "json_export")]
    pub fn cell_to_json(&self, key: CellKey) -> Result<JsonValue> {
        let cell = self.try_cell(key)?;
        Ok(object! {
            "address": JsonValue::from(self.address(key).iter().map(|p| p.to_string()).collect::<Vec<_>>()),
            "depth": cell.depth,
            "box": JsonValue::from(self.bounding_box(key)?.to_vec()),
            "flags": cell.flags.to_json(),
        })
    }
}

fn opposite_quadrant(q: Quadrant) -> Quadrant {
    match q {
        Quadrant::SW => Quadrant::NE,
        Quadrant::SE => Quadrant::NW,
        Quadrant::NW => Quadrant::SE,
        Quadrant::NE => Quadrant::SW,
    }
}

impl Hierarchy for CellTree {
    type Key = CellKey;
    type Entry = Cell;

    fn root(&self) -> CellKey {
        self.root
    }

    fn entry(&self, key: CellKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    fn parent(&self, key: CellKey) -> Option<CellKey> {
        self.cells.get(key)?.parent
    }

    fn position(&self, key: CellKey) -> Option<ChildPos> {
        self.cells.get(key)?.position
    }

    fn depth(&self, key: CellKey) -> usize {
        self.cells.get(key).map_or(0, |c| c.depth)
    }

    fn children(&self, key: CellKey) -> &[(ChildPos, CellKey)] {
        self.cells.get(key).map_or(&[][..], |c| c.children.as_slice())
    }

    fn grid_size(&self, key: CellKey) -> Option<GridSize> {
        self.cells.get(key)?.grid
    }

    fn dim(&self) -> usize {
        self.kind.dim()
    }
}
