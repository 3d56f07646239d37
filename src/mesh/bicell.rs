use super::{
    cell::{CellGeometry, CellKey, CellTree},
    edge::EdgeKey,
    error::{MeshError, Result},
    position::{Bisection, ChildPos, GridSize},
    vertex::{Point, VertexKey},
};

use smallvec::SmallVec;

/// Geometry of an interval cell
///
/// ```text
///     L          M          R
///     *----------*----------*
///     |<-- L --->|<--- R -->|
/// ```
///
/// The mid-point `M` exists only while the cell is split. End-points are shared with the neighboring intervals.
#[derive(Clone, Copy, Debug)]
pub struct BiCell {
    /// `[L, R]`
    pub vertices: [VertexKey; 2],
    pub midpoint: Option<VertexKey>,
    pub edge: EdgeKey,
}

impl BiCell {
    pub fn new(vertices: [VertexKey; 2], edge: EdgeKey) -> Self {
        Self {
            vertices,
            midpoint: None,
            edge,
        }
    }

    pub fn left(&self) -> VertexKey {
        self.vertices[0]
    }

    pub fn right(&self) -> VertexKey {
        self.vertices[1]
    }

    pub fn vertex_keys(&self) -> SmallVec<[VertexKey; 9]> {
        let mut keys = SmallVec::from_slice(&self.vertices);
        keys.extend(self.midpoint);
        keys
    }
}

impl CellTree {
    /// Split a `BiCell` into `L` and `R` halves; coarse neighbors must already be split
    pub(super) fn split_bicell(&mut self, key: CellKey) -> Result<()> {
        let bi = *self
            .try_cell(key)?
            .as_bicell()
            .ok_or_else(|| not_a_bicell(key))?;
        let [l, r] = bi.vertices;

        let m = self.add_vertex(self.point(l)?.midpoint(&self.point(r)?));
        if let Some(CellGeometry::Bi(b)) = self.cell_mut(key).map(|c| &mut c.geometry) {
            b.midpoint = Some(m);
        }

        let left = BiCell::new([l, m], self.add_edge([l, m], false)?);
        let right = BiCell::new([m, r], self.add_edge([m, r], false)?);
        self.add_child(key, ChildPos::Half(Bisection::L), CellGeometry::Bi(left))?;
        self.add_child(key, ChildPos::Half(Bisection::R), CellGeometry::Bi(right))?;
        Ok(())
    }

    /// Split a gridded root interval into `nx` equal intervals
    pub(super) fn split_interval_grid(
        &mut self,
        key: CellKey,
        bi: BiCell,
        grid: GridSize,
    ) -> Result<()> {
        let GridSize::One(nx) = grid else {
            return Err(MeshError::MalformedGrid(format!(
                "{:?} cannot divide a BiCell",
                grid
            )));
        };
        let [x0, x1] = self.bounding_box(key)?.x;

        let mut vertices = Vec::with_capacity(nx + 1);
        vertices.push(bi.left());
        for i in 1..nx {
            vertices.push(self.add_vertex(Point::X(x0 + (x1 - x0) * i as f64 / nx as f64)));
        }
        vertices.push(bi.right());

        for i in 0..nx {
            let ends = [vertices[i], vertices[i + 1]];
            let edge = if nx == 1 {
                bi.edge
            } else {
                self.add_edge(ends, false)?
            };
            self.add_child(key, ChildPos::Index(i), CellGeometry::Bi(BiCell::new(ends, edge)))?;
        }
        Ok(())
    }
}

fn not_a_bicell(key: CellKey) -> MeshError {
    MeshError::StructuralInconsistency(format!("Cell {:?} is not a BiCell", key))
}
