/// An interval cell
pub mod bicell;
/// Geometric refinement tree of intervals or rectangles
pub mod cell;
/// Construction parameters of a Mesh
pub mod config;
/// A line between two Vertices
pub mod edge;
/// Error type shared by every mesh operation
pub mod error;
/// Labels attached to mesh entities
pub mod flags;
/// Topological refinement tree, used for marking and 2:1 balancing
pub mod node;
/// Directions and named positions within cells
pub mod position;
/// A rectangular cell
pub mod quadcell;
/// Traversal and neighbor search shared by cell and node trees
pub mod tree;
/// A triangle of a conforming triangulation
pub mod tricell;
/// A point in 1D or 2D space
pub mod vertex;

use cell::{BoundingBox, CellKey, CellTree};
use config::MeshConfig;
use edge::EdgeKey;
use error::{MeshError, Result};
use flags::{Flag, Markable};
use node::{NodeKey, Tree};
use position::{ChildPos, Direction, GridSize};
use tree::{Hierarchy, TraversalMode};
use tricell::TriCell;
use vertex::{Point, VertexKey};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use log::{info, warn};
use std::collections::BTreeSet;
#[cfg(feature = "json_export")]
use std::fs::File;
#[cfg(feature = "json_export")]
use std::io::BufWriter;

/// Cross products and parameters smaller than this are treated as zero in line-segment intersection tests
pub const INTERSECTION_TOLERANCE: f64 = 1e-14;

/// Maximum depth of a cell or node. Splits beyond this depth fail.
pub const MAX_TREE_DEPTH: usize = 20;

/// Maximum number of leaves examined by a single balancing or support-removal pass before it is considered divergent
pub const MAX_BALANCE_ITERATIONS: usize = 1 << 20;

/// Maximum number of cells beneath a gridded root
pub const MAX_GRID_CELLS: usize = 1 << 24;

/// The expected refinement depth. This determines the stack allocation size of tree addresses.
pub const EXPECTED_TREE_DEPTH: usize = 8;

/// Selects the entities affected by [`Mesh::unmark`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnmarkTargets {
    pub nodes: bool,
    pub quadcells: bool,
    pub quadedges: bool,
    pub quadvertices: bool,
    pub tricells: bool,
    pub triedges: bool,
    pub trivertices: bool,
}

impl UnmarkTargets {
    /// Every kind of entity
    pub fn all() -> Self {
        Self {
            nodes: true,
            quadcells: true,
            quadedges: true,
            quadvertices: true,
            tricells: true,
            triedges: true,
            trivertices: true,
        }
    }

    pub fn nodes() -> Self {
        Self {
            nodes: true,
            ..Default::default()
        }
    }
}

/// An adaptive mesh over an interval or a rectangle
///
/// Pairs a geometric [`CellTree`] with a topological node [`Tree`] of the same shape.
/// The root node is always linked to the root cell. Leaves of the node tree make up the mesh;
/// the cell tree may be finer where a split forced its coarser neighbors to split.
#[derive(Clone, Debug)]
pub struct Mesh {
    cells: CellTree,
    nodes: Tree,
    triangulated: bool,
    mesh_count: usize,
}

impl Mesh {
    /// Construct a mesh over `bbox` (`[x0, x1]` or `[x0, x1, y0, y1]`), optionally gridded
    pub fn newmesh(bbox: &[f64], grid_size: Option<GridSize>) -> Result<Self> {
        Self::from_config(MeshConfig::new(bbox, grid_size)?)
    }

    pub fn from_config(config: MeshConfig) -> Result<Self> {
        let cells = CellTree::new(config.bbox, config.grid)?;
        let nodes = Tree::from_cells(&cells)?;
        info!(
            "constructed {}D mesh over {:?} with {} leaves",
            cells.dim(),
            config.bbox.to_vec(),
            nodes.find_leaves(None, false).len()
        );
        Ok(Self {
            cells,
            nodes,
            triangulated: false,
            mesh_count: 0,
        })
    }

    /// Construct a mesh from a JSON configuration file (see [`MeshConfig::from_json`])
    pub fn from_file(path: impl AsRef<str>) -> Result<Self> {
        Self::from_config(MeshConfig::from_file(path)?)
    }

    /// An independent deep copy
    pub fn copymesh(&self) -> Self {
        self.clone()
    }

    /// An independent copy restricted to the nodes carrying `flag` (such as a [`Mesh::record`]ed snapshot)
    pub fn submesh(&self, flag: &Flag) -> Self {
        let mut nodes = self.nodes.restricted(flag);
        nodes.clear_tricells();
        let mut cells = self.cells.clone();
        cells.clear_triangulation_geometry();
        Self {
            cells,
            nodes,
            triangulated: false,
            mesh_count: self.mesh_count,
        }
    }

    /// Link the node tree to a different cell tree, returning the previous one
    ///
    /// Cells are split where the node tree is finer. On failure, the mesh stays linked to its current cells.
    pub fn relink(&mut self, mut cells: CellTree) -> Result<CellTree> {
        let root = self.nodes.root();
        let new_root = cells.root();
        if let Err(err) = self.nodes.link(root, &mut cells, new_root, true) {
            let old_root = self.cells.root();
            self.nodes.link(root, &mut self.cells, old_root, true)?;
            return Err(err);
        }

        warn!("relinked mesh to a new CellTree; existing triangulation discarded");
        self.nodes.clear_tricells();
        self.triangulated = false;
        let mut old = std::mem::replace(&mut self.cells, cells);
        old.clear_triangulation_geometry();
        Ok(old)
    }

    // ----------------------------------------------------------------------------------------------------
    // Data retrieval
    // ----------------------------------------------------------------------------------------------------

    pub fn cells(&self) -> &CellTree {
        &self.cells
    }

    pub fn nodes(&self) -> &Tree {
        &self.nodes
    }

    pub fn dim(&self) -> usize {
        self.cells.dim()
    }

    /// Extent of the whole mesh
    pub fn bounding_box(&self) -> Result<BoundingBox> {
        self.cells.bounding_box(self.cells.root())
    }

    pub fn is_triangulated(&self) -> bool {
        self.triangulated
    }

    /// Number of snapshots taken by [`Mesh::record`] without an explicit flag
    pub fn mesh_count(&self) -> usize {
        self.mesh_count
    }

    /// The cell linked to `node`
    pub fn node_cell(&self, node: NodeKey) -> Result<CellKey> {
        self.nodes.try_node(node)?.cell().ok_or_else(|| {
            MeshError::StructuralInconsistency(format!("Node {:?} is not linked to a Cell", node))
        })
    }

    /// Resolve an address from the root node
    pub fn find_node(&self, address: &[ChildPos]) -> Option<NodeKey> {
        self.nodes.find_by_address(address)
    }

    /// Leaf nodes (see [`Hierarchy::find_leaves`])
    pub fn find_leaves(&self, flag: Option<&Flag>, nested: bool) -> Vec<NodeKey> {
        self.nodes.find_leaves(flag, nested)
    }

    /// Cells linked to the leaf nodes
    pub fn leaf_cells(&self, flag: Option<&Flag>, nested: bool) -> Result<Vec<CellKey>> {
        self.find_leaves(flag, nested)
            .into_iter()
            .map(|node| self.node_cell(node))
            .collect()
    }

    /// Cells linked to the nodes at `depth`
    pub fn find_cells_at_depth(&self, depth: usize) -> Result<Vec<CellKey>> {
        self.nodes
            .find_at_depth(depth)
            .into_iter()
            .map(|node| self.node_cell(node))
            .collect()
    }

    /// Find the neighbor of a node (see [`Tree::find_neighbor`])
    pub fn find_neighbor(&self, node: NodeKey, dir: Direction) -> Result<Option<NodeKey>> {
        self.nodes.find_neighbor(node, dir)
    }

    /// The leaf cell containing `point`, descending only through nodes carrying `flag` (any node if `None`)
    ///
    /// Points on a border shared by several cells resolve to the first containing child.
    pub fn locate_point(&self, point: &Point, flag: Option<&Flag>) -> Result<Option<CellKey>> {
        if point.dim() != self.dim() {
            return Err(MeshError::DimensionMismatch {
                expected: self.dim(),
                found: point.dim(),
            });
        }
        let carries_flag = |node: NodeKey| flag.is_none() || self.nodes.is_marked(node, flag);

        let root = self.nodes.root();
        if !carries_flag(root) || !self.cells.contains_point(self.node_cell(root)?, point)? {
            return Ok(None);
        }

        let mut current = root;
        'descend: loop {
            for (_, child) in self.nodes.children(current) {
                if carries_flag(*child)
                    && self.cells.contains_point(self.node_cell(*child)?, point)?
                {
                    current = *child;
                    continue 'descend;
                }
            }
            return self.node_cell(current).map(Some);
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Iteration over leaf geometry
    // ----------------------------------------------------------------------------------------------------

    /// Leaf `QuadCell`s (none for a 1D mesh)
    pub fn iter_quadcells(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = CellKey> + '_ {
        self.find_leaves(flag, nested)
            .into_iter()
            .filter_map(move |node| self.nodes.cell(node))
            .filter(move |cell| {
                self.cells
                    .cell(*cell)
                    .map_or(false, |c| c.as_quadcell().is_some())
            })
    }

    /// Sides of the leaf `QuadCell`s, each listed once
    pub fn iter_quadedges(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = EdgeKey> + '_ {
        unique(self.iter_quadcells(flag, nested).flat_map(move |cell| {
            self.cells
                .cell(cell)
                .map(|c| c.sides())
                .unwrap_or_default()
        }))
    }

    /// Corners of the leaf `QuadCell`s, each listed once
    pub fn iter_quadvertices(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = VertexKey> + '_ {
        unique(self.iter_quadcells(flag, nested).flat_map(move |cell| {
            self.cells
                .cell(cell)
                .map(|c| c.corners())
                .unwrap_or_default()
        }))
    }

    /// TriCells attached to the leaf nodes by [`Mesh::triangulate`]
    pub fn iter_tricells(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = &TriCell> + '_ {
        self.find_leaves(flag, nested)
            .into_iter()
            .flat_map(move |node| self.nodes.tricells(node).iter())
    }

    pub fn iter_triedges(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = EdgeKey> + '_ {
        unique(self.iter_tricells(flag, nested).flat_map(|tri| tri.edges()))
    }

    pub fn iter_trivertices(
        &self,
        flag: Option<&Flag>,
        nested: bool,
    ) -> impl Iterator<Item = VertexKey> + '_ {
        unique(self.iter_tricells(flag, nested).flat_map(|tri| tri.vertices()))
    }

    // ----------------------------------------------------------------------------------------------------
    // Refinement
    // ----------------------------------------------------------------------------------------------------

    /// Split one leaf node along with its cell
    pub fn split_node(&mut self, node: NodeKey) -> Result<()> {
        self.nodes.split(node, Some(&mut self.cells))
    }

    /// Remove the descendants of a node. Its cells stay split.
    pub fn merge_node(&mut self, node: NodeKey) -> Result<()> {
        self.nodes.merge(node)
    }

    /// Remove a node along with its siblings (see [`Tree::remove`])
    pub fn remove_node(&mut self, node: NodeKey) -> Result<NodeKey> {
        self.nodes.remove(node)
    }

    /// Split every leaf node carrying `flag` (every leaf if `None`)
    pub fn refine(&mut self, flag: Option<&Flag>) -> Result<()> {
        let leaves = self.nodes.find_leaves(flag, false);
        for leaf in leaves.iter() {
            self.nodes.split(*leaf, Some(&mut self.cells))?;
        }
        info!("refined {} leaves", leaves.len());
        Ok(())
    }

    /// Enforce the 2:1 rule by splitting leaves into support nodes
    pub fn balance(&mut self) -> Result<()> {
        self.nodes.balance(Some(&mut self.cells))
    }

    pub fn is_balanced(&self) -> bool {
        self.nodes.is_balanced()
    }

    /// Remove support nodes which are no longer needed for the 2:1 rule
    pub fn remove_supports(&mut self) -> Result<()> {
        self.nodes.remove_supports()
    }

    /// Coarsening of marked leaves is not supported; use [`Mesh::merge_node`] or [`Mesh::remove_supports`]
    pub fn coarsen(&mut self) -> Result<()> {
        Err(MeshError::NotImplemented("Mesh::coarsen"))
    }

    /// Stamp every node of the current tree with `flag`
    ///
    /// Without a flag, the next [`Flag::Generation`] is used, so that successive snapshots can
    /// coexist in one tree. Returns the flag used.
    pub fn record(&mut self, flag: Option<Flag>) -> Flag {
        let flag = match flag {
            Some(flag) => flag,
            None => {
                self.mesh_count += 1;
                Flag::Generation(self.mesh_count - 1)
            }
        };

        let keys: Vec<NodeKey> = self
            .nodes
            .traverse(self.nodes.root(), None, TraversalMode::DepthFirst)
            .collect();
        for key in keys.iter() {
            if let Some(node) = self.nodes.node_mut(*key) {
                node.mark(Some(flag.clone()));
            }
        }
        info!("recorded {} nodes as {}", keys.len(), flag);
        flag
    }

    /// Remove `flag` (every flag if `None`) from the selected entities
    ///
    /// Cell, edge and vertex targets cover every entity referenced by a cell of the cell tree.
    /// TriCell targets cover the triangles of the current triangulation and their edges and vertices.
    pub fn unmark(&mut self, targets: UnmarkTargets, flag: Option<&Flag>) {
        let node_keys: Vec<NodeKey> = self.nodes.node_keys().collect();

        if targets.nodes {
            for key in node_keys.iter() {
                if let Some(node) = self.nodes.node_mut(*key) {
                    node.unmark(flag);
                }
            }
        }

        let cell_keys: Vec<CellKey> = self.cells.iter_cell_keys().collect();
        let mut edges = BTreeSet::new();
        let mut vertices = BTreeSet::new();
        for key in cell_keys {
            if let Some(cell) = self.cells.cell_mut(key) {
                if targets.quadcells {
                    cell.unmark(flag);
                }
                if targets.quadedges {
                    edges.extend(cell.edge_keys());
                }
                if targets.quadvertices {
                    vertices.extend(cell.vertex_keys());
                }
            }
        }

        for key in node_keys.iter() {
            if let Some(tris) = self.nodes.tricells_mut(*key) {
                for tri in tris.iter_mut() {
                    if targets.tricells {
                        tri.unmark(flag);
                    }
                    if targets.triedges {
                        edges.extend(tri.edges());
                    }
                    if targets.trivertices {
                        vertices.extend(tri.vertices());
                    }
                }
            }
        }

        for key in edges {
            if let Some(edge) = self.cells.edge_mut(key) {
                edge.unmark(flag);
            }
        }
        for key in vertices {
            if let Some(vertex) = self.cells.vertex_mut(key) {
                vertex.unmark(flag);
            }
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Triangulation
    // ----------------------------------------------------------------------------------------------------

    /// Balance the mesh, then attach a conforming set of [`TriCell`]s to every leaf node
    ///
    /// Any previous triangulation is discarded. Only 2D meshes can be triangulated.
    pub fn triangulate(&mut self) -> Result<()> {
        if self.dim() != 2 {
            return Err(MeshError::NotImplemented("triangulation of 1D meshes"));
        }
        self.balance()?;
        self.nodes.clear_tricells();
        self.cells.clear_triangulation_geometry();

        let mut count = 0;
        for leaf in self.nodes.find_leaves(None, false) {
            let cell = self.node_cell(leaf)?;

            let mut hanging = [None; 4];
            for (side, dir) in quadcell::SIDES.iter().enumerate() {
                let Some(nb) = self.nodes.find_neighbor_in_tree(leaf, *dir) else {
                    continue;
                };
                if !self.nodes.has_children(nb) {
                    continue;
                }
                let nb_cell = self.node_cell(nb)?;
                if let Some(quad) = self.cells.try_cell(nb_cell)?.as_quadcell() {
                    let facing = dir.opposite();
                    hanging[side] = quad.midpoint(facing).zip(quad.halves(facing));
                }
            }

            let tris = self.cells.triangulate_quadcell(cell, hanging)?;
            count += tris.len();
            self.nodes.add_tricells(leaf, tris)?;
        }

        self.triangulated = true;
        info!("triangulated mesh into {} TriCells", count);
        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // Export
    // ----------------------------------------------------------------------------------------------------

    /// Leaf cells, their vertices and edges, and any TriCells as a JSON object
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> Result<JsonValue> {
        let leaf_cells = self.leaf_cells(None, false)?;
        let cells = leaf_cells
            .iter()
            .map(|cell| self.cells.cell_to_json(*cell))
            .collect::<Result<Vec<_>>>()?;

        let vertices: Vec<JsonValue> = unique(
            leaf_cells
                .iter()
                .filter_map(|cell| self.cells.cell(*cell))
                .flat_map(|cell| cell.corners()),
        )
        .filter_map(|v| self.cells.vertex(v))
        .map(|v| v.to_json())
        .collect();

        let edges: Vec<JsonValue> = unique(
            leaf_cells
                .iter()
                .filter_map(|cell| self.cells.cell(*cell))
                .flat_map(|cell| cell.sides()),
        )
        .filter_map(|e| self.cells.edge(e))
        .map(|e| e.to_json())
        .collect();

        let tricells: Vec<JsonValue> = self
            .iter_tricells(None, false)
            .map(|tri| tri.to_json())
            .collect();

        Ok(object! {
            "dim": self.dim(),
            "box": JsonValue::from(self.bounding_box()?.to_vec()),
            "triangulated": self.triangulated,
            "cells": JsonValue::from(cells),
            "vertices": JsonValue::from(vertices),
            "edges": JsonValue::from(edges),
            "tricells": JsonValue::from(tricells),
        })
    }

    /// Write [`Mesh::to_json`] to a file
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut w = BufWriter::new(file);
        self.to_json()?.write_pretty(&mut w, 4)?;
        Ok(())
    }
}

/// Drop repeated keys, keeping first-seen order
fn unique<K: Ord + Copy>(keys: impl Iterator<Item = K>) -> impl Iterator<Item = K> {
    let mut seen = BTreeSet::new();
    keys.filter(move |k| seen.insert(*k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use env_logger::Env;
    use position::Quadrant;

    fn init_logging() {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
            .format_timestamp(None)
            .is_test(true)
            .try_init();
    }

    fn unit_grid() -> Mesh {
        init_logging();
        Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap()
    }

    fn grid_node(mesh: &Mesh, i: usize, j: usize) -> NodeKey {
        mesh.find_node(&[ChildPos::Grid(i, j)]).unwrap()
    }

    fn total_area(mesh: &Mesh) -> f64 {
        mesh.iter_tricells(None, false).map(|t| t.area()).sum()
    }

    #[test]
    fn construction() {
        let mesh = unit_grid();
        assert_eq!(mesh.dim(), 2);
        assert_eq!(mesh.find_leaves(None, false).len(), 4);
        assert_eq!(mesh.node_cell(mesh.nodes().root()).unwrap(), mesh.cells().root());
        assert_eq!(mesh.bounding_box().unwrap().to_vec(), vec![0.0, 1.0, 0.0, 1.0]);

        let interval = Mesh::newmesh(&[0.0, 4.0], Some(GridSize::One(4))).unwrap();
        assert_eq!(interval.dim(), 1);
        assert_eq!(interval.leaf_cells(None, false).unwrap().len(), 4);
        assert_eq!(interval.iter_quadcells(None, false).count(), 0);

        assert!(matches!(
            Mesh::newmesh(&[0.0, 1.0, 0.0], None),
            Err(MeshError::MalformedBox(_))
        ));
        assert!(matches!(
            Mesh::newmesh(&[0.0, 1.0], Some(GridSize::Two(2, 2))),
            Err(MeshError::MalformedGrid(_))
        ));
        assert!(matches!(
            Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(0, 2))),
            Err(MeshError::MalformedGrid(_))
        ));
    }

    #[test]
    fn refine_flagged_leaves() {
        let mut mesh = unit_grid();
        let target = Flag::from("target");
        let g11 = grid_node(&mesh, 1, 1);
        mesh.nodes.node_mut(g11).unwrap().mark(Some(target.clone()));

        mesh.refine(Some(&target)).unwrap();
        assert_eq!(mesh.find_leaves(None, false).len(), 7);
        assert_eq!(mesh.nodes().children(g11).len(), 4);
        assert!(mesh.is_balanced());

        mesh.refine(None).unwrap();
        assert_eq!(mesh.find_leaves(None, false).len(), 28);
        assert!(matches!(
            mesh.split_node(g11),
            Err(MeshError::AlreadySplit(_))
        ));
    }

    #[test]
    fn leaf_geometry_iterators() {
        let mut mesh = unit_grid();
        assert_eq!(mesh.iter_quadcells(None, false).count(), 4);
        assert_eq!(mesh.iter_quadedges(None, false).count(), 12);
        assert_eq!(mesh.iter_quadvertices(None, false).count(), 9);

        mesh.refine(None).unwrap();
        assert_eq!(mesh.iter_quadcells(None, false).count(), 16);
        assert_eq!(mesh.iter_quadedges(None, false).count(), 40);
        assert_eq!(mesh.iter_quadvertices(None, false).count(), 25);
    }

    #[test]
    fn snapshots() {
        let mut mesh = unit_grid();
        let coarse = mesh.record(None);
        assert_eq!(coarse, Flag::Generation(0));

        mesh.refine(None).unwrap();
        let fine = mesh.record(None);
        assert_eq!(fine, Flag::Generation(1));
        assert_eq!(mesh.mesh_count(), 2);

        let named = mesh.record(Some(Flag::from("final")));
        assert_eq!(named, Flag::from("final"));
        assert_eq!(mesh.mesh_count(), 2);

        assert_eq!(mesh.find_leaves(Some(&coarse), true).len(), 4);
        assert_eq!(mesh.find_leaves(Some(&fine), true).len(), 16);

        let mut sub = mesh.submesh(&coarse);
        assert_eq!(sub.find_leaves(None, false).len(), 4);
        sub.refine(None).unwrap();
        sub.refine(None).unwrap();
        assert_eq!(sub.find_leaves(None, false).len(), 64);
        assert_eq!(mesh.find_leaves(None, false).len(), 16);
    }

    #[test]
    fn copies_are_independent() {
        let mut mesh = unit_grid();
        let mut copy = mesh.copymesh();

        let v = mesh.iter_quadvertices(None, false).next().unwrap();
        copy.cells.vertex_mut(v).unwrap().mark(None);
        assert!(copy.cells().vertex(v).unwrap().is_marked(None));
        assert!(!mesh.cells().vertex(v).unwrap().is_marked(None));

        copy.refine(None).unwrap();
        assert_eq!(copy.find_leaves(None, false).len(), 16);
        assert_eq!(mesh.find_leaves(None, false).len(), 4);

        mesh.balance().unwrap();
        assert_eq!(mesh.find_leaves(None, false).len(), 4);
    }

    #[test]
    fn relinking() {
        let mut mesh = unit_grid();
        mesh.split_node(grid_node(&mesh, 0, 0)).unwrap();

        let replacement = CellTree::new(
            BoundingBox::new(&[0.0, 2.0, 0.0, 2.0]).unwrap(),
            Some(GridSize::Two(2, 2)),
        )
        .unwrap();
        let old = mesh.relink(replacement).unwrap();
        assert_eq!(old.bounding_box(old.root()).unwrap().x, [0.0, 1.0]);
        assert_eq!(mesh.bounding_box().unwrap().x, [0.0, 2.0]);

        // the replacement was split to match the nodes
        let leaf = mesh
            .find_node(&[ChildPos::Grid(0, 0), ChildPos::Quad(Quadrant::NE)])
            .unwrap();
        let cell = mesh.node_cell(leaf).unwrap();
        assert_eq!(mesh.cells().bounding_box(cell).unwrap().x, [0.5, 1.0]);

        // a 1D cell tree cannot be linked; the mesh keeps its cells
        let interval = CellTree::new(BoundingBox::new(&[0.0, 1.0]).unwrap(), None).unwrap();
        assert!(matches!(
            mesh.relink(interval),
            Err(MeshError::DimensionMismatch { .. })
        ));
        // nor can one with a different grid
        let ungridded =
            CellTree::new(BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(), None).unwrap();
        assert!(matches!(
            mesh.relink(ungridded),
            Err(MeshError::LinkMismatch { .. })
        ));
        assert_eq!(mesh.bounding_box().unwrap().x, [0.0, 2.0]);
        assert_eq!(mesh.node_cell(leaf).unwrap(), cell);
    }

    #[test]
    fn point_location() {
        let mut mesh = unit_grid();
        let coarse = mesh.record(None);
        mesh.refine(None).unwrap();

        let p = Point::XY([0.1, 0.2]);
        let fine_cell = mesh.locate_point(&p, None).unwrap().unwrap();
        assert_eq!(mesh.cells().depth(fine_cell), 2);
        let coarse_cell = mesh.locate_point(&p, Some(&coarse)).unwrap().unwrap();
        assert_eq!(mesh.cells().depth(coarse_cell), 1);
        assert!(mesh.cells().contains_point(coarse_cell, &p).unwrap());

        assert_eq!(mesh.locate_point(&Point::XY([1.5, 0.5]), None).unwrap(), None);
        assert_eq!(
            mesh.locate_point(&p, Some(&Flag::from("missing"))).unwrap(),
            None
        );
        assert!(matches!(
            mesh.locate_point(&Point::X(0.5), None),
            Err(MeshError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn unmarking() {
        let mut mesh = unit_grid();
        let flag = Flag::from("plot");
        mesh.record(Some(flag.clone()));
        let cell = mesh.leaf_cells(None, false).unwrap()[0];
        let edge = mesh.iter_quadedges(None, false).next().unwrap();
        let vertex = mesh.iter_quadvertices(None, false).next().unwrap();
        mesh.cells.cell_mut(cell).unwrap().mark(Some(flag.clone()));
        mesh.cells.edge_mut(edge).unwrap().mark(Some(flag.clone()));
        mesh.cells.vertex_mut(vertex).unwrap().mark(None);

        mesh.unmark(UnmarkTargets::nodes(), Some(&flag));
        assert!(mesh.find_leaves(Some(&flag), false).is_empty());
        assert!(mesh.cells().cell(cell).unwrap().is_marked(Some(&flag)));

        let targets = UnmarkTargets {
            quadcells: true,
            quadedges: true,
            ..Default::default()
        };
        mesh.unmark(targets, Some(&flag));
        assert!(!mesh.cells().cell(cell).unwrap().is_marked(None));
        assert!(!mesh.cells().edge(edge).unwrap().is_marked(None));
        assert!(mesh.cells().vertex(vertex).unwrap().is_marked(None));

        mesh.unmark(UnmarkTargets::all(), None);
        assert!(!mesh.cells().vertex(vertex).unwrap().is_marked(None));
    }

    #[test]
    fn triangulation() {
        let mut mesh = unit_grid();
        let g00 = grid_node(&mesh, 0, 0);
        mesh.split_node(g00).unwrap();
        mesh.triangulate().unwrap();
        assert!(mesh.is_triangulated());

        // 4 conforming children, two fans with one hanging vertex each, and one conforming cell
        assert_eq!(mesh.iter_tricells(None, false).count(), 4 * 2 + 5 + 5 + 2);
        assert!((total_area(&mesh) - 1.0).abs() < 1e-12);

        // the fan of (1, 0) uses the half-edges of (0, 0)'s children
        let g00_se = mesh.nodes().child(g00, ChildPos::Quad(Quadrant::SE)).unwrap();
        let shared = mesh.cells().cell(mesh.node_cell(g00_se).unwrap()).unwrap().sides()[1];
        let g10 = grid_node(&mesh, 1, 0);
        assert!(mesh
            .nodes()
            .tricells(g10)
            .iter()
            .any(|t| t.edges().contains(&shared)));

        // retriangulating replaces the previous triangles and their geometry
        let arena_sizes = |mesh: &Mesh| {
            (
                mesh.cells().iter_vertex_keys().count(),
                mesh.cells().iter_edge_keys().count(),
            )
        };
        let first = arena_sizes(&mesh);
        mesh.triangulate().unwrap();
        mesh.triangulate().unwrap();
        assert_eq!(arena_sizes(&mesh), first);
        assert_eq!(mesh.iter_tricells(None, false).count(), 20);
        assert_eq!(
            mesh.iter_trivertices(None, false).count(),
            mesh.iter_quadvertices(None, false).count() + 2
        );

        mesh.iter_triedges(None, false)
            .for_each(|e| assert!(mesh.cells().edge(e).is_some()));

        let mut interval = Mesh::newmesh(&[0.0, 1.0], None).unwrap();
        assert!(matches!(
            interval.triangulate(),
            Err(MeshError::NotImplemented(_))
        ));
    }

    #[test]
    fn triangulation_balances_first() {
        let mut mesh = unit_grid();
        let g00 = grid_node(&mesh, 0, 0);
        mesh.split_node(g00).unwrap();
        let g00_ne = mesh.nodes().child(g00, ChildPos::Quad(Quadrant::NE)).unwrap();
        mesh.split_node(g00_ne).unwrap();
        assert!(!mesh.is_balanced());

        mesh.triangulate().unwrap();
        assert!(mesh.is_balanced());
        assert!((total_area(&mesh) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coarsening_is_not_implemented() {
        let mut mesh = unit_grid();
        assert_eq!(
            mesh.coarsen(),
            Err(MeshError::NotImplemented("Mesh::coarsen"))
        );
    }

    #[cfg(feature = "json_export")]
    #[test]
    fn json_export() {
        let mut mesh = unit_grid();
        mesh.refine(None).unwrap();
        mesh.triangulate().unwrap();

        let exported = mesh.to_json().unwrap();
        assert_eq!(exported["cells"].len(), 16);
        assert_eq!(exported["vertices"].len(), 25);
        assert_eq!(exported["edges"].len(), 40);
        assert_eq!(exported["tricells"].len(), 32);

        let path = std::env::temp_dir().join("adaptive_mesh_json_export.json");
        let path = path.to_str().unwrap();
        mesh.export_to_json(path).unwrap();
        let parsed = json::parse(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["dim"].as_usize(), Some(2));
        assert_eq!(parsed["cells"].len(), 16);
    }
}
