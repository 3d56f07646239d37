//! Adaptive hierarchical meshes over 1-D intervals and 2-D rectangles.
//!
//! A [`Mesh`] pairs two isomorphic trees:
//! * a geometric [`CellTree`] of [`BiCell`](mesh::bicell::BiCell)s or [`QuadCell`](mesh::quadcell::QuadCell)s
//!   which owns every [`Vertex`] and [`Edge`] and shares them between adjacent cells
//! * a topological [`Tree`] of [`Node`]s used for marking, traversal and 2:1 balancing
//!
//! ```
//! use adaptive_mesh::{Mesh, GridSize};
//!
//! let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();
//! mesh.refine(None).unwrap();
//! mesh.balance().unwrap();
//! assert!(mesh.is_balanced());
//! assert_eq!(mesh.find_leaves(None, false).len(), 16);
//! ```

/// Adaptive mesh data structures
pub mod mesh;

pub use mesh::{
    cell::{BoundingBox, Cell, CellKey, CellKind, CellTree},
    config::MeshConfig,
    edge::{Edge, EdgeKey},
    error::{MeshError, Result},
    flags::{Flag, FlagSet, Markable},
    node::{Node, NodeKey, Tree},
    position::{Bisection, ChildPos, Direction, EdgePos, GridSize, Quadrant, VertexPos},
    tree::{Hierarchy, NodeType, TraversalMode},
    tricell::TriCell,
    vertex::{Point, Vertex, VertexKey},
    Mesh, UnmarkTargets,
};
