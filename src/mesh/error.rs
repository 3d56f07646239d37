use super::{cell::CellKey, node::NodeKey};
use thiserror::Error;

/// Result type used by every fallible mesh operation
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors produced while constructing, refining or querying a [`Mesh`](super::Mesh)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// `split` was called on a cell or node which already has children
    #[error("{0} is already split; cannot split again!")]
    AlreadySplit(String),
    /// `remove` was called on the root node
    #[error("The root Node cannot be removed from its Tree!")]
    RemoveRoot,
    /// A grid size was empty or did not match the dimension of the bounding box
    #[error("Malformed grid size: {0}")]
    MalformedGrid(String),
    /// A bounding box was not `[x0, x1]` or `[x0, x1, y0, y1]` with `x0 < x1` and `y0 < y1`
    #[error("Malformed bounding box: {0}")]
    MalformedBox(String),
    /// Refinement would exceed [`MAX_TREE_DEPTH`](super::MAX_TREE_DEPTH)
    #[error("Cannot refine past the maximum tree depth of {0}!")]
    MaxDepthExceeded(usize),
    /// A direction string or value could not be used
    #[error("Invalid direction: '{0}'")]
    InvalidDirection(String),
    /// A child position string or value could not be used
    #[error("Invalid position: '{0}'")]
    InvalidPosition(String),
    /// A point, order list or grid has the wrong number of components
    #[error("Expected {expected} dimension(s), found {found}!")]
    DimensionMismatch { expected: usize, found: usize },
    /// The cell tree is in a state that split/neighbor logic cannot reconcile
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),
    /// A node's child positions differ from those of its linked cell
    #[error("Node {node:?} and Cell {cell:?} have different child positions; cannot link!")]
    LinkMismatch { node: NodeKey, cell: CellKey },
    /// The key does not refer to a cell in this tree
    #[error("Cell {0:?} doesn't exist!")]
    MissingCell(CellKey),
    /// The key does not refer to a node in this tree
    #[error("Node {0:?} doesn't exist!")]
    MissingNode(NodeKey),
    /// A linked node was modified without access to its cell tree
    #[error("Node {0:?} is linked to a Cell, but no CellTree was provided!")]
    MissingCellTree(NodeKey),
    /// `balance` exceeded [`MAX_BALANCE_ITERATIONS`](super::MAX_BALANCE_ITERATIONS)
    #[error("Balancing did not converge after {0} iterations!")]
    BalanceDidNotConverge(usize),
    /// The operation exists in the API but has no implementation
    #[error("{0} is not implemented!")]
    NotImplemented(&'static str),
    /// A TriCell already carries a number and `overwrite` was not requested
    #[error("TriCell is already numbered ({0}); use overwrite to renumber!")]
    AlreadyNumbered(usize),
    /// A mesh configuration document could not be interpreted
    #[error("Invalid mesh configuration: {0}")]
    Config(String),
    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MeshError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<json::Error> for MeshError {
    fn from(err: json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
