use super::{
    cell::{CellKey, CellTree},
    error::{MeshError, Result},
    flags::{Flag, FlagSet, Markable},
    position::{Bisection, ChildPos, Direction, GridSize, Quadrant},
    tree::{Hierarchy, TraversalMode},
    tricell::TriCell,
    MAX_BALANCE_ITERATIONS, MAX_TREE_DEPTH,
};

use log::{debug, info};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::collections::BTreeSet;

new_key_type! {
    /// Identity of a [`Node`] within a [`Tree`]
    pub struct NodeKey;
}

/// A node of the topological refinement tree
///
/// A node mirrors one [`Cell`](super::cell::Cell) when linked. Nodes with children
/// always have a complete set of them.
#[derive(Clone, Debug)]
pub struct Node {
    parent: Option<NodeKey>,
    position: Option<ChildPos>,
    depth: usize,
    children: SmallVec<[(ChildPos, NodeKey); 4]>,
    grid: Option<GridSize>,
    cell: Option<CellKey>,
    support: bool,
    tricells: Vec<TriCell>,
    flags: FlagSet,
}

impl Node {
    fn new(
        parent: Option<NodeKey>,
        position: Option<ChildPos>,
        depth: usize,
        cell: Option<CellKey>,
    ) -> Self {
        Self {
            parent,
            position,
            depth,
            children: SmallVec::new(),
            grid: None,
            cell,
            support: false,
            tricells: Vec::new(),
            flags: FlagSet::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn position(&self) -> Option<ChildPos> {
        self.position
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn children(&self) -> &[(ChildPos, NodeKey)] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// The linked cell
    pub fn cell(&self) -> Option<CellKey> {
        self.cell
    }

    pub fn is_linked(&self) -> bool {
        self.cell.is_some()
    }

    /// Whether the node only exists to satisfy the 2:1 rule
    pub fn is_support(&self) -> bool {
        self.support
    }

    pub fn tricells(&self) -> &[TriCell] {
        &self.tricells
    }

    pub fn has_tricells(&self) -> bool {
        !self.tricells.is_empty()
    }
}

impl Markable for Node {
    fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }
}

/// The topological refinement tree
///
/// Marking, traversal and 2:1 balancing operate on nodes alone. Operations which change the
/// shape of the tree accept the [`CellTree`] holding the linked cells, so that linked nodes
/// are only ever split together with their cells. The cell tree may be finer than the node tree:
/// merging nodes leaves their cells in place, and a later split links to the existing cells again.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    dim: usize,
}

impl Tree {
    /// Construct an unlinked tree of dimension `dim`. A gridded root is immediately split into its grid.
    pub fn new(dim: usize, grid: Option<GridSize>) -> Result<Self> {
        if !(1..=2).contains(&dim) {
            return Err(MeshError::DimensionMismatch {
                expected: 2,
                found: dim,
            });
        }
        if let Some(grid) = grid {
            grid.validate(dim)?;
        }

        let mut nodes = SlotMap::with_key();
        let mut root_node = Node::new(None, None, 0, None);
        root_node.grid = grid;
        let root = nodes.insert(root_node);

        let mut tree = Self { nodes, root, dim };
        if grid.is_some() {
            tree.split(root, None)?;
        }
        Ok(tree)
    }

    /// Construct a tree with the same shape as `cells`, with every node linked to its cell
    pub fn from_cells(cells: &CellTree) -> Result<Self> {
        let cell_root = cells.root();
        let mut nodes = SlotMap::with_key();
        let mut root_node = Node::new(None, None, 0, Some(cell_root));
        root_node.grid = cells.grid_size(cell_root);
        let root = nodes.insert(root_node);

        let mut tree = Self {
            nodes,
            root,
            dim: cells.dim(),
        };

        let mut stack = vec![(root, cell_root)];
        while let Some((node, cell)) = stack.pop() {
            for (pos, child_cell) in cells.children(cell) {
                let child = tree.add_child(node, *pos, Some(*child_cell))?;
                stack.push((child, *child_cell));
            }
        }
        Ok(tree)
    }

    /// A copy of the tree with every cell link removed
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        for node in copy.nodes.values_mut() {
            node.cell = None;
        }
        copy
    }

    /// A copy of the tree restricted to the nodes carrying `flag`
    ///
    /// Descent stops at any node whose children do not all carry `flag`. Cell links are kept.
    pub fn restricted(&self, flag: &Flag) -> Self {
        let mut copy = self.clone();
        let mut stack = vec![copy.root];
        while let Some(key) = stack.pop() {
            let children: SmallVec<[NodeKey; 4]> =
                copy.children(key).iter().map(|(_, c)| *c).collect();
            if children.iter().all(|c| copy.is_marked(*c, Some(flag))) {
                stack.extend(children);
            } else {
                copy.remove_descendants(key);
            }
        }
        copy
    }

    // ----------------------------------------------------------------------------------------------------
    // Data retrieval
    // ----------------------------------------------------------------------------------------------------

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub(crate) fn try_node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes.get(key).ok_or(MeshError::MissingNode(key))
    }

    fn try_node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes.get_mut(key).ok_or(MeshError::MissingNode(key))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Every node key, in arena order
    pub fn node_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.keys()
    }

    /// The cell linked to `key`
    pub fn cell(&self, key: NodeKey) -> Option<CellKey> {
        self.nodes.get(key)?.cell
    }

    pub fn is_linked(&self, key: NodeKey) -> bool {
        self.cell(key).is_some()
    }

    pub fn is_support(&self, key: NodeKey) -> bool {
        self.nodes.get(key).map_or(false, |n| n.support)
    }

    pub fn mark_support(&mut self, key: NodeKey) -> Result<()> {
        self.try_node_mut(key)?.support = true;
        Ok(())
    }

    pub fn tricells(&self, key: NodeKey) -> &[TriCell] {
        self.nodes.get(key).map_or(&[][..], |n| n.tricells.as_slice())
    }

    pub fn tricells_mut(&mut self, key: NodeKey) -> Option<&mut [TriCell]> {
        self.nodes.get_mut(key).map(|n| n.tricells.as_mut_slice())
    }

    pub fn has_tricells(&self, key: NodeKey) -> bool {
        !self.tricells(key).is_empty()
    }

    /// Attach `tricells` to a node, keeping any it already holds
    pub fn add_tricells(&mut self, key: NodeKey, tricells: Vec<TriCell>) -> Result<()> {
        self.try_node_mut(key)?.tricells.extend(tricells);
        Ok(())
    }

    pub fn clear_tricells(&mut self) {
        for node in self.nodes.values_mut() {
            node.tricells.clear();
        }
    }

    /// Find the neighbor of `key` in direction `dir`
    ///
    /// The result is never deeper than `key`; a coarser leaf is returned where the tree is coarser.
    pub fn find_neighbor(&self, key: NodeKey, dir: Direction) -> Result<Option<NodeKey>> {
        self.try_node(key)?;
        if dir.dim() != self.dim {
            return Err(MeshError::InvalidDirection(format!(
                "{} (in a {}D tree)",
                dir, self.dim
            )));
        }
        Ok(self.find_neighbor_in_tree(key, dir))
    }

    fn side_directions(&self) -> &'static [Direction] {
        match self.dim {
            1 => &Direction::LATERAL,
            _ => &Direction::CARDINAL,
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Refinement
    // ----------------------------------------------------------------------------------------------------

    fn add_child(
        &mut self,
        parent: NodeKey,
        position: ChildPos,
        cell: Option<CellKey>,
    ) -> Result<NodeKey> {
        let depth = self.try_node(parent)?.depth + 1;
        let child = self
            .nodes
            .insert(Node::new(Some(parent), Some(position), depth, cell));
        self.try_node_mut(parent)?.children.push((position, child));
        Ok(child)
    }

    /// Child positions of an unlinked node
    fn child_positions(&self, key: NodeKey) -> Vec<ChildPos> {
        match (self.grid_size(key), self.dim) {
            (Some(grid), _) => grid.positions(),
            (None, 1) => Bisection::ALL.into_iter().map(ChildPos::Half).collect(),
            (None, _) => Quadrant::ALL.into_iter().map(ChildPos::Quad).collect(),
        }
    }

    /// Split a childless node
    ///
    /// A linked node requires `cells`: its cell is split (unless the cell tree is already finer)
    /// and each new node is linked to the matching child cell.
    pub fn split(&mut self, key: NodeKey, cells: Option<&mut CellTree>) -> Result<()> {
        let node = self.try_node(key)?;
        if node.has_children() {
            return Err(MeshError::AlreadySplit(format!("Node {:?}", key)));
        }
        if node.depth >= MAX_TREE_DEPTH {
            return Err(MeshError::MaxDepthExceeded(MAX_TREE_DEPTH));
        }

        let children: Vec<(ChildPos, Option<CellKey>)> = match node.cell {
            Some(cell) => {
                let cells = cells.ok_or(MeshError::MissingCellTree(key))?;
                if !cells.has_children(cell) {
                    cells.split(cell)?;
                }
                cells
                    .children(cell)
                    .iter()
                    .map(|(pos, c)| (*pos, Some(*c)))
                    .collect()
            }
            None => self
                .child_positions(key)
                .into_iter()
                .map(|pos| (pos, None))
                .collect(),
        };

        for (pos, cell) in children {
            self.add_child(key, pos, cell)?;
        }
        debug!("split Node {:?} at depth {}", key, self.depth(key));
        Ok(())
    }

    fn remove_descendants(&mut self, key: NodeKey) -> usize {
        let descendants: Vec<NodeKey> = self
            .traverse(key, None, TraversalMode::DepthFirst)
            .skip(1)
            .collect();
        for d in descendants.iter() {
            self.nodes.remove(*d);
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.children.clear();
        }
        descendants.len()
    }

    /// Remove every descendant of `key`, making it a leaf. Linked cells are left split.
    pub fn merge(&mut self, key: NodeKey) -> Result<()> {
        self.try_node(key)?;
        let removed = self.remove_descendants(key);
        if removed > 0 {
            debug!("merged Node {:?} ({} descendants removed)", key, removed);
        }
        Ok(())
    }

    /// Remove `key` from the tree
    ///
    /// Partial child sets are not allowed, so the parent of `key` is coarsened into a leaf, removing
    /// every sibling as well. Returns the parent.
    pub fn remove(&mut self, key: NodeKey) -> Result<NodeKey> {
        let parent = self.try_node(key)?.parent.ok_or(MeshError::RemoveRoot)?;
        self.merge(parent)?;
        Ok(parent)
    }

    // ----------------------------------------------------------------------------------------------------
    // Linking
    // ----------------------------------------------------------------------------------------------------

    /// Link `node` to `cell`
    ///
    /// When `recursive`, the descendants of `node` are linked to the matching descendants of `cell`,
    /// splitting cells where the node tree is finer. Fails with [`MeshError::LinkMismatch`] if a node
    /// and its cell have different child positions.
    pub fn link(
        &mut self,
        node: NodeKey,
        cells: &mut CellTree,
        cell: CellKey,
        recursive: bool,
    ) -> Result<()> {
        if cells.dim() != self.dim {
            return Err(MeshError::DimensionMismatch {
                expected: self.dim,
                found: cells.dim(),
            });
        }

        let mut stack = vec![(node, cell)];
        while let Some((n, c)) = stack.pop() {
            cells.try_cell(c)?;
            self.try_node_mut(n)?.cell = Some(c);
            if !recursive || !self.has_children(n) {
                continue;
            }

            if !cells.has_children(c) {
                cells.split(c)?;
            }
            if cells.children(c).len() != self.children(n).len() {
                return Err(MeshError::LinkMismatch { node: n, cell: c });
            }
            for (pos, child) in self.children(n) {
                let child_cell = cells
                    .child(c, *pos)
                    .ok_or(MeshError::LinkMismatch { node: n, cell: c })?;
                stack.push((*child, child_cell));
            }
        }
        Ok(())
    }

    /// Remove the cell link of `node` (and of its descendants when `recursive`)
    pub fn unlink(&mut self, node: NodeKey, recursive: bool) -> Result<()> {
        self.try_node(node)?;
        let keys: Vec<NodeKey> = if recursive {
            self.traverse(node, None, TraversalMode::DepthFirst).collect()
        } else {
            vec![node]
        };
        for key in keys {
            self.try_node_mut(key)?.cell = None;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // 2:1 Balancing
    // ----------------------------------------------------------------------------------------------------

    /// Whether a leaf has a neighbor whose children nearest to it are split
    fn violates_balance(&self, leaf: NodeKey) -> bool {
        self.side_directions().iter().any(|dir| {
            self.find_neighbor_in_tree(leaf, *dir).map_or(false, |nb| {
                self.near_children(nb, *dir)
                    .iter()
                    .any(|c| self.has_children(*c))
            })
        })
    }

    /// Whether adjacent leaves differ in depth by at most one everywhere
    pub fn is_balanced(&self) -> bool {
        self.find_leaves(None, false)
            .into_iter()
            .all(|leaf| !self.violates_balance(leaf))
    }

    /// Split leaves until [`Tree::is_balanced`] holds, marking each new node as a support node
    ///
    /// Linked trees require `cells`.
    pub fn balance(&mut self, mut cells: Option<&mut CellTree>) -> Result<()> {
        let mut work: BTreeSet<NodeKey> = self.find_leaves(None, false).into_iter().collect();
        let mut iterations = 0;
        let mut splits = 0;

        while let Some(leaf) = work.pop_first() {
            iterations += 1;
            if iterations > MAX_BALANCE_ITERATIONS {
                return Err(MeshError::BalanceDidNotConverge(MAX_BALANCE_ITERATIONS));
            }
            if !self.contains(leaf) || self.has_children(leaf) || !self.violates_balance(leaf) {
                continue;
            }

            self.split(leaf, cells.as_deref_mut())?;
            splits += 1;
            let children: SmallVec<[NodeKey; 4]> =
                self.children(leaf).iter().map(|(_, c)| *c).collect();
            for child in children {
                self.mark_support(child)?;
                work.insert(child);
            }

            // coarser leaves next to the new children may now be out of balance
            let depth = self.depth(leaf);
            for dir in self.side_directions() {
                if let Some(nb) = self.find_neighbor_in_tree(leaf, *dir) {
                    if !self.has_children(nb) && self.depth(nb) < depth {
                        work.insert(nb);
                    }
                }
            }
        }

        info!(
            "balanced tree with {} splits ({} iterations)",
            splits, iterations
        );
        Ok(())
    }

    /// Whether `key` could be made a leaf without violating the 2:1 rule
    fn safe_to_coarsen(&self, key: NodeKey) -> bool {
        self.children(key).iter().all(|(_, c)| !self.has_children(*c))
            && !self.violates_balance(key)
    }

    /// Remove support nodes wherever the 2:1 rule still holds without them
    ///
    /// A set of support leaves is merged into its parent once every sibling is a support leaf and
    /// the parent is safe to coarsen. The parent is then reconsidered, so removal can cascade upwards.
    pub fn remove_supports(&mut self) -> Result<()> {
        let mut work: BTreeSet<NodeKey> = self.find_leaves(None, false).into_iter().collect();
        let mut iterations = 0;
        let mut merges = 0;

        while let Some(leaf) = work.pop_first() {
            iterations += 1;
            if iterations > MAX_BALANCE_ITERATIONS {
                return Err(MeshError::BalanceDidNotConverge(MAX_BALANCE_ITERATIONS));
            }
            if !self.contains(leaf) || self.has_children(leaf) || !self.is_support(leaf) {
                continue;
            }
            let Some(parent) = self.parent(leaf) else {
                continue;
            };
            let all_support = self
                .children(parent)
                .iter()
                .all(|(_, s)| self.is_support(*s));
            if !all_support || !self.safe_to_coarsen(parent) {
                continue;
            }

            self.merge(parent)?;
            merges += 1;
            work.insert(parent);

            // leaves which were blocked by the removed nodes can be reconsidered
            for dir in self.side_directions() {
                if let Some(nb) = self.find_neighbor_in_tree(parent, *dir) {
                    work.insert(nb);
                    work.extend(self.near_children(nb, *dir));
                }
            }
        }

        info!("removed {} sets of support nodes", merges);
        Ok(())
    }
}

impl Hierarchy for Tree {
    type Key = NodeKey;
    type Entry = Node;

    fn root(&self) -> NodeKey {
        self.root
    }

    fn entry(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key)?.parent
    }

    fn position(&self, key: NodeKey) -> Option<ChildPos> {
        self.nodes.get(key)?.position
    }

    fn depth(&self, key: NodeKey) -> usize {
        self.nodes.get(key).map_or(0, |n| n.depth)
    }

    fn children(&self, key: NodeKey) -> &[(ChildPos, NodeKey)] {
        self.nodes
            .get(key)
            .map_or(&[][..], |n| n.children.as_slice())
    }

    fn grid_size(&self, key: NodeKey) -> Option<GridSize> {
        self.nodes.get(key)?.grid
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
