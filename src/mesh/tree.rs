use super::{
    flags::{Flag, Markable},
    position::{Bisection, ChildPos, Direction, GridSize, Quadrant},
    EXPECTED_TREE_DEPTH,
};

use smallvec::SmallVec;
use std::collections::VecDeque;

/// Sequence of child positions leading from the root to an entry
pub type Address = SmallVec<[ChildPos; EXPECTED_TREE_DEPTH]>;

/// Classification of an entry by its place in the tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// no parent
    Root,
    /// a parent and children
    Branch,
    /// a parent and no children
    Leaf,
}

/// Visiting order of a [`Traversal`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalMode {
    /// each subtree is completely visited before its next sibling
    DepthFirst,
    /// level by level
    BreadthFirst,
}

/// Read access to an arena-backed refinement tree
///
/// Implemented by both the geometric [`CellTree`](super::cell::CellTree) and the topological
/// [`Tree`](super::node::Tree) so that neighbor search, traversal and leaf enumeration are written once.
pub trait Hierarchy: Sized {
    type Key: slotmap::Key + Ord;
    type Entry: Markable;

    fn root(&self) -> Self::Key;

    fn entry(&self, key: Self::Key) -> Option<&Self::Entry>;

    fn parent(&self, key: Self::Key) -> Option<Self::Key>;

    /// Position relative to the parent (`None` for the root)
    fn position(&self, key: Self::Key) -> Option<ChildPos>;

    fn depth(&self, key: Self::Key) -> usize;

    /// Children in construction order
    fn children(&self, key: Self::Key) -> &[(ChildPos, Self::Key)];

    /// The grid beneath a gridded root
    fn grid_size(&self, key: Self::Key) -> Option<GridSize>;

    /// 1 for binary trees, 2 for quad trees
    fn dim(&self) -> usize;

    // ----------------------------------------------------------------------------------------------------
    // Provided methods
    // ----------------------------------------------------------------------------------------------------

    fn contains(&self, key: Self::Key) -> bool {
        self.entry(key).is_some()
    }

    fn has_parent(&self, key: Self::Key) -> bool {
        self.parent(key).is_some()
    }

    fn has_children(&self, key: Self::Key) -> bool {
        !self.children(key).is_empty()
    }

    /// Whether any child carries `flag` (any flag if `None`)
    fn has_children_with(&self, key: Self::Key, flag: Option<&Flag>) -> bool {
        self.children(key)
            .iter()
            .any(|(_, child)| self.is_marked(*child, flag))
    }

    fn node_type(&self, key: Self::Key) -> NodeType {
        if !self.has_parent(key) {
            NodeType::Root
        } else if self.has_children(key) {
            NodeType::Branch
        } else {
            NodeType::Leaf
        }
    }

    fn is_marked(&self, key: Self::Key, flag: Option<&Flag>) -> bool {
        self.entry(key).map_or(false, |e| e.is_marked(flag))
    }

    /// The child at `pos`
    fn child(&self, key: Self::Key, pos: ChildPos) -> Option<Self::Key> {
        let children = self.children(key);
        // grid children are stored bottom to top, left to right
        let guess = match (self.grid_size(key), pos) {
            (Some(GridSize::Two(nx, _)), ChildPos::Grid(i, j)) => Some(j * nx + i),
            (Some(GridSize::One(_)), ChildPos::Index(i)) => Some(i),
            _ => None,
        };
        match guess.and_then(|idx| children.get(idx)) {
            Some((p, c)) if *p == pos => Some(*c),
            _ => children.iter().find(|(p, _)| *p == pos).map(|(_, c)| *c),
        }
    }

    fn find_root(&self, key: Self::Key) -> Self::Key {
        let mut current = key;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Positions from the root down to `key`
    fn address(&self, key: Self::Key) -> Address {
        let mut address = Address::new();
        let mut current = key;
        while let Some(pos) = self.position(current) {
            address.push(pos);
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        address.reverse();
        address
    }

    /// Resolve an address from the root
    fn find_by_address(&self, address: &[ChildPos]) -> Option<Self::Key> {
        address
            .iter()
            .try_fold(self.root(), |key, pos| self.child(key, *pos))
    }

    fn max_depth(&self) -> usize {
        self.traverse(self.root(), None, TraversalMode::DepthFirst)
            .map(|key| self.depth(key))
            .max()
            .unwrap_or(0)
    }

    fn find_at_depth(&self, depth: usize) -> Vec<Self::Key> {
        self.traverse(self.root(), None, TraversalMode::BreadthFirst)
            .filter(|key| self.depth(*key) == depth)
            .collect()
    }

    /// Iterate over `start` and all of its descendants which carry `flag` (every entry if `None`)
    fn traverse<'a>(
        &'a self,
        start: Self::Key,
        flag: Option<&'a Flag>,
        mode: TraversalMode,
    ) -> Traversal<'a, Self> {
        Traversal::new(self, start, flag, mode)
    }

    /// Breadth-first [`Hierarchy::traverse`]
    fn traverse_depthwise<'a>(
        &'a self,
        start: Self::Key,
        flag: Option<&'a Flag>,
    ) -> Traversal<'a, Self> {
        Traversal::new(self, start, flag, TraversalMode::BreadthFirst)
    }

    /// Leaves of the tree, in depth-first order
    ///
    /// * `nested == false`: childless entries carrying `flag`
    /// * `nested == true`: descent proceeds only through entries carrying `flag`; the result is
    ///   every flagged entry without flagged children. Flagged entries beneath an unflagged one are never reached.
    fn find_leaves(&self, flag: Option<&Flag>, nested: bool) -> Vec<Self::Key> {
        if !nested || flag.is_none() {
            return self
                .traverse(self.root(), flag, TraversalMode::DepthFirst)
                .filter(|key| !self.has_children(*key))
                .collect();
        }

        let mut leaves = Vec::new();
        if !self.is_marked(self.root(), flag) {
            return leaves;
        }
        let mut stack = vec![self.root()];
        while let Some(key) = stack.pop() {
            let flagged_children: Vec<_> = self
                .children(key)
                .iter()
                .map(|(_, c)| *c)
                .filter(|c| self.is_marked(*c, flag))
                .collect();
            if flagged_children.is_empty() {
                leaves.push(key);
            } else {
                stack.extend(flagged_children.into_iter().rev());
            }
        }
        leaves
    }

    /// Find the neighbor of `key` in direction `dir` using only the tree's topology
    ///
    /// The result is never deeper than `key`. When the neighboring region is coarser,
    /// the coarser leaf covering it is returned. Diagonal neighbors across a parent's
    /// side are only returned at the same depth as `key`.
    fn find_neighbor_in_tree(&self, key: Self::Key, dir: Direction) -> Option<Self::Key> {
        if dir.dim() != self.dim() {
            return None;
        }
        let parent = self.parent(key)?;
        let pos = self.position(key)?;

        if pos.in_grid() {
            let grid = self.grid_size(parent)?;
            return self.child(parent, grid.step(pos, dir)?);
        }

        if let Some(sibling) = pos.interior_neighbor(dir) {
            return self.child(parent, sibling);
        }

        if let (ChildPos::Quad(q), Some((dv, dh))) = (pos, dir.components()) {
            if q != dir.as_quadrant()? {
                // the neighbor lies across the side `here` shared by `q` and `dir`
                let (qv, qh) = q.components();
                let (here, target) = if qv == dv {
                    (dv, Quadrant::from_components(dv.opposite(), dh)?)
                } else if qh == dh {
                    (dh, Quadrant::from_components(dv, dh.opposite())?)
                } else {
                    return None;
                };

                let mu = self.find_neighbor_in_tree(parent, here)?;
                return if self.depth(mu) == self.depth(parent) && self.has_children(mu) {
                    self.child(mu, ChildPos::Quad(target))
                } else {
                    None
                };
            }
        }

        let mu = self.find_neighbor_in_tree(parent, dir)?;
        if self.has_children(mu) {
            self.child(mu, pos.exterior_neighbor(dir)?)
        } else {
            Some(mu)
        }
    }

    /// Children of `dir`'s neighbor which touch the shared side (or vertex in 1D)
    fn near_children(&self, neighbor: Self::Key, dir: Direction) -> SmallVec<[Self::Key; 2]> {
        let positions: SmallVec<[ChildPos; 2]> = match dir.dim() {
            1 => Bisection::near(dir).map(ChildPos::Half).into_iter().collect(),
            _ => Quadrant::near(dir)
                .into_iter()
                .flatten()
                .map(ChildPos::Quad)
                .collect(),
        };
        positions
            .into_iter()
            .filter_map(|pos| self.child(neighbor, pos))
            .collect()
    }
}

/// Iterator over a subtree, produced by [`Hierarchy::traverse`]
///
/// Traversal uses an explicit double-ended queue rather than recursion.
/// The tree must not be structurally modified while a traversal borrows it.
pub struct Traversal<'a, H: Hierarchy> {
    tree: &'a H,
    queue: VecDeque<H::Key>,
    flag: Option<&'a Flag>,
    mode: TraversalMode,
}

impl<'a, H: Hierarchy> Traversal<'a, H> {
    fn new(tree: &'a H, start: H::Key, flag: Option<&'a Flag>, mode: TraversalMode) -> Self {
        let mut queue = VecDeque::new();
        if tree.contains(start) {
            queue.push_back(start);
        }
        Self {
            tree,
            queue,
            flag,
            mode,
        }
    }
}

impl<'a, H: Hierarchy> Iterator for Traversal<'a, H> {
    type Item = H::Key;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = match self.mode {
                TraversalMode::DepthFirst => {
                    let key = self.queue.pop_back()?;
                    // reversed so that the first child is visited first
                    self.queue
                        .extend(self.tree.children(key).iter().rev().map(|(_, c)| *c));
                    key
                }
                TraversalMode::BreadthFirst => {
                    let key = self.queue.pop_front()?;
                    self.queue
                        .extend(self.tree.children(key).iter().map(|(_, c)| *c));
                    key
                }
            };

            if self.flag.is_none() || self.tree.is_marked(key, self.flag) {
                return Some(key);
            }
        }
    }
}
