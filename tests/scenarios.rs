use adaptive_mesh::{
    Bisection, BoundingBox, CellKey, CellTree, ChildPos, Direction, EdgePos, GridSize, Hierarchy,
    Mesh, MeshConfig, MeshError, NodeKey, Point, Quadrant, TraversalMode, VertexPos,
};
use env_logger::Env;
use proptest::prelude::*;

fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

fn quad(q: Quadrant) -> ChildPos {
    ChildPos::Quad(q)
}

fn node_at(mesh: &Mesh, address: &[ChildPos]) -> NodeKey {
    mesh.find_node(address).unwrap()
}

fn assert_complete_child_sets(mesh: &Mesh) {
    let branching = 2usize.pow(mesh.dim() as u32);
    let nodes = mesh.nodes();
    for key in nodes.traverse(nodes.root(), None, TraversalMode::DepthFirst) {
        let n = nodes.children(key).len();
        match nodes.grid_size(key) {
            Some(grid) => assert_eq!(n, grid.num_cells()),
            None => assert!(n == 0 || n == branching),
        }
    }
    let cells = mesh.cells();
    for key in cells.traverse(cells.root(), None, TraversalMode::BreadthFirst) {
        let n = cells.children(key).len();
        match cells.grid_size(key) {
            Some(grid) => assert_eq!(n, grid.num_cells()),
            None => assert!(n == 0 || n == branching),
        }
    }
}

/// Equally deep cells which share a side must share its edge and end-points
fn assert_shared_geometry(mesh: &Mesh) {
    let cells = mesh.cells();
    for key in mesh.leaf_cells(None, false).unwrap() {
        for (dir, mine, theirs) in [(Direction::E, 1, 3), (Direction::N, 2, 0)] {
            let Some(nb) = cells.find_neighbor(key, dir).unwrap() else {
                continue;
            };
            if cells.depth(nb) != cells.depth(key) {
                continue;
            }
            let (a, b) = (cells.cell(key).unwrap(), cells.cell(nb).unwrap());
            assert_eq!(a.sides()[mine], b.sides()[theirs]);

            let edge = cells.edge(a.sides()[mine]).unwrap();
            for v in edge.vertices {
                assert!(a.corners().contains(&v));
                assert!(b.corners().contains(&v));
            }
        }
    }
}

fn arena_sizes(cells: &CellTree) -> (usize, usize) {
    (cells.iter_vertex_keys().count(), cells.iter_edge_keys().count())
}

/// Every vertex and edge held by a cell must still exist
fn assert_geometry_resolves(cells: &CellTree) {
    for key in cells.iter_cell_keys() {
        let cell = cells.cell(key).unwrap();
        for v in cell.vertex_keys() {
            assert!(cells.vertex(v).is_some(), "Cell {:?} holds a removed vertex", key);
        }
        for e in cell.edge_keys() {
            let edge = cells.edge(e).unwrap();
            assert!(edge.vertices.iter().all(|v| cells.vertex(*v).is_some()));
        }
    }
}

/// Refine the grid cell (0, 0) three times towards the center of the unit square
fn refine_to_center(mesh: &mut Mesh) {
    let g00 = ChildPos::Grid(0, 0);
    let ne = quad(Quadrant::NE);
    mesh.split_node(node_at(mesh, &[g00])).unwrap();
    mesh.split_node(node_at(mesh, &[g00, ne])).unwrap();
    mesh.split_node(node_at(mesh, &[g00, ne, ne])).unwrap();
}

#[test]
fn refinement_across_grid_boundaries_is_balanced_with_support_nodes() {
    init_logging();
    let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();

    // a single refinement of (0, 0) is already balanced
    mesh.split_node(node_at(&mesh, &[ChildPos::Grid(0, 0)])).unwrap();
    assert!(mesh.is_balanced());
    mesh.merge_node(node_at(&mesh, &[ChildPos::Grid(0, 0)])).unwrap();

    refine_to_center(&mut mesh);
    assert!(!mesh.is_balanced());
    mesh.balance().unwrap();
    assert!(mesh.is_balanced());

    let nodes = mesh.nodes();
    for (i, j) in [(1, 0), (0, 1), (1, 1)] {
        let neighbor = node_at(&mesh, &[ChildPos::Grid(i, j)]);
        assert_eq!(nodes.children(neighbor).len(), 4);
        for (_, child) in nodes.children(neighbor) {
            assert!(nodes.is_support(*child));
        }
    }
    assert_complete_child_sets(&mesh);
    assert_shared_geometry(&mesh);
}

#[test]
fn interval_neighbors_share_end_points() {
    init_logging();
    let mut mesh = Mesh::newmesh(&[0.0, 4.0], None).unwrap();
    mesh.refine(None).unwrap();
    mesh.refine(None).unwrap();
    assert_eq!(mesh.find_leaves(None, false).len(), 4);

    let (l, r) = (ChildPos::Half(Bisection::L), ChildPos::Half(Bisection::R));
    let second = node_at(&mesh, &[l, r]);
    let third = node_at(&mesh, &[r, l]);
    assert_eq!(mesh.find_neighbor(second, Direction::R).unwrap(), Some(third));

    let cells = mesh.cells();
    let (a, b) = (mesh.node_cell(second).unwrap(), mesh.node_cell(third).unwrap());
    assert_eq!(cells.find_neighbor(a, Direction::R).unwrap(), Some(b));
    let a_right = cells.cell(a).unwrap().as_bicell().unwrap().right();
    let b_left = cells.cell(b).unwrap().as_bicell().unwrap().left();
    assert_eq!(a_right, b_left);
    assert_eq!(
        cells.vertex(a_right).unwrap().coordinate(),
        cells.vertex(b_left).unwrap().coordinate()
    );
    assert_eq!(cells.vertex(a_right).unwrap().coordinate(), Point::X(2.0));

    // the same lookup across top-level grid intervals
    let mut gridded = Mesh::newmesh(&[0.0, 4.0], Some(GridSize::One(4))).unwrap();
    gridded.refine(None).unwrap();
    let rightmost = node_at(&gridded, &[ChildPos::Index(1), r]);
    let leftmost = node_at(&gridded, &[ChildPos::Index(2), l]);
    assert_eq!(
        gridded.find_neighbor(rightmost, Direction::R).unwrap(),
        Some(leftmost)
    );
    let cells = gridded.cells();
    let shared = cells
        .cell(gridded.node_cell(rightmost).unwrap())
        .unwrap()
        .as_bicell()
        .unwrap()
        .right();
    assert_eq!(cells.vertex(shared).unwrap().coordinate(), Point::X(2.0));
}

#[test]
fn diagonal_neighbors_require_a_shared_corner() {
    init_logging();
    let mut cells =
        CellTree::new(BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(), None).unwrap();
    let root = cells.root();
    cells.split(root).unwrap();
    let child = |cells: &CellTree, key: CellKey, q: Quadrant| cells.child(key, quad(q)).unwrap();

    // a depth 1 NE cell and its SW sibling meet at the center
    let ne = child(&cells, root, Quadrant::NE);
    let sw = child(&cells, root, Quadrant::SW);
    assert_eq!(cells.find_neighbor(ne, Direction::SW).unwrap(), Some(sw));
    assert_eq!(
        cells.vertex_at(ne, VertexPos::SW),
        cells.vertex_at(sw, VertexPos::NE)
    );
    assert_eq!(cells.find_neighbor(ne, Direction::NE).unwrap(), None);

    // across a side, the diagonal neighbor only exists once the cell beyond it is split
    cells.split(ne).unwrap();
    let ne_nw = child(&cells, ne, Quadrant::NW);
    assert_eq!(cells.find_neighbor(ne_nw, Direction::SW).unwrap(), None);

    let nw = child(&cells, root, Quadrant::NW);
    cells.split(nw).unwrap();
    let nw_se = child(&cells, nw, Quadrant::SE);
    assert_eq!(cells.find_neighbor(ne_nw, Direction::SW).unwrap(), Some(nw_se));
    assert_eq!(
        cells.vertex_at(ne_nw, VertexPos::SW),
        cells.vertex_at(nw_se, VertexPos::NE)
    );

    // grid cells
    let grid = CellTree::new(
        BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(),
        Some(GridSize::Two(2, 2)),
    )
    .unwrap();
    let g00 = grid.child(grid.root(), ChildPos::Grid(0, 0)).unwrap();
    let g11 = grid.child(grid.root(), ChildPos::Grid(1, 1)).unwrap();
    assert_eq!(grid.find_neighbor(g11, Direction::SW).unwrap(), Some(g00));
    assert_eq!(grid.find_neighbor(g00, Direction::SW).unwrap(), None);
    assert!(matches!(
        grid.find_neighbor(g00, Direction::L),
        Err(MeshError::InvalidDirection(_))
    ));
}

#[test]
fn points_on_shared_borders_are_located() {
    init_logging();
    let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();
    mesh.refine(None).unwrap();

    for p in [
        Point::XY([0.5, 0.5]),
        Point::XY([0.5, 0.1]),
        Point::XY([0.25, 0.75]),
        Point::XY([0.0, 0.0]),
        Point::XY([1.0, 1.0]),
    ] {
        let cell = mesh.locate_point(&p, None).unwrap().unwrap();
        assert!(mesh.cells().contains_point(cell, &p).unwrap());
        assert!(!mesh.cells().has_children(cell));
    }
    assert_eq!(mesh.locate_point(&Point::XY([1.0, 1.0 + 1e-9]), None).unwrap(), None);

    let interval = Mesh::newmesh(&[0.0, 4.0], Some(GridSize::One(4))).unwrap();
    let cell = interval.locate_point(&Point::X(2.0), None).unwrap().unwrap();
    assert!(interval.cells().contains_point(cell, &Point::X(2.0)).unwrap());
}

#[test]
fn segment_intersection_with_edges() {
    let cells = CellTree::new(BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(), None).unwrap();
    let south = cells
        .edge(cells.edge_at(cells.root(), EdgePos::SwSe).unwrap())
        .unwrap();
    assert!(south.is_on_boundary());

    // collinear and overlapping
    assert!(south.intersects_line_segment([Point::XY([0.5, 0.0]), Point::XY([2.0, 0.0])]));
    // collinear and disjoint
    assert!(!south.intersects_line_segment([Point::XY([1.5, 0.0]), Point::XY([2.0, 0.0])]));
    // crossing
    assert!(south.intersects_line_segment([Point::XY([0.5, -1.0]), Point::XY([0.5, 1.0])]));
    // parallel but offset
    assert!(!south.intersects_line_segment([Point::XY([0.0, 0.5]), Point::XY([1.0, 0.5])]));
    // the crossing point lies beyond the segment
    assert!(!south.intersects_line_segment([Point::XY([0.5, 0.5]), Point::XY([0.5, 1.0])]));
}

#[test]
fn split_then_merge_restores_a_leaf() {
    let mut cells = CellTree::new(
        BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(),
        Some(GridSize::Two(2, 1)),
    )
    .unwrap();
    let left = cells.child(cells.root(), ChildPos::Grid(0, 0)).unwrap();
    let right = cells.child(cells.root(), ChildPos::Grid(1, 0)).unwrap();
    cells.split(right).unwrap();
    cells.split(left).unwrap();
    let shared = cells.vertex_at(left, VertexPos::E).unwrap();

    cells.merge(left).unwrap();
    assert!(!cells.has_children(left));
    assert_eq!(cells.vertex_at(left, VertexPos::E), None);
    // the neighbor keeps the mid-side vertex
    assert_eq!(cells.vertex_at(right, VertexPos::W), Some(shared));
    assert!(cells.vertex(shared).is_some());
}

#[test]
fn oversized_grids_are_rejected() {
    for grid in [GridSize::Two(usize::MAX, 1), GridSize::Two(1 << 33, 1 << 33)] {
        assert!(matches!(
            Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(grid)),
            Err(MeshError::MalformedGrid(_))
        ));
    }
    assert!(matches!(
        Mesh::newmesh(&[0.0, 1.0], Some(GridSize::One(usize::MAX))),
        Err(MeshError::MalformedGrid(_))
    ));
    assert!(matches!(
        MeshConfig::from_json(r#"{ "grid_size": [4294967296, 4294967296] }"#),
        Err(MeshError::MalformedGrid(_))
    ));
}

#[test]
fn retriangulation_reuses_the_same_geometry() {
    init_logging();
    let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();
    mesh.split_node(node_at(&mesh, &[ChildPos::Grid(0, 0)])).unwrap();

    mesh.triangulate().unwrap();
    let sizes = arena_sizes(mesh.cells());
    for _ in 0..3 {
        mesh.triangulate().unwrap();
        assert_eq!(arena_sizes(mesh.cells()), sizes);
    }

    // refining and triangulating again only adds the new refinement's geometry
    mesh.refine(None).unwrap();
    mesh.triangulate().unwrap();
    let refined = arena_sizes(mesh.cells());
    mesh.triangulate().unwrap();
    assert_eq!(arena_sizes(mesh.cells()), refined);
    assert_geometry_resolves(mesh.cells());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn balance_survives_arbitrary_refinement(
        picks in proptest::collection::vec(0usize..1000, 1..10)
    ) {
        let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();
        for pick in picks {
            let leaves = mesh.find_leaves(None, false);
            let leaf = leaves[pick % leaves.len()];
            if mesh.nodes().depth(leaf) < 6 {
                mesh.split_node(leaf).unwrap();
            }
            mesh.balance().unwrap();
            prop_assert!(mesh.is_balanced());
        }
        assert_complete_child_sets(&mesh);
        assert_shared_geometry(&mesh);

        let area: f64 = mesh
            .leaf_cells(None, false)
            .unwrap()
            .into_iter()
            .map(|c| {
                let w = mesh.cells().bounding_box(c).unwrap().widths();
                w[0] * w[1]
            })
            .sum();
        prop_assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn interval_balance_survives_arbitrary_refinement(
        picks in proptest::collection::vec(0usize..1000, 1..10)
    ) {
        let mut mesh = Mesh::newmesh(&[0.0, 4.0], Some(GridSize::One(3))).unwrap();
        for pick in picks {
            let leaves = mesh.find_leaves(None, false);
            let leaf = leaves[pick % leaves.len()];
            if mesh.nodes().depth(leaf) < 8 {
                mesh.split_node(leaf).unwrap();
            }
            mesh.balance().unwrap();
            prop_assert!(mesh.is_balanced());
        }
        assert_complete_child_sets(&mesh);
    }

    #[test]
    fn triangulating_twice_is_stable(
        picks in proptest::collection::vec(0usize..1000, 1..8)
    ) {
        let mut mesh = Mesh::newmesh(&[0.0, 1.0, 0.0, 1.0], Some(GridSize::Two(2, 2))).unwrap();
        for pick in picks {
            let leaves = mesh.find_leaves(None, false);
            let leaf = leaves[pick % leaves.len()];
            if mesh.nodes().depth(leaf) < 5 {
                mesh.split_node(leaf).unwrap();
            }
        }

        mesh.triangulate().unwrap();
        let sizes = arena_sizes(mesh.cells());
        let count = mesh.iter_tricells(None, false).count();
        mesh.triangulate().unwrap();
        prop_assert_eq!(arena_sizes(mesh.cells()), sizes);
        prop_assert_eq!(mesh.iter_tricells(None, false).count(), count);

        for tri in mesh.iter_tricells(None, false) {
            prop_assert!(tri.vertices().iter().all(|v| mesh.cells().vertex(*v).is_some()));
            prop_assert!(tri.edges().iter().all(|e| mesh.cells().edge(*e).is_some()));
        }
        let area: f64 = mesh.iter_tricells(None, false).map(|t| t.area()).sum();
        prop_assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn split_merge_cycles_leave_no_orphans(
        ops in proptest::collection::vec((0usize..1000, any::<bool>()), 1..16)
    ) {
        let mut cells = CellTree::new(
            BoundingBox::new(&[0.0, 1.0, 0.0, 1.0]).unwrap(),
            Some(GridSize::Two(2, 2)),
        )
        .unwrap();
        let root = cells.root();
        let initial = arena_sizes(&cells);

        for (pick, split) in ops {
            if split {
                let leaves = cells.find_leaves(None, false);
                let leaf = leaves[pick % leaves.len()];
                if cells.depth(leaf) < 5 {
                    cells.split(leaf).unwrap();
                }
            } else {
                let branches: Vec<CellKey> = cells
                    .traverse(root, None, TraversalMode::DepthFirst)
                    .filter(|c| *c != root && cells.has_children(*c))
                    .collect();
                if !branches.is_empty() {
                    cells.merge(branches[pick % branches.len()]).unwrap();
                }
            }
            assert_geometry_resolves(&cells);
        }

        let grid_cells: Vec<CellKey> = cells.children(root).iter().map(|(_, c)| *c).collect();
        for cell in grid_cells {
            cells.merge(cell).unwrap();
        }
        prop_assert_eq!(arena_sizes(&cells), initial);
    }
}
