use super::{error::MeshError, MAX_GRID_CELLS};
use std::fmt;
use std::str::FromStr;

/// Direction from a cell towards one of its neighbors
///
/// `L`/`R` apply to 1-D (binary) trees; the cardinal and diagonal directions apply to 2-D (quad) trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    L,
    R,
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Direction {
    pub const LATERAL: [Self; 2] = [Self::L, Self::R];
    pub const CARDINAL: [Self; 4] = [Self::N, Self::S, Self::E, Self::W];
    pub const DIAGONAL: [Self; 4] = [Self::NE, Self::NW, Self::SE, Self::SW];

    pub fn opposite(self) -> Self {
        match self {
            Self::L => Self::R,
            Self::R => Self::L,
            Self::N => Self::S,
            Self::S => Self::N,
            Self::E => Self::W,
            Self::W => Self::E,
            Self::NE => Self::SW,
            Self::NW => Self::SE,
            Self::SE => Self::NW,
            Self::SW => Self::NE,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(self, Self::NE | Self::NW | Self::SE | Self::SW)
    }

    /// Dimension of the trees in which this direction is meaningful
    pub fn dim(self) -> usize {
        match self {
            Self::L | Self::R => 1,
            _ => 2,
        }
    }

    /// The `(vertical, horizontal)` components of a diagonal direction
    pub fn components(self) -> Option<(Self, Self)> {
        self.as_quadrant().map(|q| q.components())
    }

    /// The quadrant a diagonal direction points towards
    pub fn as_quadrant(self) -> Option<Quadrant> {
        match self {
            Self::NE => Some(Quadrant::NE),
            Self::NW => Some(Quadrant::NW),
            Self::SE => Some(Quadrant::SE),
            Self::SW => Some(Quadrant::SW),
            _ => None,
        }
    }

    /// Index offset `(di, dj)` between grid neighbors
    pub fn grid_offset(self) -> (isize, isize) {
        match self {
            Self::L | Self::W => (-1, 0),
            Self::R | Self::E => (1, 0),
            Self::N => (0, 1),
            Self::S => (0, -1),
            Self::NE => (1, 1),
            Self::NW => (-1, 1),
            Self::SE => (1, -1),
            Self::SW => (-1, -1),
        }
    }
}

impl FromStr for Direction {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "R" => Ok(Self::R),
            "N" => Ok(Self::N),
            "S" => Ok(Self::S),
            "E" => Ok(Self::E),
            "W" => Ok(Self::W),
            "NE" => Ok(Self::NE),
            "NW" => Ok(Self::NW),
            "SE" => Ok(Self::SE),
            "SW" => Ok(Self::SW),
            _ => Err(MeshError::InvalidDirection(s.to_owned())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Quadrant of a child cell following a quad split (from the parent's perspective)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quadrant {
    /// south west
    SW,
    /// south east
    SE,
    /// north west
    NW,
    /// north east
    NE,
}

impl Quadrant {
    pub const ALL: [Self; 4] = [Self::SW, Self::SE, Self::NW, Self::NE];

    pub fn index(&self) -> usize {
        match self {
            Self::SW => 0,
            Self::SE => 1,
            Self::NW => 2,
            Self::NE => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// `(vertical, horizontal)` components
    pub fn components(self) -> (Direction, Direction) {
        match self {
            Self::SW => (Direction::S, Direction::W),
            Self::SE => (Direction::S, Direction::E),
            Self::NW => (Direction::N, Direction::W),
            Self::NE => (Direction::N, Direction::E),
        }
    }

    pub fn from_components(vertical: Direction, horizontal: Direction) -> Option<Self> {
        match (vertical, horizontal) {
            (Direction::S, Direction::W) => Some(Self::SW),
            (Direction::S, Direction::E) => Some(Self::SE),
            (Direction::N, Direction::W) => Some(Self::NW),
            (Direction::N, Direction::E) => Some(Self::NE),
            _ => None,
        }
    }

    pub fn as_direction(self) -> Direction {
        match self {
            Self::SW => Direction::SW,
            Self::SE => Direction::SE,
            Self::NW => Direction::NW,
            Self::NE => Direction::NE,
        }
    }

    /// The corner vertex of a cell lying in this quadrant
    pub fn corner(self) -> VertexPos {
        match self {
            Self::SW => VertexPos::SW,
            Self::SE => VertexPos::SE,
            Self::NW => VertexPos::NW,
            Self::NE => VertexPos::NE,
        }
    }

    /// Sibling reached by stepping in `dir` without leaving the parent
    pub fn interior_neighbor(self, dir: Direction) -> Option<Self> {
        use Quadrant::*;
        match (dir, self) {
            (Direction::N, SW) => Some(NW),
            (Direction::N, SE) => Some(NE),
            (Direction::S, NW) => Some(SW),
            (Direction::S, NE) => Some(SE),
            (Direction::E, SW) => Some(SE),
            (Direction::E, NW) => Some(NE),
            (Direction::W, SE) => Some(SW),
            (Direction::W, NE) => Some(NW),
            (Direction::NE, SW) => Some(NE),
            (Direction::NW, SE) => Some(NW),
            (Direction::SE, NW) => Some(SE),
            (Direction::SW, NE) => Some(SW),
            _ => None,
        }
    }

    /// Position, within the parent's `dir` neighbor, of the cell adjacent to `self` in `dir`
    ///
    /// This is the inverse of [`Quadrant::interior_neighbor`].
    pub fn exterior_neighbor(self, dir: Direction) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|q| q.interior_neighbor(dir) == Some(self))
    }

    /// Children of a neighbor in direction `dir` which touch the shared side
    pub fn near(dir: Direction) -> Option<[Self; 2]> {
        match dir {
            Direction::N => Some([Self::SW, Self::SE]),
            Direction::S => Some([Self::NW, Self::NE]),
            Direction::E => Some([Self::SW, Self::NW]),
            Direction::W => Some([Self::SE, Self::NE]),
            _ => None,
        }
    }
}

impl FromStr for Quadrant {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SW" => Ok(Self::SW),
            "SE" => Ok(Self::SE),
            "NW" => Ok(Self::NW),
            "NE" => Ok(Self::NE),
            _ => Err(MeshError::InvalidPosition(s.to_owned())),
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Location of a child cell following a binary split (from the parent's perspective)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bisection {
    /// Left
    L,
    /// Right
    R,
}

impl Bisection {
    pub const ALL: [Self; 2] = [Self::L, Self::R];

    pub fn index(&self) -> usize {
        match self {
            Self::L => 0,
            Self::R => 1,
        }
    }

    pub fn interior_neighbor(self, dir: Direction) -> Option<Self> {
        match (dir, self) {
            (Direction::R, Self::L) => Some(Self::R),
            (Direction::L, Self::R) => Some(Self::L),
            _ => None,
        }
    }

    pub fn exterior_neighbor(self, dir: Direction) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.interior_neighbor(dir) == Some(self))
    }

    /// Child of a neighbor in direction `dir` which touches the shared vertex
    pub fn near(dir: Direction) -> Option<Self> {
        match dir {
            Direction::R => Some(Self::L),
            Direction::L => Some(Self::R),
            _ => None,
        }
    }
}

impl FromStr for Bisection {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "R" => Ok(Self::R),
            _ => Err(MeshError::InvalidPosition(s.to_owned())),
        }
    }
}

impl fmt::Display for Bisection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The location of a cell (or node) relative to its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildPos {
    /// child of a binary split
    Half(Bisection),
    /// child of a quad split
    Quad(Quadrant),
    /// child of a gridded 1-D root
    Index(usize),
    /// child `(i, j)` of a gridded 2-D root
    Grid(usize, usize),
}

impl ChildPos {
    pub fn in_grid(&self) -> bool {
        matches!(self, Self::Index(_) | Self::Grid(_, _))
    }

    pub fn interior_neighbor(self, dir: Direction) -> Option<Self> {
        match self {
            Self::Half(b) => b.interior_neighbor(dir).map(Self::Half),
            Self::Quad(q) => q.interior_neighbor(dir).map(Self::Quad),
            _ => None,
        }
    }

    pub fn exterior_neighbor(self, dir: Direction) -> Option<Self> {
        match self {
            Self::Half(b) => b.exterior_neighbor(dir).map(Self::Half),
            Self::Quad(q) => q.exterior_neighbor(dir).map(Self::Quad),
            _ => None,
        }
    }
}

impl From<Quadrant> for ChildPos {
    fn from(q: Quadrant) -> Self {
        Self::Quad(q)
    }
}

impl From<Bisection> for ChildPos {
    fn from(b: Bisection) -> Self {
        Self::Half(b)
    }
}

impl fmt::Display for ChildPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Half(b) => write!(f, "{}", b),
            Self::Quad(q) => write!(f, "{}", q),
            Self::Index(i) => write!(f, "{}", i),
            Self::Grid(i, j) => write!(f, "({},{})", i, j),
        }
    }
}

/// Parses `"SW"`, `"L"`, `"3"` or `"(1,2)"`
impl FromStr for ChildPos {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MeshError::InvalidPosition(s.to_owned());
        let t = s.trim();

        if let Ok(q) = t.parse::<Quadrant>() {
            return Ok(Self::Quad(q));
        }
        if let Ok(b) = t.parse::<Bisection>() {
            return Ok(Self::Half(b));
        }
        if let Ok(i) = t.parse::<usize>() {
            return Ok(Self::Index(i));
        }

        let inner = t
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let mut parts = inner.split(',').map(|p| p.trim().parse::<usize>());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(i)), Some(Ok(j)), None) => Ok(Self::Grid(i, j)),
            _ => Err(invalid()),
        }
    }
}

/// Dimensions of the background grid directly beneath a root cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridSize {
    One(usize),
    Two(usize, usize),
}

impl GridSize {
    pub fn dim(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Two(_, _) => 2,
        }
    }

    pub fn num_cells(&self) -> usize {
        match self {
            Self::One(nx) => *nx,
            Self::Two(nx, ny) => nx * ny,
        }
    }

    /// Fails if any dimension is zero, if the grid has more than [`MAX_GRID_CELLS`] cells,
    /// or if the grid does not match dimension `dim`
    pub fn validate(&self, dim: usize) -> Result<(), MeshError> {
        if self.dim() != dim {
            return Err(MeshError::MalformedGrid(format!(
                "{:?} is {}-dimensional, but the bounding box is {}-dimensional",
                self,
                self.dim(),
                dim
            )));
        }
        match self {
            Self::One(0) | Self::Two(0, _) | Self::Two(_, 0) => Err(MeshError::MalformedGrid(
                format!("{:?} must have at least one cell in each direction", self),
            )),
            Self::One(nx) if *nx > MAX_GRID_CELLS => Err(too_many_cells(self)),
            Self::Two(nx, ny) if nx.checked_mul(*ny).map_or(true, |n| n > MAX_GRID_CELLS) => {
                Err(too_many_cells(self))
            }
            _ => Ok(()),
        }
    }

    /// Child positions in construction order (bottom to top, left to right)
    pub fn positions(&self) -> Vec<ChildPos> {
        match *self {
            Self::One(nx) => (0..nx).map(ChildPos::Index).collect(),
            Self::Two(nx, ny) => (0..ny)
                .flat_map(|j| (0..nx).map(move |i| ChildPos::Grid(i, j)))
                .collect(),
        }
    }

    /// Position of the grid cell offset from `pos` by `dir`, if it lies within the grid
    pub fn step(&self, pos: ChildPos, dir: Direction) -> Option<ChildPos> {
        let (di, dj) = dir.grid_offset();
        match (*self, pos) {
            (Self::One(nx), ChildPos::Index(i)) if dir.dim() == 1 => {
                let i = i.checked_add_signed(di)?;
                (i < nx).then_some(ChildPos::Index(i))
            }
            (Self::Two(nx, ny), ChildPos::Grid(i, j)) if dir.dim() == 2 => {
                let i = i.checked_add_signed(di)?;
                let j = j.checked_add_signed(dj)?;
                (i < nx && j < ny).then_some(ChildPos::Grid(i, j))
            }
            _ => None,
        }
    }
}

fn too_many_cells(grid: &GridSize) -> MeshError {
    MeshError::MalformedGrid(format!(
        "{:?} exceeds the maximum of {} grid cells",
        grid, MAX_GRID_CELLS
    ))
}

/// Named vertex positions of a [`QuadCell`](super::quadcell::QuadCell)
///
/// ```text
///  NW     N     NE
///   *-----*-----*
///   |           |
/// W *     * M   * E
///   |           |
///   *-----*-----*
///  SW     S     SE
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexPos {
    SW,
    S,
    SE,
    E,
    NE,
    N,
    NW,
    W,
    M,
}

impl VertexPos {
    pub const ALL: [Self; 9] = [
        Self::SW,
        Self::S,
        Self::SE,
        Self::E,
        Self::NE,
        Self::N,
        Self::NW,
        Self::W,
        Self::M,
    ];

    /// Corners in counter-clockwise order
    pub const CORNERS: [Self; 4] = [Self::SW, Self::SE, Self::NE, Self::NW];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_corner(&self) -> bool {
        matches!(self, Self::SW | Self::SE | Self::NE | Self::NW)
    }

    /// Mid-side vertex on side `dir`
    pub fn midpoint(dir: Direction) -> Option<Self> {
        match dir {
            Direction::N => Some(Self::N),
            Direction::S => Some(Self::S),
            Direction::E => Some(Self::E),
            Direction::W => Some(Self::W),
            _ => None,
        }
    }

    /// Location on the reference square `[0,1]²`
    pub fn reference_coords(&self) -> [f64; 2] {
        match self {
            Self::SW => [0.0, 0.0],
            Self::S => [0.5, 0.0],
            Self::SE => [1.0, 0.0],
            Self::E => [1.0, 0.5],
            Self::NE => [1.0, 1.0],
            Self::N => [0.5, 1.0],
            Self::NW => [0.0, 1.0],
            Self::W => [0.0, 0.5],
            Self::M => [0.5, 0.5],
        }
    }
}

/// Named edge positions of a [`QuadCell`](super::quadcell::QuadCell)
///
/// Edges are named by their end-points (see [`VertexPos`]):
/// * 4 boundary edges: `SwSe`, `SeNe`, `NeNw`, `NwSw`
/// * 2 diagonals: `SwNe`, `NwSe`
/// * 8 half-edges, present only while the cell is split: `SwS`, `SSe`, `SeE`, `ENe`, `NeN`, `NNw`, `NwW`, `WSw`
/// * 8 spokes from the center, present only while the cell is split: `MSw`, `MS`, `MSe`, `ME`, `MNe`, `MN`, `MNw`, `MW`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgePos {
    SwSe,
    SeNe,
    NeNw,
    NwSw,
    SwNe,
    NwSe,
    SwS,
    SSe,
    SeE,
    ENe,
    NeN,
    NNw,
    NwW,
    WSw,
    MSw,
    MS,
    MSe,
    ME,
    MNe,
    MN,
    MNw,
    MW,
}

impl EdgePos {
    pub const ALL: [Self; 22] = [
        Self::SwSe,
        Self::SeNe,
        Self::NeNw,
        Self::NwSw,
        Self::SwNe,
        Self::NwSe,
        Self::SwS,
        Self::SSe,
        Self::SeE,
        Self::ENe,
        Self::NeN,
        Self::NNw,
        Self::NwW,
        Self::WSw,
        Self::MSw,
        Self::MS,
        Self::MSe,
        Self::ME,
        Self::MNe,
        Self::MN,
        Self::MNw,
        Self::MW,
    ];

    /// Boundary edges in counter-clockwise order (S, E, N, W)
    pub const BOUNDARY: [Self; 4] = [Self::SwSe, Self::SeNe, Self::NeNw, Self::NwSw];

    pub const DIAGONALS: [Self; 2] = [Self::SwNe, Self::NwSe];

    pub const SPOKES: [Self; 8] = [
        Self::MSw,
        Self::MS,
        Self::MSe,
        Self::ME,
        Self::MNe,
        Self::MN,
        Self::MNw,
        Self::MW,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn endpoints(&self) -> [VertexPos; 2] {
        use VertexPos::*;
        match self {
            Self::SwSe => [SW, SE],
            Self::SeNe => [SE, NE],
            Self::NeNw => [NE, NW],
            Self::NwSw => [NW, SW],
            Self::SwNe => [SW, NE],
            Self::NwSe => [NW, SE],
            Self::SwS => [SW, S],
            Self::SSe => [S, SE],
            Self::SeE => [SE, E],
            Self::ENe => [E, NE],
            Self::NeN => [NE, N],
            Self::NNw => [N, NW],
            Self::NwW => [NW, W],
            Self::WSw => [W, SW],
            Self::MSw => [M, SW],
            Self::MS => [M, S],
            Self::MSe => [M, SE],
            Self::ME => [M, E],
            Self::MNe => [M, NE],
            Self::MN => [M, N],
            Self::MNw => [M, NW],
            Self::MW => [M, W],
        }
    }

    /// Boundary edge on side `dir`
    pub fn side(dir: Direction) -> Option<Self> {
        match dir {
            Direction::S => Some(Self::SwSe),
            Direction::E => Some(Self::SeNe),
            Direction::N => Some(Self::NeNw),
            Direction::W => Some(Self::NwSw),
            _ => None,
        }
    }

    /// The two halves of side `dir`, ordered by increasing coordinate along the side
    ///
    /// Because of the ordering, `halves(d)[k]` of a cell coincides with
    /// `halves(d.opposite())[k]` of its equally deep neighbor in direction `d`.
    pub fn halves(dir: Direction) -> Option<[Self; 2]> {
        match dir {
            Direction::S => Some([Self::SwS, Self::SSe]),
            Direction::N => Some([Self::NNw, Self::NeN]),
            Direction::W => Some([Self::WSw, Self::NwW]),
            Direction::E => Some([Self::SeE, Self::ENe]),
            _ => None,
        }
    }

    /// Spoke from the center `M` to vertex `v`
    pub fn spoke(v: VertexPos) -> Option<Self> {
        match v {
            VertexPos::SW => Some(Self::MSw),
            VertexPos::S => Some(Self::MS),
            VertexPos::SE => Some(Self::MSe),
            VertexPos::E => Some(Self::ME),
            VertexPos::NE => Some(Self::MNe),
            VertexPos::N => Some(Self::MN),
            VertexPos::NW => Some(Self::MNw),
            VertexPos::W => Some(Self::MW),
            VertexPos::M => None,
        }
    }

    /// Edges which exist only while the cell is split
    pub fn is_split_edge(&self) -> bool {
        self.index() >= Self::SwS.index()
    }
}
