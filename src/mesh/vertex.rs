use super::flags::{FlagSet, Markable};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identity of a [`Vertex`] within a [`CellTree`](super::cell::CellTree)
    pub struct VertexKey;
}

/// A point in 1D or 2D space
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Point {
    X(f64),
    XY([f64; 2]),
}

impl Point {
    pub fn dim(&self) -> usize {
        match self {
            Self::X(_) => 1,
            Self::XY(_) => 2,
        }
    }

    pub fn x(&self) -> f64 {
        match self {
            Self::X(x) => *x,
            Self::XY([x, _]) => *x,
        }
    }

    pub fn y(&self) -> Option<f64> {
        match self {
            Self::X(_) => None,
            Self::XY([_, y]) => Some(*y),
        }
    }

    /// Coordinate along axis `i` (0 is x, 1 is y)
    pub fn coord(&self, i: usize) -> Option<f64> {
        match (self, i) {
            (_, 0) => Some(self.x()),
            (_, 1) => self.y(),
            _ => None,
        }
    }

    /// Euclidean distance (absolute distance in 1D)
    pub fn dist(&self, other: &Self) -> f64 {
        match (self, other) {
            (Self::X(a), Self::X(b)) => (a - b).abs(),
            (Self::XY([x0, y0]), Self::XY([x1, y1])) => (x1 - x0).hypot(y1 - y0),
            _ => f64::NAN,
        }
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::XY([x0, y0]), Self::XY([x1, y1])) => {
                Self::XY([0.5 * (x0 + x1), 0.5 * (y0 + y1)])
            }
            _ => Self::X(0.5 * (self.x() + other.x())),
        }
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::X(x) => JsonValue::from(vec![*x]),
            Self::XY(xy) => JsonValue::from(xy.to_vec()),
        }
    }
}

impl From<f64> for Point {
    fn from(x: f64) -> Self {
        Self::X(x)
    }
}

impl From<[f64; 2]> for Point {
    fn from(xy: [f64; 2]) -> Self {
        Self::XY(xy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::X(x) => write!(f, "({:.5})", x),
            Self::XY([x, y]) => write!(f, "({:.5}, {:.5})", x, y),
        }
    }
}

/// A fixed location in space shared by every cell which touches it
///
/// Vertices are identified by their [`VertexKey`]: two vertices at the same coordinate are
/// distinct unless they were shared by construction.
#[derive(Clone, Debug)]
pub struct Vertex {
    coordinate: Point,
    flags: FlagSet,
}

impl Vertex {
    pub fn new(coordinate: impl Into<Point>) -> Self {
        Self {
            coordinate: coordinate.into(),
            flags: FlagSet::new(),
        }
    }

    pub fn coordinate(&self) -> Point {
        self.coordinate
    }

    pub fn dim(&self) -> usize {
        self.coordinate.dim()
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "coordinate": self.coordinate.to_json(),
            "flags": self.flags.to_json(),
        }
    }
}

impl Markable for Vertex {
    fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }
}
