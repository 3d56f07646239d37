#[cfg(feature = "json_export")]
use json::JsonValue;
use std::collections::BTreeSet;
use std::fmt;

/// A label which can be attached to any [`Markable`] mesh entity
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// The catch-all label used when `mark` is called without a flag
    Default,
    /// An automatically numbered refinement snapshot (see [`Mesh::record`](super::Mesh::record))
    Generation(usize),
    /// A user supplied label
    Label(String),
}

impl From<&str> for Flag {
    fn from(label: &str) -> Self {
        Self::Label(label.to_owned())
    }
}

impl From<usize> for Flag {
    fn from(generation: usize) -> Self {
        Self::Generation(generation)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Default => write!(f, "*"),
            Self::Generation(g) => write!(f, "#{}", g),
            Self::Label(l) => write!(f, "{}", l),
        }
    }
}

/// Set of [`Flag`]s held by a mesh entity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlagSet {
    inner: BTreeSet<Flag>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> + '_ {
        self.inner.iter()
    }

    /// Add `flag`, or [`Flag::Default`] if `None`
    pub fn insert(&mut self, flag: Option<Flag>) {
        self.inner.insert(flag.unwrap_or(Flag::Default));
    }

    /// Remove `flag`, or every flag if `None`
    pub fn remove(&mut self, flag: Option<&Flag>) {
        match flag {
            Some(flag) => {
                self.inner.remove(flag);
            }
            None => self.inner.clear(),
        }
    }

    /// Whether `flag` is present, or whether any flag is present if `None`
    pub fn contains(&self, flag: Option<&Flag>) -> bool {
        match flag {
            Some(flag) => self.inner.contains(flag),
            None => !self.inner.is_empty(),
        }
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::from(
            self.inner
                .iter()
                .map(|flag| flag.to_string())
                .collect::<Vec<_>>(),
        )
    }
}

/// Shared marking behavior of vertices, edges, cells, nodes and tricells
///
/// * `mark(None)` attaches [`Flag::Default`]; `mark(Some(f))` attaches `f`
/// * `unmark(None)` clears every flag; `unmark(Some(f))` removes only `f`
/// * `is_marked(None)` is true if any flag is attached; `is_marked(Some(f))` checks for `f`
pub trait Markable {
    fn flags(&self) -> &FlagSet;

    fn flags_mut(&mut self) -> &mut FlagSet;

    fn mark(&mut self, flag: Option<Flag>) {
        self.flags_mut().insert(flag);
    }

    fn unmark(&mut self, flag: Option<&Flag>) {
        self.flags_mut().remove(flag);
    }

    fn is_marked(&self, flag: Option<&Flag>) -> bool {
        self.flags().contains(flag)
    }
}
