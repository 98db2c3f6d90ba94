//! Path projection between Global State and local models.
//!
//! A [`Path`] locates a value inside the state tree. A [`PathMap`] binds
//! socket names to paths. [`project`] reads a local model out of the tree and
//! [`commit`] writes a (possibly partial) local model back.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mapping from socket name to current value.
pub type LocalModel = Map<String, Value>;

/// Socket name to path binding of a component.
pub type PathMap = BTreeMap<String, Path>;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// Object key this segment addresses. Indexes address their decimal key.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }

    /// Two segments address the same location in any container.
    pub fn same_location(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Key(a), Segment::Key(b)) => a == b,
            (Segment::Index(a), Segment::Index(b)) => a == b,
            _ => self.as_key() == other.as_key(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Ordered sequence of segments locating a value inside Global State.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// New path with `segment` appended.
    pub fn child(&self, segment: impl Into<Segment>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// Paths overlap when they agree on every index of the shorter one,
    /// i.e. one is a prefix of (or equal to) the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.same_location(b))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", segment)?;
        }
        f.write_str("]")
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Path(segments)
    }
}

/// Build a [`Path`] from mixed key and index segments.
///
/// ```
/// use socketry::path;
/// let p = path!["person", "hobbies", 0];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => { $crate::paths::Path::default() };
    ($($segment:expr),+ $(,)?) => {
        $crate::paths::Path::from(vec![$($crate::paths::Segment::from($segment)),+])
    };
}

/// Build a [`PathMap`] from `(socket, path)` pairs.
pub fn path_map<I, K>(entries: I) -> PathMap
where
    I: IntoIterator<Item = (K, Path)>,
    K: Into<String>,
{
    entries
        .into_iter()
        .map(|(socket, path)| (socket.into(), path))
        .collect()
}

/// Read the value at `path`. Missing intermediate segments yield `None`.
pub fn read<'a>(state: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(state, |node, segment| match (node, segment) {
            (Value::Object(map), segment) => map.get(&segment.as_key()),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            (Value::Array(items), Segment::Key(key)) => {
                key.parse::<usize>().ok().and_then(|index| items.get(index))
            }
            _ => None,
        })
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Writing `Null` to a location that does not exist leaves the tree as is:
/// a projected absent value comes back as `Null` and must not materialize.
/// The empty path is the state root, which is never replaced.
pub fn write(state: &mut Value, path: &Path, value: Value) {
    if value.is_null() && read(state, path).is_none() {
        return;
    }

    let Some((last, parents)) = path.segments().split_last() else {
        tracing::warn!("Ignoring write to the state root");
        return;
    };

    let mut node = state;
    for segment in parents {
        node = slot(node, segment);
    }
    *slot(node, last) = value;
}

/// Mutable slot for `segment` inside `node`, turning scalars into objects.
fn slot<'a>(node: &'a mut Value, segment: &Segment) -> &'a mut Value {
    let array_slot = match (&*node, array_index(segment)) {
        (Value::Array(_), Some(index)) => Some(index),
        _ => None,
    };

    if let Some(index) = array_slot {
        let Value::Array(items) = node else {
            unreachable!("checked to be an array above")
        };
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        return &mut items[index];
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map.entry(segment.as_key()).or_insert(Value::Null),
        _ => unreachable!("normalized to an object above"),
    }
}

fn array_index(segment: &Segment) -> Option<usize> {
    match segment {
        Segment::Index(index) => Some(*index),
        Segment::Key(key) => key.parse().ok(),
    }
}

/// Project `state` through `paths` into a local model.
///
/// Every socket of the map is present in the result: the state value, else
/// the matching default, else `Null`.
pub fn project(state: &Value, paths: &PathMap, defaults: &LocalModel) -> LocalModel {
    paths
        .iter()
        .map(|(socket, path)| {
            let value = read(state, path)
                .cloned()
                .or_else(|| defaults.get(socket).cloned())
                .unwrap_or(Value::Null);
            (socket.clone(), value)
        })
        .collect()
}

/// Write every key of `changed` that has a path back into `state`.
///
/// Sockets missing from `changed` are left untouched, which is what lets
/// partial and deferred actions avoid clobbering fields changed meanwhile.
pub fn commit(state: &mut Value, paths: &PathMap, changed: &LocalModel) {
    for (socket, value) in changed {
        if let Some(path) = paths.get(socket) {
            write(state, path, value.clone());
        }
    }
}
