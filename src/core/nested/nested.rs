use crate::core::error::ReducerError;
use crate::core::nested::{NestedPath, PathSegment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tree whose leaves carry values and whose inner nodes are either
/// positional (`Sequence`) or named (`Mapping`) collections.
///
/// Templates, observations, reducer states and finalized results are all
/// `Nested` values; two trees can only be combined leaf-by-leaf when they are
/// congruent, i.e. they have the same node kinds, the same child counts and
/// the same mapping keys at every level.
///
/// Mapping children are kept in key order, so traversal order is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Nested<T> {
    Leaf(T),
    Sequence(Vec<Nested<T>>),
    Mapping(BTreeMap<String, Nested<T>>),
}

impl<T> Nested<T> {
    pub fn leaf(value: T) -> Self {
        Nested::Leaf(value)
    }

    pub fn sequence<I: IntoIterator<Item = Nested<T>>>(children: I) -> Self {
        Nested::Sequence(children.into_iter().collect())
    }

    pub fn mapping<K, I>(children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Nested<T>)>,
    {
        Nested::Mapping(children.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Nested::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Nested::Leaf(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_leaf(self) -> Option<T> {
        match self {
            Nested::Leaf(v) => Some(v),
            _ => None,
        }
    }

    /// Child of a `Mapping` node by key.
    pub fn get(&self, key: &str) -> Option<&Nested<T>> {
        match self {
            Nested::Mapping(children) => children.get(key),
            _ => None,
        }
    }

    /// Child of a `Sequence` node by position.
    pub fn at(&self, index: usize) -> Option<&Nested<T>> {
        match self {
            Nested::Sequence(children) => children.get(index),
            _ => None,
        }
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Nested::Leaf(v) => out.push(v),
            Nested::Sequence(children) => children.iter().for_each(|c| c.collect_leaves(out)),
            Nested::Mapping(children) => children.values().for_each(|c| c.collect_leaves(out)),
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            Nested::Leaf(_) => 1,
            Nested::Sequence(children) => children.iter().map(Nested::num_leaves).sum(),
            Nested::Mapping(children) => children.values().map(Nested::num_leaves).sum(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Nested::Leaf(_) => "leaf".to_string(),
            Nested::Sequence(children) => format!("sequence of {}", children.len()),
            Nested::Mapping(children) => {
                format!("mapping with keys {:?}", children.keys().collect::<Vec<_>>())
            }
        }
    }

    /// Applies `f` to every leaf, keeping the tree shape.
    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> Nested<U> {
        self.map_inner(&mut f)
    }

    fn map_inner<U, F: FnMut(&T) -> U>(&self, f: &mut F) -> Nested<U> {
        match self {
            Nested::Leaf(v) => Nested::Leaf(f(v)),
            Nested::Sequence(children) => {
                Nested::Sequence(children.iter().map(|c| c.map_inner(f)).collect())
            }
            Nested::Mapping(children) => Nested::Mapping(
                children
                    .iter()
                    .map(|(k, c)| (k.clone(), c.map_inner(f)))
                    .collect(),
            ),
        }
    }

    /// Fallible leaf map. Stops at the first failing leaf; errors raised
    /// without a location are anchored at that leaf's path.
    pub fn try_map<U, F>(&self, mut f: F) -> Result<Nested<U>, ReducerError>
    where
        F: FnMut(&NestedPath, &T) -> Result<U, ReducerError>,
    {
        self.try_map_inner(&mut NestedPath::root(), &mut f)
    }

    fn try_map_inner<U, F>(&self, path: &mut NestedPath, f: &mut F) -> Result<Nested<U>, ReducerError>
    where
        F: FnMut(&NestedPath, &T) -> Result<U, ReducerError>,
    {
        match self {
            Nested::Leaf(v) => f(path, v).map(Nested::Leaf).map_err(|e| e.at(path)),
            Nested::Sequence(children) => {
                let mut out = Vec::with_capacity(children.len());
                for (i, child) in children.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    let mapped = child.try_map_inner(path, f);
                    path.pop();
                    out.push(mapped?);
                }
                Ok(Nested::Sequence(out))
            }
            Nested::Mapping(children) => {
                let mut out = BTreeMap::new();
                for (key, child) in children {
                    path.push(PathSegment::Key(key.clone()));
                    let mapped = child.try_map_inner(path, f);
                    path.pop();
                    out.insert(key.clone(), mapped?);
                }
                Ok(Nested::Mapping(out))
            }
        }
    }

    /// Fails with `StructureMismatch` at the first node where `self` and
    /// `other` disagree in kind, child count or mapping keys.
    pub fn assert_congruent<U>(&self, other: &Nested<U>) -> Result<(), ReducerError> {
        self.congruent_inner(other, &mut NestedPath::root())
    }

    fn congruent_inner<U>(&self, other: &Nested<U>, path: &mut NestedPath) -> Result<(), ReducerError> {
        match (self, other) {
            (Nested::Leaf(_), Nested::Leaf(_)) => Ok(()),
            (Nested::Sequence(a), Nested::Sequence(b)) if a.len() == b.len() => {
                for (i, (x, y)) in a.iter().zip(b).enumerate() {
                    path.push(PathSegment::Index(i));
                    let checked = x.congruent_inner(y, path);
                    path.pop();
                    checked?;
                }
                Ok(())
            }
            (Nested::Mapping(a), Nested::Mapping(b)) if a.keys().eq(b.keys()) => {
                for (key, (x, y)) in a.keys().zip(a.values().zip(b.values())) {
                    path.push(PathSegment::Key(key.clone()));
                    let checked = x.congruent_inner(y, path);
                    path.pop();
                    checked?;
                }
                Ok(())
            }
            _ => Err(ReducerError::mismatch(path, self.describe(), other.describe())),
        }
    }

    /// Combines two congruent trees leaf-by-leaf.
    ///
    /// Congruence is checked for the whole tree before `f` runs on any leaf.
    pub fn try_zip_with<U, V, F>(&self, other: &Nested<U>, mut f: F) -> Result<Nested<V>, ReducerError>
    where
        F: FnMut(&NestedPath, &T, &U) -> Result<V, ReducerError>,
    {
        self.assert_congruent(other)?;
        self.zip_inner(other, &mut NestedPath::root(), &mut f)
    }

    fn zip_inner<U, V, F>(
        &self,
        other: &Nested<U>,
        path: &mut NestedPath,
        f: &mut F,
    ) -> Result<Nested<V>, ReducerError>
    where
        F: FnMut(&NestedPath, &T, &U) -> Result<V, ReducerError>,
    {
        match (self, other) {
            (Nested::Leaf(a), Nested::Leaf(b)) => {
                f(path, a, b).map(Nested::Leaf).map_err(|e| e.at(path))
            }
            (Nested::Sequence(a), Nested::Sequence(b)) => {
                let mut out = Vec::with_capacity(a.len());
                for (i, (x, y)) in a.iter().zip(b).enumerate() {
                    path.push(PathSegment::Index(i));
                    let zipped = x.zip_inner(y, path, f);
                    path.pop();
                    out.push(zipped?);
                }
                Ok(Nested::Sequence(out))
            }
            (Nested::Mapping(a), Nested::Mapping(b)) => {
                let mut out = BTreeMap::new();
                for ((key, x), y) in a.iter().zip(b.values()) {
                    path.push(PathSegment::Key(key.clone()));
                    let zipped = x.zip_inner(y, path, f);
                    path.pop();
                    out.insert(key.clone(), zipped?);
                }
                Ok(Nested::Mapping(out))
            }
            _ => Err(ReducerError::mismatch(path, self.describe(), other.describe())),
        }
    }
}
