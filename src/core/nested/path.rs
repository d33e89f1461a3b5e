use std::fmt::{Display, Formatter, Result};

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

/// Location of a node inside a [`Nested`](super::Nested) tree, used to point
/// errors at the offending leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedPath {
    segments: Vec<PathSegment>,
}

impl NestedPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub(crate) fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }
}

impl Display for NestedPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Index(i) => write!(f, "[{i}]")?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
            }
        }
        Ok(())
    }
}
