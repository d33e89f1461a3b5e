use crate::core::error::ReducerError;
use crate::core::nested::NestedPath;
use serde::{Deserialize, Serialize};

/// Number of trailing leaf dimensions that form one jointly-correlated event.
///
/// `All` treats every dimension of a leaf as an event dimension, whatever the
/// leaf's rank. `Trailing(0)` makes every element an independent batch entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventNdims {
    #[default]
    All,
    Trailing(usize),
}

impl EventNdims {
    pub fn as_option(self) -> Option<usize> {
        match self {
            EventNdims::All => None,
            EventNdims::Trailing(k) => Some(k),
        }
    }
}

impl From<usize> for EventNdims {
    fn from(k: usize) -> Self {
        EventNdims::Trailing(k)
    }
}

impl From<Option<usize>> for EventNdims {
    fn from(k: Option<usize>) -> Self {
        k.map_or(EventNdims::All, EventNdims::Trailing)
    }
}

/// Split of a leaf shape into independent batch dimensions (leading) and
/// correlated event dimensions (trailing).
///
/// Fixed when the reducer state is initialized; every later observation of
/// the leaf is checked against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafLayout {
    batch_shape: Vec<usize>,
    event_shape: Vec<usize>,
}

impl LeafLayout {
    pub fn partition(shape: &[usize], event_ndims: EventNdims) -> Result<Self, ReducerError> {
        let k = match event_ndims {
            EventNdims::All => shape.len(),
            EventNdims::Trailing(k) => k,
        };
        if k > shape.len() {
            return Err(ReducerError::shape(
                &NestedPath::root(),
                format!("event_ndims {k} exceeds leaf rank {} (shape {shape:?})", shape.len()),
            ));
        }
        let (batch, event) = shape.split_at(shape.len() - k);
        Ok(Self {
            batch_shape: batch.to_vec(),
            event_shape: event.to_vec(),
        })
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    pub fn event_shape(&self) -> &[usize] {
        &self.event_shape
    }

    pub fn batch_ndims(&self) -> usize {
        self.batch_shape.len()
    }

    pub fn event_ndims(&self) -> usize {
        self.event_shape.len()
    }

    /// Number of independent batch entries (1 for an empty batch shape).
    pub fn batch_size(&self) -> usize {
        self.batch_shape.iter().product()
    }

    /// Length of one flattened event vector (1 for an empty event shape).
    pub fn event_size(&self) -> usize {
        self.event_shape.iter().product()
    }

    /// `batch_shape + event_shape`: the template, mean and variance shape.
    pub fn shape(&self) -> Vec<usize> {
        [self.batch_shape.as_slice(), self.event_shape.as_slice()].concat()
    }

    /// `batch_shape + event_shape + event_shape`.
    pub fn covariance_shape(&self) -> Vec<usize> {
        [
            self.batch_shape.as_slice(),
            self.event_shape.as_slice(),
            self.event_shape.as_slice(),
        ]
        .concat()
    }

    pub fn check_observation(&self, shape: &[usize]) -> Result<(), ReducerError> {
        if shape != self.shape().as_slice() {
            return Err(ReducerError::shape(
                &NestedPath::root(),
                format!(
                    "observation shape {shape:?} does not match template shape {:?}",
                    self.shape()
                ),
            ));
        }
        Ok(())
    }

    /// Validates a chunked observation and returns the axis order that moves
    /// the chunk axis between the batch and event dimensions, together with
    /// the chunk length.
    ///
    /// The chunk axis is inserted into the template shape at `axis`, which
    /// may not exceed the batch rank.
    pub fn chunk_order(&self, shape: &[usize], axis: usize) -> Result<(Vec<usize>, usize), ReducerError> {
        let rank = self.batch_ndims() + self.event_ndims();
        if shape.len() != rank + 1 {
            return Err(ReducerError::shape(
                &NestedPath::root(),
                format!(
                    "chunked observation must have rank {} (template rank + 1), found shape {shape:?}",
                    rank + 1
                ),
            ));
        }
        if axis > self.batch_ndims() {
            return Err(ReducerError::shape(
                &NestedPath::root(),
                format!(
                    "chunk axis {axis} falls inside the event dimensions (batch rank {})",
                    self.batch_ndims()
                ),
            ));
        }

        let mut rest = shape.to_vec();
        let chunk_len = rest.remove(axis);
        if rest != self.shape() {
            return Err(ReducerError::shape(
                &NestedPath::root(),
                format!(
                    "chunked observation shape {shape:?} without axis {axis} does not match template shape {:?}",
                    self.shape()
                ),
            ));
        }

        let order = (0..=self.batch_ndims())
            .filter(|&d| d != axis)
            .chain(std::iter::once(axis))
            .chain(self.batch_ndims() + 1..=rank)
            .collect();
        Ok((order, chunk_len))
    }
}
