use crate::core::nested::Nested;
use crate::reducers::Observation;
use ndarray::{ArrayD, ArrayView, Axis, IxDyn, ShapeError};

pub fn constant(shape: &[usize], value: f64) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(shape), value)
}

/// `({"one": 1s, "zero": 0s}, {"two": 2s})`, every leaf shaped `shape`.
pub fn chain_state(shape: &[usize]) -> Observation {
    Nested::sequence([
        Nested::mapping([
            ("one", Nested::leaf(constant(shape, 1.0))),
            ("zero", Nested::leaf(constant(shape, 0.0))),
        ]),
        Nested::mapping([("two", Nested::leaf(constant(shape, 2.0)))]),
    ])
}

/// Stacks equally shaped samples along a new `axis`, producing a chunk for
/// `one_step(.., Some(axis))`.
pub fn stack(samples: &[ArrayD<f64>], axis: usize) -> Result<ArrayD<f64>, ShapeError> {
    let views: Vec<ArrayView<'_, f64, IxDyn>> = samples.iter().map(ArrayD::view).collect();
    ndarray::stack(Axis(axis), &views)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_state_has_three_leaves() {
        let chain = chain_state(&[2, 3]);
        assert_eq!(chain.num_leaves(), 3);
        assert!(chain.leaves().iter().all(|leaf| leaf.shape() == [2, 3]));
    }

    #[test]
    fn stack_inserts_a_new_axis() {
        let a = constant(&[2, 3], 1.0);
        let b = constant(&[2, 3], 2.0);
        assert_eq!(stack(&[a.clone(), b.clone()], 0).unwrap().shape(), &[2, 2, 3]);
        assert_eq!(stack(&[a, b], 2).unwrap().shape(), &[2, 3, 2]);
    }
}
