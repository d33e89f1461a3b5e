use crate::core::error::ReducerError;
use crate::core::nested::Nested;
use crate::reducers::ReducerState;
use ndarray::ArrayD;

/// One or more samples arranged like the reducer's template.
pub type Observation = Nested<ArrayD<f64>>;

/// Streaming reducer over nested observations.
///
/// A reducer is pure configuration: all accumulated data lives in the
/// [`ReducerState`] values it produces. Callers drive it with any loop they
/// like, threading the returned state into the next call:
///
/// ```
/// use ndarray::arr1;
/// use streamcov::core::nested::Nested;
/// use streamcov::reducers::{CovarianceReducer, Reducer};
///
/// let reducer = CovarianceReducer::new().with_event_ndims(1);
/// let mut state = reducer.initialize(&Nested::leaf(arr1(&[0.0, 0.0]).into_dyn())).unwrap();
/// for x in [[1.0, 2.0], [3.0, 6.0]] {
///     state = reducer.one_step(&Nested::leaf(arr1(&x).into_dyn()), &state, None).unwrap();
/// }
/// let cov = reducer.finalize(&state).into_leaf().unwrap();
/// assert_eq!(cov.shape(), &[2, 2]);
/// ```
pub trait Reducer {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Builds an empty state whose leaf shapes follow `template`.
    ///
    /// Fails with [`ReducerError::Shape`] when a leaf has fewer dimensions
    /// than the configured event rank.
    fn initialize(&self, template: &Observation) -> Result<ReducerState, ReducerError>;

    /// Absorbs `observation` and returns the next state; `state` itself is
    /// left untouched.
    ///
    /// With `axis = None` every leaf is a single sample shaped like the
    /// template. With `axis = Some(a)` every leaf is a chunk of samples
    /// stacked along dimension `a` (at most the batch rank).
    fn one_step(
        &self,
        observation: &Observation,
        state: &ReducerState,
        axis: Option<usize>,
    ) -> Result<ReducerState, ReducerError>;

    /// Normalized second moments, nested like the template. Safe to call at
    /// any point in the stream.
    fn finalize(&self, state: &ReducerState) -> Nested<ArrayD<f64>>;
}
