use crate::config::VarianceParams;
use crate::core::error::ReducerError;
use crate::core::nested::Nested;
use crate::core::running_covariance::Moment;
use crate::reducers::{CovarianceReducer, Observation, Reducer, ReducerState};
use ndarray::ArrayD;

/// Running elementwise variance of every leaf.
///
/// Equivalent to a [`CovarianceReducer`] with `event_ndims = 0` that skips
/// the outer product: every element is its own batch entry, and the
/// finalized leaf has the template's shape.
#[derive(Debug, Clone)]
pub struct VarianceReducer {
    inner: CovarianceReducer,
}

impl Default for VarianceReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl VarianceReducer {
    pub fn new() -> Self {
        Self {
            inner: CovarianceReducer::new()
                .with_event_ndims(0)
                .with_moment(Moment::Variance)
                .with_name("variance_reducer"),
        }
    }

    pub fn with_ddof(self, ddof: usize) -> Self {
        Self {
            inner: self.inner.with_ddof(ddof),
        }
    }

    pub fn with_name<N: Into<String>>(self, name: N) -> Self {
        Self {
            inner: self.inner.with_name(name),
        }
    }

    pub fn with_transform<F>(self, transform: F) -> Self
    where
        F: Fn(&Observation) -> Observation + Send + Sync + 'static,
    {
        Self {
            inner: self.inner.with_transform(transform),
        }
    }

    pub fn ddof(&self) -> usize {
        self.inner.ddof()
    }

    pub fn parameters(&self) -> VarianceParams {
        VarianceParams { ddof: self.ddof() }
    }
}

impl Reducer for VarianceReducer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn initialize(&self, template: &Observation) -> Result<ReducerState, ReducerError> {
        self.inner.initialize(template)
    }

    fn one_step(
        &self,
        observation: &Observation,
        state: &ReducerState,
        axis: Option<usize>,
    ) -> Result<ReducerState, ReducerError> {
        self.inner.one_step(observation, state, axis)
    }

    fn finalize(&self, state: &ReducerState) -> Nested<ArrayD<f64>> {
        self.inner.finalize(state)
    }
}
