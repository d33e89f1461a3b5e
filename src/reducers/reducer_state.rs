use crate::core::nested::Nested;
use crate::core::running_covariance::RunningCovariance;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Accumulated statistics for every leaf of the template.
///
/// Immutable once built; reducers return a fresh value from each step, so a
/// state can be shared or branched freely. Serializable through serde for
/// callers that checkpoint long runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerState {
    running: Nested<RunningCovariance>,
}

impl ReducerState {
    pub(crate) fn new(running: Nested<RunningCovariance>) -> Self {
        Self { running }
    }

    pub fn running(&self) -> &Nested<RunningCovariance> {
        &self.running
    }

    pub fn num_samples(&self) -> Nested<f64> {
        self.running.map(RunningCovariance::num_samples)
    }

    pub fn mean(&self) -> Nested<ArrayD<f64>> {
        self.running.map(|acc| acc.mean().clone())
    }

    pub fn sum_sq_dev(&self) -> Nested<ArrayD<f64>> {
        self.running.map(|acc| acc.sum_sq_dev().clone())
    }
}
