mod covariance_reducer;
mod reducer;
mod reducer_state;
mod variance_reducer;

pub use covariance_reducer::{CovarianceReducer, ObservationTransform};
pub use reducer::{Observation, Reducer};
pub use reducer_state::ReducerState;
pub use variance_reducer::VarianceReducer;
