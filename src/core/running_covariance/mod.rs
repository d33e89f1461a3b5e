mod chunk;
mod running_covariance;

pub use running_covariance::{Moment, RunningCovariance};
