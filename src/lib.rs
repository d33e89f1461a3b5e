//! Single-pass running mean, variance and covariance over nested streams of
//! numeric arrays.
//!
//! Observations are [`Nested`](core::nested::Nested) trees of
//! `ndarray::ArrayD<f64>` leaves. A reducer builds an immutable
//! [`ReducerState`](reducers::ReducerState) from a template, absorbs samples
//! one at a time or in chunks, and projects the state to variances or
//! covariances whenever asked.

pub mod config;
pub mod core;
pub mod reducers;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
