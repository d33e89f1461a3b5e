pub mod error;
pub mod layout;
pub mod nested;
pub mod running_covariance;
