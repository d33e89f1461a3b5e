mod choice;
mod loader;
mod reducer_choice;

pub use choice::Choice;
pub use loader::{load_reducer_choice, parse_reducer_choice};
pub use reducer_choice::{CovarianceParams, ReducerChoice, ReducerKind, VarianceParams};
