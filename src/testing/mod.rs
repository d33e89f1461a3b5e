mod fixtures;

pub use fixtures::{chain_state, constant, stack};
