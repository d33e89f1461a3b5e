use crate::config::ReducerChoice;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn parse_reducer_choice(text: &str) -> Result<ReducerChoice> {
    serde_json::from_str(text).context("invalid reducer configuration")
}

/// Reads a JSON reducer configuration such as
/// `{"type": "covariance", "params": {"event_ndims": 1, "ddof": 0}}`.
pub fn load_reducer_choice<P: AsRef<Path>>(path: P) -> Result<ReducerChoice> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read reducer config '{}'", path.display()))?;
    parse_reducer_choice(&text).with_context(|| format!("in '{}'", path.display()))
}
