use anyhow::Result;
use schemars::{JsonSchema, Schema};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use strum::{EnumMessage, IntoEnumIterator};

/// Contract for a tagged configuration enum (`{"type": .., "params": ..}`).
pub trait Choice: Sized + Serialize + DeserializeOwned + JsonSchema {
    type Kind: Copy + Into<&'static str> + EnumMessage + IntoEnumIterator;

    /// JSON Schema for the whole tagged enum.
    fn schema() -> Schema;

    /// Default `params` JSON for a given kind.
    fn default_params(kind: Self::Kind) -> Value;

    /// Build the typed enum from kind + params.
    fn from_parts(kind: Self::Kind, params: Value) -> Result<Self> {
        let key: &'static str = kind.into();
        let v = json!({ "type": key, "params": params });
        Ok(serde_json::from_value(v)?)
    }
}
