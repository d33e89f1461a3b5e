use crate::config::Choice;
use crate::reducers::{CovarianceReducer, Reducer, VarianceReducer};
use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum_macros::{Display, EnumDiscriminants, EnumIter, EnumMessage, EnumString, IntoStaticStr};

fn default_ddof() -> usize {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CovarianceParams {
    #[serde(default)]
    #[schemars(
        title = "Event dimensions",
        description = "Trailing dimensions of each leaf treated as one correlated vector (None = the whole leaf)."
    )]
    pub event_ndims: Option<usize>,

    #[serde(default = "default_ddof")]
    #[schemars(
        title = "Delta degrees of freedom",
        description = "Subtracted from the sample count when normalizing."
    )]
    pub ddof: usize,
}

impl Default for CovarianceParams {
    fn default() -> Self {
        Self {
            event_ndims: None,
            ddof: default_ddof(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VarianceParams {
    #[serde(default = "default_ddof")]
    #[schemars(
        title = "Delta degrees of freedom",
        description = "Subtracted from the sample count when normalizing."
    )]
    pub ddof: usize,
}

impl Default for VarianceParams {
    fn default() -> Self {
        Self {
            ddof: default_ddof(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, EnumDiscriminants, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
#[strum_discriminants(name(ReducerKind))]
#[strum_discriminants(derive(EnumIter, EnumString, Display, IntoStaticStr, EnumMessage))]
#[strum_discriminants(strum(serialize_all = "kebab-case"))]
pub enum ReducerChoice {
    #[strum_discriminants(strum(
        message = "Covariance Reducer",
        detailed_message = "Running covariance over the event dimensions of every leaf."
    ))]
    Covariance(CovarianceParams),
    #[strum_discriminants(strum(
        message = "Variance Reducer",
        detailed_message = "Running elementwise variance of every leaf."
    ))]
    Variance(VarianceParams),
}

impl Default for ReducerChoice {
    fn default() -> Self {
        Self::Covariance(CovarianceParams::default())
    }
}

impl ReducerChoice {
    pub fn build(&self) -> Box<dyn Reducer> {
        match self {
            ReducerChoice::Covariance(p) => Box::new(CovarianceReducer::from(p.clone())),
            ReducerChoice::Variance(p) => Box::new(VarianceReducer::from(p.clone())),
        }
    }
}

impl Choice for ReducerChoice {
    type Kind = ReducerKind;

    fn schema() -> Schema {
        schema_for!(ReducerChoice)
    }

    fn default_params(kind: Self::Kind) -> Value {
        match kind {
            ReducerKind::Covariance => json!({ "event_ndims": null, "ddof": 0 }),
            ReducerKind::Variance => json!({ "ddof": 0 }),
        }
    }
}

impl From<CovarianceParams> for CovarianceReducer {
    fn from(p: CovarianceParams) -> Self {
        CovarianceReducer::new()
            .with_event_ndims(p.event_ndims)
            .with_ddof(p.ddof)
    }
}

impl From<VarianceParams> for VarianceReducer {
    fn from(p: VarianceParams) -> Self {
        VarianceReducer::new().with_ddof(p.ddof)
    }
}
