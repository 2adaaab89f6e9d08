//! Error types for fallible flow operations.
//!
//! Resolution itself never fails; these cover option decoding and
//! structural edits that cannot apply to the target node.

use thiserror::Error;

use crate::types::NodeId;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid node options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    #[error("invalid flow config: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    #[error("node {0} is not joined, it has no child list")]
    NotJoined(NodeId),

    #[error("node {0} has been released")]
    Released(NodeId),

    #[error("node {0} belongs to another flow")]
    ForeignNode(NodeId),
}

pub type FlowResult<T> = Result<T, FlowError>;
