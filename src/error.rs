use thiserror::Error;

use crate::client::transport::TransportError;

/// Failures surfaced to the host across the connector contract.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("CA endpoint unreachable: {0}")]
    Unavailable(#[from] TransportError),
    #[error("connector configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Operation(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl ConnectorError {
    pub fn operation(msg: impl Into<String>) -> Self {
        ConnectorError::Operation(msg.into())
    }
}
