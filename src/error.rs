//! Error types shared by every reader in the crate.

use alloy::{primitives::Bytes, transports::TransportError};

use crate::chain::BlockTag;

/// Convenience alias used across the SDK.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by chain readers, the block resolver and the log chunker.
///
/// Transport failures are propagated untouched: retry policy belongs to the
/// provider stack, not to this crate.
#[derive(Debug, derive_more::Display, derive_more::IsVariant)]
pub enum Error {
    /// The caller passed a value the operation cannot work with.
    #[display("invalid argument: {_0}")]
    InvalidArgument(String),
    /// The requested block does not exist (yet).
    #[display("block {_0} not found")]
    NotFound(BlockTag),
    /// Transport or provider failure.
    #[display("rpc error: {_0}")]
    Rpc(TransportError),
    /// Contract execution reverted.
    #[display("execution reverted: {}", const_hex::encode_prefixed(_0))]
    Revert(Bytes),
    /// Any other contract binding failure (decoding, empty return data, ...).
    #[display("contract error: {_0}")]
    Contract(alloy::contract::Error),
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(err) => Some(err),
            Self::Contract(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        // providers report reverts of eth_call as JSON-RPC errors carrying the payload
        match err.as_error_resp().and_then(|resp| resp.as_revert_data()) {
            Some(data) => Self::Revert(data),
            None => Self::Rpc(err),
        }
    }
}

impl From<alloy::contract::Error> for Error {
    fn from(err: alloy::contract::Error) -> Self {
        if let Some(data) = err.as_revert_data() {
            return Self::Revert(data);
        }
        match err {
            alloy::contract::Error::TransportError(err) => Self::Rpc(err),
            other => Self::Contract(other),
        }
    }
}
