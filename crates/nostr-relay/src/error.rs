//! Flat error taxonomy for the relay crate: transport and protocol
//! failures, mirroring `nostr_core::Error`'s single-enum shape.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("operation timed out")]
    Timeout,
    #[error("relay error: {0}")]
    RelayError(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(String),
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
    #[error(transparent)]
    Core(#[from] nostr_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
