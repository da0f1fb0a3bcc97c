//! Error types for the notification engine.

use crate::types::OwnerId;
use thiserror::Error;

/// A bulk read or subscription attempt against the backend failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Backend unavailable")]
    Unavailable,
}

/// A dismiss or clear call against the backend failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

/// Decoding an opaque metadata payload failed (consumer side only).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Payload is raw bytes, not a structured encoding")]
    NotStructured,
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            MetadataError::Deserialization(e.to_string())
        } else {
            MetadataError::Serialization(e.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for MetadataError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MetadataError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MetadataError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        MetadataError::Deserialization(e.to_string())
    }
}

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Mutation failed: {0}")]
    Mutation(#[from] MutationError),

    /// Delete event without identity. Handled internally by a resync and
    /// never returned to callers.
    #[error("Delete event arrived without a record id")]
    DegradedEvent,

    #[error("Owner mismatch: session is {active:?}, request was for {requested}")]
    OwnerMismatch {
        active: Option<OwnerId>,
        requested: OwnerId,
    },

    #[error("No owner assigned")]
    NoOwner,
}

impl SyncError {
    /// True when the backend rejected or dropped a dismiss/clear request.
    pub fn is_mutation_failure(&self) -> bool {
        matches!(self, SyncError::Mutation(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
