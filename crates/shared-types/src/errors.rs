//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors raised by key-value store adapters and the store codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    Io { message: String },

    /// Stored bytes could not be decoded into the expected entity.
    #[error("KV store corruption at key {key}: {message}")]
    Corruption { key: String, message: String },

    /// Entity could not be encoded for storage.
    #[error("Failed to encode entity: {message}")]
    Encoding { message: String },
}

/// Errors parsing a [`crate::Digest`] from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DigestParseError {
    /// Not valid hex.
    #[error("Invalid hex digest: {message}")]
    InvalidHex { message: String },

    /// Wrong number of bytes.
    #[error("Digest must be 32 bytes, got {got}")]
    InvalidLength { got: usize },
}
