//! Core types shared by the SmartPick retrieval crates.
//!
//! This crate provides the error type every store, index and cache returns,
//! plus the TOML configuration the CLI and embedding applications load.
//!
//! # Main types
//!
//! - [`SmartpickError`] — Unified error enum for all SmartPick subsystems.
//! - [`SmartpickResult`] — Convenience alias for `Result<T, SmartpickError>`.
//! - [`SmartpickConfig`] — Workspace configuration (store, cache, retrieval).

/// TOML configuration for stores, cache and retrieval.
pub mod config;

pub use config::{CacheConfig, RetrievalConfig, SmartpickConfig, StoreConfig};

// --- Error types ---

/// Top-level error type for the SmartPick retrieval core.
///
/// Expected "nothing found" outcomes (an empty scope, a cache miss) are never
/// errors; they are returned as sentinel values by the operation that
/// produced them. Every variant here is fatal to the call that raised it.
#[derive(Debug, thiserror::Error)]
pub enum SmartpickError {
    /// Misconfiguration: vector dimension mismatch, a malformed or corrupt
    /// backing file, or an invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// An operation was called out of protocol order, e.g. retrieving
    /// without a scope or touching a closed store.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Caller-supplied records are malformed (column length mismatch,
    /// document without a vector).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The embedding provider failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SmartpickError`].
pub type SmartpickResult<T> = Result<T, SmartpickError>;

impl SmartpickError {
    /// Returns `true` for configuration errors (dimension mismatch, corrupt file).
    pub fn is_config(&self) -> bool {
        matches!(self, SmartpickError::Config(_))
    }

    /// Returns `true` for protocol-order violations.
    pub fn is_precondition(&self) -> bool {
        matches!(self, SmartpickError::Precondition(_))
    }
}
