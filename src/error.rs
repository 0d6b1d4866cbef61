//! Error types for the matching core
//!
//! This module provides structured error types using thiserror so every
//! failure carries the identifiers an operator needs to act on it.

use crate::types::{UserId, VectorKind};
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for matching operations
#[derive(Error, Debug)]
pub enum MatchError {
    /// Text was empty after trimming. The generator never invents content.
    #[error("Cannot embed empty {kind} text. Provide at least one non-blank statement")]
    EmptyInput { kind: VectorKind },

    #[error("Embedding backend unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("{store} store unavailable during {operation}: {reason}")]
    StoreUnavailable {
        store: &'static str,
        operation: String,
        reason: String,
    },

    #[error("Ledger inconsistency between '{owner}' and '{matched}': {reason}")]
    InconsistentLedger {
        owner: UserId,
        matched: UserId,
        reason: String,
    },

    #[error("Delivery of '{key}' failed after {attempts} attempt(s): {reason}")]
    DeliveryFailure {
        key: String,
        attempts: u32,
        reason: String,
    },

    #[error("Invalid profile for user '{user_id}': {reason}")]
    InvalidProfile { user_id: UserId, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Run cancelled before {phase}")]
    Cancelled { phase: String },

    #[error("Batch '{batch_id}' not started: another batch run is in progress")]
    BatchInProgress { batch_id: String },

    #[error("User '{user_id}' is not registered")]
    UnknownUser { user_id: UserId },

    #[error("Worker task failed during {phase}: {reason}")]
    Worker { phase: String, reason: String },

    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Failed to persist state to '{path}': {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error(transparent)]
    Vector(#[from] VectorError),
}

impl MatchError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::EmptyInput { .. } => "EMPTY_INPUT",
            Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::InconsistentLedger { .. } => "INCONSISTENT_LEDGER",
            Self::DeliveryFailure { .. } => "DELIVERY_FAILURE",
            Self::InvalidProfile { .. } => "INVALID_PROFILE",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Cancelled { .. } => "CANCELLED",
            Self::BatchInProgress { .. } => "BATCH_IN_PROGRESS",
            Self::UnknownUser { .. } => "UNKNOWN_USER",
            Self::Worker { .. } => "WORKER_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::EmptyInput { .. } | Self::InvalidProfile { .. } => vec![
                "Register at least one requirements answer and one offerings answer",
                "Answers are routed by prompt keywords; set an explicit kind if routing misses",
            ],
            Self::EmbeddingUnavailable { .. } | Self::Timeout { .. } => vec![
                "The user stays dirty and will be retried by the next batch run",
                "Check that the embedding model is downloaded and reachable",
            ],
            Self::StoreUnavailable { .. } => vec![
                "The run was aborted before committing; dirty flags are unchanged",
                "Restore the store and run the batch again",
            ],
            Self::InconsistentLedger { .. } => vec![
                "The missing side was rebuilt from current vectors",
                "No action needed unless this repeats for the same pair",
            ],
            Self::DeliveryFailure { .. } => vec![
                "Check notification.backend_url and notification.api_key",
                "Undelivered pairs are announced again by a later run",
            ],
            Self::Config { .. } => vec![
                "Run 'reciprocity config' to inspect the effective settings",
                "Run 'reciprocity init --force' to regenerate the settings file",
            ],
            Self::Persistence { .. } => vec![
                "Check disk space and permissions for the state directory",
            ],
            Self::UnknownUser { .. } => vec!["Register the user before querying or onboarding"],
            Self::BatchInProgress { .. } => vec![
                "Wait for the running batch to finish; it covers the same dirty users",
            ],
            _ => vec![],
        }
    }

    /// Failures of shared infrastructure. These abort a batch run at the
    /// phase boundary instead of being isolated to one user.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Persistence { .. })
    }

    /// Errors a retry loop may try again within its budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable { .. } | Self::Timeout { .. } | Self::DeliveryFailure { .. }
        )
    }

    pub(crate) fn store(store: &'static str, operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store,
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for matching operations
pub type MatchResult<T> = Result<T, MatchError>;
