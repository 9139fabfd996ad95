// ── Core error types ──
//
// The reconciliation error taxonomy. Callers see not-found, conflict,
// validation, and transport classes rather than raw HTTP statuses; the
// `From<cyborg_placement::Error>` impl does the translation.

use thiserror::Error;
use uuid::Uuid;

use crate::diff::DiffError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach Placement at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Placement request timed out")]
    Timeout,

    // ── Placement errors ─────────────────────────────────────────────
    #[error("Resource provider not found: {identifier}")]
    ProviderNotFound { identifier: String },

    #[error("Root resource provider for host '{host}' not found")]
    RootProviderNotFound { host: String },

    #[error("No resource class for device type {device_type}")]
    ResourceClassNotFound { device_type: String },

    #[error("Generation conflict on {resource}: {message}")]
    GenerationConflict { resource: String, message: String },

    #[error("Resource provider {uuid} is in use: {message}")]
    ProviderInUse { uuid: Uuid, message: String },

    #[error("Failed to create resource provider '{name}': {reason}")]
    ProviderCreationFailed { name: String, reason: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error(transparent)]
    Diff(#[from] DiffError),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Placement error code (e.g. "placement.inventory.inuse").
        code: Option<String>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Generation mismatch or provider still in use.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::GenerationConflict { .. } | Self::ProviderInUse { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::ProviderNotFound { .. } | Self::RootProviderNotFound { .. }
        )
    }

    /// Failures that a later pass may heal by re-diffing.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout => true,
            Self::Api { status, .. } => status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<cyborg_placement::Error> for CoreError {
    fn from(err: cyborg_placement::Error) -> Self {
        use cyborg_placement::Error as Api;

        match err {
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Authentication { message } => CoreError::Config { message },
            Api::NotFound { resource } => CoreError::ProviderNotFound {
                identifier: resource,
            },
            Api::GenerationConflict { resource, message } => {
                CoreError::GenerationConflict { resource, message }
            }
            Api::ProviderInUse { uuid, message } => CoreError::ProviderInUse { uuid, message },
            Api::Placement {
                status,
                code,
                message,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
