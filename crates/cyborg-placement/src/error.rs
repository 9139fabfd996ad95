use thiserror::Error;

/// Top-level error type for the `cyborg-placement` crate.
///
/// Separates the three outcomes callers must treat differently: the
/// resource is absent, a concurrent writer won the generation race, or the
/// service failed for some other reason. `cyborg-core` maps these into its
/// reconciliation error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid auth token header value.
    #[error("Authentication setup failed: {message}")]
    Authentication { message: String },

    // ── Placement semantics ─────────────────────────────────────────
    /// The addressed resource does not exist (HTTP 404).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The provider generation submitted with a write is stale
    /// (HTTP 409, `placement.concurrent_update`).
    #[error("Generation conflict on {resource}: {message}")]
    GenerationConflict { resource: String, message: String },

    /// The provider still has allocations or child providers and
    /// cannot be deleted.
    #[error("Resource provider {uuid} is in use: {message}")]
    ProviderInUse { uuid: uuid::Uuid, message: String },

    /// Any other non-success response from the Placement API.
    #[error("Placement API error (HTTP {status}): {message}")]
    Placement {
        status: u16,
        code: Option<String>,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the resource was absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Placement { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// Returns `true` if a stale provider generation was rejected.
    pub fn is_generation_conflict(&self) -> bool {
        matches!(self, Self::GenerationConflict { .. })
    }

    /// Returns `true` for any HTTP 409 outcome, generation-related or not.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::GenerationConflict { .. }
                | Self::ProviderInUse { .. }
                | Self::Placement { status: 409, .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next reconciliation pass.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Placement { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract the Placement error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Placement { code, .. } => code.as_deref(),
            Self::GenerationConflict { .. } => Some(crate::CONCURRENT_UPDATE_CODE),
            _ => None,
        }
    }
}
