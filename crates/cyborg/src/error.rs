//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use cyborg_config::ConfigError;
use cyborg_core::{CoreError, DiffError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Placement at {url}")]
    #[diagnostic(
        code(cyborg::connection_failed),
        help(
            "Check that the Placement service is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(cyborg::timeout),
        help("Increase the timeout with --timeout or check Placement responsiveness.")
    )]
    Timeout,

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(cyborg::not_found), help("{hint}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    #[error("Resource provider {uuid} is in use: {message}")]
    #[diagnostic(
        code(cyborg::provider_in_use),
        help("Remove its allocations or child providers first, or use --recursive.")
    )]
    ProviderInUse { uuid: String, message: String },

    #[error("Generation conflict on {resource}")]
    #[diagnostic(
        code(cyborg::generation_conflict),
        help(
            "Another writer updated the provider concurrently: {message}\n\
             Re-run the pass, or raise generation_conflict_retries in the profile."
        )
    )]
    GenerationConflict { resource: String, message: String },

    #[error("No resource class for device type {device_type}")]
    #[diagnostic(
        code(cyborg::resource_class),
        help("Give the deployable an `rc` attribute naming its resource class.")
    )]
    ResourceClassNotFound { device_type: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Placement API error: {message}")]
    #[diagnostic(code(cyborg::api_error), help("HTTP status: {status:?}, error code: {code:?}"))]
    ApiError {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("Inventory store error: {message}")]
    #[diagnostic(code(cyborg::store))]
    Store { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(cyborg::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cyborg::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(cyborg::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: cyborg config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Placement endpoint configured")]
    #[diagnostic(
        code(cyborg::no_config),
        help(
            "Create a profile with: cyborg config init\n\
             Or pass --placement-url / set CYBORG_PLACEMENT_URL.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(cyborg::config))]
    Config { message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(cyborg::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(cyborg::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ProviderInUse { .. } | Self::GenerationConflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::Timeout => CliError::Timeout,

            CoreError::ProviderNotFound { identifier } => CliError::NotFound {
                resource_type: "resource provider".into(),
                identifier,
                hint: "Run: cyborg providers list --host <HOST>".into(),
            },

            CoreError::RootProviderNotFound { host } => CliError::NotFound {
                resource_type: "compute node provider".into(),
                identifier: host,
                hint: "The compute service must register the host with Placement first.".into(),
            },

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                resource_type: entity_type,
                identifier,
                hint: "Run: cyborg devices list".into(),
            },

            CoreError::ResourceClassNotFound { device_type } => {
                CliError::ResourceClassNotFound { device_type }
            }

            CoreError::GenerationConflict { resource, message } => {
                CliError::GenerationConflict { resource, message }
            }

            CoreError::ProviderInUse { uuid, message } => CliError::ProviderInUse {
                uuid: uuid.to_string(),
                message,
            },

            CoreError::ProviderCreationFailed { name, reason } => CliError::ApiError {
                status: None,
                code: Some("provider_creation_failed".into()),
                message: format!("could not create provider {name}: {reason}"),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Diff(e) => CliError::Validation {
                field: "device tree".into(),
                reason: e.to_string(),
            },

            CoreError::Storage { message } => CliError::Store { message },

            CoreError::Api {
                message,
                code,
                status,
            } => CliError::ApiError {
                status,
                code,
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

impl From<DiffError> for CliError {
    fn from(err: DiffError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
