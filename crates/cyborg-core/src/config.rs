// ── Runtime conductor configuration ──
//
// Describes how to reach Placement and how hard to fight for a provider
// generation. Never touches disk: the config crate or the CLI builds a
// `ConductorConfig` and hands it in.

use std::time::Duration;

use cyborg_placement::{DEFAULT_MICROVERSION, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (lab deployments with self-signed endpoints).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Everything the conductor needs to talk to Placement.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Placement endpoint, including any path prefix
    /// (e.g. `http://controller/placement`).
    pub placement_url: Url,
    /// Keystone token, if the endpoint requires one.
    pub auth_token: Option<SecretString>,
    pub tls: TlsVerification,
    pub timeout: Duration,
    /// Placement microversion sent with every request.
    pub microversion: String,
    /// How many times a generation-guarded write is refreshed and retried
    /// after a concurrent update before the conflict is surfaced.
    pub generation_conflict_retries: u32,
}

impl ConductorConfig {
    pub fn new(placement_url: Url) -> Self {
        Self {
            placement_url,
            auth_token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            microversion: DEFAULT_MICROVERSION.into(),
            generation_conflict_retries: 1,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            auth_token: self.auth_token.clone(),
            microversion: self.microversion.clone(),
        }
    }
}
