// Shared transport configuration for building reqwest::Client instances.
//
// Holds TLS, timeout, and auth-token settings so every consumer builds its
// Placement client the same way.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Default Placement microversion. 1.20 is the floor for `POST` returning
/// the created provider; 1.26 also accepts zero-total inventories.
pub const DEFAULT_MICROVERSION: &str = "1.26";

const USER_AGENT: &str = concat!("cyborg/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode (api-level mirror of core's TlsVerification).
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed endpoints).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Keystone token sent as `X-Auth-Token`, if any.
    pub auth_token: Option<SecretString>,
    /// Value of the `OpenStack-API-Version: placement <v>` header.
    pub microversion: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            auth_token: None,
            microversion: DEFAULT_MICROVERSION.into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The auth token, when present, is injected as a sensitive default
    /// header so it never shows up in debug output.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.auth_token {
            let mut value =
                HeaderValue::from_str(token.expose_secret()).map_err(|e| Error::Authentication {
                    message: format!("invalid auth token header value: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert("X-Auth-Token", value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    pub fn with_microversion(mut self, microversion: impl Into<String>) -> Self {
        self.microversion = microversion.into();
        self
    }
}
