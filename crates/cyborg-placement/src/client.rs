// Hand-crafted async HTTP client for the OpenStack Placement API.
//
// Every request carries `OpenStack-API-Version: placement <microversion>`.
// Generation-guarded writes surface HTTP 409 `placement.concurrent_update`
// as `Error::GenerationConflict`; every other failure keeps its status.

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{
    CreateProviderRequest, ErrorEnvelope, ProviderInventories, ProviderTraits, ResourceProvider,
    ResourceProviderList,
};

/// Header carrying the requested microversion.
pub const API_VERSION_HEADER: &str = "OpenStack-API-Version";

/// Error code Placement attaches to stale-generation rejections.
pub const CONCURRENT_UPDATE_CODE: &str = "placement.concurrent_update";

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the Placement API.
///
/// Stateless apart from connection pooling: generation bookkeeping lives in
/// the caller's provider tree cache.
pub struct PlacementClient {
    http: reqwest::Client,
    base_url: Url,
    version_header: String,
}

impl PlacementClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from an endpoint URL and transport config.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http, &transport.microversion)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client, microversion: &str) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            version_header: format!("placement {microversion}"),
        })
    }

    /// Placement is often mounted under a path prefix (`/placement`), so
    /// the base URL must end in `/` for relative joins to keep it.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(API_VERSION_HEADER, &self.version_header)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.request(Method::GET, url).send().await?;
        self.handle_response(resp).await
    }

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self.request(Method::GET, url).query(params).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.request(Method::POST, url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self.request(Method::PUT, url).json(body).send().await?;
        self.handle_response(resp).await
    }

    /// Bodiless `PUT` used for idempotent "ensure exists" calls. Returns
    /// `true` when the resource was created (201), `false` when it
    /// already existed (204).
    async fn put_ensure(&self, path: &str) -> Result<bool, Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self.request(Method::PUT, url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(status == StatusCode::CREATED)
        } else {
            Err(self.parse_error(status, path, resp).await)
        }
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        let resp = self.request(Method::DELETE, url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, path, resp).await)
        }
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview = &body[..body.len().min(200)];
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            let resource = resp.url().path().to_owned();
            Err(self.parse_error(status, &resource, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resource: &str, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&raw) {
            Ok(envelope) => envelope.errors.into_iter().next().map_or_else(
                || (None, status.to_string()),
                |item| {
                    let message = item
                        .detail
                        .or(item.title)
                        .unwrap_or_else(|| status.to_string());
                    (item.code, message)
                },
            ),
            Err(_) if raw.is_empty() => (None, status.to_string()),
            Err(_) => (None, raw),
        };

        match status {
            StatusCode::NOT_FOUND => Error::NotFound {
                resource: resource.to_owned(),
            },
            StatusCode::CONFLICT if code.as_deref() == Some(CONCURRENT_UPDATE_CODE) => {
                Error::GenerationConflict {
                    resource: resource.to_owned(),
                    message,
                }
            }
            _ => Error::Placement {
                status: status.as_u16(),
                code,
                message,
            },
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Resource providers ───────────────────────────────────────────

    /// Fetch one provider. A 404 is reported as `Ok(None)`.
    pub async fn get_provider(&self, uuid: &Uuid) -> Result<Option<ResourceProvider>, Error> {
        match self.get(&format!("resource_providers/{uuid}")).await {
            Ok(rp) => Ok(Some(rp)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_providers_by_name(&self, name: &str) -> Result<Vec<ResourceProvider>, Error> {
        let list: ResourceProviderList = self
            .get_with_params("resource_providers", &[("name", name.to_owned())])
            .await?;
        Ok(list.resource_providers)
    }

    /// Every provider sharing a root with `uuid`, as Placement orders them.
    pub async fn list_providers_in_tree(&self, uuid: &Uuid) -> Result<Vec<ResourceProvider>, Error> {
        let list: ResourceProviderList = self
            .get_with_params("resource_providers", &[("in_tree", uuid.to_string())])
            .await?;
        Ok(list.resource_providers)
    }

    pub async fn create_provider(
        &self,
        request: &CreateProviderRequest,
    ) -> Result<ResourceProvider, Error> {
        self.post("resource_providers", request).await
    }

    /// Delete a provider. 409 becomes `Error::ProviderInUse`; 404 is
    /// returned as-is so callers can decide whether absence is benign.
    pub async fn delete_provider(&self, uuid: &Uuid) -> Result<(), Error> {
        match self.delete(&format!("resource_providers/{uuid}")).await {
            Err(Error::Placement {
                status: 409,
                message,
                ..
            }) => Err(Error::ProviderInUse {
                uuid: *uuid,
                message,
            }),
            other => other,
        }
    }

    // ── Inventories ──────────────────────────────────────────────────

    pub async fn get_inventories(&self, uuid: &Uuid) -> Result<ProviderInventories, Error> {
        self.get(&format!("resource_providers/{uuid}/inventories"))
            .await
    }

    /// Replace the full inventory set. The body's generation must match
    /// the provider's current generation.
    pub async fn put_inventories(
        &self,
        uuid: &Uuid,
        inventories: &ProviderInventories,
    ) -> Result<ProviderInventories, Error> {
        self.put(&format!("resource_providers/{uuid}/inventories"), inventories)
            .await
    }

    // ── Traits ───────────────────────────────────────────────────────

    pub async fn get_traits(&self, uuid: &Uuid) -> Result<ProviderTraits, Error> {
        self.get(&format!("resource_providers/{uuid}/traits")).await
    }

    /// Replace the provider's trait set. Generation-guarded.
    pub async fn put_traits(
        &self,
        uuid: &Uuid,
        traits: &ProviderTraits,
    ) -> Result<ProviderTraits, Error> {
        self.put(&format!("resource_providers/{uuid}/traits"), traits)
            .await
    }

    /// Create a custom trait if missing. Returns `true` if it was created.
    pub async fn ensure_trait(&self, name: &str) -> Result<bool, Error> {
        self.put_ensure(&format!("traits/{name}")).await
    }

    // ── Resource classes ─────────────────────────────────────────────

    /// Create a custom resource class if missing. Returns `true` if it was
    /// created.
    pub async fn ensure_resource_class(&self, name: &str) -> Result<bool, Error> {
        self.put_ensure(&format!("resource_classes/{name}")).await
    }
}
