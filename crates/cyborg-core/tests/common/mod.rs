#![allow(clippy::unwrap_used, dead_code)]
// A stateful fake Placement service for wiremock.
//
// Tracks providers, generations, inventories and traits, and rejects stale
// generations with `placement.concurrent_update` the way Placement does.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use cyborg_core::{ConductorConfig, Conductor, MemoryStore};
use cyborg_placement::PlacementClient;

#[derive(Debug, Clone)]
pub struct FakeProvider {
    pub uuid: Uuid,
    pub name: String,
    pub generation: u64,
    pub parent: Option<Uuid>,
    pub root: Uuid,
    pub inventories: BTreeMap<String, Value>,
    pub traits: BTreeSet<String>,
    pub in_use: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub providers: BTreeMap<Uuid, FakeProvider>,
    pub traits: BTreeSet<String>,
    pub resource_classes: BTreeSet<String>,
}

#[derive(Clone, Default)]
pub struct FakePlacement {
    state: Arc<Mutex<FakeState>>,
}

fn error(status: u16, detail: &str, code: Option<&str>) -> ResponseTemplate {
    let mut item = json!({"status": status, "title": "error", "detail": detail});
    if let Some(code) = code {
        item["code"] = json!(code);
    }
    ResponseTemplate::new(status).set_body_json(json!({"errors": [item]}))
}

fn provider_json(p: &FakeProvider) -> Value {
    json!({
        "uuid": p.uuid,
        "name": p.name,
        "generation": p.generation,
        "parent_provider_uuid": p.parent,
        "root_provider_uuid": p.root,
    })
}

impl FakePlacement {
    /// Start a mock server mounted at `/placement` backed by a fresh fake.
    pub async fn start() -> (MockServer, Self) {
        let server = MockServer::start().await;
        let fake = Self::default();
        Mock::given(wiremock::matchers::path_regex("^/placement/.*"))
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        (server, fake)
    }

    pub fn endpoint(server: &MockServer) -> String {
        format!("{}/placement", server.uri())
    }

    pub fn client(server: &MockServer) -> PlacementClient {
        PlacementClient::from_reqwest(&Self::endpoint(server), reqwest::Client::new(), "1.26").unwrap()
    }

    pub fn conductor(server: &MockServer, store: Arc<MemoryStore>) -> Conductor {
        let config = ConductorConfig::new(Self::endpoint(server).parse().unwrap());
        Conductor::with_client(config, store, Self::client(server))
    }

    // ── State helpers ────────────────────────────────────────────────

    pub fn add_root(&self, name: &str) -> Uuid {
        let uuid = Uuid::new_v4();
        self.state.lock().unwrap().providers.insert(
            uuid,
            FakeProvider {
                uuid,
                name: name.into(),
                generation: 0,
                parent: None,
                root: uuid,
                inventories: BTreeMap::new(),
                traits: BTreeSet::new(),
                in_use: false,
            },
        );
        uuid
    }

    pub fn provider(&self, uuid: &Uuid) -> Option<FakeProvider> {
        self.state.lock().unwrap().providers.get(uuid).cloned()
    }

    pub fn provider_count(&self) -> usize {
        self.state.lock().unwrap().providers.len()
    }

    /// Simulate a concurrent writer touching the provider.
    pub fn bump_generation(&self, uuid: &Uuid) {
        if let Some(p) = self.state.lock().unwrap().providers.get_mut(uuid) {
            p.generation += 1;
        }
    }

    pub fn set_in_use(&self, uuid: &Uuid) {
        if let Some(p) = self.state.lock().unwrap().providers.get_mut(uuid) {
            p.in_use = true;
        }
    }

    pub fn release(&self, uuid: &Uuid) {
        if let Some(p) = self.state.lock().unwrap().providers.get_mut(uuid) {
            p.in_use = false;
        }
    }

    pub fn inventory_total(&self, uuid: &Uuid, class: &str) -> Option<u64> {
        self.provider(uuid)?.inventories.get(class)?["total"].as_u64()
    }

    // ── Routing ──────────────────────────────────────────────────────

    fn route(&self, req: &Request) -> ResponseTemplate {
        let path = req.url.path().trim_start_matches("/placement/").to_owned();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let method = req.method.as_str();
        let query: BTreeMap<String, String> = req.url.query_pairs().into_owned().collect();
        let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
        let mut state = self.state.lock().unwrap();

        match (method, segments.as_slice()) {
            ("GET", ["resource_providers"]) => list(&state, &query),
            ("POST", ["resource_providers"]) => create(&mut state, &body),
            ("GET", ["resource_providers", id]) => match lookup(&state, id) {
                Some(p) => ResponseTemplate::new(200).set_body_json(provider_json(p)),
                None => error(404, "No resource provider", None),
            },
            ("DELETE", ["resource_providers", id]) => delete(&mut state, id),
            ("GET", ["resource_providers", id, "inventories"]) => match lookup(&state, id) {
                Some(p) => ResponseTemplate::new(200).set_body_json(json!({
                    "resource_provider_generation": p.generation,
                    "inventories": p.inventories,
                })),
                None => error(404, "No resource provider", None),
            },
            ("PUT", ["resource_providers", id, "inventories"]) => put_inventories(&mut state, id, &body),
            ("GET", ["resource_providers", id, "traits"]) => match lookup(&state, id) {
                Some(p) => ResponseTemplate::new(200).set_body_json(json!({
                    "resource_provider_generation": p.generation,
                    "traits": p.traits,
                })),
                None => error(404, "No resource provider", None),
            },
            ("PUT", ["resource_providers", id, "traits"]) => put_traits(&mut state, id, &body),
            ("PUT", ["traits", name]) => {
                if state.traits.insert((*name).to_owned()) {
                    ResponseTemplate::new(201)
                } else {
                    ResponseTemplate::new(204)
                }
            }
            ("PUT", ["resource_classes", name]) => {
                if state.resource_classes.insert((*name).to_owned()) {
                    ResponseTemplate::new(201)
                } else {
                    ResponseTemplate::new(204)
                }
            }
            _ => error(405, "unsupported route", None),
        }
    }
}

impl Respond for FakePlacement {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.route(request)
    }
}

fn lookup<'a>(state: &'a FakeState, id: &str) -> Option<&'a FakeProvider> {
    let uuid = Uuid::parse_str(id).ok()?;
    state.providers.get(&uuid)
}

fn list(state: &FakeState, query: &BTreeMap<String, String>) -> ResponseTemplate {
    let matches: Vec<Value> = if let Some(in_tree) = query.get("in_tree") {
        match lookup(state, in_tree) {
            // Deliberately unordered relative to the hierarchy.
            Some(anchor) => state
                .providers
                .values()
                .filter(|p| p.root == anchor.root)
                .map(provider_json)
                .collect(),
            None => Vec::new(),
        }
    } else if let Some(name) = query.get("name") {
        state
            .providers
            .values()
            .filter(|p| &p.name == name)
            .map(provider_json)
            .collect()
    } else {
        state.providers.values().map(provider_json).collect()
    };
    ResponseTemplate::new(200).set_body_json(json!({"resource_providers": matches}))
}

fn create(state: &mut FakeState, body: &Value) -> ResponseTemplate {
    let uuid = Uuid::parse_str(body["uuid"].as_str().unwrap_or_default()).unwrap();
    let name = body["name"].as_str().unwrap_or_default().to_owned();
    if state.providers.contains_key(&uuid) || state.providers.values().any(|p| p.name == name) {
        return error(409, "Conflicting resource provider already exists", None);
    }
    let parent = body["parent_provider_uuid"]
        .as_str()
        .map(|s| Uuid::parse_str(s).unwrap());
    let root = match parent {
        Some(parent) => match state.providers.get(&parent) {
            Some(p) => p.root,
            None => return error(400, "parent provider does not exist", None),
        },
        None => uuid,
    };
    let provider = FakeProvider {
        uuid,
        name,
        generation: 0,
        parent,
        root,
        inventories: BTreeMap::new(),
        traits: BTreeSet::new(),
        in_use: false,
    };
    let response = provider_json(&provider);
    state.providers.insert(uuid, provider);
    ResponseTemplate::new(200).set_body_json(response)
}

fn delete(state: &mut FakeState, id: &str) -> ResponseTemplate {
    let Some(provider) = lookup(state, id).cloned() else {
        return error(404, "No resource provider", None);
    };
    if provider.in_use || state.providers.values().any(|p| p.parent == Some(provider.uuid)) {
        return error(409, "Unable to delete resource provider: in use", None);
    }
    state.providers.remove(&provider.uuid);
    ResponseTemplate::new(204)
}

fn check_generation(provider: &FakeProvider, body: &Value) -> Option<ResponseTemplate> {
    (body["resource_provider_generation"].as_u64() != Some(provider.generation)).then(|| {
        error(
            409,
            "resource provider generation conflict",
            Some("placement.concurrent_update"),
        )
    })
}

fn put_inventories(state: &mut FakeState, id: &str, body: &Value) -> ResponseTemplate {
    let Some(uuid) = lookup(state, id).map(|p| p.uuid) else {
        return error(404, "No resource provider", None);
    };
    let provider = state.providers.get_mut(&uuid).unwrap();
    if let Some(conflict) = check_generation(provider, body) {
        return conflict;
    }
    provider.inventories = body["inventories"]
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    provider.generation += 1;
    ResponseTemplate::new(200).set_body_json(json!({
        "resource_provider_generation": provider.generation,
        "inventories": provider.inventories,
    }))
}

fn put_traits(state: &mut FakeState, id: &str, body: &Value) -> ResponseTemplate {
    let Some(uuid) = lookup(state, id).map(|p| p.uuid) else {
        return error(404, "No resource provider", None);
    };
    let wanted: BTreeSet<String> = body["traits"]
        .as_array()
        .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_owned)).collect())
        .unwrap_or_default();
    if let Some(unknown) = wanted.iter().find(|t| !state.traits.contains(*t)) {
        return error(400, &format!("No such trait(s): {unknown}"), None);
    }
    let provider = state.providers.get_mut(&uuid).unwrap();
    if let Some(conflict) = check_generation(provider, body) {
        return conflict;
    }
    provider.traits = wanted;
    provider.generation += 1;
    ResponseTemplate::new(200).set_body_json(json!({
        "resource_provider_generation": provider.generation,
        "traits": provider.traits,
    }))
}

/// Count requests received by `server` with the given method.
pub async fn count_requests(server: &MockServer, method: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == method)
        .count()
}

// ── Device tree builders ─────────────────────────────────────────────

pub fn attr(key: &str, value: &str) -> cyborg_core::DriverAttribute {
    cyborg_core::DriverAttribute {
        key: key.into(),
        value: value.into(),
    }
}

pub fn vf(info: &str) -> cyborg_core::DriverAttachHandle {
    cyborg_core::DriverAttachHandle {
        attach_type: "PCI".into(),
        attach_info: info.into(),
        in_use: false,
    }
}

pub fn deployable(
    name: &str,
    num_accelerators: u32,
    attributes: Vec<cyborg_core::DriverAttribute>,
    attach_handles: Vec<cyborg_core::DriverAttachHandle>,
) -> cyborg_core::DriverDeployable {
    cyborg_core::DriverDeployable {
        name: name.into(),
        num_accelerators,
        attributes,
        attach_handles,
    }
}

pub fn device(
    device_type: cyborg_core::DeviceType,
    cpid: &str,
    deployables: Vec<cyborg_core::DriverDeployable>,
) -> cyborg_core::DriverDevice {
    cyborg_core::DriverDevice {
        fields: cyborg_core::DeviceFields {
            device_type,
            vendor: "8086".into(),
            model: "PAC Arria10".into(),
            std_board_info: String::new(),
            vendor_board_info: String::new(),
        },
        controlpath_id: cyborg_core::DriverControlpathId {
            cpid_type: "PCI".into(),
            cpid_info: cpid.into(),
        },
        deployables,
    }
}
