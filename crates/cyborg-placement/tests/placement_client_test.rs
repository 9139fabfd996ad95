#![allow(clippy::unwrap_used)]
// Integration tests for `PlacementClient` using wiremock.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cyborg_placement::{
    CreateProviderRequest, Error, InventoryRecord, PlacementClient, ProviderInventories,
    ProviderTraits,
};

// ── Helpers ─────────────────────────────────────────────────────────

const RP: &str = "6f4c3e5e-0c76-4c2b-9d53-6a0e4b7f2a10";

async fn setup() -> (MockServer, PlacementClient) {
    let server = MockServer::start().await;
    let client =
        PlacementClient::from_reqwest(&format!("{}/placement", server.uri()), reqwest::Client::new(), "1.26")
            .unwrap();
    (server, client)
}

fn rp_uuid() -> Uuid {
    Uuid::parse_str(RP).unwrap()
}

fn provider_json(generation: u64) -> serde_json::Value {
    json!({
        "uuid": RP,
        "name": "compute-1",
        "generation": generation,
        "parent_provider_uuid": null,
        "root_provider_uuid": RP
    })
}

// ── Providers ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_provider_sends_microversion() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/placement/resource_providers/{RP}")))
        .and(header("OpenStack-API-Version", "placement 1.26"))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_json(3)))
        .mount(&server)
        .await;

    let rp = client.get_provider(&rp_uuid()).await.unwrap().unwrap();
    assert_eq!(rp.name, "compute-1");
    assert_eq!(rp.generation, 3);
    assert_eq!(rp.root_provider_uuid, Some(rp_uuid()));
}

#[tokio::test]
async fn test_get_provider_not_found_is_none() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/placement/resource_providers/{RP}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"status": 404, "title": "Not Found", "detail": "No resource provider"}]
        })))
        .mount(&server)
        .await;

    assert!(client.get_provider(&rp_uuid()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_providers_in_tree() {
    let (server, client) = setup().await;
    let child = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/placement/resource_providers"))
        .and(query_param("in_tree", RP))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource_providers": [
                provider_json(1),
                {
                    "uuid": child,
                    "name": "FPGA_dev",
                    "generation": 0,
                    "parent_provider_uuid": RP,
                    "root_provider_uuid": RP
                }
            ]
        })))
        .mount(&server)
        .await;

    let tree = client.list_providers_in_tree(&rp_uuid()).await.unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[1].uuid, child);
    assert_eq!(tree[1].parent_provider_uuid, Some(rp_uuid()));
}

#[tokio::test]
async fn test_create_provider_posts_parent() {
    let (server, client) = setup().await;
    let parent = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/placement/resource_providers"))
        .and(body_json(json!({
            "uuid": RP,
            "name": "compute-1",
            "parent_provider_uuid": parent
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_json(0)))
        .mount(&server)
        .await;

    let created = client
        .create_provider(&CreateProviderRequest {
            uuid: rp_uuid(),
            name: "compute-1".into(),
            parent_provider_uuid: Some(parent),
        })
        .await
        .unwrap();
    assert_eq!(created.generation, 0);
}

#[tokio::test]
async fn test_delete_provider_in_use() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(format!("/placement/resource_providers/{RP}")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errors": [{"status": 409, "title": "Conflict", "detail": "Unable to delete resource provider: has allocations"}]
        })))
        .mount(&server)
        .await;

    let result = client.delete_provider(&rp_uuid()).await;
    assert!(
        matches!(result, Err(Error::ProviderInUse { .. })),
        "expected ProviderInUse, got: {result:?}"
    );
}

#[tokio::test]
async fn test_delete_provider_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(format!("/placement/resource_providers/{RP}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.delete_provider(&rp_uuid()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_conflict());
}

// ── Inventories ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_put_inventories_stale_generation_is_conflict() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/placement/resource_providers/{RP}/inventories")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errors": [{
                "status": 409,
                "title": "Conflict",
                "detail": "resource provider generation conflict",
                "code": "placement.concurrent_update"
            }]
        })))
        .mount(&server)
        .await;

    let mut inventories = BTreeMap::new();
    inventories.insert(
        "FPGA".to_owned(),
        InventoryRecord {
            total: 2,
            reserved: 0,
            min_unit: 1,
            max_unit: 1,
            step_size: 1,
            allocation_ratio: 1.0,
        },
    );
    let body = ProviderInventories {
        resource_provider_generation: 3,
        inventories,
    };

    let err = client.put_inventories(&rp_uuid(), &body).await.unwrap_err();
    assert!(err.is_generation_conflict(), "got: {err:?}");
    assert_eq!(err.api_error_code(), Some("placement.concurrent_update"));
}

#[tokio::test]
async fn test_get_inventories_applies_defaults() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/placement/resource_providers/{RP}/inventories")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource_provider_generation": 5,
            "inventories": { "FPGA": { "total": 4 } }
        })))
        .mount(&server)
        .await;

    let inv = client.get_inventories(&rp_uuid()).await.unwrap();
    assert_eq!(inv.resource_provider_generation, 5);
    let fpga = &inv.inventories["FPGA"];
    assert_eq!(fpga.total, 4);
    assert_eq!(fpga.max_unit, 1);
    assert!((fpga.allocation_ratio - 1.0).abs() < f64::EPSILON);
}

// ── Traits & resource classes ───────────────────────────────────────

#[tokio::test]
async fn test_put_traits_returns_new_generation() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/placement/resource_providers/{RP}/traits")))
        .and(body_json(json!({
            "resource_provider_generation": 1,
            "traits": ["CUSTOM_FPGA_INTEL"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource_provider_generation": 2,
            "traits": ["CUSTOM_FPGA_INTEL"]
        })))
        .mount(&server)
        .await;

    let updated = client
        .put_traits(
            &rp_uuid(),
            &ProviderTraits {
                resource_provider_generation: 1,
                traits: vec!["CUSTOM_FPGA_INTEL".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.resource_provider_generation, 2);
}

#[tokio::test]
async fn test_ensure_trait_created_vs_existing() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/placement/traits/CUSTOM_NEW"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/placement/traits/CUSTOM_OLD"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert!(client.ensure_trait("CUSTOM_NEW").await.unwrap());
    assert!(!client.ensure_trait("CUSTOM_OLD").await.unwrap());
}

#[tokio::test]
async fn test_ensure_resource_class_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/placement/resource_classes/CUSTOM_ACCEL"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client.ensure_resource_class("CUSTOM_ACCEL").await.unwrap_err();
    assert!(err.is_transient());
    assert!(
        matches!(err, Error::Placement { status: 503, ref message, .. } if message == "unavailable"),
        "got: {err:?}"
    );
}
