#![allow(clippy::unwrap_used)]
// End-to-end reconciliation passes: memory store plus fake Placement.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{FakePlacement, attr, count_requests, deployable, device, vf};
use cyborg_core::model::{NewDeployable, NewDevice};
use cyborg_core::{
    CoreError, DeviceType, DriverDevice, InventoryStore, MemoryStore, device_provider_name,
    load_host_tree, provider_uuid,
};

const HOST: &str = "compute-1";
const CPID: &str = "0000:5e:00.0";

fn fpga_card() -> Vec<DriverDevice> {
    vec![device(
        DeviceType::Fpga,
        CPID,
        vec![
            deployable(
                "pac_5e_vf0",
                1,
                vec![attr("trait0", "CUSTOM_FPGA_INTEL")],
                vec![vf("0000:5e:00.1")],
            ),
            deployable("pac_5e_vf1", 1, vec![], vec![vf("0000:5e:00.2")]),
        ],
    )]
}

// ── Full passes ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_pass_persists_and_reports_everything() {
    let (server, fake) = FakePlacement::start().await;
    let root = fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));

    let summary = conductor.report_data(HOST, &fpga_card()).await.unwrap();

    // device + cpid + 2 deployables + 1 attribute + 2 handles
    assert_eq!(summary.store.created, 7);
    // device provider + 2 deployable providers, both deployables get inventory
    assert_eq!(summary.placement.providers_created, 3);
    assert_eq!(summary.placement.providers_updated, 2);
    assert_eq!(summary.placement.providers_removed, 0);

    let dev = provider_uuid(&device_provider_name(DeviceType::Fpga, CPID));
    assert_eq!(fake.provider(&dev).unwrap().parent, Some(root));
    for name in ["pac_5e_vf0", "pac_5e_vf1"] {
        let dep = fake.provider(&provider_uuid(name)).unwrap();
        assert_eq!(dep.parent, Some(dev));
        assert_eq!(fake.inventory_total(&dep.uuid, "FPGA"), Some(1));
    }
    assert!(
        fake.provider(&provider_uuid("pac_5e_vf0"))
            .unwrap()
            .traits
            .contains("CUSTOM_FPGA_INTEL")
    );

    let tree = load_host_tree(store.as_ref(), HOST).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].deployables.len(), 2);
}

#[tokio::test]
async fn identical_second_pass_touches_nothing() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap();

    let writes = store.writes();
    let remote_writes = [
        count_requests(&server, "POST").await,
        count_requests(&server, "PUT").await,
        count_requests(&server, "DELETE").await,
    ];

    let summary = conductor.report_data(HOST, &fpga_card()).await.unwrap();

    assert!(summary.is_noop());
    assert_eq!(summary.diff.devices.same, 1);
    assert_eq!(summary.diff.devices.dirty, 0);
    assert_eq!(store.writes(), writes);
    // Placement is re-read every pass but not written.
    assert_eq!(
        [
            count_requests(&server, "POST").await,
            count_requests(&server, "PUT").await,
            count_requests(&server, "DELETE").await,
        ],
        remote_writes
    );
}

#[tokio::test]
async fn attribute_change_updates_and_adds_rows() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));

    let old = vec![device(
        DeviceType::Fpga,
        CPID,
        vec![deployable("x", 1, vec![attr("k1", "v1")], vec![])],
    )];
    conductor.report_data(HOST, &old).await.unwrap();

    let new = vec![device(
        DeviceType::Fpga,
        CPID,
        vec![deployable("x", 1, vec![attr("k1", "v2"), attr("k2", "v3")], vec![])],
    )];
    let summary = conductor.report_data(HOST, &new).await.unwrap();

    assert_eq!(summary.diff.devices.same, 1);
    assert_eq!(summary.diff.deployables.same, 1);
    assert_eq!(summary.diff.deployables.dirty, 0);
    assert_eq!(summary.diff.attributes.same, 1);
    assert_eq!(summary.diff.attributes.dirty, 1);
    assert_eq!(summary.diff.attributes.added, 1);
    assert_eq!(summary.store.updated, 1);
    assert_eq!(summary.store.created, 1);
    assert_eq!(summary.store.destroyed, 0);

    let tree = load_host_tree(store.as_ref(), HOST).await.unwrap();
    let mut attrs: Vec<(String, String)> = tree[0].deployables[0]
        .attributes
        .iter()
        .map(|a| (a.key.clone(), a.value.clone()))
        .collect();
    attrs.sort();
    assert_eq!(
        attrs,
        vec![("k1".into(), "v2".into()), ("k2".into(), "v3".into())]
    );
}

#[tokio::test]
async fn removed_device_loses_rows_and_providers() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap();
    assert_eq!(fake.provider_count(), 4);

    let summary = conductor.report_data(HOST, &[]).await.unwrap();

    assert_eq!(summary.diff.devices.deleted, 1);
    assert_eq!(summary.store.destroyed, 7);
    assert_eq!(summary.placement.providers_removed, 3);
    assert_eq!(fake.provider_count(), 1);
    assert!(
        store
            .list_devices_by_host(HOST)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn removed_deployable_loses_only_its_provider() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap();

    let mut shrunk = fpga_card();
    shrunk[0].deployables.truncate(1);
    let summary = conductor.report_data(HOST, &shrunk).await.unwrap();

    assert_eq!(summary.diff.deployables.deleted, 1);
    assert_eq!(summary.placement.providers_removed, 1);
    assert!(fake.provider(&provider_uuid("pac_5e_vf1")).is_none());
    assert!(fake.provider(&provider_uuid("pac_5e_vf0")).is_some());
}

#[tokio::test]
async fn accelerator_count_change_updates_inventory() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap();

    let mut grown = fpga_card();
    grown[0].deployables[1].num_accelerators = 4;
    let summary = conductor.report_data(HOST, &grown).await.unwrap();

    assert_eq!(summary.diff.deployables.dirty, 1);
    assert_eq!(summary.store.updated, 1);
    assert_eq!(fake.inventory_total(&provider_uuid("pac_5e_vf1"), "FPGA"), Some(4));
}

// ── Failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_compute_node_aborts_propagation() {
    let (server, _fake) = FakePlacement::start().await;
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));

    let err = conductor.report_data(HOST, &fpga_card()).await.unwrap_err();

    assert!(matches!(err, CoreError::RootProviderNotFound { ref host } if host == HOST));
    // Store writes are not rolled back.
    assert_eq!(store.list_devices_by_host(HOST).await.unwrap().len(), 1);
}

#[tokio::test]
async fn pass_after_missing_compute_node_repairs_placement() {
    let (server, fake) = FakePlacement::start().await;
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap_err();

    let root = fake.add_root(HOST);
    let summary = conductor.report_data(HOST, &fpga_card()).await.unwrap();

    // The store already holds the tree; only Placement has work left.
    assert_eq!(summary.store.total(), 0);
    assert_eq!(summary.placement.providers_created, 3);
    let dev = provider_uuid(&device_provider_name(DeviceType::Fpga, CPID));
    assert_eq!(fake.provider(&dev).unwrap().parent, Some(root));
    assert_eq!(fake.inventory_total(&provider_uuid("pac_5e_vf0"), "FPGA"), Some(1));
}

#[tokio::test]
async fn provider_left_in_use_is_removed_once_released() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));
    conductor.report_data(HOST, &fpga_card()).await.unwrap();

    let vf1 = provider_uuid("pac_5e_vf1");
    fake.set_in_use(&vf1);
    let mut shrunk = fpga_card();
    shrunk[0].deployables.truncate(1);
    let err = conductor.report_data(HOST, &shrunk).await.unwrap_err();
    assert!(matches!(err, CoreError::ProviderInUse { .. }), "got {err:?}");
    assert!(fake.provider(&vf1).is_some());

    fake.release(&vf1);
    let summary = conductor.report_data(HOST, &shrunk).await.unwrap();

    assert_eq!(summary.store.total(), 0);
    assert_eq!(summary.placement.providers_removed, 1);
    assert!(fake.provider(&vf1).is_none());
}

#[tokio::test]
async fn device_row_without_controlpath_id_is_discarded() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));

    // What a pass that died between the device and controlpath inserts leaves.
    let half = store
        .create_device(NewDevice {
            hostname: HOST.into(),
            fields: fpga_card()[0].fields.clone(),
        })
        .await
        .unwrap();
    let dangling = store
        .create_deployable(NewDeployable {
            device_id: half.id,
            name: "pac_5e_vf0".into(),
            num_accelerators: 1,
        })
        .await
        .unwrap();

    let summary = conductor.report_data(HOST, &fpga_card()).await.unwrap();

    assert_eq!(summary.diff.devices.deleted, 1);
    assert_eq!(summary.diff.devices.added, 1);
    assert!(store.get_device(half.id).await.unwrap().is_none());
    assert!(store.get_deployable(dangling.id).await.unwrap().is_none());
    let tree = load_host_tree(store.as_ref(), HOST).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].controlpath_id.cpid_info, CPID);
}

#[tokio::test]
async fn unmapped_device_type_without_rc_fails() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, store);

    let tree = vec![device(
        DeviceType::Qat,
        "0000:3d:00.0",
        vec![deployable("qat_3d", 1, vec![], vec![])],
    )];
    let err = conductor.report_data(HOST, &tree).await.unwrap_err();

    assert!(matches!(err, CoreError::ResourceClassNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn explicit_rc_attribute_overrides_device_type() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root(HOST);
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, store);

    let tree = vec![device(
        DeviceType::Qat,
        "0000:3d:00.0",
        vec![deployable(
            "qat_3d",
            2,
            vec![attr("rc", "CUSTOM_QAT")],
            vec![],
        )],
    )];
    conductor.report_data(HOST, &tree).await.unwrap();

    assert_eq!(fake.inventory_total(&provider_uuid("qat_3d"), "CUSTOM_QAT"), Some(2));
}

// ── Concurrency and direct reports ───────────────────────────────────

#[tokio::test]
async fn passes_for_different_hosts_run_together() {
    let (server, fake) = FakePlacement::start().await;
    fake.add_root("compute-1");
    fake.add_root("compute-2");
    let store = Arc::new(MemoryStore::new());
    let conductor = FakePlacement::conductor(&server, Arc::clone(&store));

    let other = vec![device(
        DeviceType::Gpu,
        "0000:af:00.0",
        vec![deployable("gpu_af", 1, vec![], vec![])],
    )];
    let first = fpga_card();
    let (a, b) = tokio::join!(
        conductor.report_data("compute-1", &first),
        conductor.report_data("compute-2", &other),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(fake.inventory_total(&provider_uuid("gpu_af"), "PGPU"), Some(1));
    assert_eq!(store.list_devices_by_host("compute-2").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_under_one_root_keep_each_other() {
    let (server, fake) = FakePlacement::start().await;
    let root = fake.add_root(HOST);
    let conductor = FakePlacement::conductor(&server, Arc::new(MemoryStore::new()));

    let names: Vec<String> = (0..6).map(|i| format!("leaf_{i}")).collect();
    for _ in 0..5 {
        let tasks: Vec<_> = names
            .iter()
            .map(|name| {
                let conductor = conductor.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    conductor
                        .provider_report(&name, "FPGA", &["CUSTOM_X".into()], 1, &root)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    assert_eq!(count_requests(&server, "DELETE").await, 0);
    for name in &names {
        let leaf = fake.provider(&provider_uuid(name)).unwrap();
        assert_eq!(leaf.parent, Some(root));
        assert_eq!(fake.inventory_total(&leaf.uuid, "FPGA"), Some(1));
    }
}

#[tokio::test]
async fn provider_report_creates_a_leaf_with_inventory_and_traits() {
    let (server, fake) = FakePlacement::start().await;
    let root = fake.add_root(HOST);
    let conductor = FakePlacement::conductor(&server, Arc::new(MemoryStore::new()));

    let uuid = conductor
        .provider_report("leaf", "FPGA", &["CUSTOM_X".into()], 3, &root)
        .await
        .unwrap();

    let leaf = fake.provider(&uuid).unwrap();
    assert_eq!(leaf.parent, Some(root));
    assert!(leaf.traits.contains("CUSTOM_X"));
    assert_eq!(fake.inventory_total(&uuid, "FPGA"), Some(3));
}
