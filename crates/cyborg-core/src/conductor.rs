// ── Conductor ──
//
// Entry point for host agents. One pass: load the persisted tree, diff it
// against the reported tree, apply the store writes, then converge
// Placement on the reported tree. There is no rollback; a failure aborts
// the rest of the pass. The next pass re-diffs the store from whatever
// landed and re-reads Placement, so both sides heal.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use cyborg_placement::PlacementClient;

use crate::apply::{ApplyOutcome, apply_store_ops};
use crate::config::ConductorConfig;
use crate::error::CoreError;
use crate::model::DriverDevice;
use crate::placement::{PlacementReporter, PropagationOutcome, ReportClient};
use crate::plan::{DiffStats, ReconcilePlan};
use crate::store::{InventoryStore, load_host_inventory};

/// What one `report_data` pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub host: String,
    pub diff: DiffStats,
    pub store: ApplyOutcome,
    pub placement: PropagationOutcome,
}

impl ReconcileSummary {
    /// True when the pass wrote nothing anywhere.
    pub fn is_noop(&self) -> bool {
        self.store.total() == 0 && self.placement.is_noop()
    }
}

/// Cheaply cloneable handle; clones share the store, the report client,
/// and the per-host locks.
#[derive(Clone)]
pub struct Conductor {
    inner: Arc<ConductorInner>,
}

struct ConductorInner {
    config: ConductorConfig,
    store: Arc<dyn InventoryStore>,
    client: Arc<ReportClient>,
    reporter: PlacementReporter,
    host_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Conductor {
    /// Build a conductor that talks to the Placement endpoint in `config`.
    pub fn new(config: ConductorConfig, store: Arc<dyn InventoryStore>) -> Result<Self, CoreError> {
        let api = PlacementClient::new(config.placement_url.as_str(), &config.transport())?;
        Ok(Self::with_client(config, store, api))
    }

    /// Build around an existing Placement client.
    pub fn with_client(
        config: ConductorConfig,
        store: Arc<dyn InventoryStore>,
        api: PlacementClient,
    ) -> Self {
        let client = Arc::new(ReportClient::new(api, config.generation_conflict_retries));
        let reporter = PlacementReporter::new(Arc::clone(&client));
        Self {
            inner: Arc::new(ConductorInner {
                config,
                store,
                client,
                reporter,
                host_locks: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.inner.store
    }

    pub fn report_client(&self) -> &Arc<ReportClient> {
        &self.inner.client
    }

    // ── Passes ───────────────────────────────────────────────────────

    /// Reconcile `host` against the freshly discovered `new_tree`.
    ///
    /// Passes for one host never interleave; passes for different hosts
    /// run concurrently.
    pub async fn report_data(
        &self,
        host: &str,
        new_tree: &[DriverDevice],
    ) -> Result<ReconcileSummary, CoreError> {
        let lock = Arc::clone(&self.inner.host_locks.entry(host.to_owned()).or_default());
        let _guard = lock.lock().await;

        let span = info_span!("report_data", host);
        let result = self.run_pass(host, new_tree).instrument(span).await;
        if let Err(ref e) = result {
            error!(host, error = %e, "reconciliation pass aborted");
        }
        result
    }

    async fn run_pass(
        &self,
        host: &str,
        new_tree: &[DriverDevice],
    ) -> Result<ReconcileSummary, CoreError> {
        info!(devices = new_tree.len(), "reconciliation pass started");

        let plan = self.plan(host, new_tree).await?;
        let store = apply_store_ops(self.inner.store.as_ref(), host, &plan.store_ops).await?;
        let placement = self.inner.reporter.sync_host(host, new_tree).await?;

        let summary = ReconcileSummary {
            host: host.to_owned(),
            diff: plan.stats,
            store,
            placement,
        };
        info!(
            created = summary.store.created,
            updated = summary.store.updated,
            destroyed = summary.store.destroyed,
            providers_created = summary.placement.providers_created,
            providers_updated = summary.placement.providers_updated,
            providers_removed = summary.placement.providers_removed,
            "reconciliation pass finished"
        );
        Ok(summary)
    }

    /// Compute the store plan for `host` without applying anything.
    /// Device rows left without a controlpath id are planned for removal.
    pub async fn plan(&self, host: &str, new_tree: &[DriverDevice]) -> Result<ReconcilePlan, CoreError> {
        let persisted = load_host_inventory(self.inner.store.as_ref(), host).await?;
        let mut plan = ReconcilePlan::build(host, &persisted.devices, new_tree)?;
        plan.discard_orphans(&persisted.orphans);
        Ok(plan)
    }

    /// Report one provider with a single-class inventory and traits under
    /// `parent`. Returns its UUID.
    pub async fn provider_report(
        &self,
        name: &str,
        resource_class: &str,
        traits: &[String],
        total: u32,
        parent: &Uuid,
    ) -> Result<Uuid, CoreError> {
        self.inner
            .reporter
            .provider_report(name, resource_class, traits, total, parent)
            .await
    }
}
