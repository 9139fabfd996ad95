//! Reconciliation command handlers: report, diff, plan.

use std::sync::Arc;

use tabled::Tabled;

use cyborg_core::{
    Conductor, DiffStats, InventoryStore, LayerCounts, MemoryStore, PlacementOp, ReconcilePlan,
    ReconcileSummary, apply_store_ops, load_host_inventory, load_host_tree,
};

use crate::cli::{DiffArgs, GlobalOpts, PlanArgs, ReportArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct LayerRow {
    #[tabled(rename = "Layer")]
    layer: &'static str,
    #[tabled(rename = "Same")]
    same: usize,
    #[tabled(rename = "Dirty")]
    dirty: usize,
    #[tabled(rename = "Added")]
    added: usize,
    #[tabled(rename = "Deleted")]
    deleted: usize,
}

impl LayerRow {
    fn new(layer: &'static str, counts: LayerCounts) -> Self {
        Self {
            layer,
            same: counts.same,
            dirty: counts.dirty,
            added: counts.added,
            deleted: counts.deleted,
        }
    }
}

fn stats_rows(stats: &DiffStats) -> Vec<LayerRow> {
    vec![
        LayerRow::new("device", stats.devices),
        LayerRow::new("deployable", stats.deployables),
        LayerRow::new("attribute", stats.attributes),
        LayerRow::new("attach_handle", stats.attach_handles),
    ]
}

#[derive(Tabled)]
struct OpRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Target")]
    target: &'static str,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Subject")]
    subject: String,
}

fn op_rows(plan: &ReconcilePlan) -> Vec<OpRow> {
    let store = plan.store_ops.iter().map(|op| ("store", op.kind().to_string(), op.target()));
    let placement = plan.placement_ops.iter().map(|op| match op {
        PlacementOp::ReportDevice { device } => (
            "placement",
            "report".to_owned(),
            format!(
                "{} with {} deployable(s)",
                cyborg_core::device_provider_name(
                    device.fields.device_type,
                    &device.controlpath_id.cpid_info
                ),
                device.deployables.len()
            ),
        ),
        PlacementOp::RemoveProvider { name, uuid } => {
            ("placement", "remove".to_owned(), format!("{name} ({uuid})"))
        }
    });
    store
        .chain(placement)
        .enumerate()
        .map(|(i, (target, op, subject))| OpRow {
            index: i + 1,
            target,
            op,
            subject,
        })
        .collect()
}

// ── Detail renderers ────────────────────────────────────────────────

fn plan_detail(plan: &ReconcilePlan) -> String {
    if plan.is_empty() {
        return format!("Host {}: nothing to do", plan.host);
    }
    format!(
        "Host {}\n{}\n{}",
        plan.host,
        output::render_table(&stats_rows(&plan.stats)),
        output::render_table(&op_rows(plan)),
    )
}

fn summary_detail(summary: &ReconcileSummary) -> String {
    [
        format!("Host:      {}", summary.host),
        output::render_table(&stats_rows(&summary.diff)),
        format!(
            "Store:     {} created, {} updated, {} destroyed",
            summary.store.created, summary.store.updated, summary.store.destroyed
        ),
        format!(
            "Placement: {} created, {} updated, {} removed",
            summary.placement.providers_created,
            summary.placement.providers_updated,
            summary.placement.providers_removed
        ),
    ]
    .join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

/// Run one reconciliation pass and persist the state file afterwards.
pub async fn report(args: ReportArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let tree = util::read_tree(&args.tree)?;
    let conductor_config = config::resolve_conductor_config(global)?;
    let (store, path) = util::open_store(global)?;
    let store = Arc::new(store);
    let conductor = Conductor::new(conductor_config, Arc::clone(&store) as Arc<dyn InventoryStore>)?;

    let result = conductor.report_data(&args.host, &tree).await;
    // Store writes are not rolled back, so persist them even when
    // propagation failed.
    store.save(&path)?;
    let summary = result?;

    let out = output::render_single(&global.output, &summary, summary_detail, |s| {
        format!(
            "{} {} {} {}",
            s.store.total(),
            s.placement.providers_created,
            s.placement.providers_updated,
            s.placement.providers_removed
        )
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Diff two device tree files. Nothing is persisted and Placement is not
/// contacted.
pub async fn diff(args: DiffArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let old = util::read_tree(&args.old)?;
    let new = util::read_tree(&args.new)?;

    // Stage the old tree in a scratch store so it carries store ids.
    let scratch = MemoryStore::new();
    let seed = ReconcilePlan::build(&args.host, &[], &old)?;
    apply_store_ops(&scratch, &args.host, &seed.store_ops).await?;
    let stored = load_host_tree(&scratch, &args.host).await?;

    let plan = ReconcilePlan::build(&args.host, &stored, &new)?;
    render_plan(&plan, global)
}

/// Diff a discovered tree against the state file without applying it.
pub async fn plan(args: PlanArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let tree = util::read_tree(&args.tree)?;
    let (store, _) = util::open_store(global)?;
    let stored = load_host_inventory(&store, &args.host).await?;
    let mut plan = ReconcilePlan::build(&args.host, &stored.devices, &tree)?;
    plan.discard_orphans(&stored.orphans);
    render_plan(&plan, global)
}

fn render_plan(plan: &ReconcilePlan, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.output, plan, plan_detail, |p| {
        format!("{} {}", p.store_ops.len(), p.placement_ops.len())
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
