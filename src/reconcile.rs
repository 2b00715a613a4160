use crate::error::{Error, Result};
use crate::oci_registry::HttpTransport;
use crate::selector::to_selector_string;
use crate::staleness::{self, ContainerVerdict};
use crate::state::{ControllerContext, PassReport};
use crate::workload::{KUBE_RESTARTER_ANNOTATION, WorkloadRecord};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, Secret};
use kube::ResourceExt;
use tracing::{debug, info, warn};

static POD_PHASE_RUNNING: &str = "Running";

/// Runs one reconciliation pass.
///
/// Only a failure to list workloads fails the pass. Anything that goes wrong for a
/// single workload, pod or container is logged, counted in the report and skipped.
pub async fn run(ctx: &ControllerContext) -> Result<PassReport> {
    let mut report = PassReport::start();

    let workloads = ctx.cluster.list_workloads(ctx.namespace.clone()).await?;
    let enrolled: Vec<WorkloadRecord> = workloads
        .into_iter()
        .filter(WorkloadRecord::is_enrolled)
        .collect();

    info!(
        "Scanning for digest changes in {} workloads annotated with {}=true in {}",
        enrolled.len(),
        KUBE_RESTARTER_ANNOTATION,
        ctx.namespace
            .as_deref()
            .map_or("all namespaces".to_string(), |ns| format!("namespace {}", ns))
    );

    for workload in &enrolled {
        report.workloads_checked += 1;
        if let Err(e) = reconcile_workload(ctx, workload, &mut report).await {
            warn!("Skipping {}: {}", workload, e);
            report.failures += 1;
        }
    }

    let report = report.finish();
    info!(
        "Pass finished: {} workloads, {} running pods checked, {} pods deleted, {} failures",
        report.workloads_checked, report.pods_checked, report.pods_deleted, report.failures
    );
    Ok(report)
}

async fn reconcile_workload(
    ctx: &ControllerContext,
    workload: &WorkloadRecord,
    report: &mut PassReport,
) -> Result<()> {
    let selector = workload
        .selector
        .as_ref()
        .ok_or_else(|| Error::InvalidSelector("workload declares no selector".to_string()))?;
    let label_selector = to_selector_string(selector)?;

    let pods = ctx
        .cluster
        .list_pods(&workload.namespace, &label_selector)
        .await?;
    info!(
        "Checking {} with {} pods matching {}",
        workload,
        pods.len(),
        label_selector
    );

    // Pods of one workload share a template, so the first pod's pull secrets serve all of them
    let Some(first_pod) = pods.first() else {
        return Ok(());
    };
    let secrets = gather_pull_secrets(ctx, &workload.namespace, first_pod).await;

    for pod in pods.iter().filter(|pod| is_running(pod)) {
        report.pods_checked += 1;
        let pod_name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_else(|| workload.namespace.clone());

        let Some(verdict) = find_stale_container(ctx.http.as_ref(), pod, &secrets).await else {
            continue;
        };

        info!(
            "Deleting stale pod {}/{} (container {} running {} instead of {})",
            namespace,
            pod_name,
            verdict.container_name,
            verdict.running_digest.as_deref().unwrap_or_default(),
            verdict.remote_digest.as_deref().unwrap_or_default()
        );
        match ctx.cluster.delete_pod(&namespace, &pod_name).await {
            Ok(()) => report.pods_deleted += 1,
            Err(e) => {
                warn!("Failed to delete pod {}/{}: {}", namespace, pod_name, e);
                report.failures += 1;
            }
        }
    }

    Ok(())
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some(POD_PHASE_RUNNING)
}

async fn gather_pull_secrets(ctx: &ControllerContext, namespace: &str, pod: &Pod) -> Vec<Secret> {
    let references = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.image_pull_secrets.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut secrets = Vec::with_capacity(references.len());
    for reference in references {
        match ctx.cluster.get_secret(namespace, &reference.name).await {
            Ok(secret) => secrets.push(secret),
            Err(e) => warn!(
                "Could not get pull secret {}/{}: {}",
                namespace, reference.name, e
            ),
        }
    }
    secrets
}

/// Evaluates the pod's containers in order and returns the first stale verdict.
async fn find_stale_container(
    http: &dyn HttpTransport,
    pod: &Pod,
    secrets: &[Secret],
) -> Option<ContainerVerdict> {
    let containers = pod.spec.as_ref().map(|spec| spec.containers.as_slice())?;
    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default();

    for (index, container) in containers.iter().enumerate() {
        let Some(status) = container_status(statuses, index, &container.name) else {
            debug!(
                "No status yet for container {} in pod {}",
                container.name,
                pod.name_any()
            );
            continue;
        };
        let verdict = staleness::evaluate(http, container, &status.image_id, secrets).await;
        if verdict.stale {
            return Some(verdict);
        }
    }
    None
}

/// Statuses are normally reported in declaration order; fall back to the container name
/// when the entry at the same position belongs to another container.
fn container_status<'a>(
    statuses: &'a [ContainerStatus],
    index: usize,
    name: &str,
) -> Option<&'a ContainerStatus> {
    match statuses.get(index) {
        Some(status) if status.name == name => Some(status),
        _ => statuses.iter().find(|status| status.name == name),
    }
}
