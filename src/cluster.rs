use crate::error::{Error, Result};
use crate::workload::{Workload, WorkloadRecord};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// The cluster operations a reconciliation pass needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Deployments, StatefulSets and DaemonSets in `namespace`, or in all namespaces.
    async fn list_workloads(&self, namespace: Option<String>) -> Result<Vec<WorkloadRecord>>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub async fn connect() -> anyhow::Result<Self> {
        info!("Initializing K8s client");
        let client = Client::try_default().await?;
        let api_server_info = client.apiserver_version().await?;
        info!(
            "Connected to Kubernetes API server with version {}.{} (default namespace {})",
            api_server_info.major,
            api_server_info.minor,
            client.default_namespace()
        );
        Ok(Self { client })
    }

    async fn list_kind<K: Workload>(&self, namespace: Option<&str>) -> Result<Vec<WorkloadRecord>> {
        let api: Api<K> = match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::orchestrator(format!("list {}s", K::kind_name()), e))?;
        debug!("Listed {} {}s", list.items.len(), K::kind_name());
        Ok(list.items.iter().map(|item| item.to_record()).collect())
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_workloads(&self, namespace: Option<String>) -> Result<Vec<WorkloadRecord>> {
        let namespace = namespace.as_deref();
        let mut workloads = self.list_kind::<Deployment>(namespace).await?;
        workloads.extend(self.list_kind::<StatefulSet>(namespace).await?);
        workloads.extend(self.list_kind::<DaemonSet>(namespace).await?);
        Ok(workloads)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| {
                Error::orchestrator(
                    format!("list pods in {} matching {}", namespace, label_selector),
                    e,
                )
            })?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .get(name)
            .await
            .map_err(|e| Error::orchestrator(format!("get secret {}/{}", namespace, name), e))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::orchestrator(format!("delete pod {}/{}", namespace, name), e))?;
        Ok(())
    }
}
