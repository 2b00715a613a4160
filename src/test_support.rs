//! Stateful fakes for the cluster and registry seams. Tests that only need call
//! expectations use the generated `MockClusterClient` and `MockHttpTransport`; these
//! fakes remember pods across passes and record the requests a scenario sent.

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::oci_registry::{HttpRequest, HttpResponse, HttpTransport};
use crate::workload::WorkloadRecord;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Pod, Secret};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Answers every request with `handler` and remembers what was sent.
pub struct FakeRegistry {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeRegistry {
    pub fn new(handler: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeRegistry {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(&request)
    }
}

pub fn response(status: StatusCode, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    let mut header_map = HeaderMap::new();
    for (name, value) in headers {
        header_map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    HttpResponse {
        status,
        headers: header_map,
        body: body.to_vec(),
    }
}

pub fn digest_response(digest: &str) -> HttpResponse {
    response(StatusCode::OK, &[("Docker-Content-Digest", digest)], b"")
}

pub fn docker_config_secret(name: &str, config: serde_json::Value) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        ByteString(serde_json::to_vec(&config).unwrap()),
    );
    let mut secret: Secret = serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": "apps"},
        "type": "kubernetes.io/dockerconfigjson"
    }))
    .unwrap();
    secret.data = Some(data);
    secret
}

/// In-memory cluster. Pods are keyed by `namespace` and label selector string.
#[derive(Default)]
pub struct FakeCluster {
    pub workloads: Vec<WorkloadRecord>,
    pub secrets: Vec<Secret>,
    pub pods: Mutex<BTreeMap<(String, String), Vec<Pod>>>,
    pub pod_queries: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn set_pods(&self, namespace: &str, selector: &str, pods: Vec<Pod>) {
        self.pods
            .lock()
            .unwrap()
            .insert((namespace.to_string(), selector.to_string()), pods);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn pod_queries(&self) -> Vec<String> {
        self.pod_queries.lock().unwrap().clone()
    }
}

fn not_found(what: String) -> Error {
    Error::orchestrator(
        what,
        io::Error::new(io::ErrorKind::NotFound, "not found"),
    )
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_workloads(&self, namespace: Option<String>) -> Result<Vec<WorkloadRecord>> {
        Ok(self
            .workloads
            .iter()
            .filter(|w| namespace.as_ref().is_none_or(|ns| *ns == w.namespace))
            .cloned()
            .collect())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        self.pod_queries
            .lock()
            .unwrap()
            .push(format!("{}/{}", namespace, label_selector));
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), label_selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets
            .iter()
            .find(|secret| {
                secret.metadata.namespace.as_deref() == Some(namespace)
                    && secret.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .ok_or_else(|| not_found(format!("get secret {}/{}", namespace, name)))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push(format!("{}/{}", namespace, name));
        Ok(())
    }
}
