use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};

pub static KUBE_RESTARTER_ANNOTATION: &str = "kube-restarter.io/enabled";

/// Kind-independent view of a workload that owns pods through a label selector.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadRecord {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub selector: Option<LabelSelector>,
}

impl WorkloadRecord {
    /// Only the literal value `"true"` enrolls a workload.
    pub fn is_enrolled(&self) -> bool {
        self.annotations
            .get(KUBE_RESTARTER_ANNOTATION)
            .is_some_and(|value| value == "true")
    }
}

impl fmt::Display for WorkloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

pub trait Workload
where
    Self: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Send
        + Sync
        + DeserializeOwned
        + 'static,
{
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }

    fn label_selector(&self) -> Option<&LabelSelector>;

    fn to_record(&self) -> WorkloadRecord {
        WorkloadRecord {
            kind: Self::kind_name(),
            namespace: self.namespace().unwrap_or_default(),
            name: self.name_any(),
            annotations: self.annotations().clone(),
            selector: self.label_selector().cloned(),
        }
    }
}

impl Workload for Deployment {
    fn label_selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|spec| &spec.selector)
    }
}

impl Workload for StatefulSet {
    fn label_selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|spec| &spec.selector)
    }
}

impl Workload for DaemonSet {
    fn label_selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|spec| &spec.selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(annotations: serde_json::Value) -> Deployment {
        serde_json::from_value(json!({
            "metadata": {"name": "web", "namespace": "apps", "annotations": annotations},
            "spec": {
                "selector": {"matchLabels": {"app": "web"}},
                "template": {"metadata": {"labels": {"app": "web"}}}
            }
        }))
        .expect("valid deployment")
    }

    #[test]
    fn test_to_record() {
        let record = deployment(json!({"kube-restarter.io/enabled": "true"})).to_record();

        assert_eq!(record.kind, "Deployment");
        assert_eq!(record.namespace, "apps");
        assert_eq!(record.name, "web");
        assert!(record.is_enrolled());
        assert_eq!(
            record
                .selector
                .and_then(|s| s.match_labels)
                .and_then(|labels| labels.get("app").cloned())
                .as_deref(),
            Some("web")
        );
        assert_eq!(
            deployment(json!({})).to_record().to_string(),
            "Deployment apps/web"
        );
    }

    #[test]
    fn test_enrollment_requires_exact_true() {
        for value in ["TRUE", "True", "1", "yes", ""] {
            let record = deployment(json!({"kube-restarter.io/enabled": value})).to_record();
            assert!(!record.is_enrolled(), "{:?} should not enroll", value);
        }
        assert!(!deployment(json!({})).to_record().is_enrolled());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(StatefulSet::kind_name(), "StatefulSet");
        assert_eq!(DaemonSet::kind_name(), "DaemonSet");
    }
}
