use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::Selector;

/// Renders a workload's label selector in the string form accepted by the pod list API,
/// e.g. `app=web,tier in (backend,cache),!canary`.
///
/// An empty selector would match every pod in the namespace and is rejected, as are
/// unknown operators and `In`/`NotIn` requirements without values.
pub fn to_selector_string(selector: &LabelSelector) -> Result<String> {
    // kube accepts `values: []` and would render `key in ()`
    if let Some(requirement) = selector.match_expressions.iter().flatten().find(|r| {
        matches!(r.operator.as_str(), "In" | "NotIn") && r.values.as_deref().unwrap_or_default().is_empty()
    }) {
        return Err(Error::InvalidSelector(format!(
            "operator {} on key {} requires at least one value",
            requirement.operator, requirement.key
        )));
    }

    let parsed = Selector::try_from(selector.clone()).map_err(|e| Error::InvalidSelector(e.0))?;
    if parsed.selects_all() {
        return Err(Error::InvalidSelector(
            "selector has neither matchLabels nor matchExpressions".to_string(),
        ));
    }
    Ok(parsed.to_string())
}
