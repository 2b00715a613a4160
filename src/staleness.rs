use crate::image_reference::{DEFAULT_TAG, ImageReference};
use crate::oci_registry::{HttpTransport, resolve_digest};
use k8s_openapi::api::core::v1::{Container, Secret};
use tracing::{debug, info, warn};

static PULL_POLICY_ALWAYS: &str = "Always";
static DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerVerdict {
    pub container_name: String,
    pub applicable: bool,
    pub stale: bool,
    pub running_digest: Option<String>,
    pub remote_digest: Option<String>,
}

impl ContainerVerdict {
    fn skipped(container_name: &str, applicable: bool, running_digest: Option<String>) -> Self {
        Self {
            container_name: container_name.to_string(),
            applicable,
            stale: false,
            running_digest,
            remote_digest: None,
        }
    }
}

/// A container can drift only if it is re-pulled on start and tracks `latest`, either
/// explicitly or by omitting the tag. Digest-pinned images never drift.
pub fn is_applicable(container: &Container) -> bool {
    let Some(image) = container.image.as_deref() else {
        return false;
    };
    container.image_pull_policy.as_deref() == Some(PULL_POLICY_ALWAYS)
        && !image.contains('@')
        && ImageReference::parse(image).tag == DEFAULT_TAG
}

/// Returns the `sha256:...` part of a status image id such as
/// `docker-pullable://nginx@sha256:abc`.
pub fn extract_digest(image_id: &str) -> Option<&str> {
    image_id.find(DIGEST_PREFIX).map(|idx| &image_id[idx..])
}

/// Decides whether `container` runs an outdated image.
///
/// Only a confirmed mismatch is stale: a missing running digest or any failure to
/// look up the remote digest yields `stale == false`.
pub async fn evaluate(
    http: &dyn HttpTransport,
    container: &Container,
    running_image_id: &str,
    secrets: &[Secret],
) -> ContainerVerdict {
    let name = container.name.as_str();
    if !is_applicable(container) {
        debug!(
            "Container {} is not applicable (image {:?}, imagePullPolicy {:?})",
            name, container.image, container.image_pull_policy
        );
        return ContainerVerdict::skipped(name, false, None);
    }
    let image = container.image.as_deref().unwrap_or_default();

    let Some(running_digest) = extract_digest(running_image_id) else {
        info!(
            "No running digest found for container {} (imageID {:?})",
            name, running_image_id
        );
        return ContainerVerdict::skipped(name, true, None);
    };

    let remote_digest = match resolve_digest(http, image, secrets).await {
        Ok(digest) => digest,
        Err(e) => {
            warn!(
                "Failed to fetch remote digest for container {} image {}: {}",
                name, image, e
            );
            return ContainerVerdict::skipped(name, true, Some(running_digest.to_string()));
        }
    };

    let stale = running_digest != remote_digest;
    if stale {
        info!(
            "Container {} is stale: running={} remote={}",
            name,
            short(running_digest),
            short(&remote_digest)
        );
    } else {
        debug!("Container {} is up to date ({})", name, short(running_digest));
    }

    ContainerVerdict {
        container_name: name.to_string(),
        applicable: true,
        stale,
        running_digest: Some(running_digest.to_string()),
        remote_digest: Some(remote_digest),
    }
}

fn short(digest: &str) -> &str {
    digest.get(..19).unwrap_or(digest)
}
