use std::fmt;

pub static DEFAULT_REGISTRY: &str = "registry-1.docker.io";
pub static DEFAULT_TAG: &str = "latest";
static DOCKER_HUB_ALIASES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl ImageReference {
    /// Splits an image reference into registry, repository and tag.
    ///
    /// Never fails: anything that does not name a registry is treated as a
    /// Docker Hub repository, and a missing tag becomes `latest`. A trailing
    /// `@digest` is ignored; callers are expected to filter out digest-pinned
    /// images before asking for a tag's digest.
    pub fn parse(image: &str) -> Self {
        let without_digest = image.split_once('@').map_or(image, |(name, _)| name);

        // A colon followed by a slash belongs to a host:port, not to a tag
        let (name, tag) = match without_digest.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (without_digest, ""),
        };
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };

        let (registry, repository) = match name.split_once('/') {
            None => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
            Some((first, rest)) if is_docker_hub(first) => {
                (DEFAULT_REGISTRY.to_string(), hub_repository(rest))
            }
            Some((first, rest)) if looks_like_registry(first) => {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };

        Self {
            registry,
            repository,
            tag: tag.to_string(),
        }
    }
}

/// Maps any of the Docker Hub host aliases onto the host that actually serves the v2 API.
pub fn canonical_registry_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if is_docker_hub(&host) {
        DEFAULT_REGISTRY.to_string()
    } else {
        host
    }
}

fn is_docker_hub(host: &str) -> bool {
    DOCKER_HUB_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(host))
}

fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

fn hub_repository(repository: &str) -> String {
    if repository.contains('/') {
        repository.to_string()
    } else {
        format!("library/{}", repository)
    }
}
