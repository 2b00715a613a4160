use crate::image_reference::canonical_registry_host;
use crate::secret_string::SecretString;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

static DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
static DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub registry: String,
    pub username: String,
    pub password: SecretString,
}

impl Credential {
    /// Value for an `Authorization: Basic ...` header.
    pub fn basic_auth_header(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", STANDARD.encode(pair))
    }
}

#[derive(Debug, Deserialize)]
struct DockerConfigJson {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: String,
}

/// Finds login credentials for `registry` among docker-config-json pull secrets.
///
/// Secrets of any other type, unparseable payloads and entries that do not decode to
/// `user:pass` are skipped. `None` means the registry is accessed anonymously.
pub fn resolve(registry: &str, secrets: &[Secret]) -> Option<Credential> {
    let registry = canonical_registry_host(registry);

    secrets
        .iter()
        .filter(|secret| secret.type_.as_deref() == Some(DOCKER_CONFIG_JSON_TYPE))
        .filter_map(|secret| {
            let payload = secret.data.as_ref()?.get(DOCKER_CONFIG_JSON_KEY)?;
            match serde_json::from_slice::<DockerConfigJson>(&payload.0) {
                Ok(config) => Some(config),
                Err(e) => {
                    debug!(
                        "Skipping pull secret {}: malformed {} payload: {}",
                        secret.metadata.name.as_deref().unwrap_or_default(),
                        DOCKER_CONFIG_JSON_KEY,
                        e
                    );
                    None
                }
            }
        })
        .flat_map(|config| config.auths.into_iter())
        .filter(|(host, entry)| !entry.auth.is_empty() && normalize_host(host) == registry)
        .find_map(|(host, entry)| decode_auth(&host, &entry.auth))
}

/// Reduces a docker config key such as `https://index.docker.io/v1/` to a bare host.
fn normalize_host(key: &str) -> String {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = without_scheme.split('/').next().unwrap_or_default();
    canonical_registry_host(host)
}

fn decode_auth(host: &str, auth: &str) -> Option<Credential> {
    let decoded = STANDARD.decode(auth.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credential {
        registry: normalize_host(host),
        username: username.to_string(),
        password: SecretString::from(password),
    })
}
