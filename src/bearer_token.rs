use crate::credentials;
use crate::error::{Error, Result};
use crate::oci_registry::{HttpRequest, HttpTransport};
use crate::secret_string::SecretString;
use k8s_openapi::api::core::v1::Secret;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use tracing::debug;

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses `Bearer realm="...",service="...",scope="..."`.
    pub fn parse(header: &str) -> Result<Self> {
        let params = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .unwrap_or(header);

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for part in params.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        let realm = realm
            .filter(|realm| !realm.is_empty())
            .ok_or_else(|| Error::Protocol(format!("no realm in WWW-Authenticate header: {}", header)))?;

        Ok(Self {
            realm,
            service: service.filter(|s| !s.is_empty()),
            scope: scope.filter(|s| !s.is_empty()),
        })
    }

    /// Token endpoint URL: the realm plus `service` and `scope` query parameters when present.
    pub fn token_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.realm)
            .map_err(|e| Error::Protocol(format!("invalid realm {}: {}", self.realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }
        }
        // Avoid a dangling `?` when neither parameter was added
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Obtains a bearer token for the challenge returned by `registry`.
///
/// Basic credentials are looked up for the image registry, not for the host serving
/// the realm: pull secrets are keyed by the registry an image is pulled from.
pub async fn exchange(
    http: &dyn HttpTransport,
    challenge: &str,
    registry: &str,
    secrets: &[Secret],
) -> Result<SecretString> {
    let challenge = AuthChallenge::parse(challenge)?;
    let url = challenge.token_url()?.to_string();

    let mut request = HttpRequest::get(&url);
    if let Some(credential) = credentials::resolve(registry, secrets) {
        debug!(
            "Requesting token from {} as user {} of {}",
            url, credential.username, credential.registry
        );
        if let Ok(value) = HeaderValue::from_str(&credential.basic_auth_header()) {
            request.headers.insert(AUTHORIZATION, value);
        }
    } else {
        debug!("Requesting anonymous token from {}", url);
    }

    let response = http.send(request).await?;
    if !response.status.is_success() {
        return Err(Error::UnexpectedStatus {
            status: response.status,
            url,
        });
    }

    let body: TokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| Error::Protocol(format!("unparseable token response from {}: {}", url, e)))?;

    body.token
        .filter(|token| !token.is_empty())
        .or_else(|| body.access_token.filter(|token| !token.is_empty()))
        .map(SecretString::from)
        .ok_or_else(|| Error::Protocol(format!("no token in response from {}", url)))
}
