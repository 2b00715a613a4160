use crate::bearer_token;
use crate::config::Config;
use crate::credentials;
use crate::error::{Error, Result};
use crate::image_reference::ImageReference;
use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Certificate, Client, Method, StatusCode};
use std::fs;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

static DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

// Listing the index/list types makes multi-arch tags return the index digest
static MANIFEST_MEDIA_TYPES: [&str; 4] = [
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
            headers: HeaderMap::new(),
        }
    }

    pub fn head(url: &str) -> Self {
        Self {
            method: Method::HEAD,
            url: url.to_string(),
            headers: HeaderMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Sends one HTTP request. Implemented by [`reqwest::Client`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl HttpTransport for Client {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
        } = request;
        let transport_error = |e: reqwest::Error| Error::Transport {
            url: url.clone(),
            source: Box::new(e),
        };

        let response = self
            .request(method, &url)
            .headers(headers)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

pub fn create_client(config: &Config) -> anyhow::Result<Client> {
    info!("Initializing OCI Registry HTTP client");
    // System certificates are loaded automatically with rustls-tls-native-roots
    let mut client_builder = Client::builder();

    for file_path in &config.tls.ca_certificate_paths {
        let file_content = fs::read(file_path)
            .with_context(|| format!("Failed to read file {}", file_path.display()))?;
        let cert = Certificate::from_pem(&file_content)
            .with_context(|| format!("Failed to parse certificate {}", file_path.display()))?;
        client_builder = client_builder.add_root_certificate(cert);
    }

    client_builder.build().context("Failed to build HTTP client")
}

/// Returns the digest the registry currently serves for `image`'s tag.
///
/// Sends a HEAD for the manifest, with basic credentials from the pull secrets when
/// available. A `401` is answered once with a bearer token obtained from the
/// challenge; a second `401` is returned as an error.
pub async fn resolve_digest(
    http: &dyn HttpTransport,
    image: &str,
    secrets: &[Secret],
) -> Result<String> {
    let reference = ImageReference::parse(image);
    let url = format!(
        "https://{}/v2/{}/manifests/{}",
        reference.registry, reference.repository, reference.tag
    );

    let mut request = manifest_request(&url);
    if let Some(credential) = credentials::resolve(&reference.registry, secrets) {
        if let Ok(value) = HeaderValue::from_str(&credential.basic_auth_header()) {
            request.headers.insert(AUTHORIZATION, value);
        }
    }

    debug!("Fetching manifest digest for {} from {}", reference, url);
    let mut response = http.send(request).await?;

    if response.status == StatusCode::UNAUTHORIZED {
        let challenge = response
            .headers
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                Error::Protocol(format!("401 from {} without a WWW-Authenticate header", url))
            })?;
        let token = bearer_token::exchange(http, challenge, &reference.registry, secrets).await?;

        let mut retry = manifest_request(&url);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| Error::Protocol(format!("token for {} is not a valid header value", url)))?;
        retry.headers.insert(AUTHORIZATION, bearer);
        response = http.send(retry).await?;
    }

    if response.status != StatusCode::OK {
        return Err(Error::UnexpectedStatus {
            status: response.status,
            url,
        });
    }

    response
        .headers
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|value| value.to_str().ok())
        .filter(|digest| !digest.is_empty())
        .map(str::to_string)
        .ok_or(Error::MissingDigest { url })
}

fn manifest_request(url: &str) -> HttpRequest {
    let mut request = HttpRequest::head(url);
    if let Ok(accept) = HeaderValue::from_str(&MANIFEST_MEDIA_TYPES.join(", ")) {
        request.headers.insert(ACCEPT, accept);
    }
    request
}
