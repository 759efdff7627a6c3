//! [`ControlPlane`] over the Kubernetes REST API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use schedbench_core::{ClientConfig, NamespaceScope, Pod, PodList};

use crate::error::{ClientError, Status};
use crate::kubeconfig::{Auth, ConnectionInfo};
use crate::rate_limit::RateLimiter;
use crate::traits::{ControlPlane, WatchStream};
use crate::watch;

/// Timeout for unary calls (create, list). Watches are long-lived and
/// bounded server-side by `timeoutSeconds` instead.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the server keeps one watch open before closing it.
const WATCH_TIMEOUT_SECS: u64 = 300;

/// HTTP client for the core/v1 pods API.
pub struct KubeClient {
    base_url: String,
    http: reqwest::Client,
    auth: Auth,
    limiter: RateLimiter,
}

impl KubeClient {
    /// Build a client from resolved connection details.
    pub fn new(info: ConnectionInfo, limiter: RateLimiter) -> Result<Self, ClientError> {
        let parsed = Url::parse(&info.server)
            .map_err(|e| ClientError::Config(format!("invalid server URL {:?}: {e}", info.server)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ClientError::Config(format!(
                "unsupported server URL scheme {:?}",
                parsed.scheme()
            )));
        }

        // Client identities are parsed for rustls; native-tls rejects them.
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10));
        if let Some(ca) = &info.ca_pem {
            let cert = reqwest::Certificate::from_pem(ca)
                .map_err(|e| ClientError::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(pem) = &info.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| ClientError::Config(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        if info.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        info!(server = %info.server, "Kubernetes client initialized");

        Ok(Self {
            base_url: info.server.trim_end_matches('/').to_string(),
            http,
            auth: info.auth,
            limiter,
        })
    }

    /// Resolve the kubeconfig and build a rate-limited client.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let info = ConnectionInfo::from_client_config(config)?;
        Self::new(info, RateLimiter::new(config.qps, config.burst))
    }

    fn pods_url(&self, scope: &NamespaceScope) -> String {
        match scope {
            NamespaceScope::All => format!("{}/api/v1/pods", self.base_url),
            NamespaceScope::Namespace(ns) => {
                format!("{}/api/v1/namespaces/{}/pods", self.base_url, ns)
            }
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }

    /// Send a request after waiting on the limiter, mapping failures to
    /// typed errors.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        self.limiter.acquire().await;
        let resp = self.authorize(request).send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let code = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::from_status(code, Status::from_body(&body)))
    }
}

#[async_trait]
impl ControlPlane for KubeClient {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError> {
        let url = self.pods_url(&NamespaceScope::Namespace(namespace.to_string()));
        debug!(namespace, name = pod.name(), "Creating pod");
        let resp = self
            .send(self.http.post(&url).timeout(REQUEST_TIMEOUT).json(pod))
            .await?;
        resp.json()
            .await
            .map_err(|e| ClientError::Decode(format!("created pod: {e}")))
    }

    async fn list_pods(&self, scope: &NamespaceScope) -> Result<PodList, ClientError> {
        let url = self.pods_url(scope);
        debug!(%scope, "Listing pods");
        let resp = self
            .send(
                self.http
                    .get(&url)
                    .timeout(REQUEST_TIMEOUT)
                    .query(&[("resourceVersion", "0")]),
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| ClientError::Decode(format!("pod list: {e}")))
    }

    async fn watch_pods(
        &self,
        scope: &NamespaceScope,
        resource_version: &str,
    ) -> Result<WatchStream, ClientError> {
        let url = self.pods_url(scope);
        debug!(%scope, resource_version, "Opening pod watch");
        let timeout = WATCH_TIMEOUT_SECS.to_string();
        let resp = self
            .send(self.http.get(&url).query(&[
                ("watch", "1"),
                ("resourceVersion", resource_version),
                ("allowWatchBookmarks", "true"),
                ("timeoutSeconds", timeout.as_str()),
            ]))
            .await?;
        Ok(watch::event_stream(resp.bytes_stream()))
    }
}
