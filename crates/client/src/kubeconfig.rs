//! Kubeconfig loading.
//!
//! Supports the commonly used fields: cluster server, CA bundle (file or
//! inline), insecure-skip-tls-verify, bearer token (inline or file), basic
//! auth and client certificates. Exec and auth-provider plugins are rejected.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use schedbench_core::ClientConfig;

use crate::error::ClientError;

// ── File format ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub certificate_authority: Option<PathBuf>,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<PathBuf>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<PathBuf>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

// ── Resolved connection ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// Everything needed to open an HTTP client to one API server.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub server: String,
    pub auth: Auth,
    /// PEM CA bundle to trust in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM client certificate followed by its private key.
    pub identity_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl ConnectionInfo {
    /// Plain connection to `server` with no credentials.
    pub fn anonymous(server: &str) -> Self {
        Self {
            server: server.to_string(),
            auth: Auth::None,
            ca_pem: None,
            identity_pem: None,
            insecure_skip_tls_verify: false,
        }
    }

    /// Resolve a connection from flags, `$KUBECONFIG` or `~/.kube/config`.
    ///
    /// `master` overrides the kubeconfig's server; with no kubeconfig at all
    /// `master` alone is used without credentials.
    pub fn from_client_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut info = match config.kubeconfig_path() {
            Some(path) => {
                debug!(path = %path.display(), "Loading kubeconfig");
                Kubeconfig::read(&path)?.resolve(base_dir(&path))?
            }
            None => match &config.master {
                Some(master) => Self::anonymous(master),
                None => {
                    return Err(ClientError::Config(
                        "no kubeconfig found and no master URL given".into(),
                    ))
                }
            },
        };
        if let Some(master) = &config.master {
            info.server = master.clone();
        }
        Ok(info)
    }
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn decode_data(field: &str, data: &str) -> Result<Vec<u8>, ClientError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| ClientError::Config(format!("invalid base64 in {field}: {e}")))
}

fn read_relative(dir: &Path, path: &Path) -> Result<Vec<u8>, ClientError> {
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    };
    std::fs::read(&full).map_err(|e| {
        ClientError::Config(format!("failed to read {}: {e}", full.display()))
    })
}

fn inline_or_file(
    field: &str,
    data: Option<&str>,
    file: Option<&Path>,
    dir: &Path,
) -> Result<Option<Vec<u8>>, ClientError> {
    if let Some(data) = data {
        return decode_data(field, data).map(Some);
    }
    file.map(|path| read_relative(dir, path)).transpose()
}

impl Kubeconfig {
    pub fn read(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read kubeconfig {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ClientError> {
        serde_yaml::from_str(text)
            .map_err(|e| ClientError::Config(format!("invalid kubeconfig: {e}")))
    }

    /// Resolve the current context. Relative file references are read
    /// relative to `dir`.
    pub fn resolve(&self, dir: &Path) -> Result<ConnectionInfo, ClientError> {
        let context_name = self
            .current_context
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ClientError::Config("kubeconfig has no current-context".into()))?;

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                ClientError::Config(format!("context {context_name:?} not found in kubeconfig"))
            })?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                ClientError::Config(format!("cluster {:?} not found in kubeconfig", context.cluster))
            })?;

        let server = cluster
            .server
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ClientError::Config(format!("cluster {:?} has no server", context.cluster))
            })?;

        let default_user = AuthInfo::default();
        let user = match &context.user {
            Some(name) => self
                .users
                .iter()
                .find(|u| &u.name == name)
                .map(|u| &u.user)
                .ok_or_else(|| ClientError::Config(format!("user {name:?} not found in kubeconfig")))?,
            None => &default_user,
        };

        if user.exec.is_some() || user.auth_provider.is_some() {
            return Err(ClientError::Config(
                "exec and auth-provider credentials are not supported".into(),
            ));
        }

        let auth = if let Some(token) = user.token.as_deref().filter(|t| !t.is_empty()) {
            Auth::Bearer(token.to_string())
        } else if let Some(file) = &user.token_file {
            let raw = read_relative(dir, file)?;
            Auth::Bearer(String::from_utf8_lossy(&raw).trim().to_string())
        } else if let (Some(username), Some(password)) = (&user.username, &user.password) {
            Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            Auth::None
        };

        let ca_pem = inline_or_file(
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            dir,
        )?;

        let cert = inline_or_file(
            "client-certificate-data",
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            dir,
        )?;
        let key = inline_or_file(
            "client-key-data",
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            dir,
        )?;
        let identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                if !cert.ends_with(b"\n") {
                    cert.push(b'\n');
                }
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(ClientError::Config(
                    "client certificate and key must be given together".into(),
                ))
            }
        };

        Ok(ConnectionInfo {
            server,
            auth,
            ca_pem,
            identity_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: bench
clusters:
- name: lab
  cluster:
    server: https://10.0.0.1:6443
    certificate-authority-data: Q0EtUEVN
- name: other
  cluster:
    server: https://10.9.9.9:6443
contexts:
- name: bench
  context:
    cluster: lab
    user: admin
- name: elsewhere
  context:
    cluster: other
    user: admin
users:
- name: admin
  user:
    token: s3cr3t
"#;

    #[test]
    fn test_resolves_current_context() {
        let info = Kubeconfig::parse(KUBECONFIG)
            .unwrap()
            .resolve(Path::new("."))
            .unwrap();
        assert_eq!(info.server, "https://10.0.0.1:6443");
        assert_eq!(info.auth, Auth::Bearer("s3cr3t".into()));
        assert_eq!(info.ca_pem.as_deref(), Some(&b"CA-PEM"[..]));
        assert!(info.identity_pem.is_none());
        assert!(!info.insecure_skip_tls_verify);
    }

    #[test]
    fn test_missing_context_is_config_error() {
        let mut cfg = Kubeconfig::parse(KUBECONFIG).unwrap();
        cfg.current_context = Some("nope".into());
        let err = cfg.resolve(Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_exec_plugin_rejected() {
        let text = r#"
current-context: c
clusters: [{name: k, cluster: {server: "https://k"}}]
contexts: [{name: c, context: {cluster: k, user: u}}]
users: [{name: u, user: {exec: {command: aws}}}]
"#;
        let err = Kubeconfig::parse(text).unwrap().resolve(Path::new(".")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_token_file_and_client_cert_read_relative_to_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token"), "file-token\n").unwrap();
        std::fs::write(dir.path().join("client.crt"), "CERT").unwrap();
        std::fs::write(dir.path().join("client.key"), "KEY\n").unwrap();
        let text = r#"
current-context: c
clusters: [{name: k, cluster: {server: "https://k", insecure-skip-tls-verify: true}}]
contexts: [{name: c, context: {cluster: k, user: u}}]
users:
- name: u
  user:
    tokenFile: token
    client-certificate: client.crt
    client-key: client.key
"#;
        let info = Kubeconfig::parse(text).unwrap().resolve(dir.path()).unwrap();
        assert_eq!(info.auth, Auth::Bearer("file-token".into()));
        assert_eq!(info.identity_pem.as_deref(), Some(&b"CERT\nKEY\n"[..]));
        assert!(info.insecure_skip_tls_verify);
    }

    #[test]
    fn test_master_overrides_kubeconfig_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG).unwrap();
        let config = ClientConfig {
            kubeconfig: Some(path),
            master: Some("http://127.0.0.1:8001".into()),
            ..Default::default()
        };
        let info = ConnectionInfo::from_client_config(&config).unwrap();
        assert_eq!(info.server, "http://127.0.0.1:8001");
        assert_eq!(info.auth, Auth::Bearer("s3cr3t".into()));
    }

    #[test]
    fn test_basic_auth() {
        let text = r#"
current-context: c
clusters: [{name: k, cluster: {server: "https://k"}}]
contexts: [{name: c, context: {cluster: k, user: u}}]
users: [{name: u, user: {username: alice, password: pw}}]
"#;
        let info = Kubeconfig::parse(text).unwrap().resolve(Path::new(".")).unwrap();
        assert_eq!(
            info.auth,
            Auth::Basic {
                username: "alice".into(),
                password: "pw".into()
            }
        );
    }
}
