use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Default client-side QPS for long-running watchers.
pub const DEFAULT_QPS: f32 = 20.0;

/// Default client-side burst for long-running watchers.
pub const DEFAULT_BURST: u32 = 30;

// ── Control plane client ──────────────────────────────────────

/// How to reach the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API server URL; overrides the kubeconfig's cluster server.
    pub master: Option<String>,
    /// Explicit kubeconfig path.
    pub kubeconfig: Option<PathBuf>,
    /// Sustained requests per second allowed by the client-side limiter.
    pub qps: f32,
    /// Requests allowed above `qps` in a burst.
    pub burst: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            master: None,
            kubeconfig: None,
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
        }
    }
}

impl ClientConfig {
    /// Limiter settings tuned for `concurrency` parallel creators:
    /// one request per worker per second, twice that in bursts.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.qps = concurrency as f32;
        self.burst = (concurrency as u32).saturating_mul(2);
        self
    }

    /// Resolve the kubeconfig to read.
    ///
    /// Order: explicit path, first entry of `$KUBECONFIG`, `~/.kube/config`
    /// if it exists. `None` means no kubeconfig is available.
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Some(path.clone());
        }
        if let Some(list) = env_opt("KUBECONFIG") {
            let sep = if cfg!(windows) { ';' } else { ':' };
            if let Some(first) = list.split(sep).find(|p| !p.is_empty()) {
                return Some(PathBuf::from(first));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(".kube").join("config"))
            .filter(|path| path.exists())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.qps > 0.0) {
            return Err(CoreError::Config(format!("qps must be positive, got {}", self.qps)));
        }
        if self.burst == 0 {
            return Err(CoreError::Config("burst must be at least 1".into()));
        }
        if self.master.is_none() && self.kubeconfig_path().is_none() {
            return Err(CoreError::Config(
                "no kubeconfig found and --master not set".into(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            master = self.master.as_deref().unwrap_or("(from kubeconfig)"),
            kubeconfig = %self
                .kubeconfig_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string()),
            qps = self.qps,
            burst = self.burst,
            "Client config loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_concurrency_derives_limits() {
        let cfg = ClientConfig::default().with_concurrency(8);
        assert_eq!(cfg.qps, 8.0);
        assert_eq!(cfg.burst, 16);
    }

    #[test]
    fn test_explicit_kubeconfig_wins() {
        let cfg = ClientConfig {
            kubeconfig: Some(PathBuf::from("/tmp/explicit")),
            ..Default::default()
        };
        assert_eq!(cfg.kubeconfig_path(), Some(PathBuf::from("/tmp/explicit")));
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let cfg = ClientConfig {
            master: Some("http://127.0.0.1:8080".into()),
            burst: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_accepts_master_only() {
        let cfg = ClientConfig {
            master: Some("http://127.0.0.1:8080".into()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
