use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use schedbench_core::config::{DEFAULT_BURST, DEFAULT_QPS};
use schedbench_core::{ClientConfig, NamespaceScope};
use schedbench_create::{EngineConfig, RetryPolicy};
use schedbench_monitor::MonitorConfig;

/// Scheduler benchmark for Kubernetes.
///
/// `create` floods the API server with pods from a template; `wait` reports
/// how quickly the scheduler places them.
#[derive(Parser, Debug)]
#[command(name = "schedbench", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create pods from a template with bounded concurrency.
    Create(CreateArgs),
    /// Report scheduling latency of pods until interrupted.
    Wait(WaitArgs),
}

/// How to reach the API server.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Path to control plane kubeconfig file.
    #[arg(long, env = "SCHEDBENCH_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Address of the Kubernetes API server. Overrides any value in the kubeconfig.
    #[arg(long, env = "SCHEDBENCH_MASTER")]
    pub master: Option<String>,
}

impl ConnectionArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            master: self.master.clone(),
            kubeconfig: self.kubeconfig.clone(),
            ..ClientConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Path to pod template (YAML or JSON).
    #[arg(long)]
    pub pod_template: PathBuf,

    /// Number of pods to create.
    #[arg(long)]
    pub count: usize,

    /// Number of concurrent create requests.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Attempts per pod before it is abandoned (0 retries forever).
    #[arg(long, env = "SCHEDBENCH_MAX_ATTEMPTS", default_value_t = 10)]
    pub max_attempts: u32,

    /// Seconds between progress lines.
    #[arg(long, default_value_t = 1)]
    pub progress_interval_secs: u64,
}

impl CreateArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            concurrency: self.concurrency,
            retry: RetryPolicy::default().with_max_attempts(self.max_attempts),
            progress_interval: Duration::from_secs(self.progress_interval_secs.max(1)),
        }
    }
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// QPS to use while talking with the API server.
    #[arg(long, default_value_t = DEFAULT_QPS)]
    pub kube_api_qps: f32,

    /// Burst to use while talking with the API server.
    #[arg(long, default_value_t = DEFAULT_BURST)]
    pub kube_api_burst: u32,

    /// Namespace to watch (all namespaces if unset).
    #[arg(long)]
    pub namespace: Option<String>,

    /// Seconds between reports.
    #[arg(long, default_value_t = 5)]
    pub interval_secs: u64,

    /// Seconds to wait for the initial pod list.
    #[arg(long, default_value_t = 60)]
    pub sync_timeout_secs: u64,
}

impl WaitArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            qps: self.kube_api_qps,
            burst: self.kube_api_burst,
            ..self.connection.client_config()
        }
    }

    pub fn scope(&self) -> NamespaceScope {
        NamespaceScope::from_option(self.namespace.as_deref())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("schedbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_create_flags() {
        let cli = parse(&[
            "create",
            "--master",
            "https://127.0.0.1:6443",
            "--pod-template",
            "pod.yaml",
            "--count",
            "100",
            "--concurrency",
            "8",
        ]);
        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.count, 100);
        assert_eq!(args.pod_template, PathBuf::from("pod.yaml"));

        let engine = args.engine_config();
        assert_eq!(engine.concurrency, 8);
        assert_eq!(engine.retry.max_attempts, Some(10));
        assert_eq!(engine.progress_interval, Duration::from_secs(1));

        let client = args.connection.client_config().with_concurrency(args.concurrency);
        assert_eq!(client.qps, 8.0);
        assert_eq!(client.burst, 16);
    }

    #[test]
    fn test_create_unbounded_retries() {
        let cli = parse(&["create", "--pod-template", "p.yaml", "--count", "1", "--max-attempts", "0"]);
        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.engine_config().retry.max_attempts, None);
    }

    #[test]
    fn test_create_requires_template() {
        let result = Cli::try_parse_from(["schedbench", "create", "--count", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_wait_defaults() {
        let cli = parse(&["wait"]);
        let Command::Wait(args) = cli.command else {
            panic!("expected wait");
        };
        let client = args.client_config();
        assert_eq!(client.qps, 20.0);
        assert_eq!(client.burst, 30);
        assert_eq!(args.scope(), NamespaceScope::All);
        let monitor = args.monitor_config();
        assert_eq!(monitor.interval, Duration::from_secs(5));
        assert_eq!(monitor.sync_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_wait_overrides() {
        let cli = parse(&[
            "wait",
            "--kube-api-qps",
            "50",
            "--kube-api-burst",
            "100",
            "--namespace",
            "bench",
            "--interval-secs",
            "2",
        ]);
        let Command::Wait(args) = cli.command else {
            panic!("expected wait");
        };
        assert_eq!(args.client_config().qps, 50.0);
        assert_eq!(args.client_config().burst, 100);
        assert_eq!(args.scope(), NamespaceScope::Namespace("bench".into()));
        assert_eq!(args.monitor_config().interval, Duration::from_secs(2));
    }
}
