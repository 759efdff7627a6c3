//! `schedbench wait`: report scheduling latency until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use schedbench_client::KubeClient;
use schedbench_monitor::{LatencyMonitor, SchedulingCache, TracingSink};

use crate::cli::WaitArgs;
use crate::signal;

pub async fn run(args: WaitArgs) -> Result<()> {
    let client_config = args.client_config();
    client_config
        .validate()
        .context("invalid client configuration")?;
    client_config.log_summary();

    let client = KubeClient::from_config(&client_config).context("failed to build Kubernetes client")?;
    let scope = args.scope();
    info!(namespace = %scope, "Watching pods");

    let cache = Arc::new(SchedulingCache::start(Arc::new(client), scope));
    let monitor = LatencyMonitor::new(cache.clone(), Arc::new(TracingSink), args.monitor_config());

    let cancel = CancellationToken::new();
    signal::cancel_on_signal(cancel.clone());

    let result = monitor.run(cancel).await;
    cache.stop();
    result.context("latency monitor failed")
}
