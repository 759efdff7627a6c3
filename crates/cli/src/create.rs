//! `schedbench create`: submit a batch of pods and time it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info};

use schedbench_client::KubeClient;
use schedbench_create::{build_batch, load_template, CreateError, CreationEngine};

use crate::cli::CreateArgs;

pub async fn run(args: CreateArgs) -> Result<()> {
    if args.concurrency == 0 {
        return Err(CreateError::InvalidConcurrency.into());
    }

    let template = load_template(&args.pod_template)
        .with_context(|| format!("failed to load pod template {}", args.pod_template.display()))?;

    let client_config = args
        .connection
        .client_config()
        .with_concurrency(args.concurrency);
    client_config
        .validate()
        .context("invalid client configuration")?;
    client_config.log_summary();

    let client = KubeClient::from_config(&client_config).context("failed to build Kubernetes client")?;
    let engine = CreationEngine::new(Arc::new(client), args.engine_config());
    let batch = build_batch(&template, args.count);

    info!(
        base = batch.base(),
        count = args.count,
        concurrency = args.concurrency,
        "Creating pods"
    );

    let start = Instant::now();
    match engine.run_batch(batch).await {
        Ok(_) => {
            info!(
                "create {} pods in {} milliseconds by {} concurrency.",
                args.count,
                start.elapsed().as_millis(),
                args.concurrency
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Pod creation incomplete");
            Err(e).context("pod creation did not complete")
        }
    }
}
