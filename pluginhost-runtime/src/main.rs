//! # Plugin Execution Runtime Binary
//!
//! Loads the runtime configuration, discovers plugin manifests from the
//! configured roots, starts the worker-pool backend and job scheduler, and
//! serves the admin/status surface until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! pluginhost-runtime --config runtime.toml
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use pluginhost_runtime::backend::worker_pool::WorkerPoolBackend;
use pluginhost_runtime::backend::ExecutionBackend;
use pluginhost_runtime::config::RuntimeConfig;
use pluginhost_runtime::plugin::{LoadedPlugin, PluginManifest, PluginRegistry};
use pluginhost_runtime::scheduler::broker::JobBroker;
use pluginhost_runtime::server::{create_server, AppState};
use pluginhost_sdk::PlatformBundle;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the runtime configuration file.
    #[arg(short, long, default_value = "runtime.toml")]
    config: String,
}

/// Walk `discovery_roots` for `manifest_filename` and load each as an opaque
/// `PluginManifest` (§11: manifest schema validation is out of scope here).
fn discover_plugins(config: &RuntimeConfig) -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    for root in &config.plugins.discovery_roots {
        let path = std::path::Path::new(root).join(&config.plugins.manifest_filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "skipping plugin discovery root");
                continue;
            }
        };
        let manifest: PluginManifest = serde_json::from_str(&content)?;
        tracing::info!(plugin_id = %manifest.id, version = %manifest.version, "discovered plugin manifest");
        let artifact_root = std::path::Path::new(root).join(".artifacts").to_string_lossy().to_string();
        registry.insert(LoadedPlugin::new(manifest).with_outdir(artifact_root));
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RuntimeConfig::load(&args.config).unwrap_or_else(|e| {
        eprintln!("failed to load {}: {e}, falling back to defaults", args.config);
        RuntimeConfig::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(&config.logging.level)
        .init();

    config.validate()?;

    let registry = Arc::new(tokio::sync::RwLock::new(discover_plugins(&config)?));
    let platform = Arc::new(PlatformBundle::default());

    let pool = Arc::new(WorkerPoolBackend::new(
        config.worker_pool.clone(),
        config.plugins.worker_command.clone(),
        config.plugins.worker_args.clone(),
        registry.clone(),
        platform,
    ));
    let backend: Arc<dyn ExecutionBackend> = pool.clone();

    if let Err(e) = pool.warmup(".").await {
        tracing::warn!(error = %e, "worker pool warmup failed, continuing with an empty pool");
    }

    let broker = Arc::new(JobBroker::new(backend.clone(), registry.clone(), config.scheduler.clone()));

    let scheduler_tick = config.scheduler.tick_interval;
    let ticking_broker = broker.clone();
    let scheduler_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scheduler_tick);
        loop {
            ticker.tick().await;
            ticking_broker.tick().await;
        }
    });

    let health_check_interval = config.worker_pool.health_check_interval;
    let health_pool = pool.clone();
    let health_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(health_check_interval);
        loop {
            ticker.tick().await;
            health_pool.health_check().await;
        }
    });

    let load_tick = config.scheduler.tick_interval;
    let load_pool = pool.clone();
    let load_broker = broker.clone();
    let load_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(load_tick);
        loop {
            ticker.tick().await;
            let cpu = load_pool.utilization().await;
            let depth = load_broker.queue_depth().await;
            load_broker.sample_load(cpu, depth).await;
        }
    });

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        backend,
        worker_pool: Some(pool.clone()),
        broker: Some(broker),
    };

    let app = create_server(state).await?;
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(%addr, "starting plugin execution runtime admin surface");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_task.abort();
    health_task.abort();
    load_task.abort();
    pool.shutdown_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining worker pool");
}
