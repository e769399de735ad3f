use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use egressgate::args::Args;
use egressgate::config::{self, EnvVarConfig};
use egressgate::connection::{ConnectionLimiter, ConnectionTracker};
use egressgate::proxy::{self, ProxyEngine};
use egressgate::server;
use egressgate_core::defaults;
use egressgate_core::metrics::{LogSink, MetricsExporter};
use egressgate_core::pipeline::{FilterConfiguration, FilterRegistry, FilterSource, SharedServices};
use egressgate_core::{PlatformProvider, ProxyMetrics};

fn exit_with(message: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("❌ {message}: {err}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Validate arguments
    if let Err(err) = args.validate() {
        exit_with("Configuration error", err);
    }
    let listen_addr = match args.listen_addr() {
        Ok(addr) => addr,
        Err(err) => exit_with("Configuration error", err),
    };

    server::init_logging(&args);
    let config = EnvVarConfig::new();
    server::print_startup_info(&args, &config);

    // Filter pipeline
    let metrics = Arc::new(ProxyMetrics::new());
    let services = match SharedServices::system(&config, metrics.clone()) {
        Ok(services) => services,
        Err(err) => exit_with("Failed to initialise services", err),
    };
    let registry = FilterRegistry::new(&config, services);
    let configuration = FilterConfiguration::from_names(&registry, config::get_filter_names());
    let source = FilterSource::new(registry, configuration, config.cloud_platform().clone());

    let tracker = ConnectionTracker::new();
    let engine = match ProxyEngine::new(source, config::get_proxy_settings().clone(), tracker.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(err) => exit_with("Failed to initialise proxy", err),
    };

    let listener = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(err) => exit_with(&format!("Failed to bind to {listen_addr}"), err),
    };
    println!("✅ egressgate is running on {listen_addr}");

    // Metrics export
    let (export_stop_tx, export_stop_rx) = watch::channel(false);
    let export_config = config::get_metrics_export_config();
    let exporter = if export_config.enabled {
        info!(interval_secs = export_config.interval.as_secs(), "Metrics export enabled");
        let exporter = MetricsExporter::new(metrics.clone(), Arc::new(LogSink), export_config.interval);
        Some(tokio::spawn(exporter.run(export_stop_rx)))
    } else {
        info!("Metrics export disabled via ENABLE_METRICS_EXPORT");
        None
    };

    // Accept loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let limiter = ConnectionLimiter::new(config::get_max_connections());
    let server = tokio::spawn(proxy::serve(listener, engine, limiter, shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(err) = server.await {
        error!(error = %err, "Accept loop panicked");
    }

    if tracker.wait_for_shutdown(defaults::SHUTDOWN_TIMEOUT).await {
        info!("All connections closed");
    } else {
        warn!(remaining = tracker.count(), "Shutdown timeout reached, closing remaining connections");
    }

    if let Some(exporter) = exporter {
        let _ = export_stop_tx.send(true);
        if let Err(err) = exporter.await {
            error!(error = %err, "Metrics exporter panicked");
        }
    }
}
