//! Startup output and logging setup.

use std::env;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{args::Args, config, config::EnvVarConfig, env_vars};
use egressgate_core::{
    AddressPolicyProvider, ClientAccessProvider, EgressPolicyProvider, ForwardingProvider,
    PlatformProvider,
};

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info` (`debug` with
/// `--verbose`, `warn` with `--quiet`).
pub fn init_logging(args: &Args) {
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if args.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("⚠️  Logging already initialised: {err}");
    }
}

/// Print startup banner with configuration
pub fn print_startup_info(args: &Args, config: &EnvVarConfig) {
    if args.quiet {
        println!(
            "🚀 egressgate v{} starting on {}:{}",
            env!("CARGO_PKG_VERSION"),
            args.bind,
            args.listen
        );
        return;
    }

    println!("🛡️  {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("   {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("📡 Network Configuration:");
    println!("   Listen:         {}:{}", args.bind, args.listen);
    println!("   Platform:       {}", config.cloud_platform());
    println!("   Proxy Type:     {}", config.deployment_mode());
    println!(
        "   Interfaces:     internal {}, external {}",
        config.internal_interface(),
        config.external_interface()
    );
    println!();

    let settings = config::get_proxy_settings();
    let max_connections = config::get_max_connections();
    println!("🔧 Proxy Configuration:");
    println!("   Upstream Timeout: {} seconds", settings.upstream_timeout.as_secs());
    println!("   Max Body Size:    {} MB", settings.max_body_size_mb());
    if max_connections > 0 {
        println!("   Max Connections:  {max_connections}");
    } else {
        println!("   Max Connections:  unlimited");
    }

    print_policy_config(config);

    if args.verbose {
        print_filter_chains();
        print_env_config();
    }

    println!();
    println!("🚀 Server starting...");
}

/// Print egress policy summary
fn print_policy_config(config: &EnvVarConfig) {
    println!("🔒 Egress Policy:");

    if config.enforce_allowed_egress_domains() {
        let domains = config.allowed_egress_domains().unwrap_or_default();
        let count = domains.split(',').filter(|d| !d.trim().is_empty()).count();
        println!("   Domains:        enforced ({count} patterns)");
    } else {
        println!("   Domains:        not enforced");
    }

    match config.managed_service_range() {
        Some(range) => println!("   Managed Range:  {range} (treated as private)"),
        None => println!("   Managed Range:  none"),
    }

    match config.allowed_proxy_address() {
        Some(address) => println!(
            "   Clients:        127.0.0.1 and {address} ({:?} address)",
            config.allowed_proxy_address_type()
        ),
        None => println!("   Clients:        127.0.0.1 only"),
    }

    println!(
        "   HTTP Upgrade:   {}",
        if config.upgrade_http_requests() { "enabled" } else { "disabled" }
    );

    if config.webhook_target().is_some() {
        println!(
            "   Webhook:        configured (API ingress {})",
            if config.allow_api_ingress() { "allowed" } else { "denied" }
        );
    }

    let metrics = config::get_metrics_export_config();
    if metrics.enabled {
        println!("   Metrics Export: every {} seconds", metrics.interval.as_secs());
    } else {
        println!("   Metrics Export: disabled");
    }
}

fn print_filter_chains() {
    let names = config::get_filter_names();
    println!();
    println!("🧩 Filter Chains:");
    println!("   {:<15} = {}", "AWS", names.aws);
    println!("   {:<15} = {}", "GOOGLE", names.google);
    println!("   {:<15} = {}", "CROSS_PLATFORM", names.cross_platform);
    println!("   {:<15} = {}", "DEBUG", names.debug);
    println!("   {:<15} = {}", "LEGACY", names.legacy);
}

/// Print environment variable configuration status (used in verbose mode)
fn print_env_config() {
    println!();
    println!("🔧 Environment Variables:");

    for &var_name in env_vars::all_env_vars() {
        match env::var(var_name) {
            Ok(value) => {
                // Mask addresses and targets
                let display_value = if var_name.contains("ADDRESS") || var_name.contains("TARGET") {
                    "[CONFIGURED]".to_string()
                } else {
                    value
                };
                println!("   {:<32} = {}", var_name, display_value);
            }
            Err(_) => {
                println!("   {:<32} = [NOT SET]", var_name);
            }
        }
    }
}
