//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{BridgeConfig, FailurePolicy};
use std::time::Duration;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Bridge, BridgeOptions, SourceOptions};

/// Execute the `run` command
pub async fn run_bridge(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;

    info!(
        amplifier = %config.amplifier.address(),
        listener = %config.listener.address(),
        stream_bus = config.stream_bus.enabled,
        diagnostic = config.diagnostic.enabled,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let bridge = Bridge::new(BridgeOptions {
        config,
        sources: SourceOptions {
            stdin: args.stdin,
            heartbeat: args
                .heartbeat
                .map(|code| (code, Duration::from_millis(args.heartbeat_interval_ms))),
        },
    });

    let stats = bridge
        .run(shutdown_signal())
        .await
        .context("Bridge execution failed")?;

    info!(
        triggers = stats.dispatch.total_triggers,
        duration_secs = stats.duration.as_secs_f64(),
        "Bridge stopped"
    );
    stats.print_summary();
    Ok(())
}

/// Load the configuration file (or defaults) and apply CLI overrides
pub fn load_config(args: &RunArgs) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };

    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).map_err(CliError::from)?;
    Ok(config)
}

fn apply_overrides(config: &mut BridgeConfig, args: &RunArgs) {
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding amplifier host from CLI");
        config.amplifier.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding amplifier port from CLI");
        config.amplifier.port = port;
    }
    if let Some(port) = args.listen_port {
        config.listener.port = port;
    }
    if args.no_stream_bus {
        config.stream_bus.enabled = false;
    }
    if args.no_diagnostic {
        config.diagnostic.enabled = false;
    }
    if args.no_test_triggers {
        config.startup_test_triggers = false;
    }
    if args.fail_fast {
        config.dispatch.failure_policy = FailurePolicy::FailFast;
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &BridgeConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Amplifier:");
    println!("  Address: {}", config.amplifier.address());
    println!(
        "  Sync: up to {} rounds, threshold {} ms",
        config.amplifier.sync_max_rounds, config.amplifier.sync_threshold_ms
    );
    println!("  Trigger duration: {} ms", config.amplifier.trigger_duration_ms);
    println!("\nListener: {}", config.listener.address());

    println!("\nSinks:");
    println!("  - amplifier");
    if config.stream_bus.enabled {
        println!(
            "  - stream bus '{}' ({}) -> {} [{:?}]",
            config.stream_bus.name,
            config.stream_bus.stream_type,
            config.stream_bus.target,
            config.stream_bus.format
        );
    }
    if config.diagnostic.enabled {
        println!("  - diagnostic (stdout)");
    }
    println!("\nFailure policy: {:?}", config.dispatch.failure_policy);
    println!("Startup test triggers: {}", config.startup_test_triggers);
    println!();
}
