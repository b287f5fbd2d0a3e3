//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{BridgeConfig, FailurePolicy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Outcome of validating one configuration file
#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

/// What the bridge would do with this configuration
#[derive(Serialize)]
struct ConfigSummary {
    amplifier: String,
    listener: String,
    sinks: Vec<String>,
    failure_policy: FailurePolicy,
    startup_test_triggers: bool,
}

impl ValidationReport {
    fn invalid(config_path: String, error: impl ToString) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error.to_string()),
            warnings: Vec::new(),
            summary: None,
        }
    }

    fn valid(config_path: String, config: &BridgeConfig) -> Self {
        Self {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(config),
            summary: Some(ConfigSummary::from(config)),
        }
    }

    fn print(&self) {
        if !self.valid {
            println!("✗ Invalid bridge configuration: {}", self.config_path);
            if let Some(error) = &self.error {
                println!("   └─ {}", error);
            }
            return;
        }

        println!("✓ Bridge configuration OK: {}", self.config_path);
        if let Some(summary) = &self.summary {
            println!("   ├─ Amplifier: {}", summary.amplifier);
            println!("   ├─ Listener: {}", summary.listener);
            println!("   ├─ Sinks: {}", summary.sinks.join(" -> "));
            println!("   ├─ Failure policy: {:?}", summary.failure_policy);
            println!("   └─ Startup test triggers: {}", summary.startup_test_triggers);
        }
        for warning in &self.warnings {
            println!("⚠ {}", warning);
        }
    }
}

impl From<&BridgeConfig> for ConfigSummary {
    fn from(config: &BridgeConfig) -> Self {
        let mut sinks = vec!["amplifier".to_string()];
        if config.stream_bus.enabled {
            sinks.push(format!("stream_bus:{}", config.stream_bus.name));
        }
        if config.diagnostic.enabled {
            sinks.push("diagnostic".to_string());
        }

        Self {
            amplifier: config.amplifier.address(),
            listener: config.listener.address(),
            sinks,
            failure_policy: config.dispatch.failure_policy,
            startup_test_triggers: config.startup_test_triggers,
        }
    }
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let report = check_file(&args.config);
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize validation report")?;
        println!("{}", json);
    } else {
        report.print();
    }

    anyhow::ensure!(report.valid, "Configuration validation failed");
    Ok(())
}

fn check_file(path: &Path) -> ValidationReport {
    let config_path = path.display().to_string();
    if !path.exists() {
        let error = format!("File not found: {}", config_path);
        return ValidationReport::invalid(config_path, error);
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(config) => ValidationReport::valid(config_path, &config),
        Err(e) => ValidationReport::invalid(config_path, e),
    }
}

/// Non-fatal issues worth pointing out
fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.stream_bus.enabled && !config.diagnostic.enabled {
        warnings.push("Only the amplifier sink is enabled".to_string());
    }
    if config.amplifier.sync_threshold_ms > 10 {
        warnings.push(format!(
            "amplifier.sync_threshold_ms = {} accepts coarse clock alignment",
            config.amplifier.sync_threshold_ms
        ));
    }
    if config.amplifier.trigger_duration_ms == 0 {
        warnings.push("amplifier.trigger_duration_ms is 0, events have no duration".to_string());
    }
    if config.dispatch.failure_policy == FailurePolicy::FailFast {
        warnings.push("fail_fast: a failing sink hides the trigger from later sinks".to_string());
    }

    warnings
}
