//! `metrics`: counter sink surface.

use anyhow::Result;
use vectra_guard_core::metrics::MetricsSink;
use vectra_guard_core::GuardConfig;

fn sink(config: &GuardConfig) -> MetricsSink {
    MetricsSink::new(MetricsSink::default_path(), config.sandbox.enable_metrics)
}

pub fn cmd_show(config: &GuardConfig, json: bool) -> Result<i32> {
    let snapshot = sink(config).snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(0);
    }
    if snapshot.is_empty() {
        println!("No metrics recorded");
        return Ok(0);
    }
    for (name, value) in snapshot {
        println!("{:<24} {}", name, value);
    }
    Ok(0)
}

pub fn cmd_reset(config: &GuardConfig) -> Result<i32> {
    sink(config).reset()?;
    println!("Metrics reset");
    Ok(0)
}
