// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic resource-governor usage example.
//!
//! Demonstrates:
//! 1. Building a governance context with a scripted memory profile
//! 2. Filling the block cache and reading blocks back
//! 3. Recording telemetry, rolling it up and spotting an anomaly
//! 4. Registering shards and checking activation deferral
//! 5. Driving memory pressure through the monitor cycle
//! 6. Displaying metrics and health
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=resource_governor=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use resource_governor::{
    Block, Governance, GovernanceConfig, MetricPoint, NoopCollector, ScriptedSampler, Tier,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the facade emits)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║         resource-governor: Basic Usage Example                ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and initialize
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring governance...");

    let mut config = GovernanceConfig::default();
    config.resource.max_heap_mb = 1024;
    config.governor.max_total_shard_memory_mb = 60.0;

    // Scripted heap profile: calm, then a spike
    let sampler = Arc::new(ScriptedSampler::from_used_mb([300.0]));
    let governance = Governance::with_parts(config, sampler.clone(), Arc::new(NoopCollector))?;
    println!("   State: {}", governance.state());

    governance.initialize();
    println!("   ✅ Running! State: {}", governance.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Block cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧱 Adding 200 blocks...");
    let blocks: Vec<Block> = (0..200).map(|n| Block::new(n, vec![0u8; 4096])).collect();
    governance.block_cache().add_blocks(blocks, Tier::Hot);

    let recent = governance.block_cache().get_recent_blocks(5);
    println!(
        "   └─ Recent: {:?}",
        recent.iter().map(|b| b.number).collect::<Vec<_>>()
    );
    let stats = governance.block_cache().stats();
    println!(
        "   └─ hot={} warm={} cold={} bytes={}",
        stats.cache.hot_entries, stats.cache.warm_entries, stats.cache.cold_entries, stats.cache.size_bytes
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Telemetry
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Recording telemetry...");
    let aggregator = governance.aggregator();
    for i in 0..30u64 {
        let value = if i == 29 { 480.0 } else { 120.0 + (i % 3) as f64 };
        aggregator.record_point(MetricPoint::new("block_time_ms", value, i * 10_000));
    }
    let rolled = aggregator.aggregate_minute_at(300_000);
    println!("   └─ Minute buckets created: {}", rolled);
    for anomaly in aggregator.detect_anomalies() {
        println!(
            "   └─ ⚠️  {} = {} ({:?}, {:.1}σ)",
            anomaly.name, anomaly.value, anomaly.severity, anomaly.deviation
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Shards
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗂️  Activating shards...");
    let governor = governance.governor();
    for i in 0..5 {
        let id = format!("shard-{i}");
        let decision = governor.should_defer_activation(&id);
        if decision.defer {
            println!("   └─ {id}: deferred ({})", decision.reason);
        } else {
            governor.register_shard(id.clone(), None);
            println!("   └─ {id}: active");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Pressure
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔥 Simulating a heap spike...");
    for mb in [700.0, 900.0, 980.0, 500.0] {
        sampler.push_used_mb(mb);
        let (snapshot, state) = governance.monitor_once();
        println!(
            "   └─ {:>5.0} MB → level={} governor={} hibernated={}",
            mb,
            snapshot.level,
            state,
            governor.stats().hibernated_shards
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics and health
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🩺 Health:");
    let health = governance.health();
    println!("   └─ healthy={}", health.healthy);
    for line in health
        .resource
        .recommendations
        .iter()
        .chain(&health.governor.recommendations)
    {
        println!("   └─ {line}");
    }

    println!("\n📊 Prometheus (governor block):");
    for line in governor.prometheus().lines().filter(|l| !l.starts_with('#')) {
        println!("   │  {line}");
    }

    println!("\n📈 Raw Metrics (facade):");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    governance.shutdown();
    println!("   ✅ Shutdown complete! State: {}", governance.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            println!("   │  └─ {}{} count={} sum={:.4}", name, labels, count, sum);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
