//! # Frame Simulator
//!
//! Runs deterministic mesh churn against the block allocator and reports
//! growth, fragmentation and upload bandwidth.
//!
//! Usage: `frame_sim [config.toml]`
//!
//! Without a path the built-in defaults are used. Log verbosity follows
//! `RUST_LOG` (default `info`; `strata_core=debug` shows growth and full
//! uploads, `trace` shows every partial upload).

use std::process::ExitCode;

use strata::sim::{FrameSim, SimConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimConfig::load(&path) {
            Ok(config) => {
                info!(%path, "loaded simulator config");
                config
            }
            Err(err) => {
                error!(%path, "invalid config: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => SimConfig::default(),
    };

    info!(
        frames = config.frames,
        seed = config.seed,
        elements_per_block = config.layout.elements_per_block(),
        "starting simulation"
    );

    let summary = match FrameSim::new(config).and_then(|mut sim| sim.run()) {
        Ok(summary) => summary,
        Err(err) => {
            error!("simulation failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("frames            {}", summary.frames);
    println!("live meshes       {}", summary.live_meshes);
    println!(
        "blocks            {} used / {} total ({} regions)",
        summary.allocator.used_blocks, summary.allocator.local_blocks, summary.allocator.region_count
    );
    println!("fragmentation     {:.1}%", summary.allocator.fragmentation() * 100.0);
    println!(
        "growth            {} grows, {} coalesce passes, {} regions retired",
        summary.allocator.grow_events, summary.allocator.coalesce_passes, summary.allocator.regions_retired
    );
    println!(
        "uploads           {} full, {} partial, {} skipped",
        summary.sync.full_uploads, summary.sync.partial_uploads, summary.sync.skipped
    );
    println!(
        "bandwidth         {} bytes sent ({:.1}% saved)",
        summary.sync.bytes_uploaded,
        summary.sync.bandwidth_savings() * 100.0
    );

    ExitCode::SUCCESS
}
