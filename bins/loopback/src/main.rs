use anyhow::Context;
use refring_config::LoopbackConfig;
use refring_core::{RingConfig, ShmRing};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod loopback;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => LoopbackConfig::load(path)?,
        None => LoopbackConfig::default(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ring_config = RingConfig::new(config.capacity_units)?.with_scale(config.scale)?;
    let mut shm = ShmRing::create(&config.shm_file_path, ring_config)
        .with_context(|| format!("failed to create ring at {}", config.shm_file_path))?;

    info!(
        path = %config.shm_file_path,
        capacity_bytes = ring_config.capacity_bytes(),
        message_size = config.message_size,
        "LOOPBACK: streaming through shared ring"
    );

    let report = loopback::run(&mut shm, &config);
    let _ = std::fs::remove_file(&config.shm_file_path);
    let report = report?;
    let throughput = format!("{:.1}", report.throughput_mb_s());

    info!(
        bytes_written = report.bytes_written,
        bytes_read = report.bytes_read,
        notifications = report.notifications,
        elapsed = ?report.elapsed,
        throughput_mb_s = %throughput,
        "LOOPBACK: done"
    );
    Ok(())
}
