//! Writer/reader loop over a shared ring, standing in for the transport.
//!
//! The writer thread offers `message_size` bytes of an incrementing byte
//! pattern per attempt until the configured duration elapses. The reader
//! thread drains the ring, checks the pattern, and bumps the flow-control
//! counter for every byte it frees. Once the counter reaches the notify
//! threshold the reader takes it back to zero and counts one
//! notification to the (imaginary) remote peer.

use anyhow::{Context, anyhow, bail};
use refring_config::LoopbackConfig;
use refring_core::ShmRing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct LoopbackReport {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub notifications: u64,
    pub elapsed: Duration,
}

impl LoopbackReport {
    pub fn throughput_mb_s(&self) -> f64 {
        self.bytes_read as f64 / 1e6 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

#[inline(always)]
fn pattern(offset: u64) -> u8 {
    offset as u8
}

pub fn run(shm: &mut ShmRing, config: &LoopbackConfig) -> anyhow::Result<LoopbackReport> {
    let mut ring = shm.ring().context("failed to bind ring")?;
    let (mut writer, mut reader) = ring.split().context("failed to split ring")?;
    let threshold = config.notify_threshold();
    let duration = Duration::from_millis(config.duration_ms);
    let stop = AtomicBool::new(false);
    let start = Instant::now();

    let (written, read) = thread::scope(|s| {
        let stop = &stop;

        let producer = s.spawn(move || {
            let mut chunk = vec![0u8; config.message_size];
            let mut sent: u64 = 0;
            while start.elapsed() < duration {
                for (k, b) in chunk.iter_mut().enumerate() {
                    *b = pattern(sent + k as u64);
                }
                let n = writer.write(&chunk);
                if n == 0 {
                    std::hint::spin_loop();
                }
                sent += n as u64;
            }
            stop.store(true, Ordering::SeqCst);
            sent
        });

        let consumer = s.spawn(move || -> anyhow::Result<(u64, u64)> {
            let mut buf = vec![0u8; config.message_size.max(4096)];
            let mut received: u64 = 0;
            let mut notifications: u64 = 0;
            loop {
                let n = reader.read(&mut buf, None);
                if n == 0 {
                    if stop.load(Ordering::SeqCst) && reader.read_available_bytes() == 0 {
                        break;
                    }
                    std::hint::spin_loop();
                    continue;
                }

                if let Some(k) = (0..n).find(|&k| buf[k] != pattern(received + k as u64)) {
                    bail!("stream corrupted at byte {}", received + k as u64);
                }
                received += n as u64;

                let before = reader.add_consume_signal(n as u64)?;
                if before + n as u64 >= threshold {
                    let freed = reader.take_consume_signal()?;
                    notifications += 1;
                    trace!(freed, "notify peer of freed space");
                }
            }
            Ok((received, notifications))
        });

        let written = producer
            .join()
            .map_err(|_| anyhow!("writer thread panicked"))?;
        let read = consumer
            .join()
            .map_err(|_| anyhow!("reader thread panicked"))??;
        Ok::<_, anyhow::Error>((written, read))
    })?;

    let (bytes_read, notifications) = read;
    if written != bytes_read {
        bail!("wrote {written} bytes but read {bytes_read}");
    }
    debug!(written, bytes_read, notifications, "loopback finished");

    Ok(LoopbackReport {
        bytes_written: written,
        bytes_read,
        notifications,
        elapsed: start.elapsed(),
    })
}
