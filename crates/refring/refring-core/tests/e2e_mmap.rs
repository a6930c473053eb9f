//! End-to-end two-process test for a reference ring in a mapped file.
//!
//! # Overview
//!
//! The same test executable is spawned twice with a role in the environment:
//! a writer that creates the ring file and streams bytes into it, and a
//! reader that maps the same file and consumes the stream concurrently. Head,
//! tail and the flow-control counter live in the file header, so the two
//! processes share nothing else.
//!
//! ```text
//!                    Time -->
//!
//! [Writer]  ----[create]----[write chunks...]------------[done]
//!                  |              |    |    |
//!                  v              v    v    v
//!              [mmap file]   (head/tail handoff)
//!                  |              ^    ^    ^
//!                  v              |    |    |
//! [Reader]  ------[open]---------[read chunks...]---------[done]
//! ```
//!
//! Unlike a broadcast ring nothing may be lost: the writer stalls when the
//! ring is full, so the reader must see every byte, in order.
//!
//! # Running the Test
//!
//! ```bash
//! cargo test -p refring-core --test e2e_mmap -- --nocapture
//! ```

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "REFRING_E2E_ROLE";
const ENV_PATH: &str = "REFRING_E2E_PATH";
const ROLE_WRITER: &str = "writer";
const ROLE_READER: &str = "reader";

/// Total bytes streamed from writer to reader.
const STREAM_BYTES: u64 = 8 << 20;

/// Small enough that the writer regularly finds the ring full.
const CAPACITY_UNITS: u32 = 1 << 10;

/// Bytes per unit; every transfer is a multiple of this.
const SCALE: u32 = 8;

const WRITE_CHUNK: usize = 1500;

fn test_path() -> String {
    let pid = std::process::id();
    format!("/tmp/refring_e2e_ring_{pid}")
}

fn pattern(i: u64) -> u8 {
    (i ^ (i >> 11)) as u8
}

fn run_writer(path: &str) {
    use refring_core::{RingConfig, ShmRing};

    log!("[WRITER] Creating ring");
    log!("[WRITER]   path: {path}");
    log!("[WRITER]   capacity: {CAPACITY_UNITS} units x {SCALE} bytes");
    log!("[WRITER]   bytes to stream: {STREAM_BYTES}");

    // Build under a temporary name so the reader never maps a half-written
    // header.
    let staging = format!("{path}.staging");
    let cfg = RingConfig::new(CAPACITY_UNITS)
        .and_then(|c| c.with_scale(SCALE))
        .expect("writer: invalid ring config");
    let mut shm = ShmRing::create(&staging, cfg).expect("writer: failed to create ring");
    std::fs::rename(&staging, path).expect("writer: failed to publish ring file");

    let mut ring = shm.ring().expect("writer: failed to bind ring");
    let (mut writer, _) = ring.split().expect("writer: failed to split ring");

    let deadline = Instant::now() + Duration::from_secs(20);
    let start = Instant::now();
    let mut chunk = vec![0u8; WRITE_CHUNK];
    let mut sent: u64 = 0;
    let mut stalls: u64 = 0;

    while sent < STREAM_BYTES {
        assert!(Instant::now() < deadline, "[WRITER] timed out at {sent} bytes");

        let len = (STREAM_BYTES - sent).min(WRITE_CHUNK as u64) as usize;
        for (k, b) in chunk[..len].iter_mut().enumerate() {
            *b = pattern(sent + k as u64);
        }
        let n = writer.write(&chunk[..len]);
        assert_eq!(n % SCALE as usize, 0, "[WRITER] unaligned write of {n}");
        if n == 0 {
            stalls += 1;
            std::hint::spin_loop();
        }
        sent += n as u64;
    }

    let elapsed = start.elapsed();
    let throughput = STREAM_BYTES as f64 / elapsed.as_secs_f64() / 1e6;

    log!("[WRITER] Complete");
    log!("[WRITER]   bytes written: {sent}");
    log!("[WRITER]   full-ring stalls: {stalls}");
    log!("[WRITER]   elapsed: {elapsed:?}");
    log!("[WRITER]   throughput: {throughput:.1} MB/s");
}

fn run_reader(path: &str) {
    use refring_core::ShmRing;

    log!("[READER] Waiting for ring at {path}");

    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mut shm = loop {
        match ShmRing::open(path) {
            Ok(shm) => {
                log!("[READER] Ring opened");
                break shm;
            }
            Err(_) if Instant::now() < open_deadline => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("[READER] Failed to open ring: {e}"),
        }
    };

    let mut ring = shm.ring().expect("reader: failed to bind ring");
    let (_, mut reader) = ring.split().expect("reader: failed to split ring");

    let deadline = Instant::now() + Duration::from_secs(20);
    let start = Instant::now();
    let mut buf = vec![0u8; 4096];
    let mut received: u64 = 0;

    while received < STREAM_BYTES {
        assert!(
            Instant::now() < deadline,
            "[READER] timed out at {received} bytes"
        );

        let n = reader.read(&mut buf, None);
        assert_eq!(n % SCALE as usize, 0, "[READER] unaligned read of {n}");
        for (k, b) in buf[..n].iter().enumerate() {
            let at = received + k as u64;
            assert_eq!(*b, pattern(at), "[READER] corrupted byte at {at}");
        }
        if n == 0 {
            std::hint::spin_loop();
        } else {
            reader
                .add_consume_signal(n as u64)
                .expect("reader: counter must be bound");
        }
        received += n as u64;
    }

    let signalled = shm.header().consume_signal.load(Ordering::SeqCst);
    let elapsed = start.elapsed();

    log!("[READER] Complete");
    log!("[READER]   bytes read: {received}");
    log!("[READER]   consume signal total: {signalled}");
    log!("[READER]   elapsed: {elapsed:?}");

    assert_eq!(received, STREAM_BYTES);
    assert_eq!(signalled, STREAM_BYTES);
    log!("[READER] Validation passed");
}

/// Two-process concurrent test: every byte written by one process is read,
/// in order and unit aligned, by the other.
#[test]
fn e2e_two_process_mmap_ring() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("REFRING_E2E_PATH not set");
        match role.as_str() {
            ROLE_WRITER => run_writer(&path),
            ROLE_READER => run_reader(&path),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let path = test_path();
    let _ = std::fs::remove_file(&path);
    let exe = env::current_exe().expect("Failed to get current executable path");

    log!("");
    log!("{}", "=".repeat(70));
    log!("E2E Two-Process Reference Ring Test");
    log!("{}", "=".repeat(70));

    let spawn = |role: &str| {
        Command::new(&exe)
            .arg("--exact")
            .arg("e2e_two_process_mmap_ring")
            .env(ENV_ROLE, role)
            .env(ENV_PATH, &path)
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn child process")
    };

    // Reader first: it retries until the writer publishes the file.
    let mut reader_proc = spawn(ROLE_READER);
    let mut writer_proc = spawn(ROLE_WRITER);

    let writer_status = writer_proc.wait().expect("Failed to wait for writer");
    let reader_status = reader_proc.wait().expect("Failed to wait for reader");

    log!("[ORCHESTRATOR] Writer exit status: {writer_status}");
    log!("[ORCHESTRATOR] Reader exit status: {reader_status}");

    let _ = std::fs::remove_file(&path);

    assert!(
        writer_status.success(),
        "Writer process failed with status: {writer_status}"
    );
    assert!(
        reader_status.success(),
        "Reader process failed with status: {reader_status}"
    );
}
