//! One writer thread and one reader thread streaming through a small ring.
//!
//! The ring is deliberately tiny relative to the stream so that both sides
//! spend most of their time on short writes and reads and the wrap boundary
//! is crossed thousands of times.

use refring_core::{RefRingBuffer, Region, RingConfig};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;

const STREAM_BYTES: usize = 1 << 20;
const CAPACITY_UNITS: u32 = 64;
const SCALE: u32 = 4;

fn pattern(i: usize) -> u8 {
    (i.wrapping_mul(31) ^ (i >> 8)) as u8
}

#[test]
fn threaded_stream_arrives_in_order() {
    let head = AtomicU32::new(0);
    let tail = AtomicU32::new(0);
    let signal = AtomicU64::new(0);
    let mut data = vec![0u8; (CAPACITY_UNITS * SCALE) as usize];

    let cfg = RingConfig::new(CAPACITY_UNITS)
        .unwrap()
        .with_scale(SCALE)
        .unwrap();
    let capacity_bytes = cfg.capacity_bytes();

    let mut ring = RefRingBuffer::new(cfg);
    ring.bind_region(Region::from_slice(&mut data));
    ring.bind_head(&head);
    ring.bind_tail(&tail);
    ring.bind_consume_signal(&signal);
    let (mut writer, mut reader) = ring.split().expect("ring should split");

    let source: Vec<u8> = (0..STREAM_BYTES).map(pattern).collect();

    thread::scope(|s| {
        s.spawn(|| {
            let mut sent = 0;
            // Odd chunk sizes force truncation to whole units on every call.
            let mut chunk = 7;
            while sent < source.len() {
                let end = (sent + chunk).min(source.len());
                let n = writer.write(&source[sent..end]);
                assert_eq!(n % SCALE as usize, 0);
                sent += n;
                chunk = chunk % 97 + 13;
                if n == 0 {
                    std::hint::spin_loop();
                }
            }
        });

        s.spawn(|| {
            let mut received = 0;
            let mut buf = [0u8; 53];
            while received < STREAM_BYTES {
                let occupied = reader.read_available_bytes();
                assert!(occupied <= capacity_bytes, "occupancy {occupied} exceeds capacity");

                let n = reader.read(&mut buf, None);
                assert_eq!(n % SCALE as usize, 0);
                for (k, b) in buf[..n].iter().enumerate() {
                    assert_eq!(*b, pattern(received + k), "byte {} corrupted", received + k);
                }
                if n > 0 {
                    reader.add_consume_signal(n as u64).unwrap();
                } else {
                    std::hint::spin_loop();
                }
                received += n;
            }
        });
    });

    assert_eq!(signal.load(Ordering::SeqCst), STREAM_BYTES as u64);
    assert_eq!(
        tail.load(Ordering::SeqCst),
        (STREAM_BYTES / SCALE as usize) as u32
    );
    assert_eq!(head.load(Ordering::SeqCst), tail.load(Ordering::SeqCst));
}

#[test]
fn concurrent_consume_signals_accumulate() {
    let signal = AtomicU64::new(0);
    let mut ring = RefRingBuffer::new(RingConfig::default());
    ring.bind_consume_signal(&signal);
    let ring = &ring;

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(move || {
                for _ in 0..1000 {
                    ring.add_consume_signal(3).unwrap();
                }
            });
        }
    });

    assert_eq!(signal.load(Ordering::SeqCst), 12_000);
}
