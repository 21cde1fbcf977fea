//! Kairos - Low-Latency Trading Building Blocks
//!
//! Arsitektur:
//! - No-Allocation: Pre-allocated pool, ring dan socket buffers
//! - Lock-Free: Atomic-only SPSC ring buffer
//! - Async Logging: Formatting dan file I/O di background thread
//! - Busy-Poll Reactor: mio dengan zero timeout

use std::time::Instant;

use kairos::core::{Pool, RingBuffer};
use kairos::log_fmt;
use kairos::logger::{AsyncLogger, LoggerConfig};

fn main() {
    kairos::diagnostics::init_tracing("warn");

    println!("🚀 Kairos Trading Infrastructure - v0.1");
    println!("=======================================\n");

    benchmark_ring_buffer();
    benchmark_pool();
    if let Err(e) = benchmark_logger() {
        eprintln!("logger benchmark skipped: {}", e);
    }

    println!("\n✅ All benchmarks complete!");
    println!("\nTo start echo server: cargo run --release --bin kairos_server -- --port 12345");
}

fn benchmark_ring_buffer() {
    println!("📊 Ring Buffer Benchmark (Lock-Free SPSC)");
    println!("-----------------------------------------");

    const ITERATIONS: usize = 1_000_000;
    let (mut producer, mut consumer) = RingBuffer::<u64>::with_capacity(65536).split();

    // Warm up
    for i in 0..1000 {
        producer.push(i);
    }
    while consumer.pop().is_some() {}

    // Same thread: push in bursts that fit, pop them back
    let start = Instant::now();
    let mut pushed = 0;
    while pushed < ITERATIONS {
        let burst = (ITERATIONS - pushed).min(producer.capacity());
        for i in 0..burst {
            producer.push(i as u64);
        }
        for _ in 0..burst {
            consumer.pop();
        }
        pushed += burst;
    }
    let cycle_duration = start.elapsed();

    // Cross thread: consumer spins on its own core
    let reader = std::thread::spawn(move || {
        let mut seen = 0usize;
        while seen < ITERATIONS {
            if consumer.pop().is_some() {
                seen += 1;
            } else {
                std::hint::spin_loop();
            }
        }
    });
    let start = Instant::now();
    for i in 0..ITERATIONS {
        while producer.size() == producer.capacity() {
            std::hint::spin_loop();
        }
        producer.push(i as u64);
    }
    reader.join().ok();
    let spsc_duration = start.elapsed();

    let cycle_ns = cycle_duration.as_nanos() as f64 / ITERATIONS as f64;
    let spsc_ns = spsc_duration.as_nanos() as f64 / ITERATIONS as f64;

    println!("  Operations: {}", ITERATIONS);
    println!(
        "  Push+pop (1 thread): {:.2} ns/op ({:.3} μs/op)",
        cycle_ns,
        cycle_ns / 1000.0
    );
    println!(
        "  Producer->consumer:  {:.2} ns/op ({:.3} μs/op)",
        spsc_ns,
        spsc_ns / 1000.0
    );
    println!(
        "  Throughput:          {:.2} M ops/sec\n",
        ITERATIONS as f64 / spsc_duration.as_secs_f64() / 1_000_000.0
    );
}

#[derive(Default)]
struct Order {
    id: u64,
    price: f64,
    qty: u32,
}

fn benchmark_pool() {
    println!("📊 Memory Pool Benchmark (Pre-allocated)");
    println!("----------------------------------------");

    const ITERATIONS: usize = 1_000_000;
    const CAPACITY: usize = 4096;

    let mut pool: Pool<Order> = Pool::with_capacity(CAPACITY);
    let mut live = Vec::with_capacity(CAPACITY / 2);

    let start = Instant::now();
    for i in 0..ITERATIONS {
        let handle = pool.allocate(Order {
            id: i as u64,
            price: 100.0 + (i % 64) as f64 * 0.25,
            qty: (i % 500) as u32,
        });
        live.push(handle);
        if live.len() == CAPACITY / 2 {
            for handle in live.drain(..) {
                pool.deallocate(handle);
            }
        }
    }
    let duration = start.elapsed();

    let checksum: u64 = live
        .iter()
        .map(|h| {
            let order = pool.get(h);
            order.id + order.qty as u64 + order.price as u64
        })
        .sum();
    for handle in live.drain(..) {
        pool.deallocate(handle);
    }

    let ns = duration.as_nanos() as f64 / ITERATIONS as f64;
    println!("  Capacity: {} objects", CAPACITY);
    println!("  Allocate+deallocate: {:.2} ns/op ({:.3} μs/op)", ns, ns / 1000.0);
    println!("  Available after drain: {} (checksum {})\n", pool.available(), checksum);
}

fn benchmark_logger() -> kairos::Result<()> {
    println!("📊 Async Logger Benchmark (Caller-side cost)");
    println!("--------------------------------------------");

    const ITERATIONS: usize = 100_000;

    let path = std::env::temp_dir().join("kairos_bench.log");
    let mut config = LoggerConfig::new(&path);
    config.drain_poll_interval = std::time::Duration::from_millis(10);
    let mut logger = AsyncLogger::with_config(config)?;

    let start = Instant::now();
    for i in 0..ITERATIONS {
        log_fmt!(logger, "order % px % qty %\n", i as u64, 101.25f64, 10i32);
    }
    let duration = start.elapsed();
    drop(logger);

    let ns = duration.as_nanos() as f64 / ITERATIONS as f64;
    let written = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    println!("  Lines: {}", ITERATIONS);
    println!("  log() latency: {:.2} ns/line ({:.3} μs/line)", ns, ns / 1000.0);
    println!("  File size after drain: {} bytes", written);

    std::fs::remove_file(&path).ok();
    Ok(())
}
