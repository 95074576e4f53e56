//! Coarse throughput checks for the request path

use server::bank::{BankLayout, ServoBank};
use server::dispatch::handle_line;
use shared::{Command, LineFramer};
use std::time::Instant;

/// Benchmarks framing of a stream delivered in awkward chunk sizes
#[test]
fn benchmark_line_framing() {
    let line = Command::Set {
        servo: 12,
        angle: 87.5,
    }
    .to_line()
    .unwrap();
    let stream: Vec<u8> = line.as_bytes().repeat(10_000);

    let start = Instant::now();
    let mut framer = LineFramer::new();
    let mut lines = 0;

    for chunk in stream.chunks(37) {
        framer.push(chunk);
        while let Some(result) = framer.next_line() {
            assert!(result.is_ok());
            lines += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Line framing: {} lines in {:?} ({:.2} μs/line)",
        lines,
        duration,
        duration.as_micros() as f64 / lines as f64
    );

    assert_eq!(lines, 10_000);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks request decoding
#[test]
fn benchmark_command_decoding() {
    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        let line = format!(r#"{{"cmd":"set","servo":{},"angle":90}}"#, i % 36);
        assert!(Command::decode(&line).is_ok());
    }

    let duration = start.elapsed();
    println!(
        "Command decoding: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the full decode, dispatch and encode path against simulated boards
#[tokio::test]
async fn benchmark_dispatch() {
    let bank = ServoBank::simulated(BankLayout::default()).unwrap();
    let iterations = 20_000;
    let start = Instant::now();

    for i in 0..iterations {
        let line = format!(
            r#"{{"cmd":"set","servo":{},"angle":{}}}"#,
            i % 36,
            i % 180
        );
        let response = handle_line(&bank, &line).await;
        assert!(response.is_ok());
        let _ = response.to_line();
    }

    let duration = start.elapsed();
    println!(
        "Dispatch: {} requests in {:?} ({:.2} μs/request)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks set_all across all three boards
#[tokio::test]
async fn benchmark_set_all() {
    let bank = ServoBank::simulated(BankLayout::default()).unwrap();
    let iterations = 2_000;
    let start = Instant::now();

    for i in 0..iterations {
        bank.set_all((i % 180) as f64).await.unwrap();
    }

    let duration = start.elapsed();
    println!(
        "set_all: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}
