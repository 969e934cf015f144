// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2020 Datadog, Inc.
//
use std::time::Instant;
use turnstile::sync::{CancelSignal, Semaphore};

fn main() {
    let runs: u32 = 100_000;
    let never = CancelSignal::never();

    let sem = Semaphore::new(CancelSignal::never(), runs as usize);
    let t = Instant::now();
    for _ in 0..runs {
        assert!(sem.acquire(&never, 1));
    }
    println!(
        "cost of acquiring uncontended semaphore: {:#?}",
        t.elapsed() / runs
    );
    sem.release(runs as usize);

    let t = Instant::now();
    for _ in 0..runs {
        assert!(sem.try_acquire(1));
    }
    println!(
        "cost of fast-path acquire on uncontended semaphore: {:#?}",
        t.elapsed() / runs
    );
    sem.release(runs as usize);

    let t = Instant::now();
    for _ in 0..runs {
        assert!(sem.try_acquire(1));
        sem.release(1);
    }
    println!(
        "cost of fast-path acquire/release round trip: {:#?}",
        t.elapsed() / runs
    );
}
