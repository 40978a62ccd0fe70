//! Cross-thread tests for the recovery channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tasklease_signal::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Wake that unparks a consumer thread, like the std supervisor does.
#[derive(Debug)]
struct ThreadWake {
    consumer: thread::Thread,
    wakes: AtomicU32,
}

impl WakePrimitive for ThreadWake {
    fn wake_from_isr(&self) -> bool {
        self.wakes.fetch_add(1, Ordering::Relaxed);
        self.consumer.unpark();
        true
    }
}

#[test]
fn test_flag_set_is_visible_after_wake() -> TestResult {
    let wake = Arc::new(ThreadWake {
        consumer: thread::current(),
        wakes: AtomicU32::new(0),
    });
    let (bridge, receiver) = recovery_channel(Arc::clone(&wake));

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        let outcome = bridge.on_expiry();
        outcome.newly_pending
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut observed = false;
    while Instant::now() < deadline {
        thread::park_timeout(Duration::from_millis(50));
        if receiver.take() {
            observed = true;
            break;
        }
    }

    let newly_pending = producer.join().map_err(|_payload| "producer panicked")?;
    assert!(newly_pending);
    assert!(observed);
    assert_eq!(wake.wakes.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test]
fn test_no_raise_is_lost_under_contention() -> TestResult {
    struct NoWake;
    impl WakePrimitive for NoWake {
        fn wake_from_isr(&self) -> bool {
            false
        }
    }

    let (bridge, receiver) = recovery_channel(NoWake);
    let raises = 10_000u32;

    let producer = thread::spawn(move || {
        for _ in 0..raises {
            let _outcome = bridge.on_expiry();
        }
    });

    let mut consumed = 0u32;
    while !producer.is_finished() {
        if receiver.take() {
            consumed += 1;
        }
    }
    producer.join().map_err(|_payload| "producer panicked")?;
    if receiver.take() {
        consumed += 1;
    }

    let metrics = receiver.metrics();
    assert_eq!(metrics.raised, raises);
    assert_eq!(metrics.consumed, consumed);
    // Every raise either became its own observation or was folded into one.
    assert_eq!(metrics.distinct_raises(), consumed);
    assert!(!metrics.pending);
    Ok(())
}
