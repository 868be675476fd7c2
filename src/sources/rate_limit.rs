//! Process-global per-source token buckets.
//!
//! Every client awaits its bucket before each request, so concurrent callers
//! serialize through one budget per API regardless of how many client values
//! exist. Budgets default to the documented per-API limits and can be raised
//! by config (an NCBI key moves that bucket from 3 to 10 rps).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::time::Instant;

struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    state: tokio::sync::Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rps: f64) -> Self {
        let rps = rps.max(0.1);
        Self {
            capacity: rps.max(1.0),
            refill_per_sec: rps,
            state: tokio::sync::Mutex::new(BucketState {
                tokens: rps.max(1.0),
                last_refill: Instant::now(),
            }),
        }
    }

    async fn acquire(&self) {
        // Holding the lock across the sleep serializes waiters in arrival
        // order, which is the contract for shared budgets.
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }
            let needed = (1.0 - state.tokens) / self.refill_per_sec;
            tokio::time::sleep(Duration::from_secs_f64(needed)).await;
        }
    }
}

fn registry() -> &'static Mutex<HashMap<String, Arc<Bucket>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Bucket>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register (or resize) the bucket for an API. Resizing replaces the bucket;
/// in-flight waiters finish against the old one.
pub fn configure(api: &str, rps: f64) {
    let mut map = registry().lock().expect("rate limiter registry poisoned");
    let replace = match map.get(api) {
        Some(bucket) => (bucket.refill_per_sec - rps).abs() > f64::EPSILON,
        None => true,
    };
    if replace {
        map.insert(api.to_string(), Arc::new(Bucket::new(rps)));
    }
}

/// Wait until the API's budget admits one request. Unregistered APIs get a
/// conservative 2 rps bucket.
pub async fn acquire(api: &str) {
    let bucket = {
        let mut map = registry().lock().expect("rate limiter registry poisoned");
        map.entry(api.to_string())
            .or_insert_with(|| Arc::new(Bucket::new(2.0)))
            .clone()
    };
    bucket.acquire().await;
}
