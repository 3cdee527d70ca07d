//! Per-peer token buckets so neither transport starves in Hybrid mode
//! (spec.md §4.7). Adapted from the reference engine's network rate
//! limiter, keyed per peer instead of process-global.

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct TokenBucketPool {
    bytes_per_second: u32,
    buckets: DashMap<String, Arc<Bucket>>,
}

impl TokenBucketPool {
    pub fn new(bytes_per_second: u32) -> Self {
        Self {
            bytes_per_second,
            buckets: DashMap::new(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    fn bucket_for(&self, peer: &str) -> Arc<Bucket> {
        if let Some(existing) = self.buckets.get(peer) {
            return existing.clone();
        }
        let kb_per_second = if self.bytes_per_second > 0 {
            (self.bytes_per_second / 1024).max(1)
        } else {
            u32::MAX
        };
        let bucket = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(kb_per_second).unwrap(),
        )));
        self.buckets.insert(peer.to_string(), bucket.clone());
        bucket
    }

    pub async fn wait_for_bytes(&self, peer: &str, bytes: usize) {
        if self.bytes_per_second == 0 {
            return;
        }
        let bucket = self.bucket_for(peer);
        let kb_units = bytes.div_ceil(1024).max(1) as u32;
        for _ in 0..kb_units {
            bucket.until_ready().await;
        }
    }
}
