use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_refreshes: AtomicU64,
    api_requests: AtomicU64,
    retries: AtomicU64,
    webhooks_received: AtomicU64,
    events_emitted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_refresh(&self) {
        self.cache_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64, u64, u64) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.cache_refreshes.load(Ordering::Relaxed),
            self.api_requests.load(Ordering::Relaxed),
            self.retries.load(Ordering::Relaxed),
            self.webhooks_received.load(Ordering::Relaxed),
            self.events_emitted.load(Ordering::Relaxed),
        )
    }
}

pub fn spawn_metrics_logger(metrics: Arc<Metrics>, interval: Duration) {
    thread::spawn(move || loop {
        thread::sleep(interval);
        let (hits, misses, refreshes, api, retries, webhooks, events) = metrics.snapshot();
        eprintln!(
            "metrics cache_hit={} cache_miss={} cache_refresh={} api_requests={} retries={} webhooks={} events={}",
            hits, misses, refreshes, api, retries, webhooks, events
        );
    });
}
