/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Default)]
pub struct SyncMetrics {
    pub page_fetches: AtomicU64,
    pub object_fetches: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub posts: AtomicU64,
    pub purged_keys: AtomicU64,
    pub skipped_items: AtomicU64,
    pub http_timeouts: AtomicU64,
    pub http_errors: AtomicU64,
    pub fetch_rtt_ema_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ts_ms: u64,
    pub page_fetches: u64,
    pub object_fetches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub posts: u64,
    pub purged_keys: u64,
    pub skipped_items: u64,
    pub http_timeouts: u64,
    pub http_errors: u64,
    pub fetch_rtt_ms: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_fetch(&self) {
        self.page_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn object_fetch(&self) {
        self.object_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn post(&self) {
        self.posts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn purged(&self, n: u64) {
        self.purged_keys.fetch_add(n, Ordering::Relaxed);
    }

    pub fn skipped_item(&self) {
        self.skipped_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn http_timeout(&self) {
        self.http_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn http_error(&self) {
        self.http_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_rtt_update(&self, ms: u64) {
        if ms == 0 {
            return;
        }
        let prev = self.fetch_rtt_ema_ms.load(Ordering::Relaxed);
        let next = if prev == 0 {
            ms
        } else {
            (prev.saturating_mul(7).saturating_add(ms)) / 8
        };
        self.fetch_rtt_ema_ms.store(next, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ts_ms: now_ms(),
            page_fetches: self.page_fetches.load(Ordering::Relaxed),
            object_fetches: self.object_fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            posts: self.posts.load(Ordering::Relaxed),
            purged_keys: self.purged_keys.load(Ordering::Relaxed),
            skipped_items: self.skipped_items.load(Ordering::Relaxed),
            http_timeouts: self.http_timeouts.load(Ordering::Relaxed),
            http_errors: self.http_errors.load(Ordering::Relaxed),
            fetch_rtt_ms: self.fetch_rtt_ema_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_rtt_average() {
        let m = SyncMetrics::new();
        m.page_fetch();
        m.page_fetch();
        m.purged(3);
        m.fetch_rtt_update(80);
        m.fetch_rtt_update(160);
        let s = m.snapshot();
        assert_eq!(s.page_fetches, 2);
        assert_eq!(s.purged_keys, 3);
        assert_eq!(s.fetch_rtt_ms, 90);
    }
}
