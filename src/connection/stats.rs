//! Link traffic statistics
//!
//! Thread-safe counters for throughput and frame accounting.
//! Uses lock-free atomics for all operations.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LinkStatsSnapshot {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    /// KB/s
    pub tx_rate: f64,
    /// KB/s
    pub rx_rate: f64,
}

/// Traffic statistics with rate calculation (fully lock-free)
pub struct LinkStats {
    tx_total: AtomicU64,
    rx_total: AtomicU64,
    frames_received: AtomicU64,
    /// Frames that failed to decode
    frames_dropped: AtomicU64,
    tx_snapshot: AtomicU64,
    rx_snapshot: AtomicU64,
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached rates in KB/s (stored as f64 bits)
    tx_rate: AtomicU64,
    rx_rate: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            tx_snapshot: AtomicU64::new(0),
            rx_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            tx_rate: AtomicU64::new(0),
            rx_rate: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count a received frame of `bytes` length
    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Update rate calculations and return (tx_kb_s, rx_kb_s)
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS
            || self
                .last_calc_nanos
                .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
        {
            // Too soon, or another thread got there first
            return self.cached_rates();
        }

        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let tx_prev = self.tx_snapshot.swap(tx_now, Ordering::Relaxed);
        let rx_prev = self.rx_snapshot.swap(rx_now, Ordering::Relaxed);

        let tx_rate = tx_now.saturating_sub(tx_prev) as f64 / elapsed / 1024.0;
        let rx_rate = rx_now.saturating_sub(rx_prev) as f64 / elapsed / 1024.0;

        self.tx_rate.store(tx_rate.to_bits(), Ordering::Relaxed);
        self.rx_rate.store(rx_rate.to_bits(), Ordering::Relaxed);

        (tx_rate, rx_rate)
    }

    fn cached_rates(&self) -> (f64, f64) {
        (
            f64::from_bits(self.tx_rate.load(Ordering::Relaxed)),
            f64::from_bits(self.rx_rate.load(Ordering::Relaxed)),
        )
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        let (tx_rate, rx_rate) = self.update_rates();
        LinkStatsSnapshot {
            tx_bytes: self.tx_bytes(),
            rx_bytes: self.rx_bytes(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped(),
            tx_rate,
            rx_rate,
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}
