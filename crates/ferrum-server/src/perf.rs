//! Performance counters: TPS window, packet/byte rates, connection gauges.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use ferrum_world::chunk::monotonic_ms;

const TPS_HISTORY_LEN: usize = 100;

#[derive(Debug)]
struct TpsHistory {
    samples: [f64; TPS_HISTORY_LEN],
    index: usize,
}

#[derive(Debug)]
pub struct PerfMonitor {
    current_tps: AtomicU64,
    tps_history: Mutex<TpsHistory>,

    packet_count: AtomicU64,
    byte_count: AtomicU64,
    packets_per_second: AtomicU64,
    bytes_per_second: AtomicU64,
    last_rate_update_ms: AtomicU64,

    active_connections: AtomicU32,
    total_connections: AtomicU32,

    start_time: Instant,
}

impl PerfMonitor {
    pub fn new() -> Self {
        Self {
            current_tps: AtomicU64::new(20.0f64.to_bits()),
            tps_history: Mutex::new(TpsHistory {
                samples: [20.0; TPS_HISTORY_LEN],
                index: 0,
            }),
            packet_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
            packets_per_second: AtomicU64::new(0),
            bytes_per_second: AtomicU64::new(0),
            last_rate_update_ms: AtomicU64::new(monotonic_ms()),
            active_connections: AtomicU32::new(0),
            total_connections: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count one packet and its frame bytes, in either direction.
    pub fn record_packet(&self, bytes: usize) {
        self.packet_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Fold the counters into per-second gauges once a second has passed.
    pub fn update_rates(&self) {
        let now = monotonic_ms();
        let last = self.last_rate_update_ms.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);
        if elapsed < 1000 {
            return;
        }
        if self
            .last_rate_update_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let packets = self.packet_count.swap(0, Ordering::Relaxed);
        let bytes = self.byte_count.swap(0, Ordering::Relaxed);
        self.packets_per_second
            .store(packets * 1000 / elapsed, Ordering::Relaxed);
        self.bytes_per_second
            .store(bytes * 1000 / elapsed, Ordering::Relaxed);
    }

    /// Record one tick's TPS measurement, clamped to the 20 TPS target.
    pub fn record_tps(&self, tps: f64) {
        let tps = tps.min(20.0);
        self.current_tps.store(tps.to_bits(), Ordering::Relaxed);
        let mut history = self.tps_history.lock().unwrap();
        let index = history.index;
        history.samples[index] = tps;
        history.index = (index + 1) % TPS_HISTORY_LEN;
    }

    pub fn current_tps(&self) -> f64 {
        f64::from_bits(self.current_tps.load(Ordering::Relaxed))
    }

    pub fn average_tps(&self) -> f64 {
        let history = self.tps_history.lock().unwrap();
        history.samples.iter().sum::<f64>() / TPS_HISTORY_LEN as f64
    }

    pub fn min_tps(&self) -> f64 {
        let history = self.tps_history.lock().unwrap();
        history.samples.iter().copied().fold(20.0, f64::min)
    }

    pub fn set_active_connections(&self, count: u32) {
        self.active_connections.store(count, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn record_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_connections(&self) -> u32 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn packets_per_second(&self) -> u64 {
        self.packets_per_second.load(Ordering::Relaxed)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Process resident set size in bytes. Linux only; 0 elsewhere.
    pub fn memory_usage(&self) -> u64 {
        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if let Some(rest) = line.strip_prefix("VmRSS:") {
                        let kib: u64 = rest
                            .trim()
                            .trim_end_matches("kB")
                            .trim()
                            .parse()
                            .unwrap_or(0);
                        return kib * 1024;
                    }
                }
            }
        }
        0
    }
}

impl Default for PerfMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot for the status surface.
#[derive(Debug, Clone)]
pub struct PerfStats {
    pub current_tps: f64,
    pub average_tps: f64,
    pub min_tps: f64,
    pub active_connections: u32,
    pub total_connections: u32,
    pub packets_per_second: u64,
    pub bytes_per_second: u64,
    pub memory_usage_mb: u64,
    pub uptime_seconds: f64,
}

impl PerfMonitor {
    pub fn stats(&self) -> PerfStats {
        PerfStats {
            current_tps: self.current_tps(),
            average_tps: self.average_tps(),
            min_tps: self.min_tps(),
            active_connections: self.active_connections(),
            total_connections: self.total_connections(),
            packets_per_second: self.packets_per_second(),
            bytes_per_second: self.bytes_per_second(),
            memory_usage_mb: self.memory_usage() / (1024 * 1024),
            uptime_seconds: self.uptime_seconds(),
        }
    }
}
