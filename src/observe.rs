//! Scan telemetry — observer handle passed into the driver.
//!
//! The library never renders anything itself; the binary installs an
//! indicatif-backed observer and the default is a no-op.  The driver calls
//! `on_block` once per scanned block and `on_detection` once per accepted
//! record, always from the scan thread.

/// Progress snapshot delivered after each block.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub bytes_scanned:  u64,
    pub total_bytes:    u64,
    pub blocks_scanned: u64,
    /// Accepted records so far.
    pub detections:     u64,
    /// Throughput since the previous block, MiB/s.
    pub current_mbps:   f64,
    /// Throughput since the scan started, MiB/s.
    pub average_mbps:   f64,
    /// Estimated seconds remaining at the average speed.
    pub eta_seconds:    Option<f64>,
}

impl ScanProgress {
    /// Completed fraction in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.bytes_scanned as f64 / self.total_bytes as f64
    }
}

pub trait ScanObserver {
    fn on_block(&mut self, _progress: &ScanProgress) {}
    fn on_detection(&mut self, _type_name: &str) {}
}

/// Default observer: ignores everything.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}
