//! Scan driver — the single-producer loop that ties the pipeline together.
//!
//! # Windowed iteration
//!
//! The source is walked in fixed blocks of `B` bytes.  Every window is
//! extended by `overlap = max_header_size − 1` bytes into the next block so
//! a header straddling the block edge is still fully inside the window.
//! The **boundary rule** keeps that overlap from double-reporting: a hit
//! whose absolute offset lands at or past the block edge is skipped — the
//! next iteration's window starts on it and reports it instead.  Each
//! header offset is therefore examined by exactly one iteration.
//!
//! A `(offset, signature)` set backs the boundary rule up: overlapping
//! signatures whose windows could re-enter the tail region are counted as
//! `duplicate_matches` instead of producing a second record.
//!
//! # Pipeline per hit
//!
//! re-sample up to the signature's `max_size` → entropy gate → structural
//! validation (tolerant iff the profile repairs) → trim/repair → SHA-256 →
//! append to the inventory sink.  Validation failures are counters, never
//! errors; sink failures abort the scan.
//!
//! Records are appended in strictly ascending absolute offset: per-window
//! hits are sorted by start offset before processing (the automaton orders
//! by end position, which overlapping headers of different lengths can
//! invert).

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::hashing::sha256_hex;
use crate::inventory::{InventorySink, RecoveredRecord, SinkError};
use crate::matcher::{HeaderMatcher, MatcherError};
use crate::observe::{ScanObserver, ScanProgress};
use crate::registry::{Profile, SignatureRegistry};
use crate::source::{SourceError, SourceMap};
use crate::trim::trim_or_repair;
use crate::validate::{check_entropy, validate_structure, CarvedType, ENTROPY_THRESHOLD};

/// Default scan block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Monotonic per-scan counters.  Every raw match lands in exactly one of
/// the outcome buckets, so
/// `raw_matches == valid + duplicate + rejected_entropy + rejected_structure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanMetrics {
    pub bytes_scanned:      u64,
    pub blocks_scanned:     u64,
    pub raw_matches:        u64,
    pub valid_matches:      u64,
    pub duplicate_matches:  u64,
    pub rejected_entropy:   u64,
    pub rejected_structure: u64,
    pub elapsed_seconds:    f64,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Iteration block size `B`; the window is `B + overlap` except at EOF.
    pub block_size: u64,
    pub profile:    Profile,
}

impl ScanOptions {
    pub fn new(profile: Profile) -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, profile }
    }
}

/// Orchestrates one scan of one source.
pub struct ScanDriver<'a> {
    registry: &'a SignatureRegistry,
    options:  ScanOptions,
}

impl<'a> ScanDriver<'a> {
    pub fn new(registry: &'a SignatureRegistry, options: ScanOptions) -> Self {
        Self { registry, options }
    }

    /// Run the scan loop over `source`, appending accepted records to
    /// `sink` and reporting progress to `observer`.
    ///
    /// Returns the final metrics.  Validation failures never abort the
    /// scan; source bounds violations and sink failures do.
    pub fn run(
        &self,
        source:   &SourceMap,
        sink:     &mut dyn InventorySink,
        observer: &mut dyn ScanObserver,
    ) -> Result<ScanMetrics, ScanError> {
        let matcher = HeaderMatcher::build(self.registry)?;
        let overlap = self.registry.max_header_size().saturating_sub(1) as u64;
        let block   = self.options.block_size.max(1);
        let profile = &self.options.profile;
        let size    = source.size();

        log::info!(
            "scanning {} bytes in {} byte blocks ({} signatures, overlap {})",
            size,
            block,
            self.registry.len(),
            overlap,
        );

        let mut metrics = ScanMetrics::default();
        let mut seen: HashSet<(u64, usize)> = HashSet::new();
        let started = Instant::now();
        let mut last_tick  = started;
        let mut last_bytes = 0u64;

        let mut offset = 0u64;
        while offset < size {
            let block_len = block.min(size - offset);
            let scan_len  = (block_len + overlap).min(size - offset);
            let window    = source.segment(offset, scan_len)?;

            let mut hits = matcher.find_all(window);
            hits.sort_by_key(|m| (m.offset, m.signature));

            for hit in hits {
                let abs = offset + hit.offset as u64;

                // Boundary rule: hits in the overlap tail belong to the
                // next block, whose window starts on them.
                if abs >= offset + block_len {
                    continue;
                }

                metrics.raw_matches += 1;
                if !seen.insert((abs, hit.signature)) {
                    metrics.duplicate_matches += 1;
                    continue;
                }

                let signature = self.registry.get(hit.signature);
                let blob = source.segment(abs, signature.max_size.min(size - abs))?;

                if profile.validate_entropy && !check_entropy(blob, ENTROPY_THRESHOLD) {
                    metrics.rejected_entropy += 1;
                    continue;
                }

                let ty = CarvedType::from_name(&signature.name);
                if profile.validate_structure
                    && !validate_structure(blob, ty, profile.allow_repair)
                {
                    metrics.rejected_structure += 1;
                    continue;
                }

                let trimmed = match trim_or_repair(blob, ty) {
                    Some(t) => t,
                    None => {
                        metrics.rejected_structure += 1;
                        continue;
                    }
                };

                metrics.valid_matches += 1;
                let record = RecoveredRecord {
                    name:           format!("{}_{:04}", signature.name, metrics.valid_matches),
                    type_name:      signature.name.clone(),
                    size_bytes:     trimmed.bytes.len() as u64,
                    offset:         abs,
                    hash:           sha256_hex(&trimmed.bytes),
                    repaired:       trimmed.repaired,
                    recovered_path: None,
                };
                log::debug!(
                    "accepted {} at {:#x} ({} bytes{})",
                    record.type_name,
                    abs,
                    record.size_bytes,
                    if record.repaired { ", repaired" } else { "" },
                );
                observer.on_detection(&signature.name);
                sink.add_entry(record, &trimmed.bytes)?;
            }

            metrics.blocks_scanned += 1;
            metrics.bytes_scanned += block_len;
            offset += block;

            let elapsed = started.elapsed().as_secs_f64();
            let tick    = last_tick.elapsed().as_secs_f64();
            let average = if elapsed > 0.0 {
                metrics.bytes_scanned as f64 / elapsed / (1024.0 * 1024.0)
            } else {
                0.0
            };
            let current = if tick > 0.0 {
                (metrics.bytes_scanned - last_bytes) as f64 / tick / (1024.0 * 1024.0)
            } else {
                average
            };
            last_tick  = Instant::now();
            last_bytes = metrics.bytes_scanned;

            observer.on_block(&ScanProgress {
                bytes_scanned:  metrics.bytes_scanned,
                total_bytes:    size,
                blocks_scanned: metrics.blocks_scanned,
                detections:     metrics.valid_matches,
                current_mbps:   current,
                average_mbps:   average,
                eta_seconds:    (average > 0.0).then(|| {
                    (size - metrics.bytes_scanned) as f64 / (average * 1024.0 * 1024.0)
                }),
            });
        }

        metrics.elapsed_seconds = started.elapsed().as_secs_f64();
        sink.set_scan_metrics(&metrics);

        log::info!(
            "scan finished: {} raw, {} valid, {} duplicate, {} low-entropy, {} structural rejects in {:.2}s",
            metrics.raw_matches,
            metrics.valid_matches,
            metrics.duplicate_matches,
            metrics.rejected_entropy,
            metrics.rejected_structure,
            metrics.elapsed_seconds,
        );

        Ok(metrics)
    }
}
