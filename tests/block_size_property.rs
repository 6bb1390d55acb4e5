//! Property: the block size is an implementation detail — moving it must
//! not change the set of accepted detections.

use proptest::prelude::*;
use tempfile::TempDir;

use sigcarve::{
    InventorySink, NoopObserver, RecoveredRecord, RegistryConfig, ScanDriver, ScanOptions,
    SignatureRegistry, SinkError, SourceMap,
};

/// In-memory sink; the reports are irrelevant to this property.
#[derive(Default)]
struct VecSink {
    records: Vec<RecoveredRecord>,
}

impl InventorySink for VecSink {
    fn add_entry(&mut self, record: RecoveredRecord, _blob: &[u8]) -> Result<(), SinkError> {
        self.records.push(record);
        Ok(())
    }
    fn set_scan_metrics(&mut self, _metrics: &sigcarve::ScanMetrics) {}
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn detections(source_path: &std::path::Path, block_size: u64) -> Vec<(u64, String, u64, String)> {
    let config = RegistryConfig::builtin();
    let (registry, profile) = SignatureRegistry::from_config(&config, "balanced").unwrap();
    let source = SourceMap::open(source_path, block_size).unwrap();

    let mut sink = VecSink::default();
    ScanDriver::new(&registry, ScanOptions { block_size, profile })
        .run(&source, &mut sink, &mut NoopObserver)
        .unwrap();

    sink.records
        .into_iter()
        .map(|r| (r.offset, r.type_name, r.size_bytes, r.hash))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn block_size_does_not_change_the_detection_set(
        first  in 1_000usize..20_000,
        second in 30_000usize..60_000,
        block  in 512u64..16_384,
    ) {
        // 64 KiB image, two JPEGs, shared EOI at the very end.  The cycling
        // body contains no 0xFF, so only the injected headers match.
        let mut image: Vec<u8> = (0..64 * 1024).map(|i| (i % 255) as u8).collect();
        let head = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xDB];
        image[first..first + head.len()].copy_from_slice(&head);
        image[second..second + head.len()].copy_from_slice(&head);
        let len = image.len();
        image[len - 2..].copy_from_slice(&[0xFF, 0xD9]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evidence.img");
        std::fs::write(&path, &image).unwrap();

        // Single-block scan is the reference.
        let reference = detections(&path, 64 * 1024);
        prop_assert_eq!(reference.len(), 2);

        let moved = detections(&path, block);
        prop_assert_eq!(&reference, &moved);
    }
}
