//! # sigcarve — signature-based file carver for raw disk images
//!
//! Scan guarantees (stable across releases):
//! - The evidence source is opened strictly read-only and memory-mapped;
//!   nothing in this crate ever writes to it
//! - Every registered header occurrence is reported by exactly one scan
//!   window; inter-block overlap plus the boundary rule make matches
//!   straddling a window edge impossible to lose or double-count
//! - Every accepted candidate passes the profile's entropy gate and the
//!   per-type structural validator before it is trimmed and hashed
//! - Every recovered blob is SHA-256 hashed; the inventory records the
//!   digest as the chain-of-custody anchor
//! - Records are emitted in strictly ascending absolute source offset
//! - Scanning the same source twice produces identical reports (modulo the
//!   report timestamp)

pub mod source;
pub mod registry;
pub mod matcher;
pub mod validate;
pub mod trim;
pub mod hashing;
pub mod observe;
pub mod driver;
pub mod inventory;

// Flat re-exports for the most common types.
pub use source::{SourceMap, SourceMetadata, SourceError};
pub use registry::{Signature, SignatureRegistry, RegistryConfig, Profile, RegistryError};
pub use matcher::{HeaderMatcher, RawMatch, MatcherError};
pub use validate::{CarvedType, check_entropy, shannon_entropy, validate_structure,
                   ENTROPY_THRESHOLD};
pub use trim::{trim_or_repair, Trimmed};
pub use hashing::sha256_hex;
pub use observe::{ScanObserver, ScanProgress, NoopObserver};
pub use driver::{ScanDriver, ScanOptions, ScanMetrics, ScanError, DEFAULT_BLOCK_SIZE};
pub use inventory::{InventorySink, RecoveredRecord, CaseInventory, SinkError};
