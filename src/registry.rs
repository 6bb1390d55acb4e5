//! Signature registry — the table of headers the scanner hunts for.
//!
//! # Input format
//!
//! The registry is consumed as data: a JSON object with a `signatures` map
//! (`name → {header, max_size}`) and a `profiles` map
//! (`name → {max_size_factor, validate_entropy, validate_structure,
//! allow_repair?}`).  Headers are even-length hex strings decoded
//! bit-exactly; `max_size` caps the bytes sampled at detection time.
//! Profiles `fast`, `balanced`, and `deep` must always be present.
//!
//! The effective per-signature cap is
//! `max(1, floor(max_size * profile.max_size_factor))` — a profile scales
//! every signature uniformly rather than editing the table.
//!
//! # Invariants
//!
//! Signature names are unique (map keys), headers are non-empty, and
//! `max_header_size` is cached at construction for the scan driver's
//! overlap computation.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read signature config {path}: {source}")]
    Read { path: String, #[source] source: io::Error },
    #[error("Malformed signature config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Config must define at least one signature")]
    NoSignatures,
    #[error("Invalid header for signature '{name}': must be valid even-length hex")]
    InvalidHeader { name: String },
    #[error("Invalid max_size for signature '{0}': must be > 0")]
    InvalidMaxSize(String),
    #[error("Missing required profiles: {0}")]
    MissingProfiles(String),
    #[error("Profile '{0}' has invalid max_size_factor (must be > 0)")]
    InvalidFactor(String),
    #[error("Unknown profile '{name}'. Available: {available}")]
    UnknownProfile { name: String, available: String },
}

/// Gates applied by the scan driver.  `allow_repair` doubles as the
/// tolerant-validation flag: a profile that repairs must also accept
/// truncated-but-plausible candidates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
    pub max_size_factor:    f64,
    pub validate_entropy:   bool,
    pub validate_structure: bool,
    #[serde(default)]
    pub allow_repair:       bool,
}

/// One signature as declared in the config, header still hex-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureSpec {
    pub header:   String,
    pub max_size: u64,
}

/// Raw registry input, exactly as deserialized.  Validation happens in
/// [`SignatureRegistry::from_config`] so a malformed table is rejected
/// before the scan loop is ever built.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub signatures: BTreeMap<String, SignatureSpec>,
    pub profiles:   BTreeMap<String, Profile>,
}

impl RegistryConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| RegistryError::Read {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Built-in table: the four default carve targets and the three
    /// required profiles.
    pub fn builtin() -> Self {
        let mut signatures = BTreeMap::new();
        signatures.insert("JPEG".into(), SignatureSpec {
            header:   "ffd8ff".into(),
            max_size: 10 * 1024 * 1024,
        });
        signatures.insert("PNG".into(), SignatureSpec {
            header:   "89504e47".into(),
            max_size: 6 * 1024 * 1024,
        });
        signatures.insert("MP4".into(), SignatureSpec {
            header:   "0000001866747970".into(),
            max_size: 32 * 1024 * 1024,
        });
        signatures.insert("ZIP".into(), SignatureSpec {
            header:   "504b0304".into(),
            max_size: 16 * 1024 * 1024,
        });

        let mut profiles = BTreeMap::new();
        profiles.insert("fast".into(), Profile {
            max_size_factor:    0.5,
            validate_entropy:   false,
            validate_structure: false,
            allow_repair:       false,
        });
        profiles.insert("balanced".into(), Profile {
            max_size_factor:    1.0,
            validate_entropy:   true,
            validate_structure: true,
            allow_repair:       false,
        });
        // Deep recovery digs for everything it can still save: double the
        // sample cap, keep low-entropy candidates, repair truncations.
        profiles.insert("deep".into(), Profile {
            max_size_factor:    2.0,
            validate_entropy:   false,
            validate_structure: true,
            allow_repair:       true,
        });

        Self { signatures, profiles }
    }
}

/// A registered signature with its header decoded and its cap scaled by
/// the active profile.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name:     String,
    pub header:   Vec<u8>,
    pub max_size: u64,
}

/// Immutable signature table.  Signature order is the config's key order
/// and doubles as the pattern id space of the header matcher.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    signatures:      Vec<Signature>,
    max_header_size: usize,
}

const REQUIRED_PROFILES: [&str; 3] = ["fast", "balanced", "deep"];

impl SignatureRegistry {
    /// Validate `config`, apply `profile_name`, and build the registry.
    ///
    /// All config defects (empty table, bad hex, non-positive sizes or
    /// factors, missing required profiles) surface here, before any
    /// scanning state exists.
    pub fn from_config(
        config:       &RegistryConfig,
        profile_name: &str,
    ) -> Result<(Self, Profile), RegistryError> {
        if config.signatures.is_empty() {
            return Err(RegistryError::NoSignatures);
        }

        let missing: Vec<&str> = REQUIRED_PROFILES
            .iter()
            .copied()
            .filter(|p| !config.profiles.contains_key(*p))
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::MissingProfiles(missing.join(", ")));
        }
        for (name, profile) in &config.profiles {
            if !(profile.max_size_factor > 0.0) {
                return Err(RegistryError::InvalidFactor(name.clone()));
            }
        }

        let profile = config.profiles.get(profile_name).ok_or_else(|| {
            RegistryError::UnknownProfile {
                name:      profile_name.to_owned(),
                available: config.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
            }
        })?;

        let mut signatures = Vec::with_capacity(config.signatures.len());
        for (name, spec) in &config.signatures {
            let header = hex::decode(&spec.header)
                .map_err(|_| RegistryError::InvalidHeader { name: name.clone() })?;
            if header.is_empty() {
                return Err(RegistryError::InvalidHeader { name: name.clone() });
            }
            if spec.max_size == 0 {
                return Err(RegistryError::InvalidMaxSize(name.clone()));
            }
            let max_size = ((spec.max_size as f64 * profile.max_size_factor).floor() as u64).max(1);
            signatures.push(Signature { name: name.clone(), header, max_size });
        }

        let max_header_size = signatures.iter().map(|s| s.header.len()).max().unwrap_or(0);
        Ok((Self { signatures, max_header_size }, profile.clone()))
    }

    #[inline] pub fn signatures(&self)     -> &[Signature] { &self.signatures }
    #[inline] pub fn get(&self, id: usize) -> &Signature   { &self.signatures[id] }
    #[inline] pub fn len(&self)            -> usize        { self.signatures.len() }
    #[inline] pub fn is_empty(&self)       -> bool         { self.signatures.is_empty() }

    /// Longest registered header; the driver's window overlap is this − 1.
    #[inline] pub fn max_header_size(&self) -> usize { self.max_header_size }
}
