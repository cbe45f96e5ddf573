//! Store Facade
//!
//! Ties the striping engine to name validation, write claims and metrics.
//! Everything above this layer (HTTP server, CLI) speaks in plain strings and
//! byte buffers.
//!
//! ```text
//! put ──▶ validate ──▶ claim ──▶ StripeSet::create ──▶ StripeWriter ──▶ publish
//! get ──▶ validate ──▶ not claimed? ──▶ StripeReader::open ──▶ read_all
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::ObjectName;
use crate::error::{Error, Result};
use crate::metrics::StoreMetrics;
use crate::stripe::{
    decode_metadata, rebuild, reconcile_except, ContentDigest, NameClaim, NameLocks,
    PublishedObject, RepairReport, StripeLocations, StripeReader, StripeRole, StripeSet,
    StripeWriter,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directories for data-A, data-B and parity stripes
    pub locations: StripeLocations,

    /// Check the content digest on whole-object reads
    pub verify_digest: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            locations: StripeLocations::new("data/a", "data/b", "data/parity"),
            verify_digest: true,
        }
    }
}

// =============================================================================
// Object Info
// =============================================================================

/// Published state of one object, as reported by [`StripeStore::stat`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub length: u64,
    /// `None` for an empty object that was never aliased
    pub digest: Option<ContentDigest>,
    pub content_name: Option<String>,
    /// Stripe that could not be opened, if any
    pub missing: Option<StripeRole>,
}

// =============================================================================
// Store
// =============================================================================

/// Striped object store over three local directories
#[derive(Debug)]
pub struct StripeStore {
    config: StoreConfig,
    locks: NameLocks,
    metrics: StoreMetrics,
}

impl StripeStore {
    /// Create a store; the three locations must be distinct
    pub fn new(config: StoreConfig) -> Result<Self> {
        let dirs: BTreeSet<PathBuf> = config
            .locations
            .iter()
            .map(|(_, dir)| dir.to_path_buf())
            .collect();
        if dirs.len() != StripeRole::ALL.len() {
            return Err(Error::Config(
                "data-a, data-b and parity directories must be distinct".to_string(),
            ));
        }

        Ok(Self {
            config,
            locks: NameLocks::new(),
            metrics: StoreMetrics::new()?,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn locations(&self) -> &StripeLocations {
        &self.config.locations
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Create any missing stripe directories
    pub fn provision(&self) -> Result<()> {
        for (role, dir) in self.locations().iter() {
            fs::create_dir_all(dir)?;
            info!(role = %role, dir = %dir.display(), "Stripe directory ready");
        }
        Ok(())
    }

    /// Store `payload` under `name`
    ///
    /// Fails with [`Error::Busy`] while another writer holds the name and
    /// with [`Error::AlreadyExists`] once it has been written.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub fn put(&self, name: &str, payload: &[u8]) -> Result<PublishedObject> {
        self.observe("put", || {
            let name = ObjectName::parse(name)?;
            let _claim = self.claim(&name)?;

            let set = StripeSet::create(self.locations(), &name)?;
            let published = StripeWriter::new(set).write_and_publish(payload)?;

            self.metrics.objects_written.inc();
            self.metrics.bytes_written.inc_by(published.metadata.length);
            Ok(published)
        })
    }

    /// Read back the whole object stored under `name`
    #[instrument(skip(self))]
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.observe("get", || {
            let mut reader = self.open(name)?;
            let data = if self.config.verify_digest {
                reader.read_all()?
            } else {
                reader.read_all_unverified()?
            };

            self.metrics.objects_read.inc();
            self.metrics.bytes_read.inc_by(data.len() as u64);
            if reader.is_degraded() {
                self.metrics.degraded_reads.inc();
                self.metrics
                    .reconstructed_blocks
                    .inc_by(reader.reconstructed_blocks());
            }
            Ok(data)
        })
    }

    /// Describe the object stored under `name` without reading it
    pub fn stat(&self, name: &str) -> Result<ObjectInfo> {
        self.observe("stat", || {
            let reader = self.open(name)?;
            Ok(ObjectInfo {
                name: reader.name().to_string(),
                length: reader.len(),
                digest: reader.digest(),
                content_name: reader.content_name().map(str::to_string),
                missing: reader.missing(),
            })
        })
    }

    /// Finish interrupted publishes, then rebuild every lost stripe
    ///
    /// Names held by a writer are skipped. An object that cannot be rebuilt
    /// is logged and left for the next pass.
    #[instrument(skip(self))]
    pub fn repair(&self) -> Result<RepairReport> {
        self.observe("repair", || {
            let mut report = reconcile_except(self.locations(), |name| self.locks.is_claimed(name))?;

            let lost: BTreeSet<String> = report
                .missing
                .iter()
                .filter_map(|(_, content_name)| decode_metadata(content_name).ok())
                .map(|meta| meta.name)
                .collect();

            for logical in lost {
                let name = ObjectName::parse(logical.as_str())?;
                let Some(_claim) = self.locks.try_claim(name.as_str()) else {
                    report.skipped.push(logical);
                    continue;
                };
                match rebuild(self.locations(), &name) {
                    Ok(Some(role)) => report.rebuilt.push((role, logical)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(name = %name, "Rebuild failed: {}", e);
                        self.metrics.record_error("rebuild", &e);
                    }
                }
            }

            info!(
                renamed = report.renamed.len(),
                aliased = report.aliased.len(),
                rebuilt = report.rebuilt.len(),
                "Repair pass complete"
            );
            Ok(report)
        })
    }

    fn open(&self, name: &str) -> Result<StripeReader> {
        let name = ObjectName::parse(name)?;
        if self.locks.is_claimed(name.as_str()) {
            return Err(Error::Busy {
                name: name.to_string(),
            });
        }
        StripeReader::open(self.locations(), &name)
    }

    fn claim(&self, name: &ObjectName) -> Result<NameClaim> {
        self.locks.try_claim(name.as_str()).ok_or_else(|| Error::Busy {
            name: name.to_string(),
        })
    }

    fn observe<T>(&self, op: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = f();
        if let Err(e) = &result {
            self.metrics.record_error(op, e);
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
