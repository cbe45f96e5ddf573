//! Write Pipeline
//!
//! Pads the payload out to whole blocks, drives the parity engine one block
//! at a time and then publishes the stripes under their content-addressed
//! name.
//!
//! # Publish sequence
//!
//! ```text
//! write blocks ──▶ close ──▶ rename ×3 (N → N$len$digest) ──▶ alias ×3 (N → N$len$digest)
//! ```
//!
//! Neither the renames nor the aliases are atomic as a group. A crash in
//! between leaves the locations inconsistent; `repair::reconcile` completes
//! such a publish from whatever made it to disk.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::domain::{BlockSink, PayloadWriter, WriteSummary};
use crate::error::Result;

use super::digest::DigestBuilder;
use super::lifecycle::{ClosedStripes, StripeSet};
use super::metadata::ObjectMetadata;
use super::BLOCK_SIZE;

// =============================================================================
// Padded Writer
// =============================================================================

/// Default payload writer: whole blocks as-is, zero-padded tail block
///
/// The digest covers payload bytes only, in order; the padding is excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaddedWriter;

impl PayloadWriter for PaddedWriter {
    fn write_payload(&self, sink: &mut dyn BlockSink, payload: &[u8]) -> Result<WriteSummary> {
        let mut digest = DigestBuilder::new();
        let mut blocks = payload.chunks_exact(BLOCK_SIZE);

        for block in &mut blocks {
            sink.write_block(block)?;
            digest.update(block);
        }

        let tail = blocks.remainder();
        if !tail.is_empty() {
            digest.update(tail);
            let mut padded = vec![0u8; BLOCK_SIZE];
            padded[..tail.len()].copy_from_slice(tail);
            sink.write_block(&padded)?;
        }

        Ok(WriteSummary {
            length: payload.len() as u64,
            digest: digest.finalize(),
        })
    }
}

// =============================================================================
// Stripe Writer
// =============================================================================

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedObject {
    /// Metadata bound into the content-addressed name
    pub metadata: ObjectMetadata,
    /// On-disk file name of every stripe
    pub content_name: String,
}

/// Writes a payload into a stripe set and publishes it
///
/// The payload writer is injected at construction; [`StripeWriter::new`]
/// uses [`PaddedWriter`].
#[derive(Debug)]
pub struct StripeWriter<W = PaddedWriter> {
    set: StripeSet,
    writer: W,
}

impl StripeWriter<PaddedWriter> {
    pub fn new(set: StripeSet) -> Self {
        Self::with_writer(set, PaddedWriter)
    }
}

impl<W: PayloadWriter> StripeWriter<W> {
    /// Use a custom payload writer
    pub fn with_writer(set: StripeSet, writer: W) -> Self {
        Self { set, writer }
    }

    /// Write the payload, close the stripes, rename and alias them
    ///
    /// If the write or the close fails, the unpublished stripe files are
    /// removed so the name can be written again. Failures during rename or
    /// aliasing are returned as-is and leave the partial publish on disk.
    #[instrument(skip_all, fields(name = %self.set.name(), payload_len = payload.len()))]
    pub fn write_and_publish(self, payload: &[u8]) -> Result<PublishedObject> {
        let Self { mut set, writer } = self;

        let summary = match writer.write_payload(&mut set, payload) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Write failed, discarding stripes: {}", e);
                set.discard();
                return Err(e);
            }
        };

        let (closed, closed_ok) = set.finish();
        if let Err(e) = closed_ok {
            warn!("Close failed, discarding stripes: {}", e);
            closed.discard();
            return Err(e);
        }

        publish(&closed, summary)
    }
}

fn publish(closed: &ClosedStripes, summary: WriteSummary) -> Result<PublishedObject> {
    let metadata = ObjectMetadata::new(closed.name.as_str(), summary.length, summary.digest);
    let content_name = metadata.encode();
    let final_paths = closed.locations.paths(&content_name);

    for (role, from) in closed.paths.iter() {
        fs::rename(from, final_paths.get(role)).inspect_err(|e| {
            warn!(role = %role, "Rename to content-addressed name failed: {}", e);
        })?;
        debug!(role = %role, "Renamed stripe");
    }

    for (role, alias) in closed.paths.iter() {
        create_alias(&content_name, alias).inspect_err(|e| {
            warn!(role = %role, "Alias creation failed: {}", e);
        })?;
        debug!(role = %role, "Created alias");
    }

    info!(
        content_name = %content_name,
        length = summary.length,
        "Published object"
    );

    Ok(PublishedObject {
        metadata,
        content_name,
    })
}

/// Point `alias` at `target_name`, relative to the alias's own directory
pub(crate) fn create_alias(target_name: &str, alias: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target_name, alias)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target_name, alias)
    }
}

// =============================================================================
// Tests
// =============================================================================
