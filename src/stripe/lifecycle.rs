//! Stripe File Lifecycle
//!
//! Creation, block writes, close and discard of the three stripe files that
//! back one object while it is being written.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};

use tracing::{debug, instrument, warn};

use crate::domain::{BlockSink, ObjectName};
use crate::error::{Error, Result};

use super::layout::{StripeLocations, StripePaths};
use super::parity::split_and_parity;
use super::{StripeRole, HALF_BLOCK};

/// Three freshly created stripe files, open for writing
///
/// Files are named by the logical name until the writer publishes them.
#[derive(Debug)]
pub struct StripeSet {
    name: ObjectName,
    locations: StripeLocations,
    paths: StripePaths,
    files: [File; 3],
}

/// A stripe set whose handles have been closed but which is not yet published
#[derive(Debug)]
pub(crate) struct ClosedStripes {
    pub name: ObjectName,
    pub locations: StripeLocations,
    pub paths: StripePaths,
}

impl StripeSet {
    /// Create the three stripe files for `name`
    ///
    /// Fails with [`Error::AlreadyExists`] if any location already holds an
    /// entry for the name (a dangling alias counts). Files are created with
    /// exclusive-create, so a concurrent creator that passed the check also
    /// loses with `AlreadyExists`. Files created by this call are removed
    /// again if a later one fails.
    #[instrument(skip_all, fields(name = %name))]
    pub fn create(locations: &StripeLocations, name: &ObjectName) -> Result<Self> {
        let paths = locations.paths(name.as_str());

        for (_, path) in paths.iter() {
            match fs::symlink_metadata(path) {
                Ok(_) => {
                    return Err(Error::AlreadyExists {
                        name: name.to_string(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut files = Vec::with_capacity(3);
        for (role, path) in paths.iter() {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(file) => files.push(file),
                Err(e) => {
                    // Roll back only what this call created
                    drop(files);
                    for (created_role, created) in paths.iter().take(role.index()) {
                        if let Err(rm) = fs::remove_file(created) {
                            warn!(role = %created_role, "Failed to roll back stripe file: {}", rm);
                        }
                    }
                    return Err(match e.kind() {
                        ErrorKind::AlreadyExists => Error::AlreadyExists {
                            name: name.to_string(),
                        },
                        _ => e.into(),
                    });
                }
            }
        }

        let files: [File; 3] = files
            .try_into()
            .map_err(|_| Error::Internal("expected exactly three stripe files".to_string()))?;

        debug!("Created stripe set");

        Ok(Self {
            name: name.clone(),
            locations: locations.clone(),
            paths,
            files,
        })
    }

    /// Logical name this set was created for
    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Current (pre-publish) paths of the three stripe files
    pub fn paths(&self) -> &StripePaths {
        &self.paths
    }

    /// Close all three handles
    ///
    /// Every handle is flushed and closed even if an earlier one fails; the
    /// first error in data-A, data-B, parity order is returned.
    pub fn close(self) -> Result<()> {
        self.finish().1
    }

    /// Close the handles and remove the unpublished files, best effort
    pub fn discard(self) {
        let (closed, _) = self.finish();
        closed.discard();
    }

    pub(crate) fn finish(self) -> (ClosedStripes, Result<()>) {
        let mut first_error: Option<std::io::Error> = None;

        for (role, file) in StripeRole::ALL.into_iter().zip(self.files) {
            if let Err(e) = file.sync_all() {
                warn!(role = %role, "Failed to flush stripe on close: {}", e);
                first_error.get_or_insert(e);
            }
            drop(file);
        }

        let closed = ClosedStripes {
            name: self.name,
            locations: self.locations,
            paths: self.paths,
        };

        match first_error {
            Some(e) => (closed, Err(e.into())),
            None => (closed, Ok(())),
        }
    }
}

impl ClosedStripes {
    pub fn discard(&self) {
        for (role, path) in self.paths.iter() {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(role = %role, path = %path.display(), "Failed to discard stripe: {}", e);
                }
            }
        }
    }
}

impl BlockSink for StripeSet {
    /// Split the block and write A-half, B-half, parity in that order
    fn write_block(&mut self, block: &[u8]) -> Result<()> {
        let split = split_and_parity(block);
        let [a, b, p] = &mut self.files;

        write_half(a, StripeRole::DataA, split.a)?;
        write_half(b, StripeRole::DataB, split.b)?;
        write_half(p, StripeRole::Parity, &split.parity)?;
        Ok(())
    }
}

/// Write one half block with a single write call
///
/// Storage writes are assumed all-or-nothing; a partial transfer is reported
/// as [`Error::ShortWrite`] rather than retried.
pub(crate) fn write_half<W: Write>(writer: &mut W, role: StripeRole, half: &[u8]) -> Result<()> {
    let written = writer.write(half)?;
    if written != HALF_BLOCK {
        return Err(Error::ShortWrite {
            role,
            written,
            expected: HALF_BLOCK,
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
