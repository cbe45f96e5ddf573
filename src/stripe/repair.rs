//! Repair
//!
//! Publishing renames and aliases three files in three directories, one at a
//! time. A crash part-way leaves some locations with the logical name still
//! a plain file, or with a content-addressed file but no alias. Losing a
//! disk leaves a location without the object at all.
//!
//! - [`reconcile`] finishes interrupted publishes from what is on disk.
//! - [`rebuild`] regenerates a lost stripe of one object from the other two.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::ObjectName;
use crate::error::{Error, Result};

use super::layout::StripeLocations;
use super::lifecycle::write_half;
use super::metadata::{decode_metadata, SEPARATOR};
use super::parity::xor_into;
use super::reader::StripeReader;
use super::writer::create_alias;
use super::{StripeRole, BLOCK_SIZE, HALF_BLOCK};

// =============================================================================
// Report
// =============================================================================

/// What a reconciliation pass found and fixed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// `(role, content name)` of stripes renamed from their logical name
    pub renamed: Vec<(StripeRole, String)>,
    /// `(role, logical name)` of aliases created
    pub aliased: Vec<(StripeRole, String)>,
    /// `(role, content name)` of stripes absent from a location
    pub missing: Vec<(StripeRole, String)>,
    /// `(role, logical name)` of stripes regenerated from the other two
    pub rebuilt: Vec<(StripeRole, String)>,
    /// File names containing `$` that do not decode
    pub corrupt: Vec<String>,
    /// Logical names left alone because a writer holds them
    pub skipped: Vec<String>,
    /// `(role, file name)` of staging files left by an interrupted rebuild
    pub removed_staging: Vec<(StripeRole, String)>,
}

impl RepairReport {
    /// Whether the pass changed anything on disk
    pub fn changed(&self) -> bool {
        !self.renamed.is_empty()
            || !self.aliased.is_empty()
            || !self.rebuilt.is_empty()
            || !self.removed_staging.is_empty()
    }
}

/// Suffix marking a stripe that is still being rebuilt
const STAGING_SUFFIX: &str = "rebuild";

/// `<content name>$rebuild`: carries the separator, so no logical name or
/// alias can collide with it
fn staging_name(content_name: &str) -> String {
    format!("{}{}{}", content_name, SEPARATOR, STAGING_SUFFIX)
}

/// Content name a staging file belongs to, if `file_name` is one
fn staged_content_name(file_name: &str) -> Option<&str> {
    let (content_name, suffix) = file_name.rsplit_once(SEPARATOR)?;
    (suffix == STAGING_SUFFIX && decode_metadata(content_name).is_ok()).then_some(content_name)
}

// =============================================================================
// Reconcile
// =============================================================================

/// Complete interrupted publishes across the three locations
///
/// For every content-addressed file found in any location:
/// - a location where the logical name is still a plain file gets it renamed
///   to the content-addressed name;
/// - a location holding the content-addressed file without an alias gets the
///   alias;
/// - a location holding neither is reported as missing.
///
/// Staging files left behind by an interrupted [`rebuild`] are removed.
///
/// Must not run concurrently with writers of the same names.
pub fn reconcile(locations: &StripeLocations) -> Result<RepairReport> {
    reconcile_except(locations, |_| false)
}

/// [`reconcile`], leaving alone every logical name for which `busy` is true
#[instrument(skip_all)]
pub fn reconcile_except<F>(locations: &StripeLocations, busy: F) -> Result<RepairReport>
where
    F: Fn(&str) -> bool,
{
    let mut report = RepairReport::default();

    // logical name -> content-addressed names seen anywhere
    let mut objects: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (role, dir) in locations.iter() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !file_name.contains(SEPARATOR) {
                continue;
            }
            if let Some(content_name) = staged_content_name(&file_name) {
                let owner = decode_metadata(content_name).map(|meta| meta.name);
                if owner.as_deref().is_ok_and(|owner| busy(owner)) {
                    continue;
                }
                fs::remove_file(entry.path())?;
                info!(role = %role, file = %file_name, "Removed stale rebuild staging file");
                report.removed_staging.push((role, file_name));
                continue;
            }
            match decode_metadata(&file_name) {
                Ok(meta) => {
                    objects.entry(meta.name).or_default().insert(file_name);
                }
                Err(_) => {
                    if !report.corrupt.contains(&file_name) {
                        report.corrupt.push(file_name);
                    }
                }
            }
        }
    }

    for (logical, content_names) in &objects {
        if busy(logical) {
            debug!(name = %logical, "Name is being written, skipping");
            report.skipped.push(logical.clone());
            continue;
        }
        if content_names.len() > 1 {
            warn!(name = %logical, versions = content_names.len(), "Several published versions, skipping");
            continue;
        }
        let Some(content_name) = content_names.first() else {
            continue;
        };

        for (role, dir) in locations.iter() {
            let alias = dir.join(logical);
            let content = dir.join(content_name);

            let alias_meta = match fs::symlink_metadata(&alias) {
                Ok(meta) => Some(meta),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            let content_present = match fs::symlink_metadata(&content) {
                Ok(_) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            };

            match (alias_meta, content_present) {
                // rename never happened here
                (Some(meta), false) if meta.is_file() => {
                    fs::rename(&alias, &content)?;
                    create_alias(content_name, &alias)?;
                    info!(role = %role, content_name = %content_name, "Completed rename");
                    report.renamed.push((role, content_name.clone()));
                    report.aliased.push((role, logical.clone()));
                }
                (None, true) => {
                    create_alias(content_name, &alias)?;
                    info!(role = %role, name = %logical, "Created missing alias");
                    report.aliased.push((role, logical.clone()));
                }
                (_, false) => {
                    report.missing.push((role, content_name.clone()));
                }
                _ => {}
            }
        }
    }

    Ok(report)
}

// =============================================================================
// Rebuild
// =============================================================================

/// Regenerate the missing stripe of `name` from the two survivors
///
/// Returns the role that was rebuilt, or `None` if all three stripes are
/// present. Objects that were never published cannot be rebuilt.
#[instrument(skip_all, fields(name = %name))]
pub fn rebuild(locations: &StripeLocations, name: &ObjectName) -> Result<Option<StripeRole>> {
    let mut reader = StripeReader::open(locations, name)?;
    let Some(role) = reader.missing() else {
        return Ok(None);
    };
    let content_name = reader
        .content_name()
        .ok_or_else(|| Error::Internal(format!("{} was never published", name)))?
        .to_string();

    let dir = locations.dir(role);
    let target = dir.join(&content_name);
    let staging = dir.join(staging_name(&content_name));

    // only an earlier interrupted rebuild of this same object leaves one
    match fs::symlink_metadata(&staging) {
        Ok(_) => fs::remove_file(&staging)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staging)?;

    let blocks = reader.len().div_ceil(BLOCK_SIZE as u64);
    let mut parity = vec![0u8; HALF_BLOCK];
    for index in 0..blocks {
        let (a, b) = reader.block_halves(index)?;
        let half = match role {
            StripeRole::DataA => a,
            StripeRole::DataB => b,
            StripeRole::Parity => {
                parity.copy_from_slice(a);
                xor_into(&mut parity, b);
                parity.as_slice()
            }
        };
        if let Err(e) = write_half(&mut out, role, half) {
            drop(out);
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
    }
    out.sync_all()?;
    drop(out);

    fs::rename(&staging, &target)?;

    let alias = dir.join(name.as_str());
    match fs::symlink_metadata(&alias) {
        Ok(_) => fs::remove_file(&alias)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    create_alias(&content_name, &alias)?;

    info!(role = %role, blocks, "Rebuilt stripe");
    Ok(Some(role))
}

// =============================================================================
// Tests
// =============================================================================
