//! Stripe addressing: maps a logical name onto three physical paths.

use std::path::{Path, PathBuf};

use super::StripeRole;

/// The three root directories holding data-A, data-B and parity stripes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeLocations {
    dirs: [PathBuf; 3],
}

impl StripeLocations {
    /// Create a location set from the three stripe directories
    pub fn new(
        data_a: impl Into<PathBuf>,
        data_b: impl Into<PathBuf>,
        parity: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dirs: [data_a.into(), data_b.into(), parity.into()],
        }
    }

    /// Directory holding the given stripe role
    pub fn dir(&self, role: StripeRole) -> &Path {
        &self.dirs[role.index()]
    }

    /// Iterate `(role, directory)` pairs in write order
    pub fn iter(&self) -> impl Iterator<Item = (StripeRole, &Path)> {
        StripeRole::ALL
            .into_iter()
            .map(move |role| (role, self.dir(role)))
    }

    /// Physical paths of `file_name` in each of the three directories
    pub fn paths(&self, file_name: &str) -> StripePaths {
        StripePaths {
            paths: [
                self.dirs[0].join(file_name),
                self.dirs[1].join(file_name),
                self.dirs[2].join(file_name),
            ],
        }
    }
}

/// Physical paths of a single object across the three locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripePaths {
    paths: [PathBuf; 3],
}

impl StripePaths {
    /// Path of the stripe with the given role
    pub fn get(&self, role: StripeRole) -> &Path {
        &self.paths[role.index()]
    }

    /// Iterate `(role, path)` pairs in write order
    pub fn iter(&self) -> impl Iterator<Item = (StripeRole, &Path)> {
        StripeRole::ALL
            .into_iter()
            .map(move |role| (role, self.get(role)))
    }
}
