//! Read / Reconstruction Pipeline
//!
//! Opens an object from any two of its three stripes. When a data stripe is
//! missing, its half of every block is rebuilt on the fly as
//! `parity ^ surviving half`.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use tracing::{debug, instrument, warn};

use crate::domain::ObjectName;
use crate::error::{Error, Result};

use super::digest::{ContentDigest, DigestBuilder};
use super::layout::StripeLocations;
use super::metadata::decode_metadata;
use super::parity::xor_into;
use super::{stripe_len, StripeRole, BLOCK_SIZE, HALF_BLOCK};

/// Stripes needed to serve a read
const REQUIRED_STRIPES: usize = 2;

/// Open handle on a published object
#[derive(Debug)]
pub struct StripeReader {
    name: ObjectName,
    files: [Option<File>; 3],
    missing: Option<StripeRole>,
    content_name: Option<String>,
    length: u64,
    digest: Option<ContentDigest>,
    half_a: Vec<u8>,
    half_b: Vec<u8>,
    reconstructed_blocks: u64,
}

impl StripeReader {
    /// Open `name` from the three locations
    ///
    /// A stripe that is absent (`NotFound`) is tolerated in one location; any
    /// other I/O failure is returned, since a disk that errors is failing
    /// rather than healable. The length and digest come from the alias at a
    /// surviving data location and must agree with the size of that stripe.
    /// An alias that cannot be read over a
    /// zero-length file is treated as an empty object.
    #[instrument(skip_all, fields(name = %name))]
    pub fn open(locations: &StripeLocations, name: &ObjectName) -> Result<Self> {
        let paths = locations.paths(name.as_str());

        let mut files: [Option<File>; 3] = [None, None, None];
        let mut missing = Vec::new();
        for (role, path) in paths.iter() {
            match File::open(path) {
                Ok(file) => files[role.index()] = Some(file),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(role = %role, path = %path.display(), "Stripe missing, trying to recover");
                    missing.push(role);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let available = StripeRole::ALL.len() - missing.len();
        if available < REQUIRED_STRIPES {
            return Err(Error::InsufficientRedundancy {
                name: name.to_string(),
                available,
                required: REQUIRED_STRIPES,
            });
        }

        let probe = if files[StripeRole::DataA.index()].is_some() {
            StripeRole::DataA
        } else {
            StripeRole::DataB
        };

        let (content_name, length, digest) = match fs::read_link(paths.get(probe)) {
            Ok(target) => {
                let content_name = target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::corrupt(target.display().to_string(), "alias target is not a file name")
                    })?
                    .to_string();
                let metadata = decode_metadata(&content_name)?;
                if metadata.name != name.as_str() {
                    return Err(Error::corrupt(
                        content_name,
                        format!("alias belongs to {:?}", metadata.name),
                    ));
                }
                let expected = stripe_len(metadata.length);
                let on_disk = match &files[probe.index()] {
                    Some(file) => file.metadata()?.len(),
                    None => 0,
                };
                if on_disk != expected {
                    return Err(Error::corrupt(
                        content_name,
                        format!(
                            "length {} needs {}-byte stripes, {} stripe has {} bytes",
                            metadata.length, expected, probe, on_disk
                        ),
                    ));
                }
                (Some(content_name), metadata.length, Some(metadata.digest))
            }
            Err(link_err) => {
                let size = match &files[probe.index()] {
                    Some(file) => file.metadata()?.len(),
                    None => 0,
                };
                if size != 0 {
                    return Err(link_err.into());
                }
                debug!("No alias over an empty stripe, treating as empty object");
                (None, 0, None)
            }
        };

        Ok(Self {
            name: name.clone(),
            files,
            missing: missing.first().copied(),
            content_name,
            length,
            digest,
            half_a: vec![0u8; HALF_BLOCK],
            half_b: vec![0u8; HALF_BLOCK],
            reconstructed_blocks: 0,
        })
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Logical length of the object in bytes
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Published digest, `None` for an unpublished empty object
    pub fn digest(&self) -> Option<ContentDigest> {
        self.digest
    }

    /// On-disk content-addressed name, `None` for an unpublished empty object
    pub fn content_name(&self) -> Option<&str> {
        self.content_name.as_deref()
    }

    /// Which stripe could not be opened, if any
    pub fn missing(&self) -> Option<StripeRole> {
        self.missing
    }

    /// Whether reads have to reconstruct a data stripe
    pub fn is_degraded(&self) -> bool {
        self.missing.is_some_and(StripeRole::is_data)
    }

    /// Blocks rebuilt through parity so far
    pub fn reconstructed_blocks(&self) -> u64 {
        self.reconstructed_blocks
    }

    /// Read logical bytes starting at `offset` into `out`
    ///
    /// Reads whole blocks from the two active stripes, reconstructing a
    /// missing data half, and stops when `out` is full or the logical end is
    /// reached. Returns the number of bytes copied.
    pub fn read(&mut self, out: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= self.length || out.is_empty() {
            return Ok(0);
        }

        let wanted = (self.length - offset).min(out.len() as u64) as usize;
        let mut block = offset / BLOCK_SIZE as u64;
        let mut start = (offset % BLOCK_SIZE as u64) as usize;

        self.seek_active(block * HALF_BLOCK as u64)?;

        let mut copied = 0;
        while copied < wanted {
            self.load_next_block()?;

            let block_offset = block * BLOCK_SIZE as u64;
            let valid = (self.length - block_offset).min(BLOCK_SIZE as u64) as usize;
            let take = (valid - start).min(wanted - copied);

            copy_from_halves(
                &self.half_a,
                &self.half_b,
                start,
                &mut out[copied..copied + take],
            );

            copied += take;
            start = 0;
            block += 1;
        }

        Ok(copied)
    }

    /// Read the whole object and check it against the published digest
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let data = self.read_all_unverified()?;
        self.verify(&data)?;
        Ok(data)
    }

    /// Read the whole object without recomputing the digest
    pub fn read_all_unverified(&mut self) -> Result<Vec<u8>> {
        let length = usize::try_from(self.length).map_err(|_| {
            Error::Internal(format!(
                "object of {} bytes does not fit in memory",
                self.length
            ))
        })?;
        let mut data = vec![0u8; length];
        let read = self.read(&mut data, 0)?;
        data.truncate(read);
        Ok(data)
    }

    /// Compare `data` with the published digest
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let Some(expected) = self.digest else {
            return Ok(());
        };

        let mut builder = DigestBuilder::new();
        builder.update(data);
        let actual = builder.finalize();

        if actual != expected {
            return Err(Error::DigestMismatch {
                name: self.name.to_string(),
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Load both data halves of block `index`
    ///
    /// Used by repair to regenerate a lost stripe.
    pub(crate) fn block_halves(&mut self, index: u64) -> Result<(&[u8], &[u8])> {
        self.seek_active(index * HALF_BLOCK as u64)?;
        self.load_next_block()?;
        Ok((self.half_a.as_slice(), self.half_b.as_slice()))
    }

    // Data-A and data-B when both exist, otherwise the survivor plus parity
    fn active_roles(&self) -> (StripeRole, StripeRole) {
        match self.missing {
            Some(StripeRole::DataA) => (StripeRole::Parity, StripeRole::DataB),
            Some(StripeRole::DataB) => (StripeRole::DataA, StripeRole::Parity),
            _ => (StripeRole::DataA, StripeRole::DataB),
        }
    }

    fn seek_active(&mut self, stripe_offset: u64) -> Result<()> {
        let (first, second) = self.active_roles();
        for role in [first, second] {
            self.active_file(role)?.seek(SeekFrom::Start(stripe_offset))?;
        }
        Ok(())
    }

    fn active_file(&mut self, role: StripeRole) -> Result<&mut File> {
        self.files[role.index()]
            .as_mut()
            .ok_or_else(|| Error::Internal(format!("{} stripe is not open", role)))
    }

    fn load_next_block(&mut self) -> Result<()> {
        let (first, second) = self.active_roles();
        let Self {
            files,
            half_a,
            half_b,
            ..
        } = &mut *self;

        for (role, buf) in [(first, &mut *half_a), (second, &mut *half_b)] {
            let file = files[role.index()]
                .as_mut()
                .ok_or_else(|| Error::Internal(format!("{} stripe is not open", role)))?;
            read_half(file, role, buf)?;
        }

        match self.missing {
            Some(StripeRole::DataA) => {
                xor_into(&mut self.half_a, &self.half_b);
                self.reconstructed_blocks += 1;
            }
            Some(StripeRole::DataB) => {
                xor_into(&mut self.half_b, &self.half_a);
                self.reconstructed_blocks += 1;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Fill `buf` with exactly one half block
pub(crate) fn read_half<R: Read>(reader: &mut R, role: StripeRole, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::ShortRead {
            role,
            expected: buf.len(),
        },
        _ => Error::Io(e),
    })
}

// Copy block bytes [start, start + out.len()) where the block is a ++ b.
// The range ends inside the first half, inside the second half, or spans both.
fn copy_from_halves(a: &[u8], b: &[u8], start: usize, out: &mut [u8]) {
    let end = start + out.len();
    if end <= HALF_BLOCK {
        out.copy_from_slice(&a[start..end]);
    } else if start >= HALF_BLOCK {
        out.copy_from_slice(&b[start - HALF_BLOCK..end - HALF_BLOCK]);
    } else {
        let split = HALF_BLOCK - start;
        out[..split].copy_from_slice(&a[start..]);
        out[split..].copy_from_slice(&b[..end - HALF_BLOCK]);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::{StripeSet, StripeWriter};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    struct Fixture {
        _dirs: [TempDir; 3],
        locations: StripeLocations,
    }

    fn fixture() -> Fixture {
        let dirs = [
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        ];
        let locations = StripeLocations::new(dirs[0].path(), dirs[1].path(), dirs[2].path());
        Fixture {
            _dirs: dirs,
            locations,
        }
    }

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn store(fx: &Fixture, object: &str, payload: &[u8]) -> String {
        let set = StripeSet::create(&fx.locations, &name(object)).unwrap();
        StripeWriter::new(set)
            .write_and_publish(payload)
            .unwrap()
            .content_name
    }

    fn lose(fx: &Fixture, role: StripeRole, object: &str, content_name: &str) {
        let dir = fx.locations.dir(role);
        fs::remove_file(dir.join(object)).unwrap();
        fs::remove_file(dir.join(content_name)).unwrap();
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_copy_from_halves_cases() {
        let a = vec![1u8; HALF_BLOCK];
        let b = vec![2u8; HALF_BLOCK];

        let mut out = vec![0u8; 10];
        copy_from_halves(&a, &b, 5, &mut out);
        assert!(out.iter().all(|x| *x == 1));

        copy_from_halves(&a, &b, HALF_BLOCK + 5, &mut out);
        assert!(out.iter().all(|x| *x == 2));

        copy_from_halves(&a, &b, HALF_BLOCK - 4, &mut out);
        assert_eq!(out, [1, 1, 1, 1, 2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_open_reads_metadata_from_alias() {
        let fx = fixture();
        let data = payload(BLOCK_SIZE + 3);
        let content_name = store(&fx, "obj", &data);

        let reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
        assert_eq!(reader.len(), data.len() as u64);
        assert_eq!(reader.digest(), Some(ContentDigest::of(&data)));
        assert_eq!(reader.content_name(), Some(content_name.as_str()));
        assert_eq!(reader.missing(), None);
        assert!(!reader.is_degraded());
    }

    #[test]
    fn test_open_missing_object() {
        let fx = fixture();
        assert_matches!(
            StripeReader::open(&fx.locations, &name("nope")),
            Err(Error::InsufficientRedundancy {
                available: 0,
                required: 2,
                ..
            })
        );
    }

    #[test]
    fn test_open_with_two_stripes_lost() {
        let fx = fixture();
        let content_name = store(&fx, "obj", b"payload");
        lose(&fx, StripeRole::DataA, "obj", &content_name);
        lose(&fx, StripeRole::Parity, "obj", &content_name);

        assert_matches!(
            StripeReader::open(&fx.locations, &name("obj")),
            Err(Error::InsufficientRedundancy { available: 1, .. })
        );
    }

    #[test]
    fn test_degraded_read_each_role() {
        for role in StripeRole::ALL {
            let fx = fixture();
            let data = payload(2 * BLOCK_SIZE + 1);
            let content_name = store(&fx, "obj", &data);
            lose(&fx, role, "obj", &content_name);

            let mut reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
            assert_eq!(reader.missing(), Some(role));
            assert_eq!(reader.is_degraded(), role.is_data());

            let read = reader.read_all().unwrap();
            assert_eq!(read, data, "lost {}", role);

            let expected_rebuilt = if role.is_data() { 3 } else { 0 };
            assert_eq!(reader.reconstructed_blocks(), expected_rebuilt);
        }
    }

    #[test]
    fn test_read_at_offset() {
        let fx = fixture();
        let data = payload(3 * BLOCK_SIZE + 100);
        store(&fx, "obj", &data);

        let mut reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
        for offset in [1usize, HALF_BLOCK - 1, HALF_BLOCK, BLOCK_SIZE + 7, data.len() - 1] {
            let mut out = vec![0u8; 1000];
            let n = reader.read(&mut out, offset as u64).unwrap();
            let expected = &data[offset..(offset + 1000).min(data.len())];
            assert_eq!(n, expected.len(), "offset {}", offset);
            assert_eq!(&out[..n], expected, "offset {}", offset);
        }

        let mut out = vec![0u8; 10];
        assert_eq!(reader.read(&mut out, data.len() as u64).unwrap(), 0);
    }

    #[test]
    fn test_unaliased_empty_file_is_empty_object() {
        let fx = fixture();
        let set = StripeSet::create(&fx.locations, &name("blank")).unwrap();
        set.close().unwrap();

        let mut reader = StripeReader::open(&fx.locations, &name("blank")).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.digest(), None);
        assert_eq!(reader.read_all().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_unaliased_nonempty_file_fails() {
        let fx = fixture();
        for (_, dir) in fx.locations.iter() {
            fs::write(dir.join("raw"), vec![1u8; HALF_BLOCK]).unwrap();
        }
        assert_matches!(
            StripeReader::open(&fx.locations, &name("raw")),
            Err(Error::Io(_))
        );
    }

    #[test]
    fn test_corrupt_alias_target() {
        let fx = fixture();
        for (_, dir) in fx.locations.iter() {
            fs::write(dir.join("bad$xyz$00"), vec![0u8; HALF_BLOCK]).unwrap();
            crate::stripe::writer::create_alias("bad$xyz$00", &dir.join("bad")).unwrap();
        }
        assert_matches!(
            StripeReader::open(&fx.locations, &name("bad")),
            Err(Error::CorruptMetadata { .. })
        );
    }

    #[test]
    fn test_alias_length_must_match_stripe() {
        let fx = fixture();
        let target = format!("big$1000000000000000${}", "0f".repeat(16));
        for (_, dir) in fx.locations.iter() {
            fs::write(dir.join(&target), vec![0u8; HALF_BLOCK]).unwrap();
            crate::stripe::writer::create_alias(&target, &dir.join("big")).unwrap();
        }
        assert_matches!(
            StripeReader::open(&fx.locations, &name("big")),
            Err(Error::CorruptMetadata { .. })
        );
    }

    #[test]
    fn test_alias_length_checked_on_survivor() {
        let fx = fixture();
        let content_name = store(&fx, "obj", &payload(BLOCK_SIZE + 1));
        lose(&fx, StripeRole::DataA, "obj", &content_name);

        let survivor = fx.locations.dir(StripeRole::DataB).join(&content_name);
        fs::OpenOptions::new()
            .write(true)
            .open(&survivor)
            .unwrap()
            .set_len(HALF_BLOCK as u64)
            .unwrap();

        assert_matches!(
            StripeReader::open(&fx.locations, &name("obj")),
            Err(Error::CorruptMetadata { .. })
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_open_propagates_other_io_errors() {
        let fx = fixture();
        store(&fx, "obj", b"payload");

        // a location that is a plain file fails with NotADirectory, not NotFound
        let dir = fx.locations.dir(StripeRole::Parity).to_path_buf();
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a directory").unwrap();

        assert_matches!(
            StripeReader::open(&fx.locations, &name("obj")),
            Err(Error::Io(_))
        );
    }

    #[test]
    fn test_truncated_stripe_is_short_read() {
        let fx = fixture();
        let data = payload(2 * BLOCK_SIZE);
        let content_name = store(&fx, "obj", &data);

        let victim = fx.locations.dir(StripeRole::DataB).join(&content_name);
        let file = fs::OpenOptions::new().write(true).open(&victim).unwrap();
        file.set_len(HALF_BLOCK as u64 + 10).unwrap();

        let mut reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
        assert_matches!(
            reader.read_all(),
            Err(Error::ShortRead {
                role: StripeRole::DataB,
                ..
            })
        );
    }

    #[test]
    fn test_tampered_stripe_fails_digest() {
        let fx = fixture();
        let data = payload(1000);
        let content_name = store(&fx, "obj", &data);

        let victim = fx.locations.dir(StripeRole::DataA).join(&content_name);
        let mut bytes = fs::read(&victim).unwrap();
        bytes[10] ^= 0xff;
        fs::write(&victim, bytes).unwrap();

        let mut reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
        assert_matches!(reader.read_all(), Err(Error::DigestMismatch { .. }));

        let mut reader = StripeReader::open(&fx.locations, &name("obj")).unwrap();
        let unchecked = reader.read_all_unverified().unwrap();
        assert_ne!(unchecked, data);
    }
}
