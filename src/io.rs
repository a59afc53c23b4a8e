// File-level helpers for delta merging and application.
//
// Wraps the whole-state pipeline with buffered file I/O: read patch
// chains, fold them through the merge engine, apply deltas to source
// files.  Optionally computes SHA-256 digests of what was written
// (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::merge;
use crate::vcdiff::decoder::DecodeError;
use crate::whole::encode::EncodeError;
use crate::whole::{self, EncodeOptions, MergeError, WholeState};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file-level operations.
#[derive(Debug)]
pub enum IoError {
    Io(io::Error),
    Decode(DecodeError),
    Merge(MergeError),
    Encode(EncodeError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Merge(e) => write!(f, "merge error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Merge(e) => Some(e),
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<DecodeError> for IoError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<MergeError> for IoError {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}

impl From<EncodeError> for IoError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `merge_files()`.
#[derive(Debug, Clone)]
pub struct MergeStats {
    /// Patches consumed, in order.
    pub patches: u64,
    /// Output bytes the merged delta reconstructs.
    pub target_length: u64,
    /// Instructions in the merged whole-state.
    pub instructions: u64,
    /// Size of the written delta file in bytes.
    pub delta_size: u64,
    /// VCDIFF windows written.
    pub windows: u64,
    /// SHA-256 of the written delta (with the `file-io` feature).
    pub output_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    pub source_size: u64,
    pub delta_size: u64,
    pub output_size: u64,
    /// SHA-256 of the reconstructed output (with the `file-io` feature).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Decode a delta file into a whole-state.
pub fn read_delta_file(path: &Path) -> Result<WholeState, IoError> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(BUF_SIZE, file);
    Ok(whole::read_whole(reader)?)
}

// ---------------------------------------------------------------------------
// merge_files
// ---------------------------------------------------------------------------

/// Merge a patch chain into a single delta file.
///
/// `patches` apply in order: the first maps V0 to V1, the last produces
/// the final version.  The merged output maps V0 directly to the final
/// version.  No intermediate version is ever reconstructed.
pub fn merge_files<P: AsRef<Path>>(
    patches: &[P],
    output_path: &Path,
    opts: &EncodeOptions,
) -> Result<MergeStats, IoError> {
    let mut iter = patches.iter();
    let first = iter
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no patches given"))?;

    let mut current = read_delta_file(first.as_ref())?;
    for patch in iter {
        let input = read_delta_file(patch.as_ref())?;
        current = merge::merge(&current, &input)?;
    }

    let out_file = File::create(output_path)?;
    let mut writer = CountingWriter::new(BufWriter::with_capacity(BUF_SIZE, out_file));
    let windows = whole::encode_whole(&current, &mut writer, opts)?;
    writer.inner.flush()?;

    Ok(MergeStats {
        patches: patches.len() as u64,
        target_length: current.length(),
        instructions: current.instructions().len() as u64,
        delta_size: writer.written,
        windows,
        output_sha256: writer.digest(),
    })
}

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply a delta file to a source file, writing the reconstructed
/// target.  The source is read fully into memory, as xdelta3 does.
pub fn apply_file(
    source_path: &Path,
    delta_path: &Path,
    output_path: &Path,
) -> Result<ApplyStats, IoError> {
    let source = std::fs::read(source_path)?;
    let delta_size = std::fs::metadata(delta_path)?.len();

    let whole = read_delta_file(delta_path)?;
    let target = whole::apply(&whole, &source)?;

    let out_file = File::create(output_path)?;
    let mut writer = CountingWriter::new(BufWriter::with_capacity(BUF_SIZE, out_file));
    writer.write_all(&target)?;
    writer.inner.flush()?;

    Ok(ApplyStats {
        source_size: source.len() as u64,
        delta_size,
        output_size: target.len() as u64,
        output_sha256: writer.digest(),
    })
}

// ---------------------------------------------------------------------------
// Counting (and optionally hashing) writer
// ---------------------------------------------------------------------------

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
        }
    }

    #[cfg(feature = "file-io")]
    fn digest(self) -> Option<[u8; 32]> {
        Some(self.hasher.finalize().into())
    }

    #[cfg(not(feature = "file-io"))]
    fn digest(self) -> Option<[u8; 32]> {
        None
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        #[cfg(feature = "file-io")]
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::encoder::{DeltaWriter, WindowEncoder};

    /// Write a one-window delta file built by `build`.
    fn write_delta(
        dir: &Path,
        name: &str,
        source: Option<(u64, u64)>,
        build: impl FnOnce(&mut WindowEncoder),
    ) -> std::path::PathBuf {
        let mut we = WindowEncoder::new(source);
        build(&mut we);
        let mut bytes = Vec::new();
        let mut writer = DeltaWriter::new(&mut bytes);
        writer.write_window(we.finish(None)).unwrap();
        writer.finish().unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &bytes).unwrap();
        path
    }

    #[test]
    fn merge_and_apply_a_chain() {
        let dir = tempfile::tempdir().unwrap();
        let v0 = b"The quick brown fox jumps over the lazy dog";

        // Patch 1: V0 -> V1 = V0[4..19] ("quick brown fox")
        let p1 = write_delta(dir.path(), "p1.vcdiff", Some((v0.len() as u64, 0)), |we| {
            we.copy(15, 4);
        });
        // Patch 2: V1 -> V2 = "my " + V1[6..11] ("brown") + "!"
        let p2 = write_delta(dir.path(), "p2.vcdiff", Some((15, 0)), |we| {
            we.add(b"my ");
            we.copy(5, 6);
            we.add(b"!");
        });

        let merged_path = dir.path().join("merged.vcdiff");
        let stats = merge_files(&[&p1, &p2], &merged_path, &EncodeOptions::default()).unwrap();
        assert_eq!(stats.patches, 2);
        assert_eq!(stats.target_length, 9);
        assert!(stats.delta_size > 0);
        assert_eq!(stats.windows, 1);

        let src_path = dir.path().join("v0.bin");
        std::fs::write(&src_path, v0).unwrap();
        let out_path = dir.path().join("v2.bin");
        let apply_stats = apply_file(&src_path, &merged_path, &out_path).unwrap();
        assert_eq!(apply_stats.source_size, v0.len() as u64);
        assert_eq!(apply_stats.output_size, 9);
        assert_eq!(std::fs::read(&out_path).unwrap(), b"my brown!");
    }

    #[test]
    fn single_patch_merge_renormalizes() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = write_delta(dir.path(), "only.vcdiff", None, |we| {
            we.add(b"standalone");
        });
        let out = dir.path().join("out.vcdiff");
        let stats = merge_files(&[&p1], &out, &EncodeOptions::default()).unwrap();
        assert_eq!(stats.patches, 1);

        let whole = read_delta_file(&out).unwrap();
        assert_eq!(whole::apply(&whole, b"").unwrap(), b"standalone");
    }

    #[test]
    fn empty_patch_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.vcdiff");
        let patches: &[&Path] = &[];
        assert!(matches!(
            merge_files(patches, &out, &EncodeOptions::default()),
            Err(IoError::Io(_))
        ));
    }

    #[test]
    fn read_delta_file_propagates_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.vcdiff");
        std::fs::write(&path, b"definitely not vcdiff").unwrap();
        assert!(matches!(
            read_delta_file(&path),
            Err(IoError::Decode(_))
        ));
    }

    #[test]
    fn out_of_range_copy_surfaces_as_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        // Patch 1 produces 4 bytes; patch 2 copies 10 from it.
        let p1 = write_delta(dir.path(), "a.vcdiff", None, |we| we.add(b"tiny"));
        let p2 = write_delta(dir.path(), "b.vcdiff", Some((16, 0)), |we| {
            we.copy(10, 2);
        });
        let out = dir.path().join("out.vcdiff");
        let err = merge_files(&[&p1, &p2], &out, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Merge(_)), "{err}");
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn digests_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = write_delta(dir.path(), "p.vcdiff", None, |we| we.add(b"bytes"));
        let out = dir.path().join("out.vcdiff");
        let stats = merge_files(&[&p1], &out, &EncodeOptions::default()).unwrap();
        let digest = stats.output_sha256.expect("digest expected");

        let mut h = sha2::Sha256::new();
        h.update(std::fs::read(&out).unwrap());
        let expected: [u8; 32] = h.finalize().into();
        assert_eq!(digest, expected);
    }
}
