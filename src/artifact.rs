//! Local build artifact checks.
//!
//! An artifact is a gzip-compressed tar. It is opened and walked once before
//! anything touches the host, so a truncated download or a stray zip fails
//! as a configuration error instead of halfway through a deploy.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// A checked artifact and its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Name used for the remote copy.
    pub file_name: String,
    pub size: u64,
    /// Number of tar entries.
    pub entries: usize,
    /// blake3 of the compressed file, hex.
    pub digest: String,
}

impl Artifact {
    /// Open `path`, walk the archive and hash it.
    pub fn inspect(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            Error::config(format!("artifact {} is not readable: {e}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(Error::config(format!(
                "artifact {} is not a file",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::config(format!("artifact {} has no usable name", path.display())))?
            .to_string();

        let entries = count_entries(path)?;
        if entries == 0 {
            return Err(Error::config(format!(
                "artifact {} is an empty archive",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size: metadata.len(),
            entries,
            digest: digest(path)?,
        })
    }

    /// First twelve hex digits of the digest.
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} entries, {})",
            self.file_name,
            self.entries,
            self.short_digest()
        )
    }
}

fn not_an_archive(path: &Path, err: &io::Error) -> Error {
    Error::config(format!(
        "artifact {} is not a gzip-compressed tar: {err}",
        path.display()
    ))
}

/// Count entries, rejecting paths that would land outside the extraction
/// directory.
fn count_entries(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| not_an_archive(path, &e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut count = 0;
    for entry in archive.entries().map_err(|e| not_an_archive(path, &e))? {
        let entry = entry.map_err(|e| not_an_archive(path, &e))?;
        let entry_path = entry.path().map_err(|e| not_an_archive(path, &e))?;
        if entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::config(format!(
                "artifact {} contains unsafe path {}",
                path.display(),
                entry_path.display()
            )));
        }
        count += 1;
    }
    Ok(count)
}

fn digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::config(format!("artifact {} is not readable: {e}", path.display())))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::config(format!("artifact {} is not readable: {e}", path.display())))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Builders for archives used across the test suite.
#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    /// Write a `.tar.gz` with the given `(path, contents)` files.
    pub fn write_tar_gz(dest: &Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(dest).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (name, contents) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(contents.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, name, contents.as_bytes())
                    .unwrap();
            }
            builder.finish().unwrap();
        }
        encoder.finish().unwrap();
    }
}
