//! Directory archives sent as a single blob
//!
//! The sender packs a directory into an uncompressed tar staged in a temp
//! file; the receiver can unpack received `.tar` blobs in place.

use crate::error::{Error, Result};
use crate::fs_enum::OutgoingFile;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use tar::{Archive, Builder};
use tempfile::NamedTempFile;

pub const ARCHIVE_SUFFIX: &str = ".tar";

/// A packed directory; the temp file lives as long as this value
pub struct StagedArchive {
    file: NamedTempFile,
    name: String,
}

impl StagedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outgoing(&self) -> OutgoingFile {
        OutgoingFile::named(self.file.path(), self.name.clone())
    }
}

/// Pack `dir` into a tar rooted at the directory's own name
pub fn pack_directory(dir: &Path) -> Result<StagedArchive> {
    let src_err = |source: io::Error| Error::Source {
        path: dir.to_path_buf(),
        source,
    };

    let canonical = dir.canonicalize().map_err(src_err)?;
    let base = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            src_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "directory has no UTF-8 name",
            ))
        })?
        .to_string();

    let file = NamedTempFile::new().map_err(src_err)?;
    {
        let out = file.reopen().map_err(src_err)?;
        let mut builder = Builder::new(out);
        builder.follow_symlinks(false);
        builder.append_dir_all(&base, &canonical).map_err(src_err)?;
        builder.into_inner().map_err(src_err)?.sync_all().map_err(src_err)?;
    }

    Ok(StagedArchive {
        file,
        name: format!("{}{}", base, ARCHIVE_SUFFIX),
    })
}

pub fn is_archive_name(name: &str) -> bool {
    name.ends_with(ARCHIVE_SUFFIX)
}

/// Unpack `archive` under `dest`; returns (files, bytes)
pub fn unpack_into(archive: &Path, dest: &Path) -> Result<(u64, u64)> {
    let dest_err = |source: io::Error| Error::Destination {
        path: dest.to_path_buf(),
        source,
    };

    let open = || {
        File::open(archive).map_err(|source| Error::Destination {
            path: archive.to_path_buf(),
            source,
        })
    };

    // Never overwrite: refuse the whole archive before writing anything
    let mut listing = Archive::new(open()?);
    for res in listing.entries().map_err(dest_err)? {
        let entry = res.map_err(dest_err)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let target = dest.join(entry.path().map_err(dest_err)?);
        if target.symlink_metadata().is_ok() {
            return Err(Error::DestinationExists(target));
        }
    }

    let f = open()?;
    fs::create_dir_all(dest).map_err(dest_err)?;

    let mut file_count = 0u64;
    let mut total_bytes = 0u64;
    let mut reader = Archive::new(f);
    for res in reader.entries().map_err(dest_err)? {
        let mut entry = res.map_err(dest_err)?;
        let et = entry.header().entry_type();
        if et.is_block_special() || et.is_character_special() || et.is_fifo() {
            // Skip special device/FIFO entries for safety
            continue;
        }

        let rel = entry.path().map_err(dest_err)?.into_owned();
        if rel.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(dest_err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive entry {:?} contains parent component", rel),
            )));
        }

        // unpack_in refuses anything that would land outside dest
        if !entry.unpack_in(dest).map_err(dest_err)? {
            continue;
        }
        if et.is_file() {
            file_count += 1;
            total_bytes += entry.header().size().unwrap_or(0);
        }
    }
    Ok((file_count, total_bytes))
}
