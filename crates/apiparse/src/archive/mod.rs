//! Archive extraction into per-job workspaces
//!
//! Uploaded projects arrive as zip archives. Each one is unpacked into a private
//! temporary directory (a [`Workspace`]) and flattened when all content sits under
//! a single wrapping folder, so entry point search always runs on a flat root.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};

/// Local file header signature of a zip archive
pub const ZIP_MAGIC: [u8; 2] = [0x50, 0x4B];

/// Archiver metadata folder dropped before flattening
const NOISE_ENTRY: &str = "__macosx";

/// Returns true when `bytes` start with the zip local file header magic
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= ZIP_MAGIC.len() && bytes[..ZIP_MAGIC.len()] == ZIP_MAGIC
}

/// Reject anything that is not a zip archive
pub fn ensure_zip(bytes: &[u8]) -> Result<()> {
    if is_zip(bytes) {
        Ok(())
    } else {
        Err(Error::invalid_input("The API file is not a zip file."))
    }
}

/// A private temporary directory owned by exactly one job.
///
/// The directory is removed when the workspace is released or dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    fn new(dir: TempDir) -> Self {
        let path = dir.path().to_path_buf();
        Self {
            dir: Some(dir),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now. Failures are logged, never returned.
    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!(path = %self.path.display(), "Workspace released"),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    "Failed to remove workspace: {}",
                    e
                ),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.close();
    }
}

/// Unpacks uploaded archives into fresh workspaces
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    config: WorkspaceConfig,
}

impl ArchiveExtractor {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    /// Allocate an empty workspace
    pub fn allocate(&self) -> Result<Workspace> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.config.prefix);
        let dir = match &self.config.temp_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::resource(format!("Unable to create workspace: {}", e)))?;
        Ok(Workspace::new(dir))
    }

    /// Expand `bytes` into a new workspace and flatten a single wrapping folder.
    ///
    /// The workspace is removed again if extraction fails part way.
    pub async fn extract(&self, bytes: bytes::Bytes) -> Result<Workspace> {
        ensure_zip(&bytes)?;
        let workspace = self.allocate()?;
        let root = workspace.path().to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || -> Result<()> {
            unpack(&bytes, &root)?;
            normalize(&root)
        })
        .await
        .map_err(|e| Error::internal(format!("Extraction task failed: {}", e)))?;

        match outcome {
            Ok(()) => {
                tracing::debug!(path = %workspace.path().display(), "Archive extracted");
                Ok(workspace)
            }
            Err(e) => {
                workspace.release();
                Err(match e {
                    Error::Zip(e) => Error::resource(format!("Unable to read archive: {}", e)),
                    Error::Io(e) => Error::resource(format!("Unable to extract archive: {}", e)),
                    other => other,
                })
            }
        }
    }
}

/// Write every archive entry below `root`, skipping names that would escape it
pub fn unpack(bytes: &[u8], root: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "Skipping unsafe archive entry");
            continue;
        };
        let target = root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Flatten a workspace whose only meaningful entry is a directory by copying
/// that directory's contents up into the root. Multiple entries are left as-is.
pub fn normalize(root: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().to_lowercase() == NOISE_ENTRY {
            continue;
        }
        entries.push(entry);
    }

    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(());
    }

    let wrapper = entries[0].path();
    for item in WalkDir::new(&wrapper).min_depth(1) {
        let item = item.map_err(|e| Error::resource(format!("Unable to read workspace: {}", e)))?;
        let relative = item
            .path()
            .strip_prefix(&wrapper)
            .map_err(|e| Error::internal(e.to_string()))?;
        let target = root.join(relative);

        if item.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if item.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(item.path(), &target)?;
        }
    }

    tracing::debug!(wrapper = %wrapper.display(), "Flattened wrapping folder");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Build an in-memory zip. Names ending in `/` become directories.
    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }
}
