//! Entry point resolution for extracted API projects
//!
//! Resolution order:
//! 1. A conventional name (`api.raml`, `api.yaml`, `api.json`) always wins.
//! 2. A single file with a description extension is the entry point.
//! 3. Several files are sniffed by content. If exactly one classifies it wins,
//!    otherwise the caller has to pick from the candidates.

pub mod vendor;

use std::path::Path;

use crate::error::{Error, Result};

pub use vendor::{classify, ApiType};

/// Entries ignored at the workspace root, compared lowercase
const IGNORED: &[&str] = &["__macosx", "exchange.json", ".ds_store"];

/// Names that are used as the entry point without further inspection
const CONVENTIONAL_NAMES: &[&str] = &["api.raml", "api.yaml", "api.json"];

/// Extensions of API description files
const EXTENSIONS: &[&str] = &["raml", "yaml", "json"];

/// Outcome of entry point resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoints {
    /// The entry point is known
    Single(String),
    /// The caller has to choose among these files, in directory order
    Candidates(Vec<String>),
}

/// Resolve the entry point(s) of the project at `dir`
pub async fn locate(dir: &Path) -> Result<EntryPoints> {
    let names = list_files(dir).await?;

    let mut files = Vec::new();
    for name in names {
        let lower = name.to_lowercase();
        if IGNORED.contains(&lower.as_str()) {
            continue;
        }
        if CONVENTIONAL_NAMES.contains(&lower.as_str()) {
            return Ok(EntryPoints::Single(name));
        }
        let recognized = Path::new(&lower)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext));
        if recognized {
            files.push(name);
        }
    }

    match files.len() {
        0 => Err(Error::invalid_input(
            "Unable to find API files in the source location",
        )),
        1 => Ok(EntryPoints::Single(files.remove(0))),
        _ => Ok(sniff(dir, files).await),
    }
}

/// Keep the candidates that classify as an API. Unreadable or unrecognized
/// files are excluded; if nothing classifies the full list is returned.
async fn sniff(dir: &Path, files: Vec<String>) -> EntryPoints {
    let mut classified = Vec::new();
    for name in &files {
        match classify_file(&dir.join(name)).await {
            Ok(Some(_)) => classified.push(name.clone()),
            Ok(None) => {}
            Err(e) => tracing::debug!(file = %name, "Unable to determine file type: {}", e),
        }
    }

    match classified.len() {
        0 => EntryPoints::Candidates(files),
        1 => EntryPoints::Single(classified.remove(0)),
        _ => EntryPoints::Candidates(classified),
    }
}

/// Read and classify a single file
pub async fn classify_file(path: &Path) -> Result<Option<ApiType>> {
    let content = tokio::fs::read_to_string(path).await?;
    classify(&content)
}

/// Regular files at the top of `dir`, sorted by name
async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
