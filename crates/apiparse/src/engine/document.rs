//! Default parsing engine
//!
//! Reads RAML, OpenAPI and AsyncAPI sources as YAML or JSON trees, resolves
//! `!include` references inside the project directory, and renders the result
//! as a compact JSON-LD document.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value as Json};
use serde_yaml::Value as Yaml;

use super::{ApiVendor, ParsingEngine};
use crate::error::{Error, Result};

/// Maximum nesting of `!include` references
const MAX_INCLUDE_DEPTH: usize = 32;

/// Included files with these extensions are parsed; anything else is embedded as text
const STRUCTURED_EXTENSIONS: &[&str] = &["raml", "yaml", "yml", "json"];

const BOM: char = '\u{feff}';

const MB: u64 = 1024 * 1024;

/// Parses API descriptions into a JSON-LD document
#[derive(Debug, Clone, Default)]
pub struct DocumentEngine {
    /// Upper bound on the total source bytes loaded for one parse
    budget_bytes: Option<u64>,
}

impl DocumentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the sources loaded per parse by the worker's memory ceiling
    pub fn with_memory_limit_mb(limit_mb: u64) -> Self {
        Self {
            budget_bytes: Some(limit_mb.saturating_mul(MB)),
        }
    }
}

impl ParsingEngine for DocumentEngine {
    fn parse_content(&self, vendor: &str, content: &str) -> Result<String> {
        let vendor: ApiVendor = vendor.parse()?;
        let mut loader = Loader::new(None, self.budget_bytes);
        loader.charge(content.len())?;

        let tree = loader.parse_source(content, Some(vendor), None)?;
        render(vendor, "#/", tree, loader.references)
    }

    fn parse_project(&self, dir: &Path, entrypoint: &str, vendor: &str) -> Result<String> {
        let vendor: ApiVendor = vendor.parse()?;
        let root = dir.canonicalize().map_err(|e| {
            Error::invalid_input(format!("Unable to read project {}: {}", dir.display(), e))
        })?;

        let mut loader = Loader::new(Some(root.clone()), self.budget_bytes);
        let entry = loader.resolve(&root, entrypoint)?;
        let tree = loader.load(&entry, Some(vendor))?;
        render(vendor, entrypoint, tree, loader.references)
    }
}

/// Loads sources for one parse, tracking includes and the byte budget
struct Loader {
    root: Option<PathBuf>,
    budget: Option<u64>,
    loaded: u64,
    stack: Vec<PathBuf>,
    references: Vec<String>,
}

impl Loader {
    fn new(root: Option<PathBuf>, budget: Option<u64>) -> Self {
        Self {
            root,
            budget,
            loaded: 0,
            stack: Vec::new(),
            references: Vec::new(),
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        self.loaded = self.loaded.saturating_add(bytes as u64);
        match self.budget {
            Some(budget) if self.loaded > budget => Err(Error::worker(format!(
                "API sources exceed the worker memory limit of {} MB",
                budget / MB
            ))),
            _ => Ok(()),
        }
    }

    /// Resolve `target` relative to `base`, refusing anything outside the project root
    fn resolve(&self, base: &Path, target: &str) -> Result<PathBuf> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::invalid_input("Unable to comply"))?;
        let path = base
            .join(target)
            .canonicalize()
            .map_err(|e| Error::invalid_input(format!("Unable to read {}: {}", target, e)))?;
        if !path.starts_with(root) {
            return Err(Error::invalid_input("Unable to comply"));
        }
        Ok(path)
    }

    fn relative(&self, path: &Path) -> String {
        self.root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn load(&mut self, path: &Path, vendor: Option<ApiVendor>) -> Result<Json> {
        if self.stack.iter().any(|p| p == path) {
            return Err(Error::invalid_input(format!(
                "Include cycle detected at {}",
                self.relative(path)
            )));
        }
        if self.stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(Error::invalid_input(format!(
                "Includes are nested deeper than {} levels",
                MAX_INCLUDE_DEPTH
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::invalid_input(format!("Unable to read {}: {}", self.relative(path), e))
        })?;
        self.charge(content.len())?;

        self.stack.push(path.to_path_buf());
        let tree = self.parse_source(&content, vendor, path.parent());
        self.stack.pop();
        tree
    }

    /// Parse one source. `vendor` is set for the root document only.
    fn parse_source(
        &mut self,
        content: &str,
        vendor: Option<ApiVendor>,
        base: Option<&Path>,
    ) -> Result<Json> {
        let content = content.trim_start_matches(BOM);
        if let Some(vendor) = vendor {
            if vendor.is_raml() && !content.trim_start().starts_with("#%RAML") {
                return Err(Error::invalid_input(format!(
                    "Document is not a valid {} API: missing #%RAML header",
                    vendor
                )));
            }
        }

        let trimmed = content.trim_start();
        let tree = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str::<Json>(trimmed)
                .map_err(|e| Error::invalid_input(format!("Invalid JSON document: {}", e)))?
        } else {
            let value: Yaml = serde_yaml::from_str(content)
                .map_err(|e| Error::invalid_input(format!("Invalid YAML document: {}", e)))?;
            self.convert(value, base)?
        };

        if let Some(vendor) = vendor {
            check_root(vendor, &tree)?;
        }
        Ok(tree)
    }

    fn convert(&mut self, value: Yaml, base: Option<&Path>) -> Result<Json> {
        Ok(match value {
            Yaml::Null => Json::Null,
            Yaml::Bool(b) => Json::Bool(b),
            Yaml::Number(n) => convert_number(&n),
            Yaml::String(s) => Json::String(s),
            Yaml::Sequence(items) => Json::Array(
                items
                    .into_iter()
                    .map(|item| self.convert(item, base))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Yaml::Mapping(mapping) => {
                let mut object = serde_json::Map::with_capacity(mapping.len());
                for (key, value) in mapping {
                    object.insert(key_string(&key), self.convert(value, base)?);
                }
                Json::Object(object)
            }
            Yaml::Tagged(tagged) => {
                if tagged.tag == "!include" {
                    let target = match &tagged.value {
                        Yaml::String(target) => target.trim().to_string(),
                        _ => return Err(Error::invalid_input("Invalid !include target")),
                    };
                    self.include(&target, base)?
                } else {
                    self.convert(tagged.value, base)?
                }
            }
        })
    }

    fn include(&mut self, target: &str, base: Option<&Path>) -> Result<Json> {
        let base = base.ok_or_else(|| Error::invalid_input("Unable to comply"))?;
        let path = self.resolve(base, target)?;

        let reference = self.relative(&path);
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }

        let structured = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STRUCTURED_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if structured {
            return self.load(&path, None);
        }

        let text = fs::read_to_string(&path)
            .map_err(|e| Error::invalid_input(format!("Unable to read {}: {}", target, e)))?;
        self.charge(text.len())?;
        Ok(Json::String(text))
    }
}

/// Minimal structural check of the root document for each dialect
fn check_root(vendor: ApiVendor, tree: &Json) -> Result<()> {
    let object = tree.as_object().ok_or_else(|| {
        Error::invalid_input(format!("Document is not a valid {} API: root is not a map", vendor))
    })?;

    let required = match vendor {
        ApiVendor::Oas20 => Some("swagger"),
        ApiVendor::Oas30 => Some("openapi"),
        ApiVendor::Async20 => Some("asyncapi"),
        ApiVendor::Raml08 | ApiVendor::Raml10 => None,
    };
    match required {
        Some(field) if !object.contains_key(field) => Err(Error::invalid_input(format!(
            "Document is not a valid {} API: missing {} field",
            vendor, field
        ))),
        _ => Ok(()),
    }
}

fn convert_number(n: &serde_yaml::Number) -> Json {
    if let Some(i) = n.as_i64() {
        Json::from(i)
    } else if let Some(u) = n.as_u64() {
        Json::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(n.to_string()))
    }
}

fn key_string(key: &Yaml) -> String {
    match key {
        Yaml::String(s) => s.clone(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn render(vendor: ApiVendor, id: &str, tree: Json, references: Vec<String>) -> Result<String> {
    let document = json!({
        "@context": {
            "doc": "http://a.ml/vocabularies/document#",
            "core": "http://a.ml/vocabularies/core#",
        },
        "@id": id,
        "@type": ["doc:Document", "doc:Unit"],
        "doc:sourceVendor": vendor.as_str(),
        "doc:references": references,
        "doc:encodes": tree,
    });
    Ok(serde_json::to_string(&document)?)
}
