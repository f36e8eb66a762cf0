//! Content sniffing of API description files

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static JSON_SWAGGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?im)"swagger"\s*:\s*"([^"\n]*)""#).expect("valid regex"));

static YAML_OAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?im)(?:openapi|swagger)["']?:\s*["']?(\d+\.\d+)"#).expect("valid regex")
});

/// RAML 1.0 fragment labels, all classified as `RAML 1.0`
/// Byte order mark some editors put in front of UTF-8 files
const BOM: char = '\u{feff}';

const RAML_FRAGMENTS: &[&str] = &[
    "Overlay",
    "Extension",
    "DataType",
    "SecurityScheme",
    "Trait",
    "Library",
    "NamedExample",
    "DocumentationItem",
    "ResourceType",
    "AnnotationTypeDeclaration",
];

/// Detected type of an API description file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiType {
    /// Vendor label, e.g. `RAML 1.0` or `OAS 3.0`
    pub vendor: String,
    /// Media type of the source
    pub media_type: &'static str,
}

impl ApiType {
    fn new(vendor: impl Into<String>, media_type: &'static str) -> Self {
        Self {
            vendor: vendor.into(),
            media_type,
        }
    }
}

/// Classify a document by its content.
///
/// Returns `Ok(None)` for JSON documents without a `swagger` field, which are
/// assumed to be plain schemas. Errors mean the file is not a recognizable API.
pub fn classify(content: &str) -> Result<Option<ApiType>> {
    let data = content.trim_start_matches(BOM).trim();

    if data.starts_with('{') {
        return Ok(JSON_SWAGGER
            .captures(data)
            .map(|caps| ApiType::new(format!("OAS {}", caps[1].trim()), "application/json")));
    }

    if let Some(caps) = YAML_OAS.captures(data) {
        return Ok(Some(ApiType::new(
            format!("OAS {}", caps[1].trim()),
            "application/yaml",
        )));
    }

    let first_line = data.lines().next().unwrap_or_default();
    let header = first_line
        .strip_prefix("#%")
        .map(str::trim)
        .filter(|h| h.starts_with("RAML "))
        .ok_or_else(|| Error::invalid_input("The API file header is unknown"))?;

    if header == "RAML 1.0" || header == "RAML 0.8" {
        return Ok(Some(ApiType::new(header, "application/raml")));
    }

    match header.strip_prefix("RAML 1.0 ") {
        Some(label) if RAML_FRAGMENTS.contains(&label.trim()) => {
            Ok(Some(ApiType::new("RAML 1.0", "application/raml")))
        }
        _ => Err(Error::invalid_input("Unsupported API file")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_swagger() {
        let api = classify(r#"{ "Swagger" : "2.0", "info": {} }"#).unwrap().unwrap();
        assert_eq!(api.vendor, "OAS 2.0");
        assert_eq!(api.media_type, "application/json");
    }

    #[test]
    fn test_json_schema_is_not_an_api() {
        assert_eq!(classify(r#"{"type": "object"}"#).unwrap(), None);
    }

    #[test]
    fn test_yaml_openapi() {
        let api = classify("openapi: \"3.0.1\"\ninfo:\n  title: x").unwrap().unwrap();
        assert_eq!(api.vendor, "OAS 3.0");
        assert_eq!(api.media_type, "application/yaml");

        let api = classify("swagger: '2.0'\n").unwrap().unwrap();
        assert_eq!(api.vendor, "OAS 2.0");
    }

    #[test]
    fn test_raml_headers() {
        let api = classify("#%RAML 1.0\ntitle: x").unwrap().unwrap();
        assert_eq!(api.vendor, "RAML 1.0");
        assert_eq!(api.media_type, "application/raml");

        let api = classify("#%RAML 0.8\ntitle: x").unwrap().unwrap();
        assert_eq!(api.vendor, "RAML 0.8");
    }

    #[test]
    fn test_raml_fragments() {
        for label in RAML_FRAGMENTS {
            let content = format!("#%RAML 1.0 {}\ntype: object", label);
            let api = classify(&content).unwrap().unwrap();
            assert_eq!(api.vendor, "RAML 1.0");
        }
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let api = classify("\u{feff}#%RAML 1.0\ntitle: x\n").unwrap().unwrap();
        assert_eq!(api.vendor, "RAML 1.0");

        let api = classify("\u{feff}{\"swagger\": \"2.0\"}").unwrap().unwrap();
        assert_eq!(api.vendor, "OAS 2.0");
        assert_eq!(api.media_type, "application/json");
    }

    #[test]
    fn test_unknown_header() {
        let err = classify("title: just yaml").unwrap_err();
        assert_eq!(err.to_string(), "The API file header is unknown");

        let err = classify("#%RAML 1.0 Widget\n").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported API file");
    }
}
