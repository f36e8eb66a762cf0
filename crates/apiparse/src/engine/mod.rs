//! Parsing engine boundary
//!
//! The worker process wraps a [`ParsingEngine`] and reports its outcome back over
//! the worker protocol. [`DocumentEngine`] is the engine shipped with the worker.

pub mod document;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use document::DocumentEngine;

/// Turns API description sources into a rendered document
pub trait ParsingEngine: Send + Sync {
    /// Parse a single document given inline
    fn parse_content(&self, vendor: &str, content: &str) -> Result<String>;

    /// Parse a project rooted at `dir` starting from `entrypoint`
    fn parse_project(&self, dir: &Path, entrypoint: &str, vendor: &str) -> Result<String>;
}

/// API description dialects the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVendor {
    Raml08,
    Raml10,
    Oas20,
    Oas30,
    Async20,
}

impl ApiVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVendor::Raml08 => "RAML 0.8",
            ApiVendor::Raml10 => "RAML 1.0",
            ApiVendor::Oas20 => "OAS 2.0",
            ApiVendor::Oas30 => "OAS 3.0",
            ApiVendor::Async20 => "ASYNC 2.0",
        }
    }

    pub fn is_raml(&self) -> bool {
        matches!(self, ApiVendor::Raml08 | ApiVendor::Raml10)
    }
}

impl FromStr for ApiVendor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "RAML 0.8" => Ok(ApiVendor::Raml08),
            "RAML 1.0" => Ok(ApiVendor::Raml10),
            "OAS 2.0" => Ok(ApiVendor::Oas20),
            "OAS 3.0" => Ok(ApiVendor::Oas30),
            "ASYNC 2.0" => Ok(ApiVendor::Async20),
            other => Err(Error::invalid_input(format!(
                "Unsupported API vendor: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ApiVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_round_trip() {
        for vendor in [
            ApiVendor::Raml08,
            ApiVendor::Raml10,
            ApiVendor::Oas20,
            ApiVendor::Oas30,
            ApiVendor::Async20,
        ] {
            assert_eq!(vendor.as_str().parse::<ApiVendor>().unwrap(), vendor);
        }
    }

    #[test]
    fn test_unknown_vendor() {
        let err = "OAS 3.1".parse::<ApiVendor>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported API vendor: OAS 3.1");
    }
}
