//! Product profiles: which server a resource lives on and how to address it

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default product when none is configured
pub const DEFAULT_PRODUCT: &str = "vbr";

/// Connection target for one backup product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProfile {
    /// Product identifier, e.g. `vbr`
    pub name: String,
    /// Server root, e.g. `https://backup.example.com:9419`
    pub base_url: String,
    /// Sent as `x-api-version` when set
    pub api_version: Option<String>,
}

impl ProductProfile {
    /// Build a profile for a known product, filling in its default API version
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::MissingConfig(format!("API URL for product '{name}'")));
        }
        let api_version = default_api_version(&name).map(str::to_string);
        Ok(Self {
            name,
            base_url,
            api_version,
        })
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Absolute URL for an API path starting with `/`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn default_api_version(product: &str) -> Option<&'static str> {
    match product {
        "vbr" => Some("1.1-rev2"),
        _ => None,
    }
}
