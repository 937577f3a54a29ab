//! Registry of escape-time fractals as plain data.
//!
//! A catalog maps a stable key (`mandelbrot`, `julia`, ...) to the two GLSL
//! snippets the renderer splices into its fragment template plus the default
//! values for the `c` and `p` parameters. Catalogs are TOML documents:
//!
//! ```toml
//! version = 1
//!
//! [[fractal]]
//! key = "julia"
//! name = "Julia"
//! default_c = [-1.0, 0.0]
//! setup = "_z = _loc; _c = _data1;"
//! next = "..."
//! ```
//!
//! The built-in catalog ships inside the crate; callers may merge user
//! catalogs over it with [`FractalCatalog::merge`]. Nothing here touches the
//! GPU, the renderer only reads definitions while building programs.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const BUILTIN_CATALOG: &str = include_str!("../data/fractals.toml");
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to parse fractal catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid fractal catalog: {0}")]
    Invalid(String),
}

/// One fractal: display name, injected GLSL and parameter presets.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FractalDefinition {
    pub key: String,
    pub name: String,
    /// Body of `setup(inout vec2 _z, inout vec2 _c, in vec2 _loc, inout vec2 _data1, inout vec2 _data2)`.
    pub setup: String,
    /// Body of `next(inout vec2 _z, inout vec2 _c)`.
    pub next: String,
    #[serde(default)]
    pub default_c: [f64; 2],
    #[serde(default)]
    pub default_p: [f64; 2],
}

#[derive(Debug, Deserialize, Serialize)]
struct CatalogFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default, rename = "fractal")]
    fractals: Vec<FractalDefinition>,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

/// Ordered, immutable-once-built collection of [`FractalDefinition`]s.
///
/// Order is the declaration order of the source document, which is also the
/// order the preview window cycles through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FractalCatalog {
    entries: Vec<FractalDefinition>,
}

impl FractalCatalog {
    /// Parses the catalog bundled with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(input)?;
        if file.version != SUPPORTED_VERSION {
            return Err(CatalogError::Invalid(format!(
                "unsupported catalog version {} (expected {SUPPORTED_VERSION})",
                file.version
            )));
        }
        Self::from_definitions(file.fractals)
    }

    pub fn from_definitions(entries: Vec<FractalDefinition>) -> Result<Self, CatalogError> {
        let catalog = Self { entries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reads and parses a catalog file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read fractal catalog at {}", path.display()))?;
        let catalog = Self::from_toml_str(&contents)
            .with_context(|| format!("failed to load fractal catalog at {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            fractals = catalog.len(),
            "loaded fractal catalog"
        );
        Ok(catalog)
    }

    /// Overlays `other` onto this catalog. Entries with an existing key are
    /// replaced in place, new keys are appended in their original order.
    pub fn merge(&mut self, other: FractalCatalog) {
        for definition in other.entries {
            match self
                .entries
                .iter_mut()
                .find(|existing| existing.key == definition.key)
            {
                Some(existing) => {
                    tracing::debug!(key = %definition.key, "overriding fractal definition");
                    *existing = definition;
                }
                None => self.entries.push(definition),
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FractalDefinition> {
        self.entries.iter().find(|definition| definition.key == key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|definition| definition.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|definition| definition.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FractalDefinition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for definition in &self.entries {
            let key = definition.key.trim();
            if key.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "fractal '{}' has an empty key",
                    definition.name
                )));
            }
            if !seen.insert(key) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate fractal key '{key}'"
                )));
            }
            if definition.setup.trim().is_empty() || definition.next.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "fractal '{key}' must define both setup and next code"
                )));
            }
            let presets = definition.default_c.iter().chain(&definition.default_p);
            if presets.into_iter().any(|value| !value.is_finite()) {
                return Err(CatalogError::Invalid(format!(
                    "fractal '{key}' has a non-finite default parameter"
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FractalCatalog {
    type Item = &'a FractalDefinition;
    type IntoIter = std::slice::Iter<'a, FractalDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
