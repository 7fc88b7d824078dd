// dataset/resolver.rs - Turn a dataset resource name into a Dataset
//
// Resource names are looked up in a list of root directories, first
// match wins. A missing name or a missing file is not an error: the test
// simply starts from an empty dataset.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FixtureConfig;
use crate::dataset::Dataset;
use crate::error::{FixtureError, Result};

/// Finds resource files below a set of root directories
#[derive(Clone, Debug, Default)]
pub struct ResourceLocator {
    roots: Vec<PathBuf>,
}

impl ResourceLocator {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ResourceLocator {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &FixtureConfig) -> Self {
        Self::new(config.resource_roots.iter().cloned())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Path of the first existing file named `name`, if any
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|path| path.is_file())
    }
}

/// Loads datasets by resource name
#[derive(Clone, Debug, Default)]
pub struct DatasetResolver {
    locator: ResourceLocator,
}

impl DatasetResolver {
    pub fn new(locator: ResourceLocator) -> Self {
        DatasetResolver { locator }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// `None`, `""` and unknown names all yield an empty dataset.
    /// Only a resource that exists but cannot be read or parsed fails.
    pub fn resolve(&self, resource_name: Option<&str>) -> Result<Dataset> {
        let Some(name) = resource_name.filter(|name| !name.is_empty()) else {
            tracing::debug!("No dataset resource named; using empty dataset");
            return Ok(Dataset::empty());
        };

        let Some(path) = self.locator.locate(name) else {
            tracing::debug!(
                resource = name,
                roots = ?self.locator.roots(),
                "Dataset resource not found; using empty dataset"
            );
            return Ok(Dataset::empty());
        };

        let text = fs::read_to_string(&path).map_err(|source| FixtureError::DatasetIo {
            path: path.clone(),
            source,
        })?;
        let dataset = Dataset::from_json_str(name, &text)?;
        tracing::debug!(
            resource = name,
            path = %path.display(),
            tables = dataset.tables().len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }
}
