//! Storage configuration shared by the CLI and the API server

use crate::error::BridgeResult;
use crate::mapping::MappingRegistry;
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_DATABASE: &str = "data/questionnaire.db";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const TEMPLATE_MIRROR_FILE: &str = "template.xlsx";
/// Template versions kept in the store; older ones are pruned on import
pub const DEFAULT_TEMPLATE_RETENTION: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// Holds the template mirror
    pub data_dir: PathBuf,
    /// YAML sheet mapping replacing the built-in registry
    pub mapping_path: Option<PathBuf>,
    pub template_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            mapping_path: None,
            template_retention: DEFAULT_TEMPLATE_RETENTION,
        }
    }
}

impl StorageConfig {
    pub fn template_mirror_path(&self) -> PathBuf {
        self.data_dir.join(TEMPLATE_MIRROR_FILE)
    }

    pub fn load_registry(&self) -> BridgeResult<MappingRegistry> {
        match &self.mapping_path {
            Some(path) => {
                let registry = MappingRegistry::from_yaml_file(path)?;
                info!(path = %path.display(), sheets = registry.len(), "loaded sheet mapping");
                Ok(registry)
            }
            None => Ok(MappingRegistry::builtin()),
        }
    }
}
