use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for the server_reflection module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerReflectionConfig {
    /// Encoded `FileDescriptorSet` files; relative paths resolve against the home dir.
    #[serde(default)]
    pub descriptor_sets: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub include_reflection_service: bool,
    #[serde(default = "default_true")]
    pub enable_v1alpha: bool,
}

impl Default for ServerReflectionConfig {
    fn default() -> Self {
        Self {
            descriptor_sets: Vec::new(),
            include_reflection_service: true,
            enable_v1alpha: true,
        }
    }
}

impl ServerReflectionConfig {
    pub fn resolved_descriptor_sets(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.descriptor_sets
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    base_dir.join(p)
                }
            })
            .collect()
    }
}

fn default_true() -> bool {
    true
}
