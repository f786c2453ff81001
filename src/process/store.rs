use crate::error::ConfigError;
use crate::process::types::ProcessSpec;
use std::collections::HashMap;
use std::sync::Arc;

/// Validated, immutable set of launch specifications.
///
/// Specs are shared behind `Arc` so any number of readers can hold them
/// concurrently; nothing mutates the store after `load`.
#[derive(Debug, Default)]
pub struct SpecStore {
    specs: Vec<Arc<ProcessSpec>>,
    index: HashMap<String, usize>,
}

impl SpecStore {
    /// Validate and take ownership of `specs`, keeping their order
    pub fn load(specs: Vec<ProcessSpec>) -> Result<Self, ConfigError> {
        let mut store = SpecStore::default();

        for spec in specs {
            validate(&spec)?;

            if store.index.contains_key(&spec.name) {
                return Err(ConfigError::invalid(
                    "name",
                    format!("duplicate process name '{}'", spec.name),
                ));
            }

            store.index.insert(spec.name.clone(), store.specs.len());
            store.specs.push(Arc::new(spec));
        }

        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProcessSpec>> {
        self.index.get(name).map(|&i| Arc::clone(&self.specs[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Specs in load order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProcessSpec>> {
        self.specs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn validate(spec: &ProcessSpec) -> Result<(), ConfigError> {
    if spec.name.trim().is_empty() {
        return Err(ConfigError::invalid("name", "must not be empty"));
    }

    if spec.command.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "command",
            format!("empty command for process '{}'", spec.name),
        ));
    }

    if !spec.cwd.exists() {
        return Err(ConfigError::invalid(
            "cwd",
            format!(
                "working directory does not exist for process '{}': {}",
                spec.name,
                spec.cwd.display()
            ),
        ));
    }

    if !spec.cwd.is_dir() {
        return Err(ConfigError::invalid(
            "cwd",
            format!(
                "working directory is not a directory for process '{}': {}",
                spec.name,
                spec.cwd.display()
            ),
        ));
    }

    Ok(())
}
