//! Versioned dictionary provider
//!
//! The pipeline never reads a global dictionary. It takes an
//! `Arc<Dictionary>` snapshot from a [`DictionaryProvider`] at the start of a
//! request and threads it through every stage, so a dictionary installed
//! mid-request only affects later requests.

use crate::error::{DictionaryError, DictionaryResult};
use crate::schema::{Dictionary, EntityDefinition};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only, versioned dictionary lookup
pub trait DictionaryProvider: Send + Sync {
    /// Snapshot of the active dictionary
    fn current(&self) -> Arc<Dictionary>;

    /// Snapshot of a specific installed version
    fn version(&self, version: &str) -> DictionaryResult<Arc<Dictionary>>;

    /// Definition of `entity_type` in `version` (active version when `None`)
    fn entity_definition(
        &self,
        entity_type: &str,
        version: Option<&str>,
    ) -> DictionaryResult<EntityDefinition> {
        let dict = match version {
            Some(v) => self.version(v)?,
            None => self.current(),
        };
        dict.entity_definition(entity_type).cloned()
    }
}

/// Swappable in-process dictionary store
#[derive(Debug)]
pub struct DictionaryRegistry {
    active: RwLock<Arc<Dictionary>>,
    versions: RwLock<HashMap<String, Arc<Dictionary>>>,
}

impl DictionaryRegistry {
    /// Create registry with an initial active dictionary
    #[must_use]
    pub fn new(initial: Dictionary) -> Self {
        let initial = Arc::new(initial);
        let mut versions = HashMap::new();
        versions.insert(initial.version().to_string(), Arc::clone(&initial));
        Self {
            active: RwLock::new(initial),
            versions: RwLock::new(versions),
        }
    }

    /// Install a dictionary and make it active
    ///
    /// Returns the previously active version.
    pub fn install(&self, dictionary: Dictionary) -> String {
        let dictionary = Arc::new(dictionary);
        let version = dictionary.version().to_string();
        self.versions
            .write()
            .insert(version.clone(), Arc::clone(&dictionary));
        let previous = std::mem::replace(&mut *self.active.write(), dictionary);
        tracing::info!(
            from = %previous.version(),
            to = %version,
            "dictionary swapped"
        );
        previous.version().to_string()
    }

    /// Re-activate an already installed version
    pub fn activate(&self, version: &str) -> DictionaryResult<()> {
        let dict = self.version(version)?;
        *self.active.write() = dict;
        Ok(())
    }

    /// Installed versions, sorted
    #[must_use]
    pub fn installed_versions(&self) -> Vec<String> {
        let mut versions: Vec<_> = self.versions.read().keys().cloned().collect();
        versions.sort();
        versions
    }
}

impl DictionaryProvider for DictionaryRegistry {
    fn current(&self) -> Arc<Dictionary> {
        self.active.read().clone()
    }

    fn version(&self, version: &str) -> DictionaryResult<Arc<Dictionary>> {
        self.versions
            .read()
            .get(version)
            .cloned()
            .ok_or_else(|| DictionaryError::VersionNotFound(version.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(version: &str, extra_field: &str) -> Dictionary {
        let src = format!(
            r#"
version: "{version}"
boundary_entity: program
root_types: [program]
entities:
  program:
    key_field: name
    fields:
      name: {{ type: string }}
      {extra_field}: {{ type: string }}
"#
        );
        Dictionary::from_yaml_str(&src).unwrap()
    }

    #[test]
    fn swap_keeps_old_snapshots_valid() {
        let registry = DictionaryRegistry::new(dict("1", "alpha"));
        let before = registry.current();

        let previous = registry.install(dict("2", "beta"));
        assert_eq!(previous, "1");

        assert!(before.entity("program").unwrap().field("alpha").is_some());
        assert!(registry
            .current()
            .entity("program")
            .unwrap()
            .field("beta")
            .is_some());
        assert_eq!(registry.installed_versions(), vec!["1", "2"]);
    }

    #[test]
    fn lookup_by_version() {
        let registry = DictionaryRegistry::new(dict("1", "alpha"));
        registry.install(dict("2", "beta"));

        let def = registry.entity_definition("program", Some("1")).unwrap();
        assert!(def.field("alpha").is_some());

        assert!(matches!(
            registry.entity_definition("program", Some("9")),
            Err(DictionaryError::VersionNotFound(_))
        ));
        assert!(matches!(
            registry.entity_definition("case", None),
            Err(DictionaryError::EntityNotFound(_))
        ));

        registry.activate("1").unwrap();
        assert_eq!(registry.current().version(), "1");
    }
}
