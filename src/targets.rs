use crate::storage::{self, Store};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to pull out of a matched element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The element's rendered text
    Text,
    /// The source attribute of the element or its first image descendant
    Image,
    /// The href attribute of the element or its first anchor descendant
    Link,
}

/// A captured extraction target: where to find it, what to call it,
/// and what to extract from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Locator path addressing the matched element(s)
    pub path: String,
    /// Column name in the extracted output, unique within a registry
    pub identifier: String,
    /// Value kind to extract
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

/// Why a target could not be added to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The identifier was empty
    EmptyIdentifier,
    /// Another target already uses this identifier
    DuplicateIdentifier,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyIdentifier => write!(f, "identifier must not be empty"),
            RegistryError::DuplicateIdentifier => write!(f, "identifier is already in use"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Ordered set of captured targets; insertion order defines output column order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetRegistry {
    targets: Vec<TargetSpec>,
}

impl TargetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an identifier can still be used for a new target
    pub fn is_identifier_free(&self, identifier: &str) -> bool {
        !self
            .targets
            .iter()
            .any(|target| target.identifier == identifier)
    }

    /// Append a target, enforcing identifier uniqueness
    pub fn add(&mut self, spec: TargetSpec) -> Result<(), RegistryError> {
        if spec.identifier.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        if !self.is_identifier_free(&spec.identifier) {
            return Err(RegistryError::DuplicateIdentifier);
        }
        self.targets.push(spec);
        Ok(())
    }

    /// Whether some target already uses the given locator path
    pub fn contains_path(&self, path: &str) -> bool {
        self.targets.iter().any(|target| target.path == path)
    }

    /// Remove every target captured under the given locator path (toggle-off).
    /// Returns true when something was removed.
    pub fn remove_path(&mut self, path: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|target| target.path != path);
        before != self.targets.len()
    }

    /// Iterate targets in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TargetSpec> {
        self.targets.iter()
    }

    /// Number of captured targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry holds no targets
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Drop every captured target
    pub fn reset(&mut self) {
        self.targets.clear();
    }

    /// Load the registry persisted for an origin, or an empty one
    pub async fn load(store: &dyn Store, origin: &str) -> Self {
        match store.get(&storage::targets_key(origin)).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(registry) => registry,
                Err(e) => {
                    ::log::error!("Ignoring unreadable saved targets for {}: {}", origin, e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Persist the full registry for an origin
    pub async fn save(&self, store: &dyn Store, origin: &str) {
        match serde_json::to_value(self) {
            Ok(value) => store.set(&storage::targets_key(origin), value).await,
            Err(e) => ::log::error!("Failed to serialize targets for {}: {}", origin, e),
        }
    }
}

/// Fallback identifier used when the user dismisses the target prompt:
/// five random base-36 characters
pub fn random_identifier() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn spec(path: &str, identifier: &str) -> TargetSpec {
        TargetSpec {
            path: path.to_string(),
            identifier: identifier.to_string(),
            kind: TargetKind::Text,
        }
    }

    #[test]
    fn test_duplicate_identifier_rejected_until_removed() {
        let mut registry = TargetRegistry::new();
        registry.add(spec(".title", "title")).unwrap();

        let err = registry.add(spec(".other", "title")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateIdentifier);

        assert!(registry.remove_path(".title"));
        registry.add(spec(".other", "title")).unwrap();
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let mut registry = TargetRegistry::new();
        let err = registry.add(spec(".title", "")).unwrap_err();
        assert_eq!(err, RegistryError::EmptyIdentifier);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = TargetRegistry::new();
        registry.add(spec(".a", "first")).unwrap();
        registry.add(spec(".b", "second")).unwrap();
        registry.add(spec(".c", "third")).unwrap();

        let order: Vec<&str> = registry.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_toggle_off_by_path() {
        let mut registry = TargetRegistry::new();
        registry.add(spec(".a", "first")).unwrap();
        assert!(registry.contains_path(".a"));
        assert!(registry.remove_path(".a"));
        assert!(!registry.contains_path(".a"));
        assert!(!registry.remove_path(".a"));
    }

    #[test]
    fn test_random_identifier_shape() {
        for _ in 0..20 {
            let id = random_identifier();
            assert_eq!(id.len(), 5);
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = MemoryStore::new();
        let mut registry = TargetRegistry::new();
        registry.add(spec(".a", "first")).unwrap();
        registry.save(&store, "https://example.com").await;

        let loaded = TargetRegistry::load(&store, "https://example.com").await;
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_path(".a"));

        let other = TargetRegistry::load(&store, "https://other.com").await;
        assert!(other.is_empty());
    }
}
