//! Database registry - named stores for the lifetime of the process

use crate::core::error::{Error, Result};
use crate::storage::mem_store::MemoryDatabase;
use crate::storage::DocumentStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Maps database names to store instances
///
/// Generic parameter D allows compile-time selection of the backend.
pub struct DatabaseRegistry<D: DocumentStore + 'static> {
    /// Lock-free map of database name to store
    databases: DashMap<String, Arc<D>>,
    /// Function to create new store instances
    factory: Arc<dyn Fn(&str) -> D + Send + Sync>,
}

impl<D: DocumentStore + 'static> DatabaseRegistry<D> {
    /// Create an empty registry with a factory function for store instances
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> D + Send + Sync + 'static,
    {
        Self {
            databases: DashMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Create a database; fails if the name is invalid or taken
    pub fn create(&self, name: &str) -> Result<Arc<D>> {
        validate_database_name(name)?;
        match self.databases.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::DatabaseExists(name.to_string())),
            Entry::Vacant(slot) => {
                let db = Arc::new((self.factory)(name));
                slot.insert(db.clone());
                info!(db = name, "database created");
                Ok(db)
            }
        }
    }

    /// Look up a database
    pub fn get(&self, name: &str) -> Result<Arc<D>> {
        self.databases
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::DatabaseMissing(name.to_string()))
    }

    /// Drop a database and all of its documents
    pub fn delete(&self, name: &str) -> Result<()> {
        match self.databases.remove(name) {
            Some(_) => {
                info!(db = name, "database deleted");
                Ok(())
            }
            None => Err(Error::DatabaseMissing(name.to_string())),
        }
    }

    /// Registered names in ascending order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get the number of databases
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    /// Whether no database is registered
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

/// Registry of in-memory databases
pub type MemoryRegistry = DatabaseRegistry<MemoryDatabase>;

impl MemoryRegistry {
    /// Registry whose databases live in memory
    pub fn in_memory() -> Self {
        Self::new(|name: &str| MemoryDatabase::new(name))
    }
}

/// Database names: a lowercase letter, then `a-z 0-9 _ $ ( ) + - /`
pub fn validate_database_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        });

    if valid {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "Name: '{}'. Only lowercase characters (a-z), digits (0-9), and any of the characters _, $, (, ), +, -, and / are allowed. Must begin with a letter.",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let registry = MemoryRegistry::in_memory();
        assert!(registry.is_empty());

        let db = registry.create("inbox").unwrap();
        assert_eq!(db.name(), "inbox");
        assert_eq!(registry.get("inbox").unwrap().name(), "inbox");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let registry = MemoryRegistry::in_memory();
        registry.create("dup").unwrap();
        assert!(matches!(registry.create("dup"), Err(Error::DatabaseExists(_))));
    }

    #[test]
    fn test_missing_database() {
        let registry = MemoryRegistry::in_memory();
        assert!(matches!(registry.get("nope"), Err(Error::DatabaseMissing(_))));
        assert!(matches!(registry.delete("nope"), Err(Error::DatabaseMissing(_))));
    }

    #[test]
    fn test_delete_and_names() {
        let registry = MemoryRegistry::in_memory();
        for name in ["zeta", "alpha", "mid"] {
            registry.create(name).unwrap();
        }
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);

        registry.delete("mid").unwrap();
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert!(registry.create("mid").is_ok());
    }

    #[test]
    fn test_database_names() {
        for ok in ["a", "db1", "my_db$(x)+y-z/w"] {
            assert!(validate_database_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "1db", "_users", "Upper", "has space", "dot.db"] {
            assert!(validate_database_name(bad).is_err(), "{bad}");
        }
    }
}
