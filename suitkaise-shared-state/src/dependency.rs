//! Declared read/write dependency sets per method and property.
//!
//! Inspecting a method's source text to discover which attributes it
//! touches is reflection this crate deliberately avoids. Instead, each
//! [`SharedObject`][crate::SharedObject] type declares its own
//! [`DependencyMap`] once, up front, the same way a `suitkaise-worker` spec
//! declares its timeouts rather than having them inferred.

use std::collections::HashMap;

/// Which attributes a method writes, and which a property read depends on.
///
/// Keys here are bare attribute names (`"total"`, not `"counter.total"`);
/// the coordinator and proxy qualify them with the object's registered name
/// when talking about pending/completed counters.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    writes: HashMap<String, Vec<String>>,
    reads: HashMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn builder() -> DependencyMapBuilder {
        DependencyMapBuilder::default()
    }

    pub fn has_write(&self, method: &str) -> bool {
        self.writes.contains_key(method)
    }

    pub fn has_read(&self, property: &str) -> bool {
        self.reads.contains_key(property)
    }

    pub fn writes_of(&self, method: &str) -> &[String] {
        self.writes.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reads_of(&self, property: &str) -> &[String] {
        self.reads.get(property).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Builds a [`DependencyMap`] declaration.
#[derive(Debug, Default)]
pub struct DependencyMapBuilder {
    map: DependencyMap,
}

impl DependencyMapBuilder {
    /// Declare that calling `method` writes `attrs`.
    pub fn writes(mut self, method: impl Into<String>, attrs: &[&str]) -> Self {
        self.map
            .writes
            .insert(method.into(), attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    /// Declare that reading `property` depends on `attrs` having been
    /// written.
    pub fn reads(mut self, property: impl Into<String>, attrs: &[&str]) -> Self {
        self.map
            .reads
            .insert(property.into(), attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn build(self) -> DependencyMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_writes_and_reads_are_queryable() {
        let map = DependencyMap::builder()
            .writes("increment", &["count"])
            .writes("rename", &["name"])
            .reads("summary", &["count", "name"])
            .build();

        assert!(map.has_write("increment"));
        assert!(!map.has_write("summary"));
        assert_eq!(map.writes_of("increment"), &["count".to_string()]);
        assert_eq!(
            map.reads_of("summary"),
            &["count".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn unknown_method_or_property_returns_empty_slice() {
        let map = DependencyMap::builder().build();
        assert!(map.writes_of("nothing").is_empty());
        assert!(map.reads_of("nothing").is_empty());
        assert!(!map.has_write("nothing"));
        assert!(!map.has_read("nothing"));
    }
}
