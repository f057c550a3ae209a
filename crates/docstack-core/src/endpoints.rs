//! Endpoint name mapping
//!
//! Logical collection names are mapped to prefixed physical names once, at
//! construction time. The closed set comes from configuration; collaborators
//! can hold an [`EndpointMap`] to validate or predict physical names without
//! reimplementing the mapping.

use std::collections::HashMap;

use crate::error::{DbError, DbResult};

/// Closed logical-to-physical endpoint name map
#[derive(Debug, Clone)]
pub struct EndpointMap {
    prefix: String,
    map: HashMap<String, String>,
}

impl EndpointMap {
    /// Build the map for a closed set of logical names
    pub fn new(prefix: &str, logical_names: &[String]) -> Self {
        let map = logical_names
            .iter()
            .map(|name| (name.clone(), format!("{}{}", prefix, name)))
            .collect();
        Self {
            prefix: prefix.to_string(),
            map,
        }
    }

    /// The configured physical-name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a logical name; names outside the set are an error
    pub fn resolve(&self, logical: &str) -> DbResult<&str> {
        self.map
            .get(logical)
            .map(String::as_str)
            .ok_or_else(|| DbError::UnknownEndpoint(logical.to_string()))
    }

    /// The physical form a logical name would take, membership aside
    pub fn physical_name(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }

    /// Whether a logical name is in the set
    pub fn contains(&self, logical: &str) -> bool {
        self.map.contains_key(logical)
    }

    /// Iterate over (logical, physical) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_applies_prefix() {
        let map = EndpointMap::new("dev_", &names(&["items", "users"]));

        assert_eq!(map.resolve("items").unwrap(), "dev_items");
        assert_eq!(map.resolve("users").unwrap(), "dev_users");
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let map = EndpointMap::new("dev_", &names(&["items"]));

        let err = map.resolve("orders").unwrap_err();
        assert!(matches!(err, DbError::UnknownEndpoint(_)));
        assert!(!map.contains("orders"));
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let map = EndpointMap::new("", &names(&["items"]));
        assert_eq!(map.resolve("items").unwrap(), "items");
    }

    #[test]
    fn test_physical_name_predicts_without_membership() {
        let map = EndpointMap::new("prod_", &names(&["items"]));
        assert_eq!(map.physical_name("anything"), "prod_anything");
    }

    #[test]
    fn test_iteration() {
        let map = EndpointMap::new("x_", &names(&["a", "b"]));
        assert_eq!(map.len(), 2);

        let mut pairs: Vec<(&str, &str)> = map.iter().collect();
        pairs.sort();
        assert_eq!(pairs, vec![("a", "x_a"), ("b", "x_b")]);
    }
}
