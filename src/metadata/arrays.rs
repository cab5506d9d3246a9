//! Registry of geo-array schemas, keyed by array name.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{GeowsError, Result};
use crate::metadata::geo_array::GeoArray;
use crate::metadata::read_json;

/// Top level of the array metadata document
#[derive(Debug, Deserialize)]
struct ArraysDocument {
    arrays: Vec<GeoArray>,
}

/// Name-indexed geo-array schemas. Entries are never replaced once inserted.
#[derive(Debug, Default)]
pub struct GeoArrayRegistry {
    arrays: HashMap<String, GeoArray>,
}

impl GeoArrayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every array of a metadata document
    pub fn load(path: &Path) -> Result<Self> {
        let document: ArraysDocument = read_json(path)?;

        let mut registry = Self::new();
        for array in document.arrays {
            array.validate()?;
            registry.insert(array)?;
        }

        debug!(
            path = %path.display(),
            array_count = registry.len(),
            "Loaded array metadata"
        );
        Ok(registry)
    }

    pub fn insert(&mut self, array: GeoArray) -> Result<()> {
        if self.arrays.contains_key(&array.name) {
            return Err(GeowsError::DuplicateArray { name: array.name });
        }
        self.arrays.insert(array.name.clone(), array);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&GeoArray> {
        self.arrays
            .get(name)
            .ok_or_else(|| GeowsError::not_found(format!("array '{}'", name)))
    }

    /// Registered names, in no particular order
    pub fn list_names(&self) -> Vec<&str> {
        self.arrays.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::metadata::geo_array::fixtures::geo_array;
    use std::io::Write;

    #[test]
    fn test_duplicate_array_keeps_first() {
        let mut registry = GeoArrayRegistry::new();
        registry.insert(geo_array("mod13q1")).unwrap();

        let mut other = geo_array("mod13q1");
        other.description = "replacement".to_string();
        let err = registry.insert(other).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateArray);
        assert_eq!(
            registry.get("mod13q1").unwrap().description,
            "MODIS 16-day vegetation indices"
        );
        assert_eq!(registry.list_names().len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let registry = GeoArrayRegistry::new();
        assert_eq!(registry.get("none").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_names() {
        let mut registry = GeoArrayRegistry::new();
        registry.insert(geo_array("b")).unwrap();
        registry.insert(geo_array("a")).unwrap();

        let mut names = registry.list_names();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_load_document() {
        let document = serde_json::json!({ "arrays": [geo_array("a"), geo_array("b")] });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", document).unwrap();

        let registry = GeoArrayRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().dimensions.len(), 3);
    }

    #[test]
    fn test_load_failures() {
        let err = GeoArrayRegistry::load(Path::new("/nonexistent/arrays.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"arrays\": [{{\"name\": 1}}]}}").unwrap();
        let err = GeoArrayRegistry::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        let document = serde_json::json!({ "arrays": [geo_array("a"), geo_array("a")] });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", document).unwrap();
        let err = GeoArrayRegistry::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateArray);
    }
}
