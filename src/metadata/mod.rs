//! Metadata index: registered geo-arrays and their timelines.

pub mod arrays;
pub mod geo_array;
pub mod timeline;

pub use arrays::GeoArrayRegistry;
pub use geo_array::{
    Attribute, BoundingBox, Datatype, Dimension, GeoArray, GeoExtent, Resolution, SpatialExtent,
    TemporalExtent, TimeInterval, ValidRange,
};
pub use timeline::{Timeline, TimelineManager};

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::{GeowsError, Result};

/// Read and deserialize a JSON document, classifying failures as
/// FileNotFound, FileOpenError or ParseError.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(GeowsError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| GeowsError::FileOpen {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&content)
        .map_err(|e| GeowsError::parse(format!("{}: {}", path.display(), e)))
}
