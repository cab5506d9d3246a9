//! Geo-array schema types.
//!
//! These mirror the JSON metadata document one to one, so loading is plain
//! serde deserialization followed by [`GeoArray::validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{GeowsError, Result};

/// One axis of an array's coordinate tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub min_idx: i64,
    pub max_idx: i64,
    /// Ordinal position inside the coordinate tuple
    pub pos: usize,
}

impl Dimension {
    /// Number of cells along this dimension, `None` when the bounds are
    /// inverted or the count does not fit in a `u64`
    pub fn size(&self) -> Option<u64> {
        let cells = i128::from(self.max_idx) - i128::from(self.min_idx) + 1;
        if cells <= 0 {
            return None;
        }
        u64::try_from(cells).ok()
    }
}

/// Storage type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

/// A typed value stored in every cell of the array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub datatype: Datatype,
    pub valid_range: ValidRange,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    pub missing_value: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub extent: BoundingBox,
    pub resolution: Resolution,
    pub srid: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub interval: TimeInterval,
    pub resolution: u32,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

/// Schema of a registered geospatial array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoArray {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detail: String,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub geo_extent: GeoExtent,
}

impl GeoArray {
    /// Dimension at ordinal position `pos`
    pub fn dimension_at(&self, pos: usize) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.pos == pos)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GeowsError::parse("array name cannot be empty"));
        }

        let mut positions = HashSet::new();
        for dim in &self.dimensions {
            if dim.name.is_empty() {
                return Err(GeowsError::parse(format!(
                    "array '{}' has a dimension without a name",
                    self.name
                )));
            }
            if dim.max_idx < dim.min_idx {
                return Err(GeowsError::parse(format!(
                    "dimension '{}' of array '{}' has max_idx {} < min_idx {}",
                    dim.name, self.name, dim.max_idx, dim.min_idx
                )));
            }
            if dim.size().is_none() {
                return Err(GeowsError::parse(format!(
                    "dimension '{}' of array '{}' spans more cells than can be counted",
                    dim.name, self.name
                )));
            }
            if !positions.insert(dim.pos) {
                return Err(GeowsError::parse(format!(
                    "array '{}' has more than one dimension at position {}",
                    self.name, dim.pos
                )));
            }
        }

        let resolution = &self.geo_extent.spatial.resolution;
        if resolution.x <= 0.0 || resolution.y <= 0.0 {
            return Err(GeowsError::parse(format!(
                "array '{}' has a non-positive spatial resolution",
                self.name
            )));
        }

        for attr in &self.attributes {
            if attr.name.is_empty() {
                return Err(GeowsError::parse(format!(
                    "array '{}' has an attribute without a name",
                    self.name
                )));
            }
            if attr.valid_range.min > attr.valid_range.max {
                return Err(GeowsError::parse(format!(
                    "attribute '{}' of array '{}' has an inverted valid range",
                    attr.name, self.name
                )));
            }
        }

        Ok(())
    }
}
