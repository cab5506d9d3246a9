//! Timelines of the temporal dimension and the per-array timeline manager.
//!
//! A timeline maps between three views of the same time point: its label
//! (usually an ISO date), its zero-based position in the timeline, and its
//! absolute index along the array's temporal dimension
//! (`position + dimension.min_idx`).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GeowsError, Result};
use crate::metadata::arrays::GeoArrayRegistry;
use crate::metadata::geo_array::Dimension;
use crate::metadata::read_json;

/// Arrays served with timelines are (col, row, time)
pub const ARRAY_RANK: usize = 3;

/// Ordinal position of the temporal dimension
pub const TEMPORAL_DIMENSION_POS: usize = 2;

/// Ordered time-point labels of one array
#[derive(Debug, Clone)]
pub struct Timeline {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
    dimension: Dimension,
}

impl Timeline {
    pub fn new(labels: Vec<String>, dimension: Dimension) -> Result<Self> {
        let mut positions = HashMap::with_capacity(labels.len());
        for (pos, label) in labels.iter().enumerate() {
            if positions.insert(label.clone(), pos).is_some() {
                return Err(GeowsError::parse(format!(
                    "time point '{}' appears more than once in the timeline of dimension '{}'",
                    label, dimension.name
                )));
            }
        }

        Ok(Self {
            labels,
            positions,
            dimension,
        })
    }

    /// Label at zero-based position `pos`
    pub fn get(&self, pos: usize) -> Result<&str> {
        self.labels.get(pos).map(String::as_str).ok_or_else(|| {
            GeowsError::out_of_bounds(format!(
                "position {} is outside a timeline of {} time points",
                pos,
                self.labels.len()
            ))
        })
    }

    /// Zero-based position of `label`
    pub fn pos(&self, label: &str) -> Result<usize> {
        self.positions.get(label).copied().ok_or_else(|| {
            GeowsError::out_of_bounds(format!("time point '{}' is not in the timeline", label))
        })
    }

    /// Zero-based position of an absolute dimension index
    pub fn pos_from_index(&self, index: i64) -> Result<usize> {
        let pos = i128::from(index) - i128::from(self.dimension.min_idx);
        if pos < 0 || pos >= self.labels.len() as i128 {
            return Err(GeowsError::out_of_bounds(format!(
                "index {} maps to position {}, outside [0, {})",
                index,
                pos,
                self.labels.len()
            )));
        }
        Ok(pos as usize)
    }

    /// Absolute dimension index of `label`
    pub fn index(&self, label: &str) -> Result<i64> {
        let pos = self.pos(label)?;
        i64::try_from(pos)
            .ok()
            .and_then(|pos| self.dimension.min_idx.checked_add(pos))
            .ok_or_else(|| {
                GeowsError::out_of_bounds(format!(
                    "time point '{}' lies past the end of dimension '{}'",
                    label, self.dimension.name
                ))
            })
    }

    /// Positions of the first label `>= start` and the last label `<= end`.
    /// Labels compare as strings, which orders ISO dates chronologically.
    pub fn range(&self, start: &str, end: &str) -> Result<(usize, usize)> {
        let first = self.labels.iter().position(|l| l.as_str() >= start);
        let last = self.labels.iter().rposition(|l| l.as_str() <= end);

        match (first, last) {
            (Some(first), Some(last)) if first <= last => Ok((first, last)),
            _ => Err(GeowsError::out_of_bounds(format!(
                "no time point between '{}' and '{}'",
                start, end
            ))),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn first(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    array: String,
    file: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    timelines: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct TimelineDocument {
    timeline: Vec<String>,
}

/// Timelines keyed by array name
#[derive(Debug, Default)]
pub struct TimelineManager {
    timelines: HashMap<String, Timeline>,
}

impl TimelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the manifest and one timeline file per listed array. Timeline
    /// file paths are relative to the manifest's directory.
    pub fn load(manifest_path: &Path, arrays: &GeoArrayRegistry) -> Result<Self> {
        let manifest: Manifest = read_json(manifest_path)?;
        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        let mut manager = Self::new();
        for entry in manifest.timelines {
            let array = arrays.get(&entry.array)?;

            if array.dimensions.len() != ARRAY_RANK {
                return Err(GeowsError::parse(format!(
                    "array '{}' has {} dimensions, timelines need exactly {}",
                    array.name,
                    array.dimensions.len(),
                    ARRAY_RANK
                )));
            }

            let dimension = array.dimension_at(TEMPORAL_DIMENSION_POS).ok_or_else(|| {
                GeowsError::parse(format!(
                    "array '{}' has no dimension at position {}",
                    array.name, TEMPORAL_DIMENSION_POS
                ))
            })?;

            let document: TimelineDocument = read_json(&base_dir.join(&entry.file))?;
            let timeline = Timeline::new(document.timeline, dimension.clone())?;

            let dimension_size = dimension.size().ok_or_else(|| {
                GeowsError::parse(format!(
                    "temporal dimension '{}' of array '{}' has invalid bounds",
                    dimension.name, array.name
                ))
            })?;
            if timeline.len() as u64 > dimension_size {
                warn!(
                    array = %array.name,
                    time_points = timeline.len(),
                    dimension_size = dimension_size,
                    "Timeline is longer than its temporal dimension"
                );
            }

            debug!(array = %array.name, time_points = timeline.len(), "Loaded timeline");
            manager.insert(entry.array, timeline)?;
        }

        Ok(manager)
    }

    pub fn insert(&mut self, array_name: impl Into<String>, timeline: Timeline) -> Result<()> {
        let array_name = array_name.into();
        if self.timelines.contains_key(&array_name) {
            return Err(GeowsError::DuplicateTimeline { name: array_name });
        }
        self.timelines.insert(array_name, timeline);
        Ok(())
    }

    pub fn get(&self, array_name: &str) -> Result<&Timeline> {
        self.timelines
            .get(array_name)
            .ok_or_else(|| GeowsError::not_found(format!("timeline for array '{}'", array_name)))
    }

    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    /// Time points across all timelines
    pub fn total_time_points(&self) -> usize {
        self.timelines.values().map(Timeline::len).sum()
    }
}
