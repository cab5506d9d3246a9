//! Test data generation utilities.
//!
//! This module writes metadata documents with known contents for testing the
//! geows server, and provides an in-memory backend connector.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use geows::pool::QueryResult;
use geows::{Connector, GeowsError, Result, Session};
use serde_json::json;

/// Paths of a written metadata set
pub struct MetadataFiles {
    pub arrays_file: PathBuf,
    pub timelines_file: PathBuf,
}

/// One 3-D array: col 0..=99, row 0..=49, time 100..=102 over
/// lon [-60, -50] and lat [-15, -10] at 0.1 degrees.
pub fn array_json(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "description": "MODIS 16-day vegetation indices",
        "dimensions": [
            {"name": "col_id", "min_idx": 0, "max_idx": 99, "pos": 0},
            {"name": "row_id", "min_idx": 0, "max_idx": 49, "pos": 1},
            {"name": "time_id", "min_idx": 100, "max_idx": 102, "pos": 2}
        ],
        "attributes": [
            {"name": "ndvi", "datatype": "int16",
             "valid_range": {"min": -2000, "max": 10000},
             "scale_factor": 0.0001, "missing_value": -3000},
            {"name": "evi", "datatype": "int16",
             "valid_range": {"min": -2000, "max": 10000},
             "scale_factor": 0.0001, "missing_value": -3000}
        ],
        "geo_extent": {
            "spatial": {
                "extent": {"xmin": -60.0, "ymin": -15.0, "xmax": -50.0, "ymax": -10.0},
                "resolution": {"x": 0.1, "y": 0.1},
                "srid": 4326
            },
            "temporal": {
                "interval": {"start": "2020-01-01", "end": "2020-03-01"},
                "resolution": 1,
                "unit": "month"
            }
        }
    })
}

/// Write an arrays document with `mod13q1` and `mod13q1_nt`, and a manifest
/// with a three-point timeline for `mod13q1` only.
pub fn write_metadata(dir: &Path) -> std::io::Result<MetadataFiles> {
    let arrays_file = dir.join("arrays.json");
    let timelines_file = dir.join("timelines.json");

    let arrays = json!({ "arrays": [array_json("mod13q1"), array_json("mod13q1_nt")] });
    std::fs::write(&arrays_file, arrays.to_string())?;

    std::fs::create_dir_all(dir.join("timelines"))?;
    let manifest = json!({
        "timelines": [{"array": "mod13q1", "file": "timelines/mod13q1.json"}]
    });
    std::fs::write(&timelines_file, manifest.to_string())?;

    let timeline = json!({ "timeline": ["2020-01-01", "2020-02-01", "2020-03-01"] });
    std::fs::write(dir.join("timelines/mod13q1.json"), timeline.to_string())?;

    Ok(MetadataFiles {
        arrays_file,
        timelines_file,
    })
}

/// Connector whose sessions answer every query with the query text
#[derive(Debug, Default)]
pub struct MemoryConnector {
    pub connects: AtomicUsize,
}

struct MemorySession {
    open: bool,
}

impl Session for MemorySession {
    fn execute(&mut self, query: &str) -> Result<QueryResult> {
        if !self.open {
            return Err(GeowsError::QueryExecution {
                message: "session is closed".to_string(),
            });
        }
        Ok(QueryResult {
            rows: vec![query.to_string()],
        })
    }

    fn close(&mut self) {
        self.open = false;
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, _address: &str, _port: u16) -> Result<Box<dyn Session>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession { open: true }))
    }
}
