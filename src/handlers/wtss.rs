//! Web Time Series Service operations.
//!
//! `list_coverages` and `describe_coverage` answer from the metadata index.
//! `time_series` validates a location/interval request against the index and
//! resolves it to grid cell and time indices; reading the cell values out of
//! the array store is left to the backend query layer.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{GeowsError, Result};
use crate::handlers::{query_vars, required, required_f64, write_json, HandlerContext};
use crate::http::{HttpRequest, HttpResponse};
use crate::metadata::{GeoArray, GeoArrayRegistry, TimelineManager};
use crate::registry::{Operation, OperationHandler, Service};

pub const SERVICE_NAME: &str = "wtss";

pub fn service(context: &HandlerContext) -> Service {
    Service::new(SERVICE_NAME)
        .with_operation(Operation::new(
            "list_coverages",
            "List the names of all registered coverages",
            ListCoverages {
                arrays: Arc::clone(&context.arrays),
            },
        ))
        .with_operation(Operation::new(
            "describe_coverage",
            "Describe the schema and timeline of a coverage",
            DescribeCoverage {
                arrays: Arc::clone(&context.arrays),
                timelines: Arc::clone(&context.timelines),
            },
        ))
        .with_operation(Operation::new(
            "time_series",
            "Resolve a time series request for a location",
            TimeSeries {
                arrays: Arc::clone(&context.arrays),
                timelines: Arc::clone(&context.timelines),
            },
        ))
}

pub struct ListCoverages {
    arrays: Arc<GeoArrayRegistry>,
}

#[derive(Debug, Serialize)]
struct CoverageList<'a> {
    coverages: Vec<&'a str>,
}

impl OperationHandler for ListCoverages {
    fn handle(&self, _request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
        let mut coverages = self.arrays.list_names();
        coverages.sort_unstable();
        write_json(response, &CoverageList { coverages })
    }
}

pub struct DescribeCoverage {
    arrays: Arc<GeoArrayRegistry>,
    timelines: Arc<TimelineManager>,
}

#[derive(Debug, Serialize)]
struct CoverageDescription<'a> {
    #[serde(flatten)]
    array: &'a GeoArray,
    timeline: &'a [String],
}

impl OperationHandler for DescribeCoverage {
    fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
        let vars = query_vars(request)?;
        let name = required(&vars, "name")?;
        let array = self.arrays.get(name)?;

        let timeline: &[String] = match self.timelines.get(name) {
            Ok(timeline) => timeline.labels(),
            Err(_) => &[],
        };

        write_json(response, &CoverageDescription { array, timeline })
    }
}

pub struct TimeSeries {
    arrays: Arc<GeoArrayRegistry>,
    timelines: Arc<TimelineManager>,
}

#[derive(Debug, Serialize)]
struct TimeSeriesQuery<'a> {
    coverage: &'a str,
    attributes: Vec<&'a str>,
    latitude: f64,
    longitude: f64,
    start_date: &'a str,
    end_date: &'a str,
}

#[derive(Debug, Serialize)]
struct AttributeInfo<'a> {
    attribute: &'a str,
    scale_factor: f64,
    missing_value: f64,
}

#[derive(Debug, Serialize)]
struct GridCell {
    col: i64,
    row: i64,
}

#[derive(Debug, Serialize)]
struct IndexRange {
    start: i64,
    end: i64,
}

#[derive(Debug, Serialize)]
struct TimeSeriesResult<'a> {
    attributes: Vec<AttributeInfo<'a>>,
    timeline: &'a [String],
    coordinates: GridCell,
    time_index: IndexRange,
}

#[derive(Debug, Serialize)]
struct TimeSeriesResponse<'a> {
    query: TimeSeriesQuery<'a>,
    result: TimeSeriesResult<'a>,
}

impl OperationHandler for TimeSeries {
    fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
        let vars = query_vars(request)?;
        let coverage = required(&vars, "coverage")?;
        let attribute_list = required(&vars, "attributes")?;
        let latitude = required_f64(&vars, "latitude")?;
        let longitude = required_f64(&vars, "longitude")?;

        let array = self.arrays.get(coverage)?;

        let mut attributes = Vec::new();
        for name in attribute_list.split(',').filter(|n| !n.is_empty()) {
            let attribute = array.attribute(name).ok_or_else(|| {
                GeowsError::request(format!(
                    "attribute '{}' is not part of coverage '{}'",
                    name, coverage
                ))
            })?;
            attributes.push(AttributeInfo {
                attribute: &attribute.name,
                scale_factor: attribute.scale_factor,
                missing_value: attribute.missing_value,
            });
        }
        if attributes.is_empty() {
            return Err(GeowsError::request("parameter 'attributes' lists no attribute"));
        }

        let coordinates = grid_cell(array, longitude, latitude)?;

        let timeline = self.timelines.get(coverage)?;
        let start_date = match vars.get("start_date").map(String::as_str) {
            Some(date) if !date.is_empty() => date,
            _ => timeline.first().unwrap_or_default(),
        };
        let end_date = match vars.get("end_date").map(String::as_str) {
            Some(date) if !date.is_empty() => date,
            _ => timeline.last().unwrap_or_default(),
        };
        let (first, last) = timeline.range(start_date, end_date)?;
        let time_index = IndexRange {
            start: timeline.index(&timeline.labels()[first])?,
            end: timeline.index(&timeline.labels()[last])?,
        };

        debug!(
            coverage = coverage,
            col = coordinates.col,
            row = coordinates.row,
            first = first,
            last = last,
            "Resolved time series request"
        );

        write_json(
            response,
            &TimeSeriesResponse {
                query: TimeSeriesQuery {
                    coverage,
                    attributes: attributes.iter().map(|a| a.attribute).collect(),
                    latitude,
                    longitude,
                    start_date,
                    end_date,
                },
                result: TimeSeriesResult {
                    attributes,
                    timeline: &timeline.labels()[first..=last],
                    coordinates,
                    time_index,
                },
            },
        )
    }
}

/// Grid cell holding a location given in the array's native reference system.
/// Columns grow eastwards from `xmin`, rows grow southwards from `ymax`.
fn grid_cell(array: &GeoArray, longitude: f64, latitude: f64) -> Result<GridCell> {
    let spatial = &array.geo_extent.spatial;
    if !spatial.extent.contains(longitude, latitude) {
        return Err(GeowsError::request(format!(
            "location ({}, {}) is outside the extent of coverage '{}'",
            longitude, latitude, array.name
        )));
    }

    let (col_dim, row_dim) = match (array.dimension_at(0), array.dimension_at(1)) {
        (Some(col), Some(row)) => (col, row),
        _ => {
            return Err(GeowsError::request(format!(
                "coverage '{}' has no spatial dimensions",
                array.name
            )))
        }
    };

    let col = ((longitude - spatial.extent.xmin) / spatial.resolution.x).floor() as i64;
    let row = ((spatial.extent.ymax - latitude) / spatial.resolution.y).floor() as i64;

    Ok(GridCell {
        col: col_dim.min_idx.saturating_add(col).min(col_dim.max_idx),
        row: row_dim.min_idx.saturating_add(row).min(row_dim.max_idx),
    })
}
