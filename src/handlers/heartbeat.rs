//! Heartbeat operation handler.
//!
//! Returns server status information, including uptime, memory usage, the
//! size of the metadata index and the state of the backend connection pool.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::Result;
use crate::handlers::{write_json, HandlerContext};
use crate::http::{HttpRequest, HttpResponse};
use crate::metadata::{GeoArrayRegistry, TimelineManager};
use crate::pool::{ConnectionPool, PoolStats};
use crate::registry::{Operation, OperationHandler, Service};

pub const SERVICE_NAME: &str = "tws";

/// Server ID, generated once per process
static SERVER_ID: once_cell::sync::Lazy<String> =
    once_cell::sync::Lazy::new(|| Uuid::new_v4().to_string());

/// Server start time
static START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

/// Heartbeat response structure
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    /// Server ID (unique per instance)
    pub server_id: String,
    /// Current timestamp (ISO 8601 format)
    pub timestamp: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Process memory usage in bytes
    pub memory_usage_bytes: Option<u64>,
    /// Available system memory in bytes
    pub available_memory_bytes: Option<u64>,
    /// Metadata index information
    pub metadata: MetadataInfo,
    /// Backend connection pool counters
    pub pool: PoolStats,
    /// Server status
    pub status: String,
}

/// Metadata index information
#[derive(Debug, Serialize)]
pub struct MetadataInfo {
    /// Number of registered arrays
    pub array_count: usize,
    /// Registered array names, sorted
    pub arrays: Vec<String>,
    /// Number of arrays with a timeline
    pub timeline_count: usize,
    /// Time points across all timelines
    pub time_points: usize,
}

/// The `tws` service with its `heartbeat` operation
pub fn service(context: &HandlerContext) -> Service {
    // uptime counts from service registration, not from the first heartbeat
    once_cell::sync::Lazy::force(&START_TIME);

    Service::new(SERVICE_NAME).with_operation(Operation::new(
        "heartbeat",
        "Report server status",
        Heartbeat {
            arrays: Arc::clone(&context.arrays),
            timelines: Arc::clone(&context.timelines),
            pool: Arc::clone(&context.pool),
        },
    ))
}

pub struct Heartbeat {
    arrays: Arc<GeoArrayRegistry>,
    timelines: Arc<TimelineManager>,
    pool: Arc<ConnectionPool>,
}

impl Heartbeat {
    fn status(&self) -> HeartbeatResponse {
        // Get current timestamp
        let now = SystemTime::now();
        let timestamp = chrono::DateTime::<chrono::Utc>::from(now)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        // Calculate uptime
        let uptime = now.duration_since(*START_TIME).unwrap_or(Duration::from_secs(0));

        let mut arrays: Vec<String> = self
            .arrays
            .list_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        arrays.sort_unstable();

        HeartbeatResponse {
            server_id: SERVER_ID.clone(),
            timestamp,
            uptime_seconds: uptime.as_secs(),
            memory_usage_bytes: get_memory_usage(),
            available_memory_bytes: get_available_memory(),
            metadata: MetadataInfo {
                array_count: arrays.len(),
                arrays,
                timeline_count: self.timelines.len(),
                time_points: self.timelines.total_time_points(),
            },
            pool: self.pool.stats(),
            status: "healthy".to_string(),
        }
    }
}

impl OperationHandler for Heartbeat {
    fn handle(&self, _request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
        write_json(response, &self.status())
    }
}

/// Get current process memory usage (platform-dependent)
fn get_memory_usage() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // RSS is the second value of /proc/self/statm, in pages
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        Some(pages * 4096)
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;

        let output = Command::new("ps")
            .args(["-o", "rss=", "-p", &std::process::id().to_string()])
            .output()
            .ok()?;
        let rss_kb = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u64>()
            .ok()?;
        Some(rss_kb * 1024)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

/// Get available system memory (platform-dependent)
fn get_available_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
        let kb = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        Some(kb * 1024)
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;

        let output = Command::new("vm_stat").output().ok()?;
        let vm_stat = String::from_utf8_lossy(&output.stdout);

        let page_size = vm_stat
            .lines()
            .find(|l| l.contains("page size of"))
            .and_then(|l| l.split("page size of ").nth(1))
            .and_then(|s| s.trim().split_whitespace().next())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(4096);

        let line = vm_stat.lines().find(|l| l.starts_with("Pages free:"))?;
        let count = line
            .split(':')
            .nth(1)?
            .trim()
            .replace('.', "")
            .parse::<u64>()
            .ok()?;
        Some(count * page_size)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
