//! Worker descriptor: the persisted identity of a background worker

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use tracing::debug;

/// Identity record of a worker as stored in its descriptor file.
///
/// Every field is optional because the file may be partially written, or not
/// written at all. A descriptor with no `serviceID`, `port` and `pid` is
/// *empty* and means no worker has ever been recorded for the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    #[serde(rename = "serviceID", default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Milliseconds since the epoch; set while the worker is booting and
    /// cleared once metadata initialization completes.
    #[serde(rename = "startTimestamp", default)]
    pub start_timestamp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl WorkerDescriptor {
    /// Create a fully-populated descriptor for a started worker
    pub fn started(
        service_id: impl Into<String>,
        port: u16,
        pid: u32,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_id: Some(service_id.into()),
            port: Some(port),
            pid: Some(pid),
            start_timestamp: None,
            version: Some(version.into()),
        }
    }

    /// True when service id, port and pid are all unset or falsy
    pub fn is_empty(&self) -> bool {
        self.service_id().is_none() && self.port().is_none() && self.pid().is_none()
    }

    /// Non-empty service id
    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Non-zero port
    pub fn port(&self) -> Option<u16> {
        self.port.filter(|port| *port != 0)
    }

    /// Non-zero pid
    pub fn pid(&self) -> Option<u32> {
        self.pid.filter(|pid| *pid != 0)
    }

    /// Whether the worker recorded here is still booting
    pub fn is_starting(&self) -> bool {
        self.start_timestamp.is_some()
    }

    /// Boot start time, if the worker is still booting
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_timestamp
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    /// Two descriptors describe the same worker when service id, port and pid
    /// are all present and pairwise equal.
    pub fn is_same_worker(&self, other: &WorkerDescriptor) -> bool {
        match (
            (self.service_id(), self.port(), self.pid()),
            (other.service_id(), other.port(), other.pid()),
        ) {
            ((Some(a_id), Some(a_port), Some(a_pid)), (Some(b_id), Some(b_port), Some(b_pid))) => {
                a_id == b_id && a_port == b_port && a_pid == b_pid
            }
            _ => false,
        }
    }

    /// Semantic-version dominance within one service.
    ///
    /// Never fails: a service mismatch, a missing version or an unparsable
    /// version all yield `false`.
    pub fn has_bigger_or_equal_version_than(&self, other: &WorkerDescriptor) -> bool {
        if self.service_id() != other.service_id() {
            return false;
        }

        let (Some(ours), Some(theirs)) = (self.version.as_deref(), other.version.as_deref()) else {
            return false;
        };

        match (semver::Version::parse(ours), semver::Version::parse(theirs)) {
            (Ok(ours), Ok(theirs)) => ours >= theirs,
            (ours, theirs) => {
                debug!(
                    "Version comparison skipped, unparsable version(s): {:?} / {:?}",
                    ours.err(),
                    theirs.err()
                );
                false
            }
        }
    }
}

impl fmt::Display for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (port {}, pid {}, version {})",
            self.service_id().unwrap_or("<unknown>"),
            self.port().map_or_else(|| "-".to_string(), |p| p.to_string()),
            self.pid().map_or_else(|| "-".to_string(), |p| p.to_string()),
            self.version.as_deref().unwrap_or("-"),
        )
    }
}

/// A partial descriptor update, merged onto whatever is already on disk.
///
/// `start_timestamp` is tri-state: untouched, set, or explicitly cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorPatch {
    pub service_id: Option<String>,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub start_timestamp: Option<Option<i64>>,
    pub version: Option<String>,
}

impl DescriptorPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Mark the worker as booting from now
    pub fn starting_now(mut self) -> Self {
        self.start_timestamp = Some(Some(Utc::now().timestamp_millis()));
        self
    }

    /// Clear the boot marker
    pub fn started(mut self) -> Self {
        self.start_timestamp = Some(None);
        self
    }

    /// Overlay the set fields onto a JSON object
    pub fn apply_to(&self, target: &mut Map<String, JsonValue>) {
        if let Some(ref service_id) = self.service_id {
            target.insert("serviceID".to_string(), JsonValue::from(service_id.clone()));
        }
        if let Some(port) = self.port {
            target.insert("port".to_string(), JsonValue::from(port));
        }
        if let Some(pid) = self.pid {
            target.insert("pid".to_string(), JsonValue::from(pid));
        }
        if let Some(start_timestamp) = self.start_timestamp {
            target.insert(
                "startTimestamp".to_string(),
                start_timestamp.map_or(JsonValue::Null, JsonValue::from),
            );
        }
        if let Some(ref version) = self.version {
            target.insert("version".to_string(), JsonValue::from(version.clone()));
        }
    }
}

impl From<&WorkerDescriptor> for DescriptorPatch {
    fn from(descriptor: &WorkerDescriptor) -> Self {
        Self {
            service_id: descriptor.service_id.clone(),
            port: descriptor.port,
            pid: descriptor.pid,
            start_timestamp: Some(descriptor.start_timestamp),
            version: descriptor.version.clone(),
        }
    }
}
