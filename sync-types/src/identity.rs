//! Stable per-device identity.
//!
//! A device generates one id on first run and presents that same id
//! to every transport forever after. Persistence is a small JSON file
//! in the caller-supplied data directory; if that directory is not
//! usable the identity degrades to a process-lifetime random id so
//! the sync layer still works for the current run.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{DeviceClass, DeviceId, DeviceRecord, IdentityError};

const IDENTITY_FILE: &str = "device.json";

/// The durable on-disk form of a device identity.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    device_id: String,
    device_class: DeviceClass,
    created_at: u64,
}

/// A device's stable identity, loaded from or created in durable
/// local storage.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    record: DeviceRecord,
    degraded: bool,
}

impl DeviceIdentity {
    /// Load the persisted identity from `data_dir`, creating and
    /// persisting a new one on first run.
    ///
    /// Never fails and never touches the network. A corrupt identity
    /// file is replaced with a freshly persisted one, so id stability
    /// resumes from the next launch. Only when the directory cannot be
    /// read or written does the returned identity carry a
    /// process-lifetime random id and report [`degraded`], so callers
    /// avoid caching assumptions that outlive the process.
    ///
    /// [`degraded`]: Self::degraded
    pub fn load_or_create(data_dir: &Path, class: DeviceClass) -> Self {
        match load_or_create_record(data_dir, class) {
            Ok(record) => Self {
                record,
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(
                    "device identity storage unavailable ({e}); \
                     using process-lifetime id"
                );
                Self {
                    record: DeviceRecord::new(DeviceId::random(), class),
                    degraded: true,
                }
            }
        }
    }

    /// The identity this device presents to every transport.
    pub fn record(&self) -> DeviceRecord {
        self.record
    }

    /// Whether this identity will not survive the process.
    pub fn degraded(&self) -> bool {
        self.degraded
    }
}

fn load_or_create_record(data_dir: &Path, class: DeviceClass) -> Result<DeviceRecord, IdentityError> {
    let path = data_dir.join(IDENTITY_FILE);

    if path.exists() {
        let contents = std::fs::read_to_string(&path)?;
        match parse_stored(&contents) {
            Ok(record) => return Ok(record),
            // A corrupt file gets overwritten below; only unusable
            // storage degrades to a process-lifetime id.
            Err(e) => tracing::warn!("stored identity unreadable ({e}); writing a fresh one"),
        }
    }

    let record = DeviceRecord::new(DeviceId::random(), class);
    let stored = StoredIdentity {
        device_id: record.id.to_string(),
        device_class: record.class,
        created_at: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };

    std::fs::create_dir_all(data_dir)?;
    let contents =
        serde_json::to_string_pretty(&stored).map_err(|e| IdentityError::Invalid(e.to_string()))?;
    std::fs::write(&path, contents)?;

    Ok(record)
}

fn parse_stored(contents: &str) -> Result<DeviceRecord, IdentityError> {
    let stored: StoredIdentity =
        serde_json::from_str(contents).map_err(|e| IdentityError::Invalid(e.to_string()))?;
    let id = DeviceId::parse(&stored.device_id)
        .ok_or_else(|| IdentityError::Invalid(stored.device_id.clone()))?;
    // The persisted class wins: it was fixed at install time.
    Ok(DeviceRecord::new(id, stored.device_class))
}
