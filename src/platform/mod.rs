pub mod snapshot;

use crate::content::BatteryStatus;
use crate::notifications::SourceError;

/// Battery and alarm state of the device.
pub trait DeviceStatus: Send + Sync {
    fn battery(&self) -> Result<BatteryStatus, SourceError>;
    /// Human-readable next alarm, `None` when no alarm is set.
    fn next_alarm(&self) -> Result<Option<String>, SourceError>;
}

pub use snapshot::{DeviceSnapshot, SnapshotFile};
