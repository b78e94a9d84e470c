//! Reader heartbeat (one record per host in the `status` collection)

use crate::controller::HardwareController;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub host: String,
    /// Data read since the previous heartbeat, in units of `rate_scale` bytes
    pub rate: f64,
    /// Run state ordinal
    pub status: i32,
    pub buffer_length: f64,
    pub run_mode: String,
    pub current_run_id: String,
    pub time: DateTime<Utc>,
}

impl Heartbeat {
    /// Sample the controller. `rate_scale` converts bytes to the reported unit.
    pub fn sample(
        host: &str,
        controller: &dyn HardwareController,
        current_run_id: &str,
        rate_scale: f64,
    ) -> Self {
        let scale = if rate_scale > 0.0 { rate_scale } else { 1.0 };
        Self {
            host: host.to_string(),
            rate: controller.data_size() as f64 / scale,
            status: controller.status().ordinal(),
            buffer_length: controller.buffer_length() as f64 / scale,
            run_mode: controller.run_mode(),
            current_run_id: current_run_id.to_string(),
            time: Utc::now(),
        }
    }
}
