//! Type definitions for L2CAP signaling

use super::constants::*;
use thiserror::Error;

/// Error types specific to L2CAP operations
#[derive(Debug, Error)]
pub enum L2capError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported signaling command 0x{code:02x}")]
    UnsupportedCommand { code: u8, identifier: u8 },

    #[error("No signaling state for connection 0x{0:04x}")]
    UnknownConnection(u16),
}

/// Connection parameters carried by an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameterUpdate {
    /// Minimum connection interval (1.25ms units)
    pub conn_interval_min: u16,
    /// Maximum connection interval (1.25ms units)
    pub conn_interval_max: u16,
    /// Peripheral latency (number of events)
    pub conn_latency: u16,
    /// Connection supervision timeout (10ms units)
    pub supervision_timeout: u16,
}

impl ConnectionParameterUpdate {
    /// Validates that the parameters are within acceptable ranges
    pub fn validate(&self) -> bool {
        let interval_ok = self.conn_interval_min >= L2CAP_LE_CONN_INTERVAL_MIN
            && self.conn_interval_max <= L2CAP_LE_CONN_INTERVAL_MAX
            && self.conn_interval_min <= self.conn_interval_max;

        let latency_ok = self.conn_latency <= L2CAP_LE_CONN_LATENCY_MAX;

        let timeout_ok = self.supervision_timeout >= L2CAP_LE_SUPERVISION_TIMEOUT_MIN
            && self.supervision_timeout <= L2CAP_LE_SUPERVISION_TIMEOUT_MAX;

        // Timeout (10ms) must exceed (1 + latency) * max interval (1.25ms) * 2
        let relation_ok = (self.supervision_timeout as u32) * 4
            > (self.conn_interval_max as u32) * (self.conn_latency as u32 + 1);

        interval_ok && latency_ok && timeout_ok && relation_ok
    }
}
