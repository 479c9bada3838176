//! Stack configuration

use std::time::Duration;

/// Differences between controller firmwares, expressed as data instead of
/// separate stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerProfile {
    /// Largest ATT MTU the stack will agree to
    pub max_mtu: u16,
    /// Whether L2CAP connection parameter signaling is active
    pub l2cap_signaling: bool,
    /// Query LE Read Buffer Size during enable and derive the max MTU from it
    pub read_buffer_size: bool,
}

impl ControllerProfile {
    /// u-blox NINA style firmware: signaling on
    pub const fn nina() -> Self {
        Self {
            max_mtu: 248,
            l2cap_signaling: true,
            read_buffer_size: false,
        }
    }

    /// Plain HCI controller: the peer drives parameter negotiation
    pub const fn generic_hci() -> Self {
        Self {
            max_mtu: 248,
            l2cap_signaling: false,
            read_buffer_size: false,
        }
    }
}

impl Default for ControllerProfile {
    fn default() -> Self {
        Self::nina()
    }
}

/// Stack configuration
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Wait for a Command Complete/Status before giving up
    pub command_timeout: Duration,
    /// Wait for an ATT response before giving up
    pub att_timeout: Duration,
    /// Wait for LE Connection Complete before cancelling
    pub connect_timeout: Duration,
    /// Sleep between poll iterations in blocking loops
    pub poll_interval: Duration,
    /// Delay after HCI Reset before the controller accepts commands
    pub reset_settle: Duration,
    pub event_mask: u64,
    pub le_event_mask: u64,
    pub profile: ControllerProfile,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(3),
            att_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
            reset_settle: Duration::from_millis(150),
            event_mask: 0x3FFF_FFFF_FFFF_FFFF,
            le_event_mask: 0x0000_0000_0000_03FF,
            profile: ControllerProfile::default(),
        }
    }
}

impl StackConfig {
    /// Poll sleep, kept within 1..=10 ms
    pub fn poll_sleep(&self) -> Duration {
        self.poll_interval
            .clamp(Duration::from_millis(1), Duration::from_millis(10))
    }
}
