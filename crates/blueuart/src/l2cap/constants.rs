//! L2CAP constants for the LE fixed channels

// Fixed channel identifiers
pub const L2CAP_CID_ATT: u16 = 0x0004;
pub const L2CAP_CID_LE_SIGNALING: u16 = 0x0005;

// Signaling command codes
pub const L2CAP_COMMAND_REJECT: u8 = 0x01;
pub const L2CAP_CONNECTION_PARAMETER_UPDATE_REQUEST: u8 = 0x12;
pub const L2CAP_CONNECTION_PARAMETER_UPDATE_RESPONSE: u8 = 0x13;

/// Code, identifier and length
pub const L2CAP_SIGNALING_HEADER_LEN: usize = 4;

// Connection Parameter Update Response results
pub const L2CAP_CONN_PARAM_ACCEPTED: u16 = 0x0000;
pub const L2CAP_CONN_PARAM_REJECTED: u16 = 0x0001;

// Command Reject reasons
pub const L2CAP_REJECT_NOT_UNDERSTOOD: u16 = 0x0000;

// LE connection parameter limits
pub const L2CAP_LE_CONN_INTERVAL_MIN: u16 = 0x0006;
pub const L2CAP_LE_CONN_INTERVAL_MAX: u16 = 0x0C80;
pub const L2CAP_LE_CONN_LATENCY_MAX: u16 = 0x01F3;
pub const L2CAP_LE_SUPERVISION_TIMEOUT_MIN: u16 = 0x000A;
pub const L2CAP_LE_SUPERVISION_TIMEOUT_MAX: u16 = 0x0C80;
