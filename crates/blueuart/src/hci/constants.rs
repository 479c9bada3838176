//! HCI protocol constants
//!
//! Packet indicators, opcode groups and event codes used by the UART (H4)
//! transport.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_ACL_PKT: u8 = 0x02;
pub const HCI_EVENT_PKT: u8 = 0x04;

// Reassembly buffer size: holds a 255-byte event or an ACL packet carrying
// an ATT PDU of up to HCI_MAX_ATT_MTU bytes
pub const HCI_BUFFER_SIZE: usize = 260;

// Position of the length field within a framed packet (indicator included)
pub const HCI_ACL_LEN_POS: usize = 4;
pub const HCI_EVT_LEN_POS: usize = 2;

pub const HCI_ACL_HEADER_LEN: usize = 4;
pub const L2CAP_HEADER_LEN: usize = 4;

// ACL packet boundary flag: continuing fragment of a higher layer frame
pub const ACL_CONTINUING_FRAGMENT: u8 = 0x01;

/// Largest ATT MTU whose PDUs still fit the reassembly buffer
pub const HCI_MAX_ATT_MTU: u16 = (HCI_BUFFER_SIZE - 1 - HCI_ACL_HEADER_LEN - L2CAP_HEADER_LEN) as u16;

// OGF (Opcode Group Field) values
pub const OGF_LINK_CTL: u8 = 0x01;
pub const OGF_HOST_CTL: u8 = 0x03;
pub const OGF_INFO_PARAM: u8 = 0x04;
pub const OGF_LE: u8 = 0x08;

// Link Control Commands (OGF: 0x01)
pub const OCF_DISCONNECT: u16 = 0x0006;

// Host Controller Commands (OGF: 0x03)
pub const OCF_SET_EVENT_MASK: u16 = 0x0001;
pub const OCF_RESET: u16 = 0x0003;

// Informational Parameters (OGF: 0x04)
pub const OCF_READ_BD_ADDR: u16 = 0x0009;

// LE Controller Commands (OGF: 0x08)
pub const OCF_LE_SET_EVENT_MASK: u16 = 0x0001;
pub const OCF_LE_READ_BUFFER_SIZE: u16 = 0x0002;
pub const OCF_LE_SET_RANDOM_ADDRESS: u16 = 0x0005;
pub const OCF_LE_SET_ADVERTISING_PARAMETERS: u16 = 0x0006;
pub const OCF_LE_SET_ADVERTISING_DATA: u16 = 0x0008;
pub const OCF_LE_SET_SCAN_RESPONSE_DATA: u16 = 0x0009;
pub const OCF_LE_SET_ADVERTISE_ENABLE: u16 = 0x000A;
pub const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
pub const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;
pub const OCF_LE_CREATE_CONNECTION: u16 = 0x000D;
pub const OCF_LE_CREATE_CONNECTION_CANCEL: u16 = 0x000E;
pub const OCF_LE_CONNECTION_UPDATE: u16 = 0x0013;
pub const OCF_LE_REMOTE_CONN_PARAM_REQ_REPLY: u16 = 0x0020;

// HCI Events
pub const EVT_DISCONN_COMPLETE: u8 = 0x05;
pub const EVT_ENCRYPTION_CHANGE: u8 = 0x08;
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_CMD_STATUS: u8 = 0x0F;
pub const EVT_HARDWARE_ERROR: u8 = 0x10;
pub const EVT_NUM_COMP_PKTS: u8 = 0x13;
pub const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta Events
pub const EVT_LE_CONN_COMPLETE: u8 = 0x01;
pub const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;
pub const EVT_LE_CONN_UPDATE_COMPLETE: u8 = 0x03;
pub const EVT_LE_REMOTE_CONN_PARAM_REQ: u8 = 0x06;
pub const EVT_LE_ENHANCED_CONN_COMPLETE: u8 = 0x0A;

// Disconnect reason: remote user terminated connection
pub const HCI_OE_USER_ENDED_CONNECTION: u8 = 0x13;

// Connection roles reported in LE Connection Complete
pub const HCI_ROLE_CENTRAL: u8 = 0x00;
pub const HCI_ROLE_PERIPHERAL: u8 = 0x01;

// Largest advertising or scan response payload
pub const HCI_MAX_ADV_DATA_LEN: usize = 31;

// Minimum LE ACL data packet length
pub const HCI_LE_MIN_PACKET_LEN: u16 = 27;

/// Packs an OGF/OCF pair into a command opcode
pub const fn opcode(ogf: u8, ocf: u16) -> u16 {
    ((ogf as u16) << 10) | (ocf & 0x03ff)
}
