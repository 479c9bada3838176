//! HCI packet structures and parsing
//!
//! Commands are built from `HciCommand` and framed with `to_packet`. Incoming
//! events are split into `HciEvent` (code plus raw parameters) and then decoded
//! into `Event`. Field offsets below are relative to the event parameters, i.e.
//! after the event code and length bytes.

use crate::error::HciError;
use crate::hci::constants::*;

/// Commands the host issues to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // Link Control Commands (OGF: 0x01)
    Disconnect { handle: u16, reason: u8 },

    // Host Controller Commands (OGF: 0x03)
    Reset,
    SetEventMask { event_mask: u64 },

    // Informational Parameters (OGF: 0x04)
    ReadBdAddr,

    // LE Commands (OGF: 0x08)
    LeSetEventMask { event_mask: u64 },
    LeReadBufferSize,
    LeSetRandomAddress { address: [u8; 6] },
    LeSetAdvertisingParameters {
        min_interval: u16,
        max_interval: u16,
        advertising_type: u8,
        own_address_type: u8,
        direct_address_type: u8,
        direct_address: [u8; 6],
        channel_map: u8,
        filter_policy: u8,
    },
    LeSetAdvertisingData { data: Vec<u8> },
    LeSetScanResponseData { data: Vec<u8> },
    LeSetAdvertiseEnable { enable: bool },
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable { enable: bool, filter_duplicates: bool },
    LeCreateConnection {
        scan_interval: u16,
        scan_window: u16,
        initiator_filter: u8,
        peer_address_type: u8,
        peer_address: [u8; 6],
        own_address_type: u8,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        supervision_timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
    },
    LeCreateConnectionCancel,
    LeConnectionUpdate {
        handle: u16,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        supervision_timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
    },
    LeRemoteConnParamReqReply {
        handle: u16,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        timeout: u16,
        min_ce_length: u16,
        max_ce_length: u16,
    },
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),

            Self::Reset => (OGF_HOST_CTL, OCF_RESET),
            Self::SetEventMask { .. } => (OGF_HOST_CTL, OCF_SET_EVENT_MASK),

            Self::ReadBdAddr => (OGF_INFO_PARAM, OCF_READ_BD_ADDR),

            Self::LeSetEventMask { .. } => (OGF_LE, OCF_LE_SET_EVENT_MASK),
            Self::LeReadBufferSize => (OGF_LE, OCF_LE_READ_BUFFER_SIZE),
            Self::LeSetRandomAddress { .. } => (OGF_LE, OCF_LE_SET_RANDOM_ADDRESS),
            Self::LeSetAdvertisingParameters { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_PARAMETERS),
            Self::LeSetAdvertisingData { .. } => (OGF_LE, OCF_LE_SET_ADVERTISING_DATA),
            Self::LeSetScanResponseData { .. } => (OGF_LE, OCF_LE_SET_SCAN_RESPONSE_DATA),
            Self::LeSetAdvertiseEnable { .. } => (OGF_LE, OCF_LE_SET_ADVERTISE_ENABLE),
            Self::LeSetScanParameters { .. } => (OGF_LE, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE, OCF_LE_SET_SCAN_ENABLE),
            Self::LeCreateConnection { .. } => (OGF_LE, OCF_LE_CREATE_CONNECTION),
            Self::LeCreateConnectionCancel => (OGF_LE, OCF_LE_CREATE_CONNECTION_CANCEL),
            Self::LeConnectionUpdate { .. } => (OGF_LE, OCF_LE_CONNECTION_UPDATE),
            Self::LeRemoteConnParamReqReply { .. } => (OGF_LE, OCF_LE_REMOTE_CONN_PARAM_REQ_REPLY),
        }
    }

    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        opcode(ogf, ocf)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        match self {
            Self::Reset | Self::ReadBdAddr | Self::LeReadBufferSize | Self::LeCreateConnectionCancel => {
                vec![]
            }

            Self::Disconnect { handle, reason } => {
                let mut params = Vec::with_capacity(3);
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*reason);
                params
            }

            Self::SetEventMask { event_mask } | Self::LeSetEventMask { event_mask } => {
                event_mask.to_le_bytes().to_vec()
            }

            Self::LeSetRandomAddress { address } => address.to_vec(),

            Self::LeSetAdvertisingParameters {
                min_interval,
                max_interval,
                advertising_type,
                own_address_type,
                direct_address_type,
                direct_address,
                channel_map,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(15);
                params.extend_from_slice(&min_interval.to_le_bytes());
                params.extend_from_slice(&max_interval.to_le_bytes());
                params.push(*advertising_type);
                params.push(*own_address_type);
                params.push(*direct_address_type);
                params.extend_from_slice(direct_address);
                params.push(*channel_map);
                params.push(*filter_policy);
                params
            }

            // Fixed 32 byte block: significant length, then zero padded data
            Self::LeSetAdvertisingData { data } | Self::LeSetScanResponseData { data } => {
                let len = data.len().min(HCI_MAX_ADV_DATA_LEN);
                let mut params = vec![0u8; HCI_MAX_ADV_DATA_LEN + 1];
                params[0] = len as u8;
                params[1..1 + len].copy_from_slice(&data[..len]);
                params
            }

            Self::LeSetAdvertiseEnable { enable } => vec![*enable as u8],

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(*scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*own_address_type);
                params.push(*filter_policy);
                params
            }

            Self::LeSetScanEnable {
                enable,
                filter_duplicates,
            } => vec![*enable as u8, *filter_duplicates as u8],

            Self::LeCreateConnection {
                scan_interval,
                scan_window,
                initiator_filter,
                peer_address_type,
                peer_address,
                own_address_type,
                min_interval,
                max_interval,
                latency,
                supervision_timeout,
                min_ce_length,
                max_ce_length,
            } => {
                let mut params = Vec::with_capacity(25);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*initiator_filter);
                params.push(*peer_address_type);
                params.extend_from_slice(peer_address);
                params.push(*own_address_type);
                for v in [
                    min_interval,
                    max_interval,
                    latency,
                    supervision_timeout,
                    min_ce_length,
                    max_ce_length,
                ] {
                    params.extend_from_slice(&v.to_le_bytes());
                }
                params
            }

            Self::LeConnectionUpdate {
                handle,
                min_interval,
                max_interval,
                latency,
                supervision_timeout,
                min_ce_length,
                max_ce_length,
            } => [
                handle,
                min_interval,
                max_interval,
                latency,
                supervision_timeout,
                min_ce_length,
                max_ce_length,
            ]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),

            Self::LeRemoteConnParamReqReply {
                handle,
                min_interval,
                max_interval,
                latency,
                timeout,
                min_ce_length,
                max_ce_length,
            } => [
                handle,
                min_interval,
                max_interval,
                latency,
                timeout,
                min_ce_length,
                max_ce_length,
            ]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        }
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = Vec::with_capacity(4 + params.len());
        packet.push(HCI_COMMAND_PKT);
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }
}

/// HCI Event packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes (without the packet indicator)
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let len = data[1] as usize;
        if data.len() < len + 2 {
            return None;
        }

        Some(HciEvent {
            event_code: data[0],
            parameters: data[2..len + 2].to_vec(),
        })
    }

    /// Frame the event as it would arrive from the controller
    pub fn to_packet(&self) -> Vec<u8> {
        let mut packet = vec![HCI_EVENT_PKT, self.event_code, self.parameters.len() as u8];
        packet.extend_from_slice(&self.parameters);
        packet
    }
}

/// One ACL data packet carrying a complete L2CAP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclData {
    /// 12-bit connection handle
    pub handle: u16,
    /// Packet boundary and broadcast flags
    pub flags: u8,
    pub channel_id: u16,
    pub payload: Vec<u8>,
}

impl AclData {
    /// Parse ACL data (without the packet indicator)
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        if data.len() < HCI_ACL_HEADER_LEN + L2CAP_HEADER_LEN {
            return Err(HciError::InvalidPacket);
        }

        let raw_handle = u16::from_le_bytes([data[0], data[1]]);
        let data_len = u16::from_le_bytes([data[2], data[3]]) as usize;
        let l2cap_len = u16::from_le_bytes([data[4], data[5]]) as usize;
        let channel_id = u16::from_le_bytes([data[6], data[7]]);
        let flags = ((raw_handle & 0xf000) >> 12) as u8;

        // Only unfragmented frames are supported
        if flags & 0x03 == ACL_CONTINUING_FRAGMENT {
            return Err(HciError::InvalidPacket);
        }
        if data_len < L2CAP_HEADER_LEN || data_len - L2CAP_HEADER_LEN != l2cap_len {
            return Err(HciError::InvalidPacket);
        }
        let end = HCI_ACL_HEADER_LEN + L2CAP_HEADER_LEN + l2cap_len;
        if data.len() < end {
            return Err(HciError::InvalidPacket);
        }

        Ok(AclData {
            handle: raw_handle & 0x0fff,
            flags,
            channel_id,
            payload: data[HCI_ACL_HEADER_LEN + L2CAP_HEADER_LEN..end].to_vec(),
        })
    }

    /// Frame an L2CAP payload under an ACL header
    pub fn to_packet(&self) -> Vec<u8> {
        let handle = (self.handle & 0x0fff) | ((self.flags as u16 & 0x0f) << 12);
        let mut packet = Vec::with_capacity(1 + HCI_ACL_HEADER_LEN + L2CAP_HEADER_LEN + self.payload.len());
        packet.push(HCI_ACL_PKT);
        packet.extend_from_slice(&handle.to_le_bytes());
        packet.extend_from_slice(&((self.payload.len() + L2CAP_HEADER_LEN) as u16).to_le_bytes());
        packet.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        packet.extend_from_slice(&self.channel_id.to_le_bytes());
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// LE Connection Complete (plain or enhanced)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeConnectionComplete {
    pub status: u8,
    pub handle: u16,
    pub role: u8,
    pub peer_address_type: u8,
    pub peer_address: [u8; 6],
    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

/// LE Advertising Report, first report only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvertisingReport {
    pub num_reports: u8,
    pub event_type: u8,
    pub address_type: u8,
    pub address: [u8; 6],
    pub data: Vec<u8>,
    pub rssi: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectionComplete {
    pub status: u8,
    pub handle: u16,
    pub reason: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeConnectionUpdateComplete {
    pub status: u8,
    pub handle: u16,
    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnParamRequest {
    pub handle: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub timeout: u16,
}

/// A decoded HCI event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `return_parameters[0]` is the command status
    CommandComplete { opcode: u16, return_parameters: Vec<u8> },
    CommandStatus { status: u8, opcode: u16 },
    DisconnectionComplete(DisconnectionComplete),
    EncryptionChange { status: u8, handle: u16, enabled: bool },
    HardwareError(u8),
    /// (connection handle, completed packets)
    NumberOfCompletedPackets(Vec<(u16, u16)>),
    LeConnectionComplete(LeConnectionComplete),
    LeAdvertisingReport(LeAdvertisingReport),
    LeConnectionUpdateComplete(LeConnectionUpdateComplete),
    LeRemoteConnParamRequest(RemoteConnParamRequest),
    Unknown { event_code: u8, subevent: Option<u8> },
}

fn u8_at(p: &[u8], at: usize) -> Result<u8, HciError> {
    p.get(at).copied().ok_or(HciError::InvalidPacket)
}

fn u16_at(p: &[u8], at: usize) -> Result<u16, HciError> {
    match p.get(at..at + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(HciError::InvalidPacket),
    }
}

fn address_at(p: &[u8], at: usize) -> Result<[u8; 6], HciError> {
    let mut address = [0u8; 6];
    address.copy_from_slice(p.get(at..at + 6).ok_or(HciError::InvalidPacket)?);
    Ok(address)
}

impl Event {
    /// Decode an event; truncated parameters are `InvalidPacket`
    pub fn parse(event: &HciEvent) -> Result<Event, HciError> {
        let p = &event.parameters;

        match event.event_code {
            EVT_CMD_COMPLETE => Ok(Event::CommandComplete {
                opcode: u16_at(p, 1)?,
                return_parameters: p.get(3..).unwrap_or_default().to_vec(),
            }),

            EVT_CMD_STATUS => Ok(Event::CommandStatus {
                status: u8_at(p, 0)?,
                opcode: u16_at(p, 2)?,
            }),

            EVT_DISCONN_COMPLETE => Ok(Event::DisconnectionComplete(DisconnectionComplete {
                status: u8_at(p, 0)?,
                handle: u16_at(p, 1)? & 0x0fff,
                reason: u8_at(p, 3)?,
            })),

            EVT_ENCRYPTION_CHANGE => Ok(Event::EncryptionChange {
                status: u8_at(p, 0)?,
                handle: u16_at(p, 1)? & 0x0fff,
                enabled: u8_at(p, 3)? != 0,
            }),

            EVT_HARDWARE_ERROR => Ok(Event::HardwareError(u8_at(p, 0)?)),

            EVT_NUM_COMP_PKTS => {
                let count = u8_at(p, 0)? as usize;
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    entries.push((u16_at(p, 1 + i * 4)? & 0x0fff, u16_at(p, 3 + i * 4)?));
                }
                Ok(Event::NumberOfCompletedPackets(entries))
            }

            EVT_LE_META_EVENT => Self::parse_le_meta(p),

            code => Ok(Event::Unknown {
                event_code: code,
                subevent: None,
            }),
        }
    }

    fn parse_le_meta(p: &[u8]) -> Result<Event, HciError> {
        let subevent = u8_at(p, 0)?;

        match subevent {
            EVT_LE_CONN_COMPLETE | EVT_LE_ENHANCED_CONN_COMPLETE => {
                // Enhanced adds the local and peer resolvable addresses
                let timing = if subevent == EVT_LE_CONN_COMPLETE { 12 } else { 24 };
                Ok(Event::LeConnectionComplete(LeConnectionComplete {
                    status: u8_at(p, 1)?,
                    handle: u16_at(p, 2)? & 0x0fff,
                    role: u8_at(p, 4)?,
                    peer_address_type: u8_at(p, 5)?,
                    peer_address: address_at(p, 6)?,
                    interval: u16_at(p, timing)?,
                    latency: u16_at(p, timing + 2)?,
                    supervision_timeout: u16_at(p, timing + 4)?,
                }))
            }

            EVT_LE_ADVERTISING_REPORT => {
                let num_reports = u8_at(p, 1)?;
                let data_len = u8_at(p, 10)? as usize;
                if data_len > HCI_MAX_ADV_DATA_LEN || p.len() < 11 + data_len {
                    return Err(HciError::InvalidPacket);
                }
                let rssi = if num_reports == 1 {
                    u8_at(p, 11 + data_len)? as i8
                } else {
                    0
                };
                Ok(Event::LeAdvertisingReport(LeAdvertisingReport {
                    num_reports,
                    event_type: u8_at(p, 2)?,
                    address_type: u8_at(p, 3)?,
                    address: address_at(p, 4)?,
                    data: p[11..11 + data_len].to_vec(),
                    rssi,
                }))
            }

            EVT_LE_CONN_UPDATE_COMPLETE => {
                Ok(Event::LeConnectionUpdateComplete(LeConnectionUpdateComplete {
                    status: u8_at(p, 1)?,
                    handle: u16_at(p, 2)? & 0x0fff,
                    interval: u16_at(p, 4)?,
                    latency: u16_at(p, 6)?,
                    supervision_timeout: u16_at(p, 8)?,
                }))
            }

            EVT_LE_REMOTE_CONN_PARAM_REQ => {
                Ok(Event::LeRemoteConnParamRequest(RemoteConnParamRequest {
                    handle: u16_at(p, 1)? & 0x0fff,
                    min_interval: u16_at(p, 3)?,
                    max_interval: u16_at(p, 5)?,
                    latency: u16_at(p, 7)?,
                    timeout: u16_at(p, 9)?,
                }))
            }

            _ => Ok(Event::Unknown {
                event_code: EVT_LE_META_EVENT,
                subevent: Some(subevent),
            }),
        }
    }
}
