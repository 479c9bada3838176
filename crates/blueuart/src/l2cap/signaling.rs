//! L2CAP LE signaling channel
//!
//! Only the connection parameter update procedure is handled. Requests from
//! the peer are answered through a [`ConnectionParameterPolicy`]; accepted
//! parameters are handed back to the caller to apply with an HCI
//! LE Connection Update.

use super::constants::*;
use super::types::*;
use crate::hci::constants::HCI_ROLE_PERIPHERAL;
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Handle for identifying signaling transactions
pub type SignalId = u8;

/// L2CAP Signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    /// Command Reject
    CommandReject { identifier: SignalId, reason: u16 },

    /// Connection Parameter Update Request
    ConnectionParameterUpdateRequest {
        identifier: SignalId,
        params: ConnectionParameterUpdate,
    },

    /// Connection Parameter Update Response
    ConnectionParameterUpdateResponse { identifier: SignalId, result: u16 },
}

impl SignalingMessage {
    pub fn code(&self) -> u8 {
        match self {
            Self::CommandReject { .. } => L2CAP_COMMAND_REJECT,
            Self::ConnectionParameterUpdateRequest { .. } => L2CAP_CONNECTION_PARAMETER_UPDATE_REQUEST,
            Self::ConnectionParameterUpdateResponse { .. } => L2CAP_CONNECTION_PARAMETER_UPDATE_RESPONSE,
        }
    }

    pub fn identifier(&self) -> SignalId {
        match self {
            Self::CommandReject { identifier, .. }
            | Self::ConnectionParameterUpdateRequest { identifier, .. }
            | Self::ConnectionParameterUpdateResponse { identifier, .. } => *identifier,
        }
    }

    /// Parse a signaling command from a C-frame payload
    pub fn parse(data: &[u8]) -> Result<Self, L2capError> {
        if data.len() < L2CAP_SIGNALING_HEADER_LEN {
            return Err(L2capError::InvalidParameter("Signaling data too short".into()));
        }

        let code = data[0];
        let identifier = data[1];
        let length = u16::from_le_bytes([data[2], data[3]]) as usize;
        let params = &data[L2CAP_SIGNALING_HEADER_LEN..];
        if params.len() < length {
            return Err(L2capError::InvalidParameter("Command parameters too short".into()));
        }

        let short = |_| L2capError::InvalidParameter("Command parameters too short".into());
        let mut cursor = Cursor::new(params);

        match code {
            L2CAP_COMMAND_REJECT => Ok(Self::CommandReject {
                identifier,
                reason: cursor.read_u16::<LittleEndian>().map_err(short)?,
            }),

            L2CAP_CONNECTION_PARAMETER_UPDATE_REQUEST => {
                let params = ConnectionParameterUpdate {
                    conn_interval_min: cursor.read_u16::<LittleEndian>().map_err(short)?,
                    conn_interval_max: cursor.read_u16::<LittleEndian>().map_err(short)?,
                    conn_latency: cursor.read_u16::<LittleEndian>().map_err(short)?,
                    supervision_timeout: cursor.read_u16::<LittleEndian>().map_err(short)?,
                };
                Ok(Self::ConnectionParameterUpdateRequest { identifier, params })
            }

            L2CAP_CONNECTION_PARAMETER_UPDATE_RESPONSE => Ok(Self::ConnectionParameterUpdateResponse {
                identifier,
                result: cursor.read_u16::<LittleEndian>().map_err(short)?,
            }),

            code => Err(L2capError::UnsupportedCommand { code, identifier }),
        }
    }

    /// Serialize the command with its header
    pub fn serialize(&self) -> Vec<u8> {
        let params: Vec<u8> = match self {
            Self::CommandReject { reason, .. } => reason.to_le_bytes().to_vec(),

            Self::ConnectionParameterUpdateRequest { params: conn_params, .. } => {
                let mut params = Vec::with_capacity(8);
                params.extend_from_slice(&conn_params.conn_interval_min.to_le_bytes());
                params.extend_from_slice(&conn_params.conn_interval_max.to_le_bytes());
                params.extend_from_slice(&conn_params.conn_latency.to_le_bytes());
                params.extend_from_slice(&conn_params.supervision_timeout.to_le_bytes());
                params
            }

            Self::ConnectionParameterUpdateResponse { result, .. } => result.to_le_bytes().to_vec(),
        };

        let mut data = Vec::with_capacity(L2CAP_SIGNALING_HEADER_LEN + params.len());
        data.push(self.code());
        data.push(self.identifier());
        data.extend_from_slice(&(params.len() as u16).to_le_bytes());
        data.extend_from_slice(&params);
        data
    }
}

/// Decides whether a peer's parameter update request is accepted
pub trait ConnectionParameterPolicy: Send {
    fn accept(&mut self, handle: u16, params: &ConnectionParameterUpdate) -> bool;
}

/// Accept every request
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ConnectionParameterPolicy for AcceptAll {
    fn accept(&mut self, _handle: u16, _params: &ConnectionParameterUpdate) -> bool {
        true
    }
}

/// Accept only requests inside the LE limits
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectInvalid;

impl ConnectionParameterPolicy for RejectInvalid {
    fn accept(&mut self, _handle: u16, params: &ConnectionParameterUpdate) -> bool {
        params.validate()
    }
}

/// What the caller has to do after a signaling frame was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingAction {
    None,
    /// Send `reply` on the signaling channel
    Reply(Vec<u8>),
    /// Send `reply`, then apply `params` to the link
    Accept {
        reply: Vec<u8>,
        params: ConnectionParameterUpdate,
    },
}

#[derive(Debug, Default)]
struct SignalingState {
    next_identifier: SignalId,
}

impl SignalingState {
    fn take_identifier(&mut self) -> SignalId {
        // Zero is not a valid identifier
        self.next_identifier = self.next_identifier.wrapping_add(1).max(1);
        self.next_identifier
    }
}

/// Per-connection LE signaling
pub struct L2capSignaling {
    enabled: bool,
    connections: BTreeMap<u16, SignalingState>,
    policy: Box<dyn ConnectionParameterPolicy>,
}

impl L2capSignaling {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            connections: BTreeMap::new(),
            policy: Box::new(AcceptAll),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_policy(&mut self, policy: Box<dyn ConnectionParameterPolicy>) {
        self.policy = policy;
    }

    /// Track a new link. A peripheral link asks the central for the
    /// parameters it was created with; the returned frame must be sent.
    pub fn add_connection(&mut self, handle: u16, role: u8, interval: u16, timeout: u16) -> Option<Vec<u8>> {
        let state = self.connections.entry(handle).or_default();
        if !self.enabled || role != HCI_ROLE_PERIPHERAL {
            return None;
        }

        let request = SignalingMessage::ConnectionParameterUpdateRequest {
            identifier: state.take_identifier(),
            params: ConnectionParameterUpdate {
                conn_interval_min: interval,
                conn_interval_max: interval,
                conn_latency: 0,
                supervision_timeout: timeout,
            },
        };
        debug!("l2cap: requesting parameters on 0x{:04x}: {:?}", handle, request);
        Some(request.serialize())
    }

    pub fn remove_connection(&mut self, handle: u16) {
        self.connections.remove(&handle);
    }

    /// Handle one frame received on the signaling channel
    pub fn handle_data(&mut self, handle: u16, data: &[u8]) -> Result<SignalingAction, L2capError> {
        debug!("l2cap: signaling on 0x{:04x}: {}", handle, hex::encode(data));
        if !self.connections.contains_key(&handle) {
            return Err(L2capError::UnknownConnection(handle));
        }

        let message = match SignalingMessage::parse(data) {
            Ok(message) => message,
            Err(L2capError::UnsupportedCommand { code, identifier }) => {
                debug!("l2cap: rejecting command 0x{:02x}", code);
                let reject = SignalingMessage::CommandReject {
                    identifier,
                    reason: L2CAP_REJECT_NOT_UNDERSTOOD,
                };
                return Ok(SignalingAction::Reply(reject.serialize()));
            }
            Err(err) => return Err(err),
        };

        match message {
            SignalingMessage::ConnectionParameterUpdateRequest { identifier, params } => {
                let accepted = self.policy.accept(handle, &params);
                let reply = SignalingMessage::ConnectionParameterUpdateResponse {
                    identifier,
                    result: if accepted {
                        L2CAP_CONN_PARAM_ACCEPTED
                    } else {
                        L2CAP_CONN_PARAM_REJECTED
                    },
                }
                .serialize();

                if accepted {
                    Ok(SignalingAction::Accept { reply, params })
                } else {
                    Ok(SignalingAction::Reply(reply))
                }
            }

            SignalingMessage::ConnectionParameterUpdateResponse { result, .. } => {
                debug!("l2cap: parameter update result {} on 0x{:04x}", result, handle);
                Ok(SignalingAction::None)
            }

            SignalingMessage::CommandReject { reason, .. } => {
                debug!("l2cap: command rejected, reason {}", reason);
                Ok(SignalingAction::None)
            }
        }
    }
}
