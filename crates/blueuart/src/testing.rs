//! In-memory controller for tests
//!
//! [`MockTransport`] records every frame the host writes and answers like a
//! controller would: Command Complete or Command Status for each command,
//! connection events for Create Connection and Disconnect, and ATT responses
//! from an embedded remote [`AttEngine`] for anything sent on channel 0x0004.

use crate::att::constants::ATT_MAX_MTU;
use crate::att::AttEngine;
use crate::config::StackConfig;
use crate::error::HciError;
use crate::hci::constants::*;
use crate::hci::{AclData, HciEvent, Transport};
use crate::l2cap::constants::L2CAP_CID_ATT;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) const PEER: [u8; 6] = [0x66, 0x55, 0x44, 0x33, 0x22, 0x11];

/// Short timeouts so failure paths finish quickly
pub(crate) fn test_config() -> StackConfig {
    StackConfig {
        command_timeout: Duration::from_millis(200),
        att_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(1),
        reset_settle: Duration::ZERO,
        ..StackConfig::default()
    }
}

pub(crate) fn event(code: u8, parameters: Vec<u8>) -> Vec<u8> {
    HciEvent {
        event_code: code,
        parameters,
    }
    .to_packet()
}

pub(crate) fn command_complete(opcode: u16, status: u8, data: &[u8]) -> Vec<u8> {
    let mut params = vec![1];
    params.extend_from_slice(&opcode.to_le_bytes());
    params.push(status);
    params.extend_from_slice(data);
    event(EVT_CMD_COMPLETE, params)
}

pub(crate) fn command_status(opcode: u16, status: u8) -> Vec<u8> {
    let mut params = vec![status, 1];
    params.extend_from_slice(&opcode.to_le_bytes());
    event(EVT_CMD_STATUS, params)
}

pub(crate) fn connection_complete(handle: u16, role: u8, address_type: u8, address: [u8; 6]) -> Vec<u8> {
    let mut params = vec![EVT_LE_CONN_COMPLETE, 0x00];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(role);
    params.push(address_type);
    params.extend_from_slice(&address);
    params.extend_from_slice(&0x0018u16.to_le_bytes());
    params.extend_from_slice(&0x0000u16.to_le_bytes());
    params.extend_from_slice(&0x00C8u16.to_le_bytes());
    params.push(0x00);
    event(EVT_LE_META_EVENT, params)
}

pub(crate) fn disconnection_complete(handle: u16, reason: u8) -> Vec<u8> {
    let mut params = vec![0x00];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(reason);
    event(EVT_DISCONN_COMPLETE, params)
}

pub(crate) fn advertising_report(address_type: u8, address: [u8; 6], data: &[u8], rssi: i8) -> Vec<u8> {
    let mut params = vec![EVT_LE_ADVERTISING_REPORT, 0x01, 0x00, address_type];
    params.extend_from_slice(&address);
    params.push(data.len() as u8);
    params.extend_from_slice(data);
    params.push(rssi as u8);
    event(EVT_LE_META_EVENT, params)
}

fn is_status_command(opcode: u16) -> bool {
    [
        crate::hci::constants::opcode(OGF_LINK_CTL, OCF_DISCONNECT),
        crate::hci::constants::opcode(OGF_LE, OCF_LE_CREATE_CONNECTION),
        crate::hci::constants::opcode(OGF_LE, OCF_LE_CONNECTION_UPDATE),
    ]
    .contains(&opcode)
}

pub(crate) struct MockController {
    rx: VecDeque<u8>,
    /// Every frame the host wrote, in order
    pub written: Vec<Vec<u8>>,
    /// The peer's GATT server
    pub remote: AttEngine,
    returns: HashMap<u16, Vec<u8>>,
    silent: HashSet<u16>,
    /// Extra bytes queued right after a command with matching parameters
    follow_ups: HashMap<(u16, Vec<u8>), Vec<u8>>,
    pub accept_connections: bool,
    pub next_handle: u16,
    /// The peer never sees or answers ATT traffic
    pub drop_att: bool,
    /// Connections with a response the host has not finished reading
    answering: HashSet<u16>,
    /// Requests written while an earlier one on the same link was unanswered
    pub att_overlaps: usize,
}

impl MockController {
    fn queue(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    fn handle_command(&mut self, frame: &[u8]) {
        let opcode = u16::from_le_bytes([frame[1], frame[2]]);
        let params = frame.get(4..).unwrap_or_default().to_vec();
        if self.silent.contains(&opcode) {
            return;
        }

        if !is_status_command(opcode) {
            let data = self.returns.get(&opcode).cloned().unwrap_or_default();
            self.queue(&command_complete(opcode, 0x00, &data));
            if let Some(bytes) = self.follow_ups.remove(&(opcode, params)) {
                self.queue(&bytes);
            }
            return;
        }
        self.queue(&command_status(opcode, 0x00));

        if opcode == crate::hci::constants::opcode(OGF_LE, OCF_LE_CREATE_CONNECTION) && self.accept_connections {
            let handle = self.next_handle;
            self.next_handle += 1;
            let mut address = [0u8; 6];
            address.copy_from_slice(&params[6..12]);
            self.remote.add_connection(handle);
            self.queue(&connection_complete(handle, HCI_ROLE_CENTRAL, params[5], address));
        } else if opcode == crate::hci::constants::opcode(OGF_LINK_CTL, OCF_DISCONNECT) {
            let handle = u16::from_le_bytes([params[0], params[1]]);
            self.remote.remove_connection(handle);
            self.queue(&disconnection_complete(handle, 0x16));
        }
    }

    fn handle_acl(&mut self, frame: &[u8]) {
        let Ok(acl) = AclData::parse(&frame[1..]) else {
            return;
        };
        if acl.channel_id != L2CAP_CID_ATT || self.drop_att {
            return;
        }
        if let Ok(Some(response)) = self.remote.handle_data(acl.handle, &acl.payload) {
            if !self.answering.insert(acl.handle) {
                self.att_overlaps += 1;
            }
            self.queue(&acl_frame(acl.handle, L2CAP_CID_ATT, &response));
        }
    }
}

pub(crate) fn acl_frame(handle: u16, channel_id: u16, payload: &[u8]) -> Vec<u8> {
    AclData {
        handle,
        flags: 0x02,
        channel_id,
        payload: payload.to_vec(),
    }
    .to_packet()
}

/// Cloneable handle on one simulated controller
#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockController>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockController {
                rx: VecDeque::new(),
                written: Vec::new(),
                remote: AttEngine::new(ATT_MAX_MTU),
                returns: HashMap::new(),
                silent: HashSet::new(),
                follow_ups: HashMap::new(),
                accept_connections: true,
                next_handle: 0x0040,
                drop_att: false,
                answering: HashSet::new(),
                att_overlaps: 0,
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockController> {
        self.state.lock().unwrap()
    }

    /// Bytes for the host to read
    pub fn queue(&self, bytes: &[u8]) {
        self.state().queue(bytes);
    }

    /// Return parameters (after the status byte) for `opcode`
    pub fn set_return(&self, opcode: u16, data: &[u8]) {
        self.state().returns.insert(opcode, data.to_vec());
    }

    /// Never answer `opcode`
    pub fn silence(&self, opcode: u16) {
        self.state().silent.insert(opcode);
    }

    /// Queue `bytes` once the command `opcode` with `params` has been answered
    pub fn queue_after(&self, opcode: u16, params: &[u8], bytes: &[u8]) {
        self.state().follow_ups.insert((opcode, params.to_vec()), bytes.to_vec());
    }

    /// A peer connects to us, or completes our connection attempt
    pub fn connect_peer(&self, handle: u16, role: u8, address: [u8; 6]) {
        let mut state = self.state();
        state.remote.add_connection(handle);
        state.queue(&connection_complete(handle, role, 0x00, address));
    }

    pub fn disconnect_peer(&self, handle: u16, reason: u8) {
        let mut state = self.state();
        state.remote.remove_connection(handle);
        state.queue(&disconnection_complete(handle, reason));
    }

    /// The peer sends `pdu` on the ATT channel
    pub fn send_att(&self, handle: u16, pdu: &[u8]) {
        self.queue(&acl_frame(handle, L2CAP_CID_ATT, pdu));
    }

    /// Opcodes of the commands written so far
    pub fn commands(&self) -> Vec<u16> {
        self.state()
            .written
            .iter()
            .filter(|f| f.first() == Some(&HCI_COMMAND_PKT) && f.len() >= 4)
            .map(|f| u16::from_le_bytes([f[1], f[2]]))
            .collect()
    }

    /// Parameters of the last command written with `opcode`
    pub fn last_command(&self, opcode: u16) -> Option<Vec<u8>> {
        self.state()
            .written
            .iter()
            .rev()
            .filter(|f| f.first() == Some(&HCI_COMMAND_PKT) && f.len() >= 4)
            .find(|f| u16::from_le_bytes([f[1], f[2]]) == opcode)
            .map(|f| f[4..].to_vec())
    }

    /// Payloads the host sent on `channel_id`
    pub fn sent_on(&self, channel_id: u16) -> Vec<(u16, Vec<u8>)> {
        self.state()
            .written
            .iter()
            .filter(|f| f.first() == Some(&HCI_ACL_PKT))
            .filter_map(|f| AclData::parse(&f[1..]).ok())
            .filter(|acl| acl.channel_id == channel_id)
            .map(|acl| (acl.handle, acl.payload))
            .collect()
    }

    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    /// Bytes queued for the host that it has not read yet
    pub fn unread(&self) -> usize {
        self.state().rx.len()
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> Result<usize, HciError> {
        Ok(self.state().rx.len())
    }

    fn read_byte(&mut self) -> Result<u8, HciError> {
        let mut state = self.state();
        let byte = state.rx.pop_front().ok_or(HciError::InvalidPacket)?;
        // Responses are queued last, so an empty queue means they were read
        if state.rx.is_empty() {
            state.answering.clear();
        }
        Ok(byte)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HciError> {
        let mut state = self.state();
        state.written.push(data.to_vec());
        match data.first() {
            Some(&HCI_COMMAND_PKT) if data.len() >= 4 => state.handle_command(data),
            Some(&HCI_ACL_PKT) => state.handle_acl(data),
            _ => {}
        }
        Ok(data.len())
    }
}
