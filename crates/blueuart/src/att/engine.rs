//! ATT engine
//!
//! One engine serves every connection in both roles. Requests from a peer are
//! answered from the local attribute table (see `server.rs`); responses to our
//! own requests fill the per-connection result buffers (see `client.rs`).
//! Nothing here touches the transport: `handle_data` returns the PDU to send.

use super::constants::*;
use super::database::AttributeDatabase;
use super::error::{AttError, AttResult};
use super::notifications::{Notification, NotificationQueue, NotificationReceiver};
use super::pdu::{AttPacket, HandleValueNotification};
use super::types::{CharacteristicRecord, DescriptorRecord, ServiceRecord};
use crate::hci::constants::HCI_MAX_ATT_MTU;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::time::Instant;

/// The one request allowed in flight on a connection
#[derive(Debug, Clone, Default)]
pub struct PendingRequest {
    pub opcode: Option<u8>,
    pub sent_at: Option<Instant>,
    pub responded: bool,
    pub errored: bool,
    /// Error Response (or malformed response) for the current request
    pub last_error: Option<AttError>,
}

/// ATT state of one connection
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub handle: u16,
    pub mtu: u16,
    pub pending: PendingRequest,
    pub services: Vec<ServiceRecord>,
    pub characteristics: Vec<CharacteristicRecord>,
    pub descriptors: Vec<DescriptorRecord>,
    pub value: Vec<u8>,
}

impl ConnectionData {
    fn new(handle: u16) -> Self {
        Self {
            handle,
            mtu: ATT_DEFAULT_MTU,
            pending: PendingRequest::default(),
            services: Vec::new(),
            characteristics: Vec::new(),
            descriptors: Vec::new(),
            value: Vec::new(),
        }
    }
}

pub struct AttEngine {
    pub(super) max_mtu: u16,
    pub(super) connections: BTreeMap<u16, ConnectionData>,
    pub(super) database: AttributeDatabase,
    pub(super) notifications: NotificationQueue,
    receiver: Option<NotificationReceiver>,
}

impl AttEngine {
    pub fn new(max_mtu: u16) -> Self {
        let (notifications, receiver) = NotificationQueue::bounded(ATT_NOTIFICATION_QUEUE_CAPACITY);
        Self {
            max_mtu: max_mtu.clamp(ATT_DEFAULT_MTU, HCI_MAX_ATT_MTU),
            connections: BTreeMap::new(),
            database: AttributeDatabase::new(),
            notifications,
            receiver: Some(receiver),
        }
    }

    pub fn max_mtu(&self) -> u16 {
        self.max_mtu
    }

    /// Capped at what the reassembly buffer can carry
    pub fn set_max_mtu(&mut self, max_mtu: u16) {
        self.max_mtu = max_mtu.clamp(ATT_DEFAULT_MTU, HCI_MAX_ATT_MTU);
    }

    /// Consumer end of the notification queue; only handed out once
    pub fn take_notification_receiver(&mut self) -> Option<NotificationReceiver> {
        self.receiver.take()
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.notifications.dropped()
    }

    pub fn add_connection(&mut self, handle: u16) {
        debug!("att: add connection 0x{:04x}", handle);
        self.connections.insert(handle, ConnectionData::new(handle));
    }

    pub fn remove_connection(&mut self, handle: u16) {
        if self.connections.remove(&handle).is_some() {
            debug!("att: remove connection 0x{:04x}", handle);
        }
    }

    pub fn connection(&self, handle: u16) -> Option<&ConnectionData> {
        self.connections.get(&handle)
    }

    pub fn connection_handles(&self) -> Vec<u16> {
        self.connections.keys().copied().collect()
    }

    pub fn mtu(&self, handle: u16) -> Option<u16> {
        self.connections.get(&handle).map(|c| c.mtu)
    }

    /// Last Error Response seen on the connection
    pub fn last_error(&self, handle: u16) -> Option<AttError> {
        self.connections.get(&handle)?.pending.last_error.clone()
    }

    pub fn database(&self) -> &AttributeDatabase {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut AttributeDatabase {
        &mut self.database
    }

    /// Reset the connection's request state and result buffers before sending
    pub fn begin_request(&mut self, handle: u16, opcode: u8) -> AttResult<()> {
        let conn = self
            .connections
            .get_mut(&handle)
            .ok_or(AttError::UnknownConnection(handle))?;
        conn.pending = PendingRequest {
            opcode: Some(opcode),
            sent_at: Some(Instant::now()),
            ..PendingRequest::default()
        };
        conn.services.clear();
        conn.characteristics.clear();
        conn.descriptors.clear();
        conn.value.clear();
        Ok(())
    }

    /// Mark the connection idle again
    pub fn finish_request(&mut self, handle: u16) {
        if let Some(conn) = self.connections.get_mut(&handle) {
            conn.pending.opcode = None;
        }
    }

    /// Handle one PDU received on the ATT channel.
    ///
    /// Returns the PDU to send back, if any.
    pub fn handle_data(&mut self, handle: u16, pdu: &[u8]) -> AttResult<Option<Vec<u8>>> {
        let opcode = *pdu.first().ok_or(AttError::InvalidPdu("empty PDU"))?;
        if !self.connections.contains_key(&handle) {
            return Err(AttError::UnknownConnection(handle));
        }
        trace!("att: recv 0x{:04x} {}", handle, hex::encode(pdu));

        match opcode {
            ATT_ERROR_RSP
            | ATT_EXCHANGE_MTU_RSP
            | ATT_FIND_INFO_RSP
            | ATT_READ_BY_TYPE_RSP
            | ATT_READ_RSP
            | ATT_READ_BY_GROUP_TYPE_RSP
            | ATT_WRITE_RSP => {
                self.handle_response(handle, opcode, pdu)?;
                Ok(None)
            }

            ATT_HANDLE_VALUE_NTF => {
                self.handle_notification(handle, pdu)?;
                Ok(None)
            }

            ATT_HANDLE_VALUE_IND => {
                self.handle_notification(handle, pdu)?;
                Ok(Some(vec![ATT_HANDLE_VALUE_CONF]))
            }

            ATT_HANDLE_VALUE_CONF => {
                debug!("att: confirmation on 0x{:04x}", handle);
                Ok(None)
            }

            ATT_WRITE_CMD => {
                self.handle_write_command(handle, pdu);
                Ok(None)
            }

            // Commands are never answered, known or not
            op if op & 0x40 != 0 => {
                debug!("att: ignoring command 0x{:02x}", op);
                Ok(None)
            }

            _ => Ok(Some(self.handle_request(handle, opcode, pdu))),
        }
    }

    /// Notification PDUs for every connection, if the characteristic at
    /// `value_handle` has notifications enabled
    pub fn notification_pdus(&self, value_handle: u16) -> Vec<(u16, Vec<u8>)> {
        let characteristic = match self.database.characteristic(value_handle) {
            Some(c) if c.cccd & CCCD_NOTIFY != 0 => c,
            _ => return Vec::new(),
        };

        self.connections
            .values()
            .map(|conn| {
                let limit = (conn.mtu as usize).saturating_sub(ATT_HANDLE_VALUE_HEADER);
                let value = &characteristic.value[..characteristic.value.len().min(limit)];
                let pdu = HandleValueNotification {
                    handle: value_handle,
                    value: value.to_vec(),
                }
                .serialize();
                (conn.handle, pdu)
            })
            .collect()
    }

    pub(super) fn queue_notification(&mut self, notification: Notification) -> bool {
        self.notifications.push(notification)
    }
}
