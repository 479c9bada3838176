//! ATT client role
//!
//! Responses and notifications from the peer land in the per-connection
//! buffers of [`AttEngine`]. The request procedures live on [`Stack`] because
//! waiting for a response means driving the whole stack's poll loop.

use super::constants::*;
use super::engine::AttEngine;
use super::error::{AttError, AttResult};
use super::notifications::Notification;
use super::pdu::*;
use super::types::{CharacteristicRecord, DescriptorRecord, ServiceRecord};
use crate::error::Result;
use crate::hci::Transport;
use crate::l2cap::constants::L2CAP_CID_ATT;
use crate::stack::Stack;
use crate::uuid::Uuid;
use log::{debug, trace, warn};
use std::thread;
use std::time::Instant;

impl AttEngine {
    /// Fill the result buffers of the request outstanding on `connection`
    pub(super) fn handle_response(&mut self, connection: u16, opcode: u8, pdu: &[u8]) -> AttResult<()> {
        let max_mtu = self.max_mtu;
        let conn = self
            .connections
            .get_mut(&connection)
            .ok_or(AttError::UnknownConnection(connection))?;

        let request = match conn.pending.opcode {
            Some(request) if !conn.pending.responded => request,
            _ => {
                debug!("att: unsolicited response 0x{:02x} on 0x{:04x}", opcode, connection);
                return Ok(());
            }
        };

        // A late answer to an earlier, timed out request must not complete this one
        let answers = match opcode {
            ATT_ERROR_RSP => ErrorResponse::parse(pdu).map_or(true, |err| err.request_opcode == request),
            _ => opcode == request.wrapping_add(1),
        };
        if !answers {
            warn!(
                "att: response 0x{:02x} does not answer request 0x{:02x} on 0x{:04x}, ignored",
                opcode, request, connection
            );
            return Ok(());
        }

        let parsed: AttResult<()> = match opcode {
            ATT_ERROR_RSP => ErrorResponse::parse(pdu).map(|err| {
                debug!(
                    "att: error response to 0x{:02x} on handle 0x{:04x}: {}",
                    err.request_opcode, err.handle, err.error_code
                );
                conn.pending.errored = true;
                conn.pending.last_error = Some(AttError::Protocol {
                    request_opcode: err.request_opcode,
                    handle: err.handle,
                    code: err.error_code,
                });
            }),
            ATT_EXCHANGE_MTU_RSP => ExchangeMtuResponse::parse(pdu).map(|rsp| {
                conn.mtu = rsp.server_mtu.clamp(ATT_DEFAULT_MTU, max_mtu);
                debug!("att: mtu 0x{:04x} = {}", connection, conn.mtu);
            }),
            ATT_FIND_INFO_RSP => FindInformationResponse::parse(pdu).map(|rsp| {
                conn.descriptors
                    .extend(rsp.entries.into_iter().map(|(handle, uuid)| DescriptorRecord { handle, uuid }));
            }),
            ATT_READ_BY_TYPE_RSP => ReadByTypeResponse::parse(pdu).map(|rsp| {
                conn.characteristics
                    .extend(rsp.0.entries.iter().filter_map(|e| CharacteristicRecord::from_type_entry(e)));
            }),
            ATT_READ_BY_GROUP_TYPE_RSP => ReadByGroupTypeResponse::parse(pdu).map(|rsp| {
                conn.services
                    .extend(rsp.0.entries.iter().filter_map(|e| ServiceRecord::from_group_entry(e)));
            }),
            ATT_READ_RSP => ReadResponse::parse(pdu).map(|rsp| conn.value = rsp.value),
            _ => WriteResponse::parse(pdu).map(|_| ()),
        };

        if let Err(err) = parsed {
            warn!("att: malformed response 0x{:02x}: {}", opcode, err);
            conn.pending.errored = true;
            conn.pending.last_error = Some(err);
        }
        conn.pending.responded = true;
        Ok(())
    }

    /// Queue a received notification or indication for delivery
    pub(super) fn handle_notification(&mut self, connection: u16, pdu: &[u8]) -> AttResult<()> {
        // Both layouts are a handle followed by the value
        let notification = HandleValueNotification::parse(pdu)
            .or_else(|_| {
                HandleValueIndication::parse(pdu).map(|ind| HandleValueNotification {
                    handle: ind.handle,
                    value: ind.value,
                })
            })?;
        trace!(
            "att: notification 0x{:04x} on 0x{:04x}: {}",
            notification.handle,
            connection,
            hex::encode(&notification.value)
        );
        self.queue_notification(Notification {
            connection,
            handle: notification.handle,
            value: notification.value,
        });
        Ok(())
    }
}

impl<T: Transport> Stack<T> {
    /// Send one request and poll until it is answered.
    ///
    /// The caller holds the stack for the whole exchange, so at most one
    /// request is ever outstanding.
    fn att_request(&mut self, connection: u16, pdu: &[u8]) -> Result<()> {
        self.att.begin_request(connection, pdu[0])?;
        debug!("att: request 0x{:02x} on 0x{:04x}", pdu[0], connection);
        self.hci.send_acl(connection, L2CAP_CID_ATT, pdu)?;

        let result = self.wait_for_response(connection);
        self.att.finish_request(connection);
        result
    }

    fn wait_for_response(&mut self, connection: u16) -> Result<()> {
        let started = Instant::now();
        loop {
            let busy = self.poll()?;

            let pending = &self
                .att
                .connection(connection)
                .ok_or(AttError::UnknownConnection(connection))?
                .pending;
            if pending.responded {
                if !pending.errored {
                    return Ok(());
                }
                let err = pending
                    .last_error
                    .clone()
                    .unwrap_or(AttError::InvalidPdu("error response"));
                return Err(err.into());
            }

            if started.elapsed() >= self.config.att_timeout {
                warn!("att: request on 0x{:04x} timed out", connection);
                return Err(AttError::Timeout.into());
            }
            if !busy {
                thread::sleep(self.config.poll_sleep());
            }
        }
    }

    fn att_connection(&self, connection: u16) -> AttResult<&super::engine::ConnectionData> {
        self.att
            .connection(connection)
            .ok_or(AttError::UnknownConnection(connection))
    }

    /// Read By Group Type, e.g. primary service discovery
    pub fn read_by_group_type(
        &mut self,
        connection: u16,
        start_handle: u16,
        end_handle: u16,
        group_type: Uuid,
    ) -> Result<Vec<ServiceRecord>> {
        let request = ReadByGroupTypeRequest {
            start_handle,
            end_handle,
            group_type,
        };
        self.att_request(connection, &request.serialize())?;
        Ok(self.att_connection(connection)?.services.clone())
    }

    /// Read By Type, e.g. characteristic discovery
    pub fn read_by_type(
        &mut self,
        connection: u16,
        start_handle: u16,
        end_handle: u16,
        attribute_type: Uuid,
    ) -> Result<Vec<CharacteristicRecord>> {
        let request = ReadByTypeRequest {
            start_handle,
            end_handle,
            attribute_type,
        };
        self.att_request(connection, &request.serialize())?;
        Ok(self.att_connection(connection)?.characteristics.clone())
    }

    pub fn find_information(
        &mut self,
        connection: u16,
        start_handle: u16,
        end_handle: u16,
    ) -> Result<Vec<DescriptorRecord>> {
        let request = FindInformationRequest {
            start_handle,
            end_handle,
        };
        self.att_request(connection, &request.serialize())?;
        Ok(self.att_connection(connection)?.descriptors.clone())
    }

    pub fn read(&mut self, connection: u16, handle: u16) -> Result<Vec<u8>> {
        self.att_request(connection, &ReadRequest { handle }.serialize())?;
        Ok(self.att_connection(connection)?.value.clone())
    }

    pub fn write_request(&mut self, connection: u16, handle: u16, value: &[u8]) -> Result<()> {
        let request = WriteRequest {
            handle,
            value: value.to_vec(),
        };
        self.att_request(connection, &request.serialize())
    }

    /// Write Command: sent and forgotten
    pub fn write_command(&mut self, connection: u16, handle: u16, value: &[u8]) -> Result<()> {
        self.att_connection(connection)?;
        let command = WriteCommand {
            handle,
            value: value.to_vec(),
        };
        self.hci.send_acl(connection, L2CAP_CID_ATT, &command.serialize())?;
        Ok(())
    }

    /// Offer our largest MTU and return what was agreed
    pub fn exchange_mtu(&mut self, connection: u16) -> Result<u16> {
        self.att_connection(connection)?;
        let client_mtu = self.att.max_mtu();
        self.att_request(connection, &ExchangeMtuRequest { client_mtu }.serialize())?;
        Ok(self.att_connection(connection)?.mtu)
    }

    /// Last Error Response received on `connection`
    pub fn last_att_error(&self, connection: u16) -> Option<AttError> {
        self.att.last_error(connection)
    }
}
