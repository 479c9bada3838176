//! ATT server role: answering a peer's requests from the local table
use super::constants::*;
use super::database::AttributeKind;
use super::engine::AttEngine;
use super::error::AttErrorCode;
use super::pdu::*;
use super::types::CharacteristicRecord;
use crate::uuid::{GATT_CHARACTERISTIC, GATT_PRIMARY_SERVICE, GATT_SECONDARY_SERVICE};
use log::debug;

type Reply = Result<Vec<u8>, ErrorResponse>;

fn invalid_pdu(opcode: u8) -> ErrorResponse {
    ErrorResponse::new(opcode, 0x0000, AttErrorCode::InvalidPdu)
}

/// Reject empty and inverted handle ranges
fn check_range(opcode: u8, start: u16, end: u16) -> Result<(), ErrorResponse> {
    if start == 0 || start > end {
        return Err(ErrorResponse::new(opcode, start, AttErrorCode::InvalidHandle));
    }
    Ok(())
}

/// Packs entries of equal length until the MTU is reached
struct EntryPacker {
    budget: usize,
    entries: Vec<Vec<u8>>,
}

impl EntryPacker {
    /// `header` bytes of the response are spent before the first entry
    fn new(mtu: u16, header: usize) -> Self {
        Self {
            budget: (mtu as usize).saturating_sub(header),
            entries: Vec::new(),
        }
    }

    /// False once the entry no longer fits or changes length
    fn push(&mut self, entry: Vec<u8>) -> bool {
        if let Some(first) = self.entries.first() {
            if first.len() != entry.len() {
                return false;
            }
        }
        if entry.len() > self.budget {
            return false;
        }
        self.budget -= entry.len();
        self.entries.push(entry);
        true
    }
}

impl AttEngine {
    fn connection_mtu(&self, connection: u16) -> u16 {
        self.mtu(connection).unwrap_or(ATT_DEFAULT_MTU)
    }

    pub(super) fn handle_request(&mut self, connection: u16, opcode: u8, pdu: &[u8]) -> Vec<u8> {
        let reply = match opcode {
            ATT_EXCHANGE_MTU_REQ => self.exchange_mtu(connection, pdu),
            ATT_FIND_INFO_REQ => self.find_information(connection, pdu),
            ATT_READ_BY_TYPE_REQ => self.read_by_type(connection, pdu),
            ATT_READ_REQ => self.read(connection, pdu),
            ATT_READ_BY_GROUP_TYPE_REQ => self.read_by_group_type(connection, pdu),
            ATT_WRITE_REQ => self.write(connection, pdu),
            ATT_FIND_BY_TYPE_VALUE_REQ
            | ATT_READ_BLOB_REQ
            | ATT_READ_MULTIPLE_REQ
            | ATT_PREPARE_WRITE_REQ
            | ATT_EXECUTE_WRITE_REQ => {
                debug!("att: request 0x{:02x} not supported", opcode);
                Err(ErrorResponse::new(opcode, 0x0000, AttErrorCode::RequestNotSupported))
            }
            _ => {
                debug!("att: unknown request 0x{:02x}", opcode);
                Err(ErrorResponse::new(opcode, 0x0000, AttErrorCode::RequestNotSupported))
            }
        };

        reply.unwrap_or_else(|err| {
            debug!("att: error response {:?}", err);
            err.serialize()
        })
    }

    fn exchange_mtu(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let request = ExchangeMtuRequest::parse(pdu).map_err(|_| invalid_pdu(ATT_EXCHANGE_MTU_REQ))?;
        let mtu = request.client_mtu.clamp(ATT_DEFAULT_MTU, self.max_mtu);
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.mtu = mtu;
        }
        debug!("att: mtu 0x{:04x} = {}", connection, mtu);
        Ok(ExchangeMtuResponse { server_mtu: mtu }.serialize())
    }

    fn read_by_group_type(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let opcode = ATT_READ_BY_GROUP_TYPE_REQ;
        let request = ReadByGroupTypeRequest::parse(pdu).map_err(|_| invalid_pdu(opcode))?;
        check_range(opcode, request.start_handle, request.end_handle)?;

        let not_found = ErrorResponse::new(opcode, request.start_handle, AttErrorCode::AttributeNotFound);
        if request.group_type != GATT_PRIMARY_SERVICE {
            if request.group_type == GATT_SECONDARY_SERVICE {
                return Err(not_found);
            }
            return Err(ErrorResponse::new(
                opcode,
                request.start_handle,
                AttErrorCode::UnsupportedGroupType,
            ));
        }

        let mut packer = EntryPacker::new(self.connection_mtu(connection), 2);
        for service in self.database.services_in(request.start_handle, request.end_handle) {
            if !packer.push(service.to_group_entry()) {
                break;
            }
        }

        if packer.entries.is_empty() {
            return Err(not_found);
        }
        Ok(ReadByGroupTypeResponse(AttributeDataList {
            entries: packer.entries,
        })
        .serialize())
    }

    fn read_by_type(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let opcode = ATT_READ_BY_TYPE_REQ;
        let request = ReadByTypeRequest::parse(pdu).map_err(|_| invalid_pdu(opcode))?;
        check_range(opcode, request.start_handle, request.end_handle)?;

        let mtu = self.connection_mtu(connection);
        let mut packer = EntryPacker::new(mtu, 2);
        let characteristics = self
            .database
            .characteristics_in(request.start_handle, request.end_handle);

        if request.attribute_type == GATT_CHARACTERISTIC {
            for characteristic in characteristics {
                if !packer.push(characteristic.record.to_type_entry()) {
                    break;
                }
            }
        } else {
            // Values of a given characteristic type, e.g. Device Name
            let max_value = (mtu as usize).saturating_sub(4).min(253);
            for characteristic in characteristics.filter(|c| c.record.uuid == request.attribute_type) {
                let CharacteristicRecord {
                    properties, value_handle, ..
                } = characteristic.record;
                if !properties.can_read() {
                    if packer.entries.is_empty() {
                        return Err(ErrorResponse::new(opcode, value_handle, AttErrorCode::ReadNotPermitted));
                    }
                    break;
                }
                let mut entry = value_handle.to_le_bytes().to_vec();
                entry.extend_from_slice(&characteristic.value[..characteristic.value.len().min(max_value)]);
                if !packer.push(entry) {
                    break;
                }
            }
        }

        if packer.entries.is_empty() {
            return Err(ErrorResponse::new(
                opcode,
                request.start_handle,
                AttErrorCode::AttributeNotFound,
            ));
        }
        Ok(ReadByTypeResponse(AttributeDataList {
            entries: packer.entries,
        })
        .serialize())
    }

    fn find_information(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let opcode = ATT_FIND_INFO_REQ;
        let request = FindInformationRequest::parse(pdu).map_err(|_| invalid_pdu(opcode))?;
        check_range(opcode, request.start_handle, request.end_handle)?;

        let mut packer = EntryPacker::new(self.connection_mtu(connection), 2);
        let mut entries = Vec::new();
        let mut format = None;
        for attribute in self.database.attributes_in(request.start_handle, request.end_handle) {
            let this_format = if attribute.uuid.is_16bit() {
                ATT_FIND_INFO_RSP_FORMAT_16BIT
            } else {
                ATT_FIND_INFO_RSP_FORMAT_128BIT
            };
            if *format.get_or_insert(this_format) != this_format {
                break;
            }

            let mut entry = attribute.handle.to_le_bytes().to_vec();
            entry.extend_from_slice(&attribute.uuid.to_att_bytes());
            if !packer.push(entry) {
                break;
            }
            entries.push((attribute.handle, attribute.uuid));
        }

        match format {
            Some(format) if !entries.is_empty() => Ok(FindInformationResponse { format, entries }.serialize()),
            _ => Err(ErrorResponse::new(
                opcode,
                request.start_handle,
                AttErrorCode::AttributeNotFound,
            )),
        }
    }

    fn read(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let opcode = ATT_READ_REQ;
        let request = ReadRequest::parse(pdu).map_err(|_| invalid_pdu(opcode))?;
        let handle = request.handle;
        let error = |code| ErrorResponse::new(opcode, handle, code);

        let attribute = self
            .database
            .attribute(handle)
            .ok_or_else(|| error(AttErrorCode::AttributeNotFound))?;

        let mut value = match attribute.kind {
            AttributeKind::Service | AttributeKind::Characteristic => attribute.value.clone(),
            AttributeKind::CharacteristicValue | AttributeKind::Descriptor => {
                let kind = attribute.kind;
                let characteristic = self
                    .database
                    .owner_of_mut(handle)
                    .ok_or_else(|| error(AttErrorCode::AttributeNotFound))?;
                let properties = characteristic.record.properties;

                if kind == AttributeKind::CharacteristicValue {
                    if !properties.can_read() {
                        return Err(error(AttErrorCode::ReadNotPermitted));
                    }
                    characteristic.value.clone()
                } else {
                    if !properties.can_subscribe() {
                        return Err(error(AttErrorCode::ReadNotPermitted));
                    }
                    characteristic.cccd.to_le_bytes().to_vec()
                }
            }
        };

        value.truncate((self.connection_mtu(connection) as usize).saturating_sub(1));
        Ok(ReadResponse { value }.serialize())
    }

    fn write(&mut self, connection: u16, pdu: &[u8]) -> Reply {
        let request = WriteRequest::parse(pdu).map_err(|_| invalid_pdu(ATT_WRITE_REQ))?;
        self.apply_write(connection, request.handle, &request.value, true)
            .map_err(|code| ErrorResponse::new(ATT_WRITE_REQ, request.handle, code))?;
        Ok(WriteResponse.serialize())
    }

    pub(super) fn handle_write_command(&mut self, connection: u16, pdu: &[u8]) {
        let command = match WriteCommand::parse(pdu) {
            Ok(command) => command,
            Err(err) => {
                debug!("att: bad write command: {}", err);
                return;
            }
        };
        if let Err(code) = self.apply_write(connection, command.handle, &command.value, false) {
            debug!("att: write command on 0x{:04x} dropped: {}", command.handle, code);
        }
    }

    /// Store a peer's write to a value or CCCD
    fn apply_write(
        &mut self,
        connection: u16,
        handle: u16,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), AttErrorCode> {
        let kind = self
            .database
            .attribute(handle)
            .map(|a| a.kind)
            .ok_or(AttErrorCode::AttributeNotFound)?;
        let characteristic = match kind {
            AttributeKind::CharacteristicValue | AttributeKind::Descriptor => self
                .database
                .owner_of_mut(handle)
                .ok_or(AttErrorCode::AttributeNotFound)?,
            _ => return Err(AttErrorCode::WriteNotPermitted),
        };
        let properties = characteristic.record.properties;

        if kind == AttributeKind::Descriptor {
            if !properties.can_subscribe() {
                return Err(AttErrorCode::WriteNotPermitted);
            }
            if value.len() < 2 {
                return Err(AttErrorCode::InvalidAttributeValueLength);
            }
            characteristic.cccd = u16::from_le_bytes([value[0], value[1]]);
            debug!("att: cccd 0x{:04x} = 0x{:04x}", handle, characteristic.cccd);
            return Ok(());
        }

        let allowed = if with_response {
            properties.can_write()
        } else {
            properties.can_write_without_response() || properties.can_write()
        };
        if !allowed {
            return Err(AttErrorCode::WriteNotPermitted);
        }

        characteristic.value = value.to_vec();
        if let Some(handler) = characteristic.write_handler.as_mut() {
            handler(connection, 0, value);
        }
        Ok(())
    }
}
