//! ATT PDU layouts
//!
//! Every PDU implements [`AttPacket`]. Parsing checks the opcode and the
//! fixed-size fields; variable tails (values, attribute data lists) take the
//! rest of the PDU.

use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Trait for ATT packet serialization/deserialization
pub trait AttPacket: Sized {
    /// Opcode for this packet
    fn opcode() -> u8;

    /// Parse packet from bytes, opcode included
    fn parse(data: &[u8]) -> AttResult<Self>;

    /// Serialize packet to bytes
    fn serialize(&self) -> Vec<u8>;
}

/// Check the opcode and minimum length, returning a cursor past the opcode
fn body<'a, P: AttPacket>(data: &'a [u8], min_len: usize) -> AttResult<Cursor<&'a [u8]>> {
    if data.len() < min_len || data.first() != Some(&P::opcode()) {
        return Err(AttError::InvalidPdu("short PDU or wrong opcode"));
    }
    Ok(Cursor::new(&data[1..]))
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> AttResult<u16> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| AttError::InvalidPdu("truncated field"))
}

fn rest(cursor: &Cursor<&[u8]>) -> Vec<u8> {
    let data = *cursor.get_ref();
    data[(cursor.position() as usize).min(data.len())..].to_vec()
}

fn handle_range(start_handle: u16, end_handle: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(5);
    packet.extend_from_slice(&start_handle.to_le_bytes());
    packet.extend_from_slice(&end_handle.to_le_bytes());
    packet
}

/// Error response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub request_opcode: u8,
    pub handle: u16,
    pub error_code: AttErrorCode,
}

impl ErrorResponse {
    pub fn new(request_opcode: u8, handle: u16, error_code: AttErrorCode) -> Self {
        Self {
            request_opcode,
            handle,
            error_code,
        }
    }
}

impl AttPacket for ErrorResponse {
    fn opcode() -> u8 {
        ATT_ERROR_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut cursor = body::<Self>(data, 5)?;
        let request_opcode = data[1];
        cursor.set_position(1);
        let handle = read_u16(&mut cursor)?;
        Ok(Self {
            request_opcode,
            handle,
            error_code: data[4].into(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.push(self.request_opcode);
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.push(self.error_code.into());
        packet
    }
}

/// Exchange MTU Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuRequest {
    pub client_mtu: u16,
}

impl AttPacket for ExchangeMtuRequest {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut cursor = body::<Self>(data, 3)?;
        Ok(Self {
            client_mtu: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode()];
        packet.extend_from_slice(&self.client_mtu.to_le_bytes());
        packet
    }
}

/// Exchange MTU Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuResponse {
    pub server_mtu: u16,
}

impl AttPacket for ExchangeMtuResponse {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut cursor = body::<Self>(data, 3)?;
        Ok(Self {
            server_mtu: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode()];
        packet.extend_from_slice(&self.server_mtu.to_le_bytes());
        packet
    }
}

/// Find Information Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationRequest {
    pub start_handle: u16,
    pub end_handle: u16,
}

impl AttPacket for FindInformationRequest {
    fn opcode() -> u8 {
        ATT_FIND_INFO_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut cursor = body::<Self>(data, 5)?;
        Ok(Self {
            start_handle: read_u16(&mut cursor)?,
            end_handle: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode()];
        packet.extend_from_slice(&handle_range(self.start_handle, self.end_handle));
        packet
    }
}

/// Find Information Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationResponse {
    /// 1 for 16-bit UUIDs, 2 for 128-bit UUIDs
    pub format: u8,
    pub entries: Vec<(u16, Uuid)>,
}

impl AttPacket for FindInformationResponse {
    fn opcode() -> u8 {
        ATT_FIND_INFO_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 2)?;
        let format = data[1];
        let uuid_len = match format {
            ATT_FIND_INFO_RSP_FORMAT_16BIT => 2,
            ATT_FIND_INFO_RSP_FORMAT_128BIT => 16,
            _ => return Err(AttError::InvalidPdu("unknown find information format")),
        };

        let entries = data[2..]
            .chunks_exact(2 + uuid_len)
            .filter_map(|chunk| {
                let handle = u16::from_le_bytes([chunk[0], chunk[1]]);
                Uuid::try_from_slice_le(&chunk[2..]).map(|uuid| (handle, uuid))
            })
            .collect();
        Ok(Self { format, entries })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode(), self.format];
        for (handle, uuid) in &self.entries {
            packet.extend_from_slice(&handle.to_le_bytes());
            if self.format == ATT_FIND_INFO_RSP_FORMAT_16BIT {
                packet.extend_from_slice(&uuid.to_att_bytes());
            } else {
                packet.extend_from_slice(uuid.as_bytes_le());
            }
        }
        packet
    }
}

/// Read By Type and Read By Group Type requests share one layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub attribute_type: Uuid,
}

fn parse_typed_range(data: &[u8]) -> AttResult<(u16, u16, Uuid)> {
    let start_handle = u16::from_le_bytes([data[1], data[2]]);
    let end_handle = u16::from_le_bytes([data[3], data[4]]);
    let attribute_type =
        Uuid::try_from_slice_le(&data[5..]).ok_or(AttError::InvalidPdu("attribute type is not 2 or 16 bytes"))?;
    Ok((start_handle, end_handle, attribute_type))
}

fn serialize_typed_range(opcode: u8, start_handle: u16, end_handle: u16, uuid: &Uuid) -> Vec<u8> {
    let mut packet = vec![opcode];
    packet.extend_from_slice(&handle_range(start_handle, end_handle));
    packet.extend_from_slice(&uuid.to_att_bytes());
    packet
}

impl AttPacket for ReadByTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 7)?;
        let (start_handle, end_handle, attribute_type) = parse_typed_range(data)?;
        Ok(Self {
            start_handle,
            end_handle,
            attribute_type,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_typed_range(Self::opcode(), self.start_handle, self.end_handle, &self.attribute_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub group_type: Uuid,
}

impl AttPacket for ReadByGroupTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 7)?;
        let (start_handle, end_handle, group_type) = parse_typed_range(data)?;
        Ok(Self {
            start_handle,
            end_handle,
            group_type,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_typed_range(Self::opcode(), self.start_handle, self.end_handle, &self.group_type)
    }
}

/// Attribute data list: a length byte, then entries of exactly that length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDataList {
    pub entries: Vec<Vec<u8>>,
}

impl AttributeDataList {
    fn parse_body(data: &[u8]) -> AttResult<Self> {
        let length = *data.first().ok_or(AttError::InvalidPdu("missing entry length"))? as usize;
        if length == 0 {
            return Err(AttError::InvalidPdu("zero entry length"));
        }
        Ok(Self {
            entries: data[1..].chunks_exact(length).map(|c| c.to_vec()).collect(),
        })
    }

    fn serialize_with(&self, opcode: u8) -> Vec<u8> {
        let length = self.entries.first().map(|e| e.len()).unwrap_or(0);
        let mut packet = vec![opcode, length as u8];
        for entry in &self.entries {
            packet.extend_from_slice(entry);
        }
        packet
    }
}

/// Read By Type Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeResponse(pub AttributeDataList);

impl AttPacket for ReadByTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 2)?;
        AttributeDataList::parse_body(&data[1..]).map(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        self.0.serialize_with(Self::opcode())
    }
}

/// Read By Group Type Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeResponse(pub AttributeDataList);

impl AttPacket for ReadByGroupTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 2)?;
        AttributeDataList::parse_body(&data[1..]).map(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        self.0.serialize_with(Self::opcode())
    }
}

/// Read Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub handle: u16,
}

impl AttPacket for ReadRequest {
    fn opcode() -> u8 {
        ATT_READ_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut cursor = body::<Self>(data, 3)?;
        Ok(Self {
            handle: read_u16(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode()];
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet
    }
}

/// Read Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub value: Vec<u8>,
}

impl AttPacket for ReadResponse {
    fn opcode() -> u8 {
        ATT_READ_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 1)?;
        Ok(Self {
            value: data[1..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode()];
        packet.extend_from_slice(&self.value);
        packet
    }
}

/// A handle followed by a value. Shared by writes and server-initiated PDUs.
macro_rules! handle_value_pdu {
    ($(#[$meta:meta])* $name:ident, $opcode:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub handle: u16,
            pub value: Vec<u8>,
        }

        impl AttPacket for $name {
            fn opcode() -> u8 {
                $opcode
            }

            fn parse(data: &[u8]) -> AttResult<Self> {
                let mut cursor = body::<Self>(data, 3)?;
                let handle = read_u16(&mut cursor)?;
                Ok(Self {
                    handle,
                    value: rest(&cursor),
                })
            }

            fn serialize(&self) -> Vec<u8> {
                let mut packet = Vec::with_capacity(ATT_HANDLE_VALUE_HEADER + self.value.len());
                packet.push(Self::opcode());
                packet.extend_from_slice(&self.handle.to_le_bytes());
                packet.extend_from_slice(&self.value);
                packet
            }
        }
    };
}

handle_value_pdu!(
    /// Write Request packet
    WriteRequest,
    ATT_WRITE_REQ
);
handle_value_pdu!(
    /// Write Command packet, never answered
    WriteCommand,
    ATT_WRITE_CMD
);
handle_value_pdu!(
    /// Handle Value Notification packet
    HandleValueNotification,
    ATT_HANDLE_VALUE_NTF
);
handle_value_pdu!(
    /// Handle Value Indication packet, confirmed by the client
    HandleValueIndication,
    ATT_HANDLE_VALUE_IND
);

/// Write Response packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResponse;

impl AttPacket for WriteResponse {
    fn opcode() -> u8 {
        ATT_WRITE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        body::<Self>(data, 1)?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode()]
    }
}
